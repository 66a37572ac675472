use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{RepositoryError, RoomRepository, RoomSlots, check_room_limits, check_version};

type SharedRoom = Arc<RwLock<Room>>;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Vec<Event>, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Every append that is already queued when the first one
/// arrives rides the same fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (events, response) = match cmd {
            WalCommand::Append { events, response } => (events, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(events, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { events, response }) => batch.push((events, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        flush_batch(&mut wal, batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (events, _) in &batch {
        if let Err(e) = wal.append_buffered(events) {
            result = Err(e);
            break;
        }
    }
    let result = result.and_then(|()| wal.flush_sync());
    if let Err(e) = &result {
        // Every caller in the batch is told it failed, so none of it may stay on disk.
        tracing::warn!("WAL batch of {} appends failed: {e}", batch.len());
        if let Err(rollback) = wal.rollback() {
            tracing::error!("WAL rollback failed: {rollback}");
        }
    }

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Apply one event to a room. Caller holds the lock.
fn apply_to_room(room: &mut Room, event: &Event) {
    match event {
        Event::RoomRenamed { name, .. } => room.name = name.clone(),
        Event::BookingConfirmed { id, room_id, span } => {
            room.add_booking(Booking::new(id.clone(), room_id.clone(), *span));
        }
        Event::BookingCancelled { id, .. } => {
            room.remove_booking(id);
        }
        // Creation is handled at the map level
        Event::RoomCreated { .. } => {}
    }
}

/// Events that turn `stored` into `incoming`. Bookings are immutable, so
/// comparing ids is enough.
fn diff_room(stored: &Room, incoming: &Room) -> Vec<Event> {
    let mut events = Vec::new();
    if stored.name != incoming.name {
        events.push(Event::RoomRenamed {
            id: incoming.id.clone(),
            name: incoming.name.clone(),
        });
    }
    let kept: HashSet<&str> = incoming.bookings().iter().map(|b| b.id()).collect();
    for b in stored.bookings() {
        if !kept.contains(b.id()) {
            events.push(Event::BookingCancelled {
                id: b.id().to_string(),
                room_id: stored.id.clone(),
            });
        }
    }
    for b in incoming.bookings() {
        if !stored.has_booking(b.id()) {
            events.push(Event::BookingConfirmed {
                id: b.id().to_string(),
                room_id: incoming.id.clone(),
                span: b.span(),
            });
        }
    }
    events
}

fn room_events(room: &Room) -> Vec<Event> {
    let mut events = Vec::with_capacity(room.bookings().len() + 1);
    events.push(Event::RoomCreated {
        id: room.id.clone(),
        name: room.name.clone(),
    });
    events.extend(room.bookings().iter().map(|b| Event::BookingConfirmed {
        id: b.id().to_string(),
        room_id: room.id.clone(),
        span: b.span(),
    }));
    events
}

/// Durable repository: an in-memory room map rebuilt from, and written
/// through to, a write-ahead log.
///
/// Each room sits behind its own lock, held across the version check, the
/// WAL append and the apply, so `save` is an atomic check-and-set.
///
/// Writers hold the `compaction` gate shared; `compact` holds it exclusively
/// from the state snapshot until the rewritten log is in place, so no
/// acknowledged write can land in a log that is about to be replaced.
pub struct WalRoomRepository {
    rooms: DashMap<String, SharedRoom>,
    slots: RoomSlots,
    compaction: RwLock<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalRoomRepository {
    /// Replay the log at `path` and start the writer task. Must run inside a Tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let events = Wal::replay(path)?;
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let rooms: DashMap<String, Room> = DashMap::new();
        for event in &events {
            match event {
                Event::RoomCreated { id, name } => {
                    rooms.insert(id.clone(), Room::new(id.clone(), name.clone()));
                }
                other => {
                    if let Some(mut room) = rooms.get_mut(other.room_id()) {
                        apply_to_room(&mut room, other);
                    }
                }
            }
        }
        tracing::info!(
            "replayed {} events into {} rooms from {}",
            events.len(),
            rooms.len(),
            path.display()
        );

        Ok(Self {
            slots: RoomSlots::with_count(rooms.len()),
            rooms: rooms
                .into_iter()
                .map(|(id, room)| (id, Arc::new(RwLock::new(room))))
                .collect(),
            compaction: RwLock::new(()),
            wal_tx,
        })
    }

    async fn wal_append(&self, events: Vec<Event>) -> Result<(), RepositoryError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                events,
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    fn get_room(&self, id: &str) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let _gate = self.compaction.write().await;
        let mut events = Vec::new();
        let shared: Vec<SharedRoom> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for room in shared {
            events.extend(room_events(&*room.read().await));
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| RepositoryError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl RoomRepository for WalRoomRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, RepositoryError> {
        match self.get_room(id) {
            Some(room) => Ok(Some(room.read().await.clone())),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Room>, RepositoryError> {
        // Collect handles first so no map shard is held across an await.
        let shared: Vec<SharedRoom> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut rooms = Vec::with_capacity(shared.len());
        for room in shared {
            rooms.push(room.read().await.clone());
        }
        Ok(rooms)
    }

    async fn save(&self, room: &Room) -> Result<(), RepositoryError> {
        check_room_limits(room)?;
        let shared = self
            .get_room(&room.id)
            .ok_or_else(|| RepositoryError::NotFound(room.id.clone()))?;
        let _gate = self.compaction.read().await;
        let mut guard = shared.write().await;
        check_version(&guard, room)?;

        let events = diff_room(&guard, room);
        if !events.is_empty() {
            self.wal_append(events.clone()).await?;
        }
        for event in &events {
            apply_to_room(&mut guard, event);
        }
        guard.version += 1;
        Ok(())
    }

    async fn insert(&self, room: Room) -> Result<(), RepositoryError> {
        check_room_limits(&room)?;
        let _gate = self.compaction.read().await;
        self.slots.reserve()?;
        let id = room.id.clone();
        let shared = Arc::new(RwLock::new(room));
        // Reserve the id while the creation is logged; readers wait on the lock.
        let mut guard = shared.clone().write_owned().await;
        match self.rooms.entry(id.clone()) {
            Entry::Occupied(_) => {
                self.slots.release();
                return Err(RepositoryError::AlreadyExists(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(shared);
            }
        }
        if let Err(e) = self.wal_append(room_events(&guard)).await {
            drop(guard);
            self.rooms.remove(&id);
            self.slots.release();
            return Err(e);
        }
        guard.version = 0;
        Ok(())
    }
}
