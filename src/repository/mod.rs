mod memory;
mod wal_store;

pub use memory::InMemoryRoomRepository;
pub use wal_store::WalRoomRepository;

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;

use crate::limits::MAX_ROOMS;
use crate::model::Room;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("room not found: {0}")]
    NotFound(String),
    #[error("room already exists: {0}")]
    AlreadyExists(String),
    /// The room changed since the caller read it.
    #[error("stale write to room {room_id}: read version {expected}, stored version {found}")]
    StaleWrite {
        room_id: String,
        expected: u64,
        found: u64,
    },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("WAL error: {0}")]
    Wal(String),
}

/// Durable home of rooms and their bookings.
///
/// `save` is a check-and-set: it only succeeds if `room.version` still equals
/// the stored version, and bumps the stored version on success. Two callers
/// racing from the same read can therefore never both commit.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, RepositoryError>;

    async fn find_all(&self) -> Result<Vec<Room>, RepositoryError>;

    /// Persist the full booking collection of `room`.
    async fn save(&self, room: &Room) -> Result<(), RepositoryError>;

    /// Register a room the repository does not know yet.
    async fn insert(&self, room: Room) -> Result<(), RepositoryError>;
}

pub(crate) fn check_room_limits(room: &Room) -> Result<(), RepositoryError> {
    use crate::limits::{MAX_BOOKINGS_PER_ROOM, MAX_ROOM_ID_LEN, MAX_ROOM_NAME_LEN};
    if room.id.is_empty() || room.id.len() > MAX_ROOM_ID_LEN {
        return Err(RepositoryError::LimitExceeded("room id length"));
    }
    if room.name.len() > MAX_ROOM_NAME_LEN {
        return Err(RepositoryError::LimitExceeded("room name too long"));
    }
    if room.bookings().len() > MAX_BOOKINGS_PER_ROOM {
        return Err(RepositoryError::LimitExceeded("too many bookings on room"));
    }
    Ok(())
}

pub(crate) fn check_version(stored: &Room, incoming: &Room) -> Result<(), RepositoryError> {
    if stored.version != incoming.version {
        return Err(RepositoryError::StaleWrite {
            room_id: incoming.id.clone(),
            expected: incoming.version,
            found: stored.version,
        });
    }
    Ok(())
}

/// Number of rooms held, counted by reservation so concurrent inserts
/// cannot overshoot `MAX_ROOMS`.
#[derive(Debug, Default)]
pub(crate) struct RoomSlots(AtomicUsize);

impl RoomSlots {
    pub(crate) fn with_count(count: usize) -> Self {
        Self(AtomicUsize::new(count))
    }

    /// Claim a slot for one new room. Give it back with `release` if the insert fails.
    pub(crate) fn reserve(&self) -> Result<(), RepositoryError> {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_ROOMS).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| RepositoryError::LimitExceeded("too many rooms"))
    }

    pub(crate) fn release(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
