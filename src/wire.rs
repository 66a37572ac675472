use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::command::{self, Command};
use crate::limits::{MAX_LINE_LEN, NOTIFY_CHANNEL_CAPACITY};
use crate::model::Room;
use crate::notify::{ALL_ROOMS, Notification, NotifyHub};
use crate::observability;
use crate::repository::RoomRepository;
use crate::system::validate::UNKNOWN_ROOM;
use crate::system::{BookingError, BookingSystem};

/// Everything a connection needs, shared by all connections.
pub struct Service {
    system: BookingSystem,
    rooms: Arc<dyn RoomRepository>,
    hub: Arc<NotifyHub>,
}

impl Service {
    pub fn new(clock: Arc<dyn Clock>, rooms: Arc<dyn RoomRepository>, hub: Arc<NotifyHub>) -> Self {
        Self {
            system: BookingSystem::new(clock, rooms.clone(), hub.clone()),
            rooms,
            hub,
        }
    }

    pub fn system(&self) -> &BookingSystem {
        &self.system
    }

    async fn execute(&self, cmd: Command, session: &mut Session) -> Result<Value, BookingError> {
        match cmd {
            Command::CreateRoom { id, name } => {
                self.rooms.insert(Room::new(id, name)).await?;
                Ok(json!({ "ok": true }))
            }
            Command::ListRooms => {
                let rooms = self.rooms.find_all().await?;
                Ok(json!({ "ok": true, "rooms": rooms }))
            }
            Command::Book {
                room_id,
                start,
                end,
            } => {
                let booked = self.system.book_room(room_id.as_deref(), start, end).await?;
                Ok(json!({ "ok": true, "booked": booked }))
            }
            Command::Available { start, end } => {
                let rooms = self.system.get_available_rooms(start, end).await?;
                Ok(json!({ "ok": true, "rooms": rooms }))
            }
            Command::Cancel { booking_id } => {
                let cancelled = self.system.cancel_booking(booking_id.as_deref()).await?;
                Ok(json!({ "ok": true, "cancelled": cancelled }))
            }
            Command::Listen { channel } => {
                if channel != ALL_ROOMS && self.rooms.find_by_id(&channel).await?.is_none() {
                    return Err(BookingError::InvalidArgument(UNKNOWN_ROOM));
                }
                session.listen(&self.hub, channel);
                Ok(json!({ "ok": true }))
            }
            Command::Unlisten => {
                session.unlisten_all();
                Ok(json!({ "ok": true }))
            }
            Command::Ping => Ok(json!({ "ok": true, "pong": true })),
        }
    }

    /// Parse and run one line, always producing a reply.
    async fn handle_line(&self, line: &str, session: &mut Session) -> Value {
        let cmd = match command::parse(line) {
            Ok(cmd) => cmd,
            Err(e) => return error_reply("parse", &e.to_string()),
        };
        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let result = self.execute(cmd, session).await;
        metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(reply) => {
                metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => "ok")
                    .increment(1);
                reply
            }
            Err(e) => {
                metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => e.code())
                    .increment(1);
                error_reply(e.code(), &e.to_string())
            }
        }
    }
}

fn error_reply(code: &str, message: &str) -> Value {
    json!({ "ok": false, "code": code, "message": message })
}

/// Per-connection subscription state. One forwarder task per channel moves hub
/// notifications into `tx`; they are aborted on UNLISTEN or disconnect.
struct Session {
    tx: mpsc::Sender<Notification>,
    forwarders: HashMap<String, JoinHandle<()>>,
}

impl Session {
    fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self {
            tx,
            forwarders: HashMap::new(),
        }
    }

    /// Listening twice on the same channel is a no-op.
    fn listen(&mut self, hub: &NotifyHub, channel: String) {
        if self.forwarders.contains_key(&channel) {
            return;
        }
        let mut rx = hub.subscribe(&channel);
        let tx = self.tx.clone();
        let name = channel.clone();
        self.forwarders.insert(name, tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(n) => {
                        if tx.send(n).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("listener on {channel} lagged, dropped {skipped} notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    fn unlisten_all(&mut self) {
        for (_, task) in self.forwarders.drain() {
            task.abort();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.unlisten_all();
    }
}

/// Serve one client until it disconnects.
pub async fn process_connection(socket: TcpStream, service: Arc<Service>) -> io::Result<()> {
    let framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (mut sink, mut lines) = framed.split();
    let (tx, mut notifications) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
    let mut session = Session::new(tx);

    loop {
        tokio::select! {
            line = lines.next() => {
                let reply = match line {
                    None => break,
                    Some(Ok(line)) if line.trim().is_empty() => continue,
                    Some(Ok(line)) => service.handle_line(&line, &mut session).await,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        // The framed reader is done after a decode error
                        warn!("closing connection after over-long line");
                        let reply = error_reply("parse", "line too long");
                        sink.send(reply.to_string()).await.map_err(codec_io)?;
                        break;
                    }
                    Some(Err(LinesCodecError::Io(e))) => return Err(e),
                };
                sink.send(reply.to_string()).await.map_err(codec_io)?;
            }
            Some(n) = notifications.recv() => {
                let line = json!({ "notification": n }).to_string();
                sink.send(line).await.map_err(codec_io)?;
            }
        }
    }
    debug!("client disconnected");
    Ok(())
}

fn codec_io(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        other => io::Error::other(other),
    }
}
