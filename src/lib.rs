pub mod clock;
pub mod command;
pub mod compactor;
pub mod config;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod repository;
pub mod system;
pub mod wal;
pub mod wire;

pub use clock::{Clock, ManualClock, SystemClock};
pub use model::{Booking, Ms, Room, Span};
pub use notify::{Notifier, NotifyError, NotifyHub};
pub use repository::{InMemoryRoomRepository, RepositoryError, RoomRepository, WalRoomRepository};
pub use system::{BookingError, BookingSystem};
