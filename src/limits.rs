use crate::model::Ms;

/// 1970-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;
pub const MAX_ROOM_ID_LEN: usize = 128;
pub const MAX_ROOM_NAME_LEN: usize = 256;

/// Longest accepted protocol line, in bytes.
pub const MAX_LINE_LEN: usize = 4096;
/// Buffered notifications per broadcast channel before slow listeners lag.
pub const NOTIFY_CHANNEL_CAPACITY: usize = 256;
