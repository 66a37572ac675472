use crate::limits::*;
use crate::model::*;

use super::BookingError;

pub(super) const MISSING_BOOKING_ARGS: &str = "requires valid room id, start and end time";
pub(super) const MISSING_SPAN: &str = "must supply both start and end time";
pub(super) const MISSING_BOOKING_ID: &str = "booking id cannot be absent";
pub(super) const END_NOT_AFTER_START: &str = "end time must be after start time";
pub(super) const TIMESTAMP_OUT_OF_RANGE: &str = "timestamp out of range";
pub(super) const START_IN_PAST: &str = "cannot book a time in the past";
pub(crate) const UNKNOWN_ROOM: &str = "room does not exist";
pub(super) const ALREADY_STARTED: &str = "cannot cancel a booking that has started or ended";

/// An empty id counts as absent.
pub(super) fn present(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

/// Build a span from raw bounds. `start` must come strictly before `end`.
pub(super) fn make_span(start: Ms, end: Ms) -> Result<Span, BookingError> {
    if end <= start {
        return Err(BookingError::InvalidArgument(END_NOT_AFTER_START));
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(BookingError::InvalidArgument(TIMESTAMP_OUT_OF_RANGE));
    }
    Ok(Span::new(start, end))
}
