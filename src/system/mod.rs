mod error;
pub(crate) mod validate;

pub use error::BookingError;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::clock::Clock;
use crate::limits::MAX_BOOKINGS_PER_ROOM;
use crate::model::*;
use crate::notify::{Notifier, NotifyError};
use crate::observability;
use crate::repository::RoomRepository;

use validate::*;

/// Decides, persists and announces room bookings.
///
/// Holds nothing but its collaborators; all state lives in the repository.
/// Each call is a plain sequence of awaits (clock read, repository read,
/// in-memory mutation, repository write, notification) with no internal
/// parallelism. Racing callers are kept apart by the repository's
/// check-and-set `save`, not here.
pub struct BookingSystem {
    clock: Arc<dyn Clock>,
    rooms: Arc<dyn RoomRepository>,
    notifier: Arc<dyn Notifier>,
}

impl BookingSystem {
    pub fn new(
        clock: Arc<dyn Clock>,
        rooms: Arc<dyn RoomRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock,
            rooms,
            notifier,
        }
    }

    /// Book `[start, end)` on a room.
    ///
    /// `Ok(false)` if the room already holds an overlapping booking; nothing is
    /// written in that case. On `Ok(true)` the booking is persisted; the
    /// confirmation is attempted afterwards and its failure is ignored.
    pub async fn book_room(
        &self,
        room_id: Option<&str>,
        start: Option<Ms>,
        end: Option<Ms>,
    ) -> Result<bool, BookingError> {
        let (Some(room_id), Some(start), Some(end)) = (present(room_id), start, end) else {
            return Err(BookingError::InvalidArgument(MISSING_BOOKING_ARGS));
        };
        let span = make_span(start, end)?;
        if span.start < self.clock.now() {
            return Err(BookingError::InvalidArgument(START_IN_PAST));
        }
        let mut room = self
            .rooms
            .find_by_id(room_id)
            .await?
            .ok_or(BookingError::InvalidArgument(UNKNOWN_ROOM))?;

        if room.has_overlap(&span) {
            debug!("room {room_id} taken for [{}, {})", span.start, span.end);
            metrics::counter!(observability::BOOKINGS_REJECTED_TOTAL, "reason" => "overlap")
                .increment(1);
            return Ok(false);
        }
        if room.bookings().len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(BookingError::LimitExceeded("too many bookings on room"));
        }

        let booking = Booking::new(Ulid::new().to_string(), room_id, span);
        room.add_booking(booking.clone());
        self.rooms.save(&room).await?;
        info!(
            "booked {} on room {room_id} for [{}, {})",
            booking.id(),
            span.start,
            span.end
        );
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);

        best_effort(
            "booking",
            booking.id(),
            self.notifier.send_booking_confirmation(&booking),
        )
        .await;
        Ok(true)
    }

    /// Rooms with no booking overlapping `[start, end)`, in no particular order.
    pub async fn get_available_rooms(
        &self,
        start: Option<Ms>,
        end: Option<Ms>,
    ) -> Result<Vec<Room>, BookingError> {
        let (Some(start), Some(end)) = (start, end) else {
            return Err(BookingError::InvalidArgument(MISSING_SPAN));
        };
        let span = make_span(start, end)?;
        let mut rooms = self.rooms.find_all().await?;
        rooms.retain(|room| !room.has_overlap(&span));
        Ok(rooms)
    }

    /// Cancel a booking that has not started yet.
    ///
    /// `Ok(false)` if no room holds `booking_id`. Bookings are found by scanning
    /// every room; there is no separate booking index.
    pub async fn cancel_booking(&self, booking_id: Option<&str>) -> Result<bool, BookingError> {
        let Some(booking_id) = present(booking_id) else {
            return Err(BookingError::InvalidArgument(MISSING_BOOKING_ID));
        };
        let owner = self
            .rooms
            .find_all()
            .await?
            .into_iter()
            .find(|room| room.has_booking(booking_id));
        let Some(mut room) = owner else {
            debug!("cancel: no booking {booking_id}");
            return Ok(false);
        };

        // `room` is our own copy; dropping it on the error path leaves the repository untouched.
        let Some(booking) = room.remove_booking(booking_id) else {
            return Ok(false);
        };
        if booking.start() <= self.clock.now() {
            return Err(BookingError::FailedPrecondition(ALREADY_STARTED));
        }

        self.rooms.save(&room).await?;
        info!("cancelled {booking_id} on room {}", room.id);
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);

        best_effort(
            "cancellation",
            booking_id,
            self.notifier.send_cancellation_confirmation(&booking),
        )
        .await;
        Ok(true)
    }
}

/// Await a notifier call, swallowing both its error and any panic inside it.
/// No retry.
async fn best_effort<F>(kind: &'static str, booking_id: &str, delivery: F)
where
    F: Future<Output = Result<(), NotifyError>>,
{
    let failure = match AssertUnwindSafe(delivery).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(_) => "notifier panicked".to_string(),
    };
    warn!("{kind} confirmation for {booking_id} not delivered: {failure}");
    metrics::counter!(observability::NOTIFY_FAILURES_TOTAL, "kind" => kind).increment(1);
}
