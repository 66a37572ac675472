use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only time type.
pub type Ms = i64;

pub const SECOND: Ms = 1_000;
pub const MINUTE: Ms = 60 * SECOND;
pub const HOUR: Ms = 60 * MINUTE;
pub const DAY: Ms = 24 * HOUR;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// A confirmed reservation of one room. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    id: String,
    room_id: String,
    span: Span,
}

impl Booking {
    pub fn new(id: impl Into<String>, room_id: impl Into<String>, span: Span) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            span,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lookup key of the owning room.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> Ms {
        self.span.start
    }

    pub fn end(&self) -> Ms {
        self.span.end
    }
}

/// A bookable room and the bookings it currently holds.
///
/// Room does not guard its own invariant: callers check `has_overlap`
/// before `add_booking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Bumped by the repository on every successful save.
    pub version: u64,
    /// Sorted by `span.start`.
    bookings: Vec<Booking>,
}

impl Room {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: 0,
            bookings: Vec::new(),
        }
    }

    pub fn bookings(&self) -> &[Booking] {
        &self.bookings
    }

    /// Insert booking maintaining sort order by start.
    pub fn add_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.start(), |b| b.start())
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove booking by id. `None` if the room does not hold it.
    pub fn remove_booking(&mut self, booking_id: &str) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id() == booking_id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn has_booking(&self, booking_id: &str) -> bool {
        self.booking(booking_id).is_some()
    }

    pub fn booking(&self, booking_id: &str) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id() == booking_id)
    }

    /// Bookings whose span overlaps the query window.
    /// Uses binary search to skip bookings starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start() < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.end() > query.start)
    }

    pub fn has_overlap(&self, span: &Span) -> bool {
        self.overlapping(span).next().is_some()
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: String,
        name: String,
    },
    RoomRenamed {
        id: String,
        name: String,
    },
    BookingConfirmed {
        id: String,
        room_id: String,
        span: Span,
    },
    BookingCancelled {
        id: String,
        room_id: String,
    },
}

impl Event {
    pub fn room_id(&self) -> &str {
        match self {
            Event::RoomCreated { id, .. } | Event::RoomRenamed { id, .. } => id,
            Event::BookingConfirmed { room_id, .. } | Event::BookingCancelled { room_id, .. } => {
                room_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(id: &str, start: Ms, end: Ms) -> Booking {
        Booking::new(id, "room01", Span::new(start, end))
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_contained_overlaps() {
        let outer = Span::new(100, 400);
        let inner = Span::new(150, 300);
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
        assert!(outer.overlaps(&outer));
    }

    #[test]
    fn bookings_kept_sorted() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("c", 300, 400));
        room.add_booking(booking("a", 100, 200));
        room.add_booking(booking("b", 200, 300));
        let starts: Vec<Ms> = room.bookings().iter().map(|b| b.start()).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn add_booking_does_not_guard_overlap() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 100, 200));
        room.add_booking(booking("b", 150, 250));
        assert_eq!(room.bookings().len(), 2);
    }

    #[test]
    fn remove_and_has_booking() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 100, 200));
        assert!(room.has_booking("a"));

        let removed = room.remove_booking("a").unwrap();
        assert_eq!(removed.id(), "a");
        assert!(!room.has_booking("a"));
        assert!(room.bookings().is_empty());
    }

    #[test]
    fn remove_nonexistent_returns_none() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 100, 200));
        assert!(room.remove_booking("missing").is_none());
        assert_eq!(room.bookings().len(), 1); // untouched
    }

    #[test]
    fn remove_middle_preserves_order() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 0, 50));
        room.add_booking(booking("b", 100, 150));
        room.add_booking(booking("c", 200, 250));
        room.remove_booking("b");
        let ids: Vec<&str> = room.bookings().iter().map(|b| b.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("past", 100, 200));
        room.add_booking(booking("hit", 450, 600));
        room.add_booking(booking("future", 1000, 1100));

        let hits: Vec<_> = room.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "hit");
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 100, 200));
        assert!(!room.has_overlap(&Span::new(200, 300)));
        assert!(!room.has_overlap(&Span::new(0, 100)));
    }

    #[test]
    fn overlapping_single_ms() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("a", 100, 201));
        assert!(room.has_overlap(&Span::new(200, 300)));
    }

    #[test]
    fn overlapping_long_booking_spanning_query() {
        let mut room = Room::new("room01", "Dubbelrum");
        room.add_booking(booking("long", 0, 10_000));
        assert!(room.has_overlap(&Span::new(500, 600)));
    }

    #[test]
    fn empty_room_has_no_overlap() {
        let room = Room::new("room01", "Dubbelrum");
        assert!(!room.has_overlap(&Span::new(0, 1000)));
    }

    #[test]
    fn booking_serialization_roundtrip() {
        let b = booking("a", 100, 200);
        let bytes = bincode::serialize(&b).unwrap();
        let decoded: Booking = bincode::deserialize(&bytes).unwrap();
        assert_eq!(b, decoded);
    }

    #[test]
    fn event_room_id() {
        let created = Event::RoomCreated {
            id: "room01".into(),
            name: "Dubbelrum".into(),
        };
        let cancelled = Event::BookingCancelled {
            id: "b1".into(),
            room_id: "room02".into(),
        };
        assert_eq!(created.room_id(), "room01");
        assert_eq!(cancelled.room_id(), "room02");
    }
}
