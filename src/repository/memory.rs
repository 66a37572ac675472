use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::Room;

use super::{RepositoryError, RoomRepository, RoomSlots, check_room_limits, check_version};

/// Process-local repository. Each room's check-and-set runs under its map shard lock.
#[derive(Debug, Default)]
pub struct InMemoryRoomRepository {
    rooms: DashMap<String, Room>,
    slots: RoomSlots,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a repository. Every room goes through the same checks as `insert`.
    pub fn with_rooms(rooms: impl IntoIterator<Item = Room>) -> Result<Self, RepositoryError> {
        let repo = Self::new();
        for room in rooms {
            repo.insert_room(room)?;
        }
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn insert_room(&self, room: Room) -> Result<(), RepositoryError> {
        check_room_limits(&room)?;
        self.slots.reserve()?;
        match self.rooms.entry(room.id.clone()) {
            Entry::Occupied(_) => {
                self.slots.release();
                Err(RepositoryError::AlreadyExists(room.id))
            }
            Entry::Vacant(slot) => {
                let mut room = room;
                room.version = 0;
                slot.insert(room);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, RepositoryError> {
        Ok(self.rooms.get(id).map(|r| r.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<Room>, RepositoryError> {
        Ok(self.rooms.iter().map(|r| r.value().clone()).collect())
    }

    async fn save(&self, room: &Room) -> Result<(), RepositoryError> {
        check_room_limits(room)?;
        let mut stored = self
            .rooms
            .get_mut(&room.id)
            .ok_or_else(|| RepositoryError::NotFound(room.id.clone()))?;
        check_version(&stored, room)?;
        let mut next = room.clone();
        next.version = stored.version + 1;
        *stored = next;
        Ok(())
    }

    async fn insert(&self, room: Room) -> Result<(), RepositoryError> {
        self.insert_room(room)
    }
}
