//! Process-wide store of rooms
//!
//! The registry owns every [`Room`] and, through them, every [`Member`].
//! Membership changes go through the binding operations on [`Room`]
//! (see [`crate::binding`]), reached via [`RoomRegistry::find_room_mut`].

use crate::error::RelayError;
use crate::ids::{IdGenerator, IdKind};
use crate::model::{MemberId, Room, RoomId};
use crate::protocol::MemberInfo;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// Default number of members a room admits
pub const DEFAULT_ROOM_CAPACITY: usize = 4;

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomAvailability {
    Missing,
    Full,
    /// The room has space; `member_id` is free for the next joiner
    Open { member_id: MemberId },
}

pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    capacity: usize,
    ids: Rc<dyn IdGenerator>,
}

impl RoomRegistry {
    pub fn new(capacity: usize, ids: Rc<dyn IdGenerator>) -> Self {
        Self {
            rooms: HashMap::new(),
            capacity,
            ids,
        }
    }

    /// Rebuild a registry from previously saved rooms
    pub fn restore(
        rooms: impl IntoIterator<Item = Room>,
        capacity: usize,
        ids: Rc<dyn IdGenerator>,
    ) -> Self {
        let rooms = rooms.into_iter().map(|room| (room.id.clone(), room)).collect();
        Self {
            rooms,
            capacity,
            ids,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Create an empty room and designate a fresh host id for it
    pub fn create_room(&mut self, now: i64) -> (RoomId, MemberId) {
        let room_id = loop {
            let candidate = RoomId(self.ids.next_id(IdKind::Room));
            if !self.rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let host_id = MemberId(self.ids.next_id(IdKind::Member));
        self.rooms.insert(
            room_id.clone(),
            Room::new(room_id.clone(), host_id.clone(), now),
        );
        info!(room_id = %room_id, host_id = %host_id, "room created");
        (room_id, host_id)
    }

    /// Insert a room with a known id whose host is a generated id nobody holds.
    ///
    /// Returns `false` if the id is already taken.
    pub fn seed_room(&mut self, room_id: RoomId, now: i64) -> bool {
        if self.rooms.contains_key(&room_id) {
            return false;
        }
        let host_id = MemberId(self.ids.next_id(IdKind::Member));
        info!(room_id = %room_id, host_id = %host_id, "room seeded");
        self.rooms
            .insert(room_id.clone(), Room::new(room_id, host_id, now));
        true
    }

    pub fn find_room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn find_room_mut(&mut self, room_id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    /// Admission check: is there a room, is it full, and which id should the
    /// next joiner use
    pub fn room_exists(&self, room_id: &RoomId) -> RoomAvailability {
        let Some(room) = self.rooms.get(room_id) else {
            return RoomAvailability::Missing;
        };
        if room.member_count() >= self.capacity {
            return RoomAvailability::Full;
        }
        let member_id = loop {
            let candidate = MemberId(self.ids.next_id(IdKind::Member));
            if !room.is_host(&candidate) && room.member(&candidate).is_none() {
                break candidate;
            }
        };
        RoomAvailability::Open { member_id }
    }

    /// Remove a room and all its members. Deleting an absent room is a no-op.
    pub fn delete_room(&mut self, room_id: &RoomId) -> Option<Room> {
        let removed = self.rooms.remove(room_id);
        if let Some(room) = &removed {
            info!(room_id = %room_id, members = room.member_count(), "room deleted");
        }
        removed
    }

    /// Describe a bound member, flagging whether it hosts the room
    pub fn member_info(
        &self,
        room_id: &RoomId,
        member_id: &MemberId,
    ) -> Result<MemberInfo, RelayError> {
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| RelayError::RoomNotFound(room_id.clone()))?;
        let member = room
            .member(member_id)
            .ok_or_else(|| RelayError::MemberNotFound(member_id.clone()))?;
        Ok(MemberInfo {
            member: member.clone(),
            is_room_host: room.is_host(member_id),
        })
    }

    /// Delete rooms that have had no members since before `now - idle_ms`
    pub fn reclaim_abandoned(&mut self, now: i64, idle_ms: i64) -> Vec<RoomId> {
        let stale: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|room| room.members.is_empty() && now - room.last_activity > idle_ms)
            .map(|room| room.id.clone())
            .collect();
        for room_id in &stale {
            self.rooms.remove(room_id);
            info!(room_id = %room_id, "abandoned room reclaimed");
        }
        if !stale.is_empty() {
            debug!(reclaimed = stale.len(), remaining = self.rooms.len(), "reclaim sweep");
        }
        stale
    }
}
