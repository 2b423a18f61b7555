//! Binding of live connections to room members

use crate::error::RelayError;
use crate::model::{ConnectionId, Member, MemberId, Room};

impl Room {
    /// Append a member for `connection_id`, keeping join order.
    ///
    /// Rejects duplicate member ids and joins beyond `capacity` without
    /// touching the existing members.
    pub fn bind(
        &mut self,
        member_id: MemberId,
        connection_id: ConnectionId,
        role: impl Into<String>,
        capacity: usize,
        now: i64,
    ) -> Result<&Member, RelayError> {
        if self.member(&member_id).is_some() {
            return Err(RelayError::DuplicateMember(member_id));
        }
        if self.members.len() >= capacity {
            return Err(RelayError::RoomFull(self.id.clone()));
        }
        self.members.push(Member {
            member_id,
            room_id: self.id.clone(),
            connection_id,
            role: role.into(),
        });
        self.last_activity = now;
        Ok(&self.members[self.members.len() - 1])
    }

    /// Remove and return the member bound to `connection_id`, if any
    pub fn unbind(&mut self, connection_id: &ConnectionId, now: i64) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|m| &m.connection_id == connection_id)?;
        self.last_activity = now;
        Some(self.members.remove(index))
    }

    /// Where to deliver events addressed to `member_id`
    pub fn resolve_connection(&self, member_id: &MemberId) -> Option<&ConnectionId> {
        self.member(member_id).map(|m| &m.connection_id)
    }

    pub fn member_by_connection(&self, connection_id: &ConnectionId) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| &m.connection_id == connection_id)
    }

    /// Connections of every bound member, in join order
    pub fn connections(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter().map(|m| &m.connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoomId;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const CAPACITY: usize = 4;

    fn room() -> Room {
        Room::new(RoomId::from("r"), MemberId::from("host"), 0)
    }

    #[test]
    fn bind_appends_in_join_order() {
        let mut room = room();
        room.bind("host".into(), "c1".into(), "host", CAPACITY, 1).unwrap();
        room.bind("guest".into(), "c2".into(), "guest", CAPACITY, 2).unwrap();

        let ids: Vec<_> = room.members.iter().map(|m| m.member_id.as_str()).collect();
        assert_eq!(ids, ["host", "guest"]);
        assert_eq!(room.members[1].room_id, RoomId::from("r"));
        assert_eq!(room.last_activity, 2);
    }

    #[test]
    fn duplicate_bind_is_rejected_without_overwriting() {
        let mut room = room();
        room.bind("a".into(), "c1".into(), "guest", CAPACITY, 0).unwrap();

        assert_matches!(
            room.bind("a".into(), "c2".into(), "host", CAPACITY, 0),
            Err(RelayError::DuplicateMember(id)) if id == MemberId::from("a")
        );
        assert_eq!(room.members.len(), 1);
        assert_eq!(room.members[0].connection_id, ConnectionId::from("c1"));
        assert_eq!(room.members[0].role, "guest");
    }

    #[test]
    fn bind_beyond_capacity_is_rejected() {
        let mut room = room();
        for i in 0..CAPACITY {
            room.bind(format!("m{i}").into(), format!("c{i}").into(), "guest", CAPACITY, 0)
                .unwrap();
        }
        assert_matches!(
            room.bind("late".into(), "c9".into(), "guest", CAPACITY, 0),
            Err(RelayError::RoomFull(_))
        );
        assert_eq!(room.members.len(), CAPACITY);
    }

    #[test]
    fn unbind_twice_returns_nothing_the_second_time() {
        let mut room = room();
        room.bind("a".into(), "c1".into(), "guest", CAPACITY, 0).unwrap();

        let removed = room.unbind(&"c1".into(), 5).unwrap();
        assert_eq!(removed.member_id, MemberId::from("a"));
        assert!(room.unbind(&"c1".into(), 6).is_none());
        assert_eq!(room.last_activity, 5);
    }

    #[test]
    fn resolve_connection_follows_the_binding() {
        let mut room = room();
        room.bind("a".into(), "c1".into(), "guest", CAPACITY, 0).unwrap();

        assert_eq!(room.resolve_connection(&"a".into()), Some(&ConnectionId::from("c1")));
        assert_eq!(
            room.member_by_connection(&"c1".into()).map(|m| &m.member_id),
            Some(&MemberId::from("a"))
        );
        room.unbind(&"c1".into(), 0);
        assert!(room.resolve_connection(&"a".into()).is_none());
    }

    proptest! {
        #[test]
        fn members_stay_unique_and_within_capacity(
            ops in proptest::collection::vec((0u8..6, any::<bool>()), 0..64)
        ) {
            let mut room = room();
            for (n, (member, join)) in ops.into_iter().enumerate() {
                if join {
                    let _ = room.bind(
                        MemberId(format!("m{member}")),
                        ConnectionId(format!("c{n}")),
                        "guest",
                        CAPACITY,
                        0,
                    );
                } else if let Some(conn) = room.resolve_connection(&MemberId(format!("m{member}"))).cloned() {
                    room.unbind(&conn, 0);
                }

                prop_assert!(room.members.len() <= CAPACITY);
                let mut ids: Vec<_> = room.members.iter().map(|m| m.member_id.clone()).collect();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), room.members.len());
            }
        }
    }
}
