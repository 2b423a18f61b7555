//! Per-connection session state machine
//!
//! ```text
//! Connecting ──admitted──▶ Joined ──connection lost──▶ Left
//!      └──────────room missing / full / duplicate──────▶ Left
//! ```
//!
//! There is no resume: once a connection has left, its member id is gone
//! from the room for good. When the departing member hosts the room, the
//! room is disbanded and every connection still bound to it is left
//! orphaned; those sessions are dropped here and the transport closes them
//! on their next interaction.

use crate::clock::Clock;
use crate::error::RelayError;
use crate::model::{ConnectionId, Member, MemberId, RoomId};
use crate::protocol::{ClientEvent, Handshake, ServerEvent};
use crate::registry::RoomRegistry;
use crate::router::{DeliverySink, MessageRouter, RouteOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Joined,
    Left,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Connecting, SessionState::Joined)
                | (SessionState::Connecting, SessionState::Left)
                | (SessionState::Joined, SessionState::Left)
        )
    }
}

/// A real-time connection and the member it speaks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub connection_id: ConnectionId,
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub state: SessionState,
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            connection_id = %self.connection_id,
            from = ?self.state,
            to = ?next,
            "session transition"
        );
        self.state = next;
    }
}

/// Close out a session whose admission failed
fn refuse(mut session: Session, error: RelayError) -> RelayError {
    session.transition(SessionState::Left);
    warn!(
        connection_id = %session.connection_id,
        room_id = %session.room_id,
        member_id = %session.member_id,
        error = %error,
        "connection refused"
    );
    error
}

/// Result of a connection leaving its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// The departed session, in state [`SessionState::Left`]
    pub session: Session,
    pub member: Member,
    /// The departing member hosted the room, which no longer exists
    pub disbanded: bool,
    /// Connections that were still in the disbanded room
    pub orphaned: Vec<ConnectionId>,
}

pub struct SessionLifecycle {
    registry: RoomRegistry,
    router: MessageRouter,
    clock: Rc<dyn Clock>,
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionLifecycle {
    pub fn new(registry: RoomRegistry, router: MessageRouter, clock: Rc<dyn Clock>) -> Self {
        Self {
            registry,
            router,
            clock,
            sessions: HashMap::new(),
        }
    }

    /// Rebuild with sessions that were joined before a snapshot was taken
    pub fn restore(
        registry: RoomRegistry,
        router: MessageRouter,
        clock: Rc<dyn Clock>,
        sessions: impl IntoIterator<Item = Session>,
    ) -> Self {
        let sessions = sessions
            .into_iter()
            .filter(|s| s.state == SessionState::Joined)
            .map(|s| (s.connection_id.clone(), s))
            .collect();
        Self {
            registry,
            router,
            clock,
            sessions,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RoomRegistry {
        &mut self.registry
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// State of a live connection; `None` once it has left or if it never
    /// joined
    pub fn state(&self, connection_id: &ConnectionId) -> Option<SessionState> {
        self.sessions.get(connection_id).map(|s| s.state)
    }

    /// Admit a new connection into the room named by its handshake and
    /// announce it with `MEMBER_JOIN`.
    ///
    /// On error the connection must be closed; nothing was bound.
    pub fn connect(
        &mut self,
        connection_id: ConnectionId,
        handshake: Handshake,
        sink: &mut dyn DeliverySink,
    ) -> Result<Member, RelayError> {
        if self.sessions.contains_key(&connection_id) {
            return Err(RelayError::ConnectionAlreadyBound(connection_id));
        }
        let Handshake {
            room_id,
            member_id,
            role,
        } = handshake;
        let mut session = Session {
            connection_id: connection_id.clone(),
            room_id: room_id.clone(),
            member_id: member_id.clone(),
            state: SessionState::Connecting,
        };

        let now = self.clock.now_millis();
        let capacity = self.registry.capacity();
        let Some(room) = self.registry.find_room_mut(&room_id) else {
            return Err(refuse(session, RelayError::RoomNotFound(room_id)));
        };
        let member = match room.bind(member_id, connection_id.clone(), role, capacity, now) {
            Ok(member) => member.clone(),
            Err(e) => return Err(refuse(session, e)),
        };

        session.transition(SessionState::Joined);
        self.sessions.insert(connection_id.clone(), session);
        info!(
            connection_id = %connection_id,
            room_id = %room_id,
            member_id = %member.member_id,
            role = %member.role,
            members = room.member_count(),
            "member joined"
        );
        self.router
            .broadcast(room, &ServerEvent::member_join(member.member_id.clone()), sink);
        Ok(member)
    }

    /// Route an inbound client event from a joined connection
    pub fn handle_event(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
        sink: &mut dyn DeliverySink,
    ) -> Result<RouteOutcome, RelayError> {
        let session = self
            .sessions
            .get(connection_id)
            .ok_or_else(|| RelayError::UnknownConnection(connection_id.clone()))?;
        let room = self
            .registry
            .find_room(&session.room_id)
            .ok_or_else(|| RelayError::RoomNotFound(session.room_id.clone()))?;
        let sender = room
            .member_by_connection(connection_id)
            .ok_or_else(|| RelayError::UnknownConnection(connection_id.clone()))?;
        Ok(self.router.dispatch(room, sender, event, sink))
    }

    /// Handle loss of a connection: unbind it, announce `MEMBER_LEAVE`, and
    /// disband the room if the host left.
    ///
    /// Safe to call for connections that never joined or already left;
    /// those return `None` and emit nothing.
    pub fn disconnect(
        &mut self,
        connection_id: &ConnectionId,
        sink: &mut dyn DeliverySink,
    ) -> Option<Departure> {
        let Some(mut session) = self.sessions.remove(connection_id) else {
            debug!(connection_id = %connection_id, "disconnect for unknown connection ignored");
            return None;
        };
        let now = self.clock.now_millis();
        let room = self.registry.find_room_mut(&session.room_id)?;
        let member = room.unbind(connection_id, now)?;
        session.transition(SessionState::Left);
        info!(
            connection_id = %connection_id,
            room_id = %room.id,
            member_id = %member.member_id,
            members = room.member_count(),
            "member left"
        );
        self.router
            .broadcast(room, &ServerEvent::member_leave(member.member_id.clone()), sink);

        let disbanded = room.is_host(&member.member_id);
        let mut orphaned = Vec::new();
        if disbanded {
            self.router.broadcast(room, &ServerEvent::RoomDisband, sink);
            orphaned = room.connections().cloned().collect();
            info!(room_id = %session.room_id, orphaned = orphaned.len(), "host left, room disbanded");
            self.registry.delete_room(&session.room_id);
            for orphan in &orphaned {
                if let Some(mut s) = self.sessions.remove(orphan) {
                    s.transition(SessionState::Left);
                }
            }
        }

        Some(Departure {
            session,
            member,
            disbanded,
            orphaned,
        })
    }
}
