//! Server state management for the relay
//!
//! Each request loads the last [`Snapshot`] from the [`StateStore`], rebuilds
//! the registry and session table, runs a liveness sweep, performs its
//! operation, and saves the result. Requests are expected to be handled one
//! at a time.
//!
//! A long-polling connection is an outbox of pending events keyed by
//! connection id. Polling drains it; a connection that stops polling for
//! longer than the configured idle window is treated as lost.

use crate::clock::{Clock, SystemClock};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::ids::{IdGenerator, IdKind, UuidIds};
use crate::lifecycle::{Departure, Session, SessionLifecycle};
use crate::model::{ConnectionId, MemberId, Room, RoomId};
use crate::protocol::{
    ClientEvent, ConnectResponse, CreateRoomResponse, Handshake, MemberInfoResponse,
    PollResponse, RoomExistsResponse, ServerEvent,
};
use crate::registry::RoomRegistry;
use crate::router::{DeliverySink, MessageRouter, RouteOutcome};
use crate::store::{FileStore, StateStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tracing::{info, warn};

/// Pending events for one connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbox {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub events: VecDeque<Value>,
    pub last_seen: i64,
    /// The relay closed this connection; the next poll delivers what is
    /// left and forgets it
    pub closing: bool,
}

/// Everything carried from one request to the next
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub rooms: Vec<Room>,
    pub sessions: Vec<Session>,
    pub outboxes: HashMap<ConnectionId, Outbox>,
}

#[derive(Debug, Default)]
struct Outboxes(HashMap<ConnectionId, Outbox>);

impl DeliverySink for Outboxes {
    fn deliver(&mut self, connection: &ConnectionId, event: &ServerEvent) {
        let Some(outbox) = self.0.get_mut(connection) else {
            warn!(connection_id = %connection, event = event.name(), "no outbox for bound connection");
            return;
        };
        if outbox.closing {
            return;
        }
        match serde_json::to_value(event) {
            Ok(value) => outbox.events.push_back(value),
            Err(e) => warn!(event = event.name(), error = %e, "failed to serialize event"),
        }
    }
}

/// Live state for the duration of one request
struct Relay {
    lifecycle: SessionLifecycle,
    outboxes: Outboxes,
}

impl Relay {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            rooms: self.lifecycle.registry().rooms().cloned().collect(),
            sessions: self.lifecycle.sessions().cloned().collect(),
            outboxes: self.outboxes.0.clone(),
        }
    }

    /// Disconnect a connection and close whatever it orphaned
    fn drop_connection(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        let departure = self
            .lifecycle
            .disconnect(connection_id, &mut self.outboxes);
        self.outboxes.0.remove(connection_id);
        if let Some(departure) = &departure {
            for orphan in &departure.orphaned {
                if let Some(outbox) = self.outboxes.0.get_mut(orphan) {
                    outbox.closing = true;
                }
            }
        }
        departure
    }

    /// Treat silent connections as lost and reclaim abandoned rooms
    fn sweep(&mut self, now: i64, config: &RelayConfig) {
        let connection_idle_ms = i64::try_from(config.connection_idle_ms).unwrap_or(i64::MAX);
        let room_idle_ms = i64::try_from(config.room_idle_ms).unwrap_or(i64::MAX);
        let silent: Vec<ConnectionId> = self
            .outboxes
            .0
            .iter()
            .filter(|(_, outbox)| now - outbox.last_seen > connection_idle_ms)
            .map(|(id, _)| id.clone())
            .collect();
        for connection_id in silent {
            info!(connection_id = %connection_id, "connection timed out");
            self.drop_connection(&connection_id);
        }

        let unreachable: Vec<ConnectionId> = self
            .lifecycle
            .sessions()
            .filter(|s| !self.outboxes.0.contains_key(&s.connection_id))
            .map(|s| s.connection_id.clone())
            .collect();
        for connection_id in unreachable {
            warn!(connection_id = %connection_id, "session without outbox, disconnecting");
            self.drop_connection(&connection_id);
        }

        self.lifecycle
            .registry_mut()
            .reclaim_abandoned(now, room_idle_ms);
    }
}

/// The relay as seen by the transport
#[derive(Clone)]
pub struct ServerState {
    config: RelayConfig,
    store: Rc<dyn StateStore>,
    ids: Rc<dyn IdGenerator>,
    clock: Rc<dyn Clock>,
}

impl ServerState {
    /// File-backed state with random ids and the system clock
    pub fn new(config: RelayConfig) -> Self {
        let store = Rc::new(FileStore::new(config.state_file.clone()));
        Self::with_parts(config, store, Rc::new(UuidIds), Rc::new(SystemClock))
    }

    pub fn with_parts(
        config: RelayConfig,
        store: Rc<dyn StateStore>,
        ids: Rc<dyn IdGenerator>,
        clock: Rc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            ids,
            clock,
        }
    }

    fn load(&self) -> Relay {
        let snapshot = match self.store.load() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to load state, starting empty");
                None
            }
        };
        let router = MessageRouter::new(self.clock.clone());
        match snapshot {
            Some(Snapshot {
                rooms,
                sessions,
                outboxes,
            }) => {
                let registry =
                    RoomRegistry::restore(rooms, self.config.room_capacity, self.ids.clone());
                Relay {
                    lifecycle: SessionLifecycle::restore(
                        registry,
                        router,
                        self.clock.clone(),
                        sessions,
                    ),
                    outboxes: Outboxes(outboxes),
                }
            }
            None => {
                let mut registry = RoomRegistry::new(self.config.room_capacity, self.ids.clone());
                let now = self.clock.now_millis();
                for room_id in &self.config.seed_rooms {
                    registry.seed_room(RoomId(room_id.clone()), now);
                }
                Relay {
                    lifecycle: SessionLifecycle::new(registry, router, self.clock.clone()),
                    outboxes: Outboxes::default(),
                }
            }
        }
    }

    fn save(&self, relay: &Relay) {
        if let Err(e) = self.store.save(&relay.snapshot()) {
            warn!(error = %e, "failed to save state");
        }
    }

    /// Load, sweep, run `op`, save
    fn with_relay<T>(&self, op: impl FnOnce(&mut Relay, i64) -> T) -> T {
        let mut relay = self.load();
        let now = self.clock.now_millis();
        relay.sweep(now, &self.config);
        let result = op(&mut relay, now);
        self.save(&relay);
        result
    }

    pub fn create_room(&self) -> CreateRoomResponse {
        self.with_relay(|relay, now| {
            let (room_id, member_id) = relay.lifecycle.registry_mut().create_room(now);
            CreateRoomResponse { room_id, member_id }
        })
    }

    pub fn room_exists(&self, room_id: &RoomId) -> RoomExistsResponse {
        self.with_relay(|relay, _| relay.lifecycle.registry().room_exists(room_id).into())
    }

    pub fn member_info(&self, room_id: &RoomId, member_id: &MemberId) -> MemberInfoResponse {
        self.with_relay(
            |relay, _| match relay.lifecycle.registry().member_info(room_id, member_id) {
                Ok(info) => MemberInfoResponse::MemberInfo(info),
                Err(e) => MemberInfoResponse::Err(e.to_string()),
            },
        )
    }

    /// Open a connection for `handshake`. On error the connection was never
    /// admitted and must be closed.
    pub fn connect(&self, handshake: Handshake) -> Result<ConnectResponse, RelayError> {
        self.with_relay(|relay, now| {
            let connection_id = ConnectionId(self.ids.next_id(IdKind::Connection));
            relay.outboxes.0.insert(
                connection_id.clone(),
                Outbox {
                    room_id: handshake.room_id.clone(),
                    member_id: handshake.member_id.clone(),
                    events: VecDeque::new(),
                    last_seen: now,
                    closing: false,
                },
            );
            match relay
                .lifecycle
                .connect(connection_id.clone(), handshake, &mut relay.outboxes)
            {
                Ok(member) => {
                    let events: Vec<Value> = relay
                        .outboxes
                        .0
                        .get_mut(&connection_id)
                        .map(|outbox| outbox.events.drain(..).collect())
                        .unwrap_or_default();
                    Ok(ConnectResponse {
                        connection_id,
                        member_id: member.member_id,
                        events,
                    })
                }
                Err(e) => {
                    relay.outboxes.0.remove(&connection_id);
                    Err(e)
                }
            }
        })
    }

    /// Drain pending events for a connection
    pub fn poll(&self, connection_id: &ConnectionId) -> Result<PollResponse, RelayError> {
        self.with_relay(|relay, now| {
            let outbox = relay
                .outboxes
                .0
                .get_mut(connection_id)
                .ok_or_else(|| RelayError::UnknownConnection(connection_id.clone()))?;
            outbox.last_seen = now;
            let events: Vec<Value> = outbox.events.drain(..).collect();
            let closed = outbox.closing;
            if closed {
                relay.outboxes.0.remove(connection_id);
                info!(connection_id = %connection_id, "orphaned connection closed");
            }
            Ok(PollResponse {
                connection_id: connection_id.clone(),
                events,
                closed,
            })
        })
    }

    /// Route an event sent by a connection
    pub fn emit(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
    ) -> Result<RouteOutcome, RelayError> {
        self.with_relay(|relay, now| {
            match relay.outboxes.0.get_mut(connection_id) {
                Some(outbox) if !outbox.closing => outbox.last_seen = now,
                _ => return Err(RelayError::UnknownConnection(connection_id.clone())),
            }
            relay
                .lifecycle
                .handle_event(connection_id, event, &mut relay.outboxes)
        })
    }

    /// Close a connection. Repeated or unknown disconnects do nothing.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Option<Departure> {
        self.with_relay(|relay, _| relay.drop_connection(connection_id))
    }

    /// Current copy of a room, for inspection
    pub fn room(&self, room_id: &RoomId) -> Option<Room> {
        self.with_relay(|relay, _| relay.lifecycle.registry().find_room(room_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ids::SequentialIds;
    use crate::store::MemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn server(config: RelayConfig) -> (ServerState, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(1_000));
        let state = ServerState::with_parts(
            config,
            Rc::new(MemoryStore::new()),
            Rc::new(SequentialIds::new()),
            clock.clone(),
        );
        (state, clock)
    }

    fn handshake(room_id: &RoomId, member_id: &MemberId) -> Handshake {
        Handshake {
            room_id: room_id.clone(),
            member_id: member_id.clone(),
            role: "guest".into(),
        }
    }

    #[test]
    fn connect_returns_the_join_announcement() {
        let (state, _) = server(RelayConfig::default());
        let created = state.create_room();

        let connected = state
            .connect(handshake(&created.room_id, &created.member_id))
            .unwrap();

        assert_eq!(connected.member_id, created.member_id);
        assert_eq!(
            connected.events,
            vec![json!({"event": "MEMBER_JOIN", "data": {"memberId": created.member_id}})]
        );
    }

    #[test]
    fn refused_connection_leaves_no_outbox() {
        let (state, _) = server(RelayConfig::default());

        let result = state.connect(handshake(&RoomId::from("missing"), &MemberId::from("m")));

        assert_matches!(result, Err(RelayError::RoomNotFound(_)));
        assert_matches!(
            state.poll(&ConnectionId::from("conn-1")),
            Err(RelayError::UnknownConnection(_))
        );
    }

    #[test]
    fn orphans_get_the_disband_then_are_closed() {
        let (state, _) = server(RelayConfig::default());
        let created = state.create_room();
        let host = state
            .connect(handshake(&created.room_id, &created.member_id))
            .unwrap();
        let guest = state
            .connect(handshake(&created.room_id, &MemberId::from("guest")))
            .unwrap();
        state.poll(&host.connection_id).unwrap();

        state.disconnect(&host.connection_id).unwrap();

        let last = state.poll(&guest.connection_id).unwrap();
        assert!(last.closed);
        assert_eq!(
            last.events,
            vec![
                json!({"event": "MEMBER_LEAVE", "data": {"memberId": created.member_id}}),
                json!({"event": "ROOM_DISBAND"}),
            ]
        );
        assert_matches!(
            state.poll(&guest.connection_id),
            Err(RelayError::UnknownConnection(_))
        );
        assert!(state.room(&created.room_id).is_none());
    }

    #[test]
    fn silent_connections_time_out() {
        let config = RelayConfig {
            connection_idle_ms: 100,
            ..RelayConfig::default()
        };
        let (state, clock) = server(config);
        let created = state.create_room();
        let host = state
            .connect(handshake(&created.room_id, &created.member_id))
            .unwrap();
        let guest = state
            .connect(handshake(&created.room_id, &MemberId::from("guest")))
            .unwrap();

        clock.advance(60);
        state.poll(&host.connection_id).unwrap();
        clock.advance(60);

        let polled = state.poll(&host.connection_id).unwrap();
        assert_eq!(
            polled.events,
            vec![json!({"event": "MEMBER_LEAVE", "data": {"memberId": "guest"}})]
        );
        assert!(state.disconnect(&guest.connection_id).is_none());
    }

    #[test]
    fn fresh_connections_survive_the_shortest_idle_window() {
        let config = RelayConfig {
            connection_idle_ms: 1,
            ..RelayConfig::default()
        };
        let (state, _) = server(config);
        let created = state.create_room();
        let host = state
            .connect(handshake(&created.room_id, &created.member_id))
            .unwrap();

        assert!(!state.poll(&host.connection_id).unwrap().closed);
        assert!(state.room(&created.room_id).is_some());
    }

    #[test]
    fn seeded_rooms_exist_on_first_start() {
        let config = RelayConfig {
            seed_rooms: vec!["123".to_string()],
            ..RelayConfig::default()
        };
        let (state, _) = server(config);

        assert_matches!(
            state.room_exists(&RoomId::from("123")),
            RoomExistsResponse { room_exists: true, full: Some(false), member_id: Some(_) }
        );
    }

    #[test]
    fn abandoned_rooms_are_reclaimed() {
        let config = RelayConfig {
            room_idle_ms: 500,
            ..RelayConfig::default()
        };
        let (state, clock) = server(config);
        let created = state.create_room();

        clock.advance(501);

        assert!(!state.room_exists(&created.room_id).room_exists);
    }

    #[test]
    fn emit_from_unknown_connection_is_rejected() {
        let (state, _) = server(RelayConfig::default());
        let result = state.emit(
            &ConnectionId::from("nobody"),
            ClientEvent::SendChatMessage(Default::default()),
        );
        assert_matches!(result, Err(RelayError::UnknownConnection(_)));
    }
}
