//! Room-scoped event routing
//!
//! The router never talks to a transport directly. It resolves recipients
//! from a [`Room`] and hands each event to an injected [`DeliverySink`],
//! which is whatever the transport uses to reach a connection (an outbox in
//! the long-polling server, a recording vector in tests).

use crate::clock::Clock;
use crate::model::{ConnectionId, Member, MemberId, Room};
use crate::protocol::{ClientEvent, ServerEvent, TargetedPayload, TIMESTAMP_FIELD};
use serde_json::{Map, Value};
use std::rc::Rc;
use tracing::debug;

/// Capability to push one event to one live connection
pub trait DeliverySink {
    fn deliver(&mut self, connection: &ConnectionId, event: &ServerEvent);
}

impl DeliverySink for Vec<(ConnectionId, ServerEvent)> {
    fn deliver(&mut self, connection: &ConnectionId, event: &ServerEvent) {
        self.push((connection.clone(), event.clone()));
    }
}

/// What happened to a routed event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Delivered to this many connections in the room
    Broadcast(usize),
    Relayed(ConnectionId),
    /// The target is not bound in the room; the event was discarded
    Dropped(MemberId),
}

pub struct MessageRouter {
    clock: Rc<dyn Clock>,
}

impl MessageRouter {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Deliver `event` to every connection bound in `room`
    pub fn broadcast(
        &self,
        room: &Room,
        event: &ServerEvent,
        sink: &mut dyn DeliverySink,
    ) -> RouteOutcome {
        let mut recipients = 0;
        for connection in room.connections() {
            sink.deliver(connection, event);
            recipients += 1;
        }
        debug!(room_id = %room.id, event = event.name(), recipients, "broadcast");
        RouteOutcome::Broadcast(recipients)
    }

    /// Deliver `event` to the connection bound to `target`, or drop it
    pub fn relay(
        &self,
        room: &Room,
        target: &MemberId,
        event: &ServerEvent,
        sink: &mut dyn DeliverySink,
    ) -> RouteOutcome {
        match room.resolve_connection(target) {
            Some(connection) => {
                sink.deliver(connection, event);
                debug!(room_id = %room.id, target = %target, event = event.name(), "relayed");
                RouteOutcome::Relayed(connection.clone())
            }
            None => {
                debug!(room_id = %room.id, target = %target, event = event.name(), "target gone, dropping");
                RouteOutcome::Dropped(target.clone())
            }
        }
    }

    /// Handle a client event meant for the whole room
    pub fn on_broadcast_event(
        &self,
        room: &Room,
        sender: &Member,
        mut message: Map<String, Value>,
        sink: &mut dyn DeliverySink,
    ) -> RouteOutcome {
        message.insert(
            TIMESTAMP_FIELD.to_string(),
            Value::from(self.clock.now_millis()),
        );
        debug!(room_id = %room.id, sender = %sender.member_id, "chat message");
        self.broadcast(room, &ServerEvent::ReceiveChatMessage(message), sink)
    }

    /// Handle a client event addressed to one member. `wrap` builds the
    /// outbound event from the untouched payload.
    pub fn on_targeted_event(
        &self,
        room: &Room,
        sender: &Member,
        payload: TargetedPayload,
        wrap: fn(TargetedPayload) -> ServerEvent,
        sink: &mut dyn DeliverySink,
    ) -> RouteOutcome {
        let target = payload.target.clone();
        let event = wrap(payload);
        debug!(room_id = %room.id, sender = %sender.member_id, target = %target, event = event.name(), "signal");
        self.relay(room, &target, &event, sink)
    }

    /// Route one inbound client event from `sender`
    pub fn dispatch(
        &self,
        room: &Room,
        sender: &Member,
        event: ClientEvent,
        sink: &mut dyn DeliverySink,
    ) -> RouteOutcome {
        match event {
            ClientEvent::SendChatMessage(message) => {
                self.on_broadcast_event(room, sender, message, sink)
            }
            ClientEvent::SendVideoOfferAnswer(payload) => self.on_targeted_event(
                room,
                sender,
                payload,
                ServerEvent::ReceiveVideoOfferAnswer,
                sink,
            ),
            ClientEvent::SendIceCandidate(payload) => self.on_targeted_event(
                room,
                sender,
                payload,
                ServerEvent::ReceiveIceCandidate,
                sink,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::RoomId;
    use serde_json::json;

    type Sent = Vec<(ConnectionId, ServerEvent)>;

    fn room_with(members: &[&str]) -> Room {
        let mut room = Room::new(RoomId::from("r"), MemberId::from(members[0]), 0);
        for name in members {
            room.bind(
                MemberId::from(*name),
                ConnectionId(format!("conn-{name}")),
                "guest",
                4,
                0,
            )
            .unwrap();
        }
        room
    }

    fn router(now: i64) -> MessageRouter {
        MessageRouter::new(Rc::new(ManualClock::new(now)))
    }

    fn targeted(target: &str) -> TargetedPayload {
        serde_json::from_value(json!({"target": target, "candidate": {"sdpMid": "0"}})).unwrap()
    }

    #[test]
    fn chat_is_stamped_and_reaches_the_whole_room() {
        let room = room_with(&["a", "b", "c"]);
        let mut sink = Sent::new();
        let mut message = Map::new();
        message.insert("content".into(), json!("hi"));
        message.insert("timestamp".into(), json!(1));

        let outcome = router(42).dispatch(
            &room,
            &room.members[1],
            ClientEvent::SendChatMessage(message),
            &mut sink,
        );

        assert_eq!(outcome, RouteOutcome::Broadcast(3));
        let recipients: Vec<_> = sink.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(recipients, ["conn-a", "conn-b", "conn-c"]);
        let ServerEvent::ReceiveChatMessage(delivered) = &sink[0].1 else {
            panic!("expected a chat message");
        };
        assert_eq!(delivered["content"], json!("hi"));
        assert_eq!(delivered["timestamp"], json!(42));
    }

    #[test]
    fn targeted_events_reach_only_the_target() {
        let room = room_with(&["a", "b", "c"]);
        let mut sink = Sent::new();

        let outcome = router(0).dispatch(
            &room,
            &room.members[0],
            ClientEvent::SendIceCandidate(targeted("c")),
            &mut sink,
        );

        assert_eq!(outcome, RouteOutcome::Relayed(ConnectionId::from("conn-c")));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].0, ConnectionId::from("conn-c"));
        assert_eq!(sink[0].1, ServerEvent::ReceiveIceCandidate(targeted("c")));
    }

    #[test]
    fn events_for_departed_members_are_dropped() {
        let mut room = room_with(&["a", "b"]);
        room.unbind(&ConnectionId::from("conn-b"), 0);
        let mut sink = Sent::new();

        let outcome = router(0).dispatch(
            &room,
            &room.members[0],
            ClientEvent::SendVideoOfferAnswer(targeted("b")),
            &mut sink,
        );

        assert_eq!(outcome, RouteOutcome::Dropped(MemberId::from("b")));
        assert!(sink.is_empty());
    }

    #[test]
    fn broadcast_stays_inside_the_room() {
        let room = room_with(&["a"]);
        let other = room_with(&["x", "y"]);
        let mut sink = Sent::new();

        router(0).broadcast(&room, &ServerEvent::RoomDisband, &mut sink);

        assert_eq!(sink, vec![(ConnectionId::from("conn-a"), ServerEvent::RoomDisband)]);
        assert!(other.connections().all(|c| sink.iter().all(|(d, _)| d != c)));
    }
}
