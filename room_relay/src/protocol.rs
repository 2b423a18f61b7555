//! Wire vocabulary of the relay
//!
//! Real-time events travel as adjacently tagged JSON objects:
//!
//! ```json
//! {"event": "MEMBER_JOIN", "data": {"memberId": "..."}}
//! {"event": "ROOM_DISBAND"}
//! {"event": "SEND_ICE_CANDIDATE", "data": {"target": "...", "candidate": {}}}
//! ```
//!
//! Chat and signaling payloads are opaque to the relay apart from `target`
//! (targeted events) and `timestamp` (stamped on chat messages).

use crate::error::ClientRequestError;
use crate::model::{ConnectionId, Member, MemberId, RoomId};
use crate::registry::RoomAvailability;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Field stamped onto chat messages by the relay
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Payload of an event addressed to one member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetedPayload {
    pub target: MemberId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub member_id: MemberId,
}

/// Events sent from the relay to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEvent {
    MemberJoin(MemberRef),
    MemberLeave(MemberRef),
    RoomDisband,
    ReceiveChatMessage(Map<String, Value>),
    ReceiveVideoOfferAnswer(TargetedPayload),
    ReceiveIceCandidate(TargetedPayload),
}

impl ServerEvent {
    pub fn member_join(member_id: MemberId) -> Self {
        ServerEvent::MemberJoin(MemberRef { member_id })
    }

    pub fn member_leave(member_id: MemberId) -> Self {
        ServerEvent::MemberLeave(MemberRef { member_id })
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::MemberJoin(_) => "MEMBER_JOIN",
            ServerEvent::MemberLeave(_) => "MEMBER_LEAVE",
            ServerEvent::RoomDisband => "ROOM_DISBAND",
            ServerEvent::ReceiveChatMessage(_) => "RECEIVE_CHAT_MESSAGE",
            ServerEvent::ReceiveVideoOfferAnswer(_) => "RECEIVE_VIDEO_OFFER_ANSWER",
            ServerEvent::ReceiveIceCandidate(_) => "RECEIVE_ICE_CANDIDATE",
        }
    }
}

/// Events sent from clients to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEvent {
    SendChatMessage(Map<String, Value>),
    SendVideoOfferAnswer(TargetedPayload),
    SendIceCandidate(TargetedPayload),
}

impl FromStr for ClientEvent {
    type Err = ClientRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s)?;
        let name = value
            .get("event")
            .and_then(Value::as_str)
            .ok_or(ClientRequestError::MissingParameter("event"))?;
        if !matches!(
            name,
            "SEND_CHAT_MESSAGE" | "SEND_VIDEO_OFFER_ANSWER" | "SEND_ICE_CANDIDATE"
        ) {
            return Err(ClientRequestError::UnsupportedType(name.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// Connection metadata supplied when a real-time connection opens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub role: String,
}

/// Body of the room-exists reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomExistsResponse {
    pub room_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
}

impl From<RoomAvailability> for RoomExistsResponse {
    fn from(availability: RoomAvailability) -> Self {
        match availability {
            RoomAvailability::Missing => Self {
                room_exists: false,
                full: None,
                member_id: None,
            },
            RoomAvailability::Full => Self {
                room_exists: true,
                full: Some(true),
                member_id: None,
            },
            RoomAvailability::Open { member_id } => Self {
                room_exists: true,
                full: Some(false),
                member_id: Some(member_id),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    /// The host's member id
    pub member_id: MemberId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInfo {
    #[serde(flatten)]
    pub member: Member,
    pub is_room_host: bool,
}

/// Body of the member-info reply: either the member or an error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberInfoResponse {
    MemberInfo(MemberInfo),
    Err(String),
}

/// Body returned when a connection is admitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connection_id: ConnectionId,
    pub member_id: MemberId,
    pub events: Vec<Value>,
}

/// Body returned by a poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub connection_id: ConnectionId,
    pub events: Vec<Value>,
    /// Set once the connection has been closed by the relay; no further
    /// polls will succeed
    pub closed: bool,
}
