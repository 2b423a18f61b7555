//! Room and member records owned by the registry

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl $name {
            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Room identifier
    RoomId
);
string_id!(
    /// Member identifier, unique within its room
    MemberId
);
string_id!(
    /// Identifier of a live real-time connection, unique across the registry
    ConnectionId
);

/// A participant bound to a live connection inside a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: MemberId,
    pub room_id: RoomId,
    pub connection_id: ConnectionId,
    pub role: String,
}

/// A call room with at most `capacity` members, in join order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub host_id: MemberId,
    pub members: Vec<Member>,
    /// Milliseconds since the epoch of the last join or leave (or creation)
    pub last_activity: i64,
}

impl Room {
    /// Create an empty room hosted by `host_id`
    pub fn new(id: RoomId, host_id: MemberId, now: i64) -> Self {
        Self {
            id,
            host_id,
            members: Vec::new(),
            last_activity: now,
        }
    }

    /// Whether `member_id` designates this room's host
    pub fn is_host(&self, member_id: &MemberId) -> bool {
        &self.host_id == member_id
    }

    /// Look up a bound member by id
    pub fn member(&self, member_id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.member_id == member_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}
