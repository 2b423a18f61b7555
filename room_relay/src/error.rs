//! Error types for the room relay

use crate::model::{ConnectionId, MemberId, RoomId};
use thiserror::Error;

/// Errors from room, membership and routing operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No room with this id is registered
    #[error("Room {0} not found")]
    RoomNotFound(RoomId),

    /// The room exists but has no such member
    #[error("Member {0} not found")]
    MemberNotFound(MemberId),

    /// A member with this id is already bound in the room
    #[error("Member {0} is already in the room")]
    DuplicateMember(MemberId),

    /// The room already holds its maximum number of members
    #[error("Room {0} is full")]
    RoomFull(RoomId),

    /// The connection is not bound to any member
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection id is already bound to a member
    #[error("Connection {0} is already bound")]
    ConnectionAlreadyBound(ConnectionId),
}

/// Errors from client requests
#[derive(Error, Debug)]
pub enum ClientRequestError {
    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported event name
    #[error("Unsupported event type: {0}")]
    UnsupportedType(String),

    /// A required handshake or header value is missing
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// The request body could not be read
    #[error("Failed to read body: {0}")]
    Body(String),
}

/// Errors from loading or saving state snapshots
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from reading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A flag or `RELAY_*` variable could not be parsed
    #[error("{0}")]
    Cli(#[from] clap::Error),

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
