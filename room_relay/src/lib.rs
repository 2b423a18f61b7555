//! WASI-compatible signaling relay for small peer-to-peer call rooms
//!
//! The relay never carries media. It keeps track of rooms (at most four
//! members, one host) and passes the handshake messages peers need to set up
//! a direct connection: offers/answers and ICE candidates go to one named
//! member, chat and membership notices go to the whole room. When the host
//! leaves, the room is disbanded.
//!
//! # Protocol
//!
//! The real-time channel runs over HTTP long-polling:
//!
//! - **POST /connect?roomId=&memberId=&role=** - Join a room, returns a connection id
//! - **GET /poll?connectionId={id}** - Receive pending events
//! - **POST /emit** - Send an event (X-Connection-Id header required)
//! - **POST /disconnect** - Leave (X-Connection-Id header required)
//!
//! plus the discovery endpoints `GET /api/room-exists/{roomId}`,
//! `POST /api/create-room` and `GET /api/member-info/{memberId}?roomId=`.
//!
//! ## Events (server → client)
//!
//! - `{"event": "MEMBER_JOIN", "data": {"memberId": "..."}}`
//! - `{"event": "MEMBER_LEAVE", "data": {"memberId": "..."}}`
//! - `{"event": "ROOM_DISBAND"}`
//! - `{"event": "RECEIVE_CHAT_MESSAGE", "data": {..., "timestamp": 1700000000000}}`
//! - `{"event": "RECEIVE_VIDEO_OFFER_ANSWER", "data": {"target": "...", "sdp": ..., "name": ...}}`
//! - `{"event": "RECEIVE_ICE_CANDIDATE", "data": {"target": "...", ...}}`
//!
//! ## Events (client → server)
//!
//! `SEND_CHAT_MESSAGE`, `SEND_VIDEO_OFFER_ANSWER` and `SEND_ICE_CANDIDATE`,
//! with the same `data` shapes.
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! wasmtime serve -S common --addr 127.0.0.1:5050 room-relay-wasm.wasm
//!
//! # Create a room (returns roomId and the host's memberId)
//! curl -X POST http://127.0.0.1:5050/api/create-room
//!
//! # Join it as the host
//! curl -X POST "http://127.0.0.1:5050/connect?roomId=<room>&memberId=<host>&role=host"
//!
//! # Poll for events
//! curl "http://127.0.0.1:5050/poll?connectionId=<connection>"
//! ```

#![forbid(unsafe_code)]

pub mod api;
pub mod binding;
pub mod clock;
pub mod config;
pub mod error;
#[cfg(target_os = "wasi")]
pub mod handler;
pub mod ids;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod route;
pub mod router;
pub mod state;
pub mod store;

pub use config::RelayConfig;
pub use error::{ClientRequestError, RelayError};
#[cfg(target_os = "wasi")]
pub use handler::handle_request;
pub use lifecycle::{SessionLifecycle, SessionState};
pub use model::{ConnectionId, Member, MemberId, Room, RoomId};
pub use registry::RoomRegistry;
pub use router::{DeliverySink, MessageRouter};
pub use state::ServerState;
