//! Request dispatch into the server state
//!
//! Produces transport-neutral [`Reply`] values; the HTTP glue only has to
//! copy status, headers and body onto a response.

use crate::error::{ClientRequestError, RelayError};
use crate::model::ConnectionId;
use crate::protocol::{ClientEvent, MemberInfoResponse};
use crate::route::Route;
use crate::state::ServerState;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

const INFO: &str = "Room Relay WASI Signaling Server (Long-Polling)\n\
    \n\
    Endpoints:\n\
    - GET  /health - Health check\n\
    - GET  /api/room-exists/{roomId} - Admission check\n\
    - POST /api/create-room - Create a room, returns the host member id\n\
    - GET  /api/member-info/{memberId}?roomId={roomId} - Member details\n\
    - POST /connect?roomId=&memberId=&role= - Open a connection\n\
    - GET  /poll?connectionId={id} - Receive pending events\n\
    - POST /emit (X-Connection-Id header) - Send an event\n\
    - POST /disconnect (X-Connection-Id header) - Close a connection\n";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Empty,
    Text(String),
    Json(Value),
}

/// Status, extra headers and body of a response
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: ReplyBody,
}

impl Reply {
    fn new(status: u16, body: ReplyBody) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body,
        }
    }

    fn text(status: u16, text: impl Into<String>) -> Self {
        Self::new(status, ReplyBody::Text(text.into()))
    }

    fn ok() -> Self {
        Self::text(200, "OK")
    }

    fn json(body: &impl Serialize) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => Self::new(200, ReplyBody::Json(value)),
            Err(e) => {
                warn!(error = %e, "failed to serialize reply");
                Self::text(500, "Internal Server Error")
            }
        }
    }

    /// The connection is closed by the relay; no error body
    fn gone() -> Self {
        Self::new(410, ReplyBody::Empty)
    }

    fn preflight() -> Self {
        Self {
            status: 204,
            headers: vec![
                ("access-control-allow-methods", "GET, POST, OPTIONS"),
                (
                    "access-control-allow-headers",
                    "content-type, x-connection-id",
                ),
                ("access-control-max-age", "86400"),
            ],
            body: ReplyBody::Empty,
        }
    }
}

impl From<&ClientRequestError> for Reply {
    fn from(error: &ClientRequestError) -> Self {
        Reply::text(400, format!("Invalid request: {error}"))
    }
}

fn closed(connection_id: &ConnectionId, error: &RelayError) -> Reply {
    debug!(connection_id = %connection_id, error = %error, "closing connection");
    Reply::gone()
}

/// Serve one request
pub fn dispatch(
    state: &ServerState,
    route: Result<Route, ClientRequestError>,
    body: &str,
) -> Reply {
    let route = match route {
        Ok(route) => route,
        Err(e) => return Reply::from(&e),
    };

    match route {
        Route::Preflight => Reply::preflight(),
        Route::Health => Reply::ok(),
        Route::Info => Reply::text(200, INFO),
        Route::NotFound => Reply::text(404, "Not Found"),
        Route::CreateRoom => Reply::json(&state.create_room()),
        Route::RoomExists(room_id) => Reply::json(&state.room_exists(&room_id)),
        Route::MemberInfo { member_id, room_id } => match room_id {
            Some(room_id) => Reply::json(&state.member_info(&room_id, &member_id)),
            None => Reply::json(&MemberInfoResponse::Err(
                ClientRequestError::MissingParameter("roomId").to_string(),
            )),
        },
        Route::Connect(handshake) => match state.connect(handshake) {
            Ok(connected) => Reply::json(&connected),
            Err(_) => Reply::gone(),
        },
        Route::Poll(connection_id) => match state.poll(&connection_id) {
            Ok(polled) => Reply::json(&polled),
            Err(e) => closed(&connection_id, &e),
        },
        Route::Emit(connection_id) => {
            let event = match ClientEvent::from_str(body) {
                Ok(event) => event,
                Err(e) => return Reply::from(&e),
            };
            match state.emit(&connection_id, event) {
                Ok(_) => Reply::ok(),
                Err(e) => closed(&connection_id, &e),
            }
        }
        Route::Disconnect(connection_id) => {
            state.disconnect(&connection_id);
            Reply::ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::RelayConfig;
    use crate::ids::SequentialIds;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::rc::Rc;

    fn state() -> ServerState {
        ServerState::with_parts(
            RelayConfig::default(),
            Rc::new(MemoryStore::new()),
            Rc::new(SequentialIds::new()),
            Rc::new(ManualClock::new(0)),
        )
    }

    fn get(state: &ServerState, path: &str, query: Option<&str>) -> Reply {
        dispatch(state, Route::parse("GET", path, query, None), "")
    }

    fn post(state: &ServerState, path: &str, query: Option<&str>, conn: Option<&str>, body: &str) -> Reply {
        dispatch(state, Route::parse("POST", path, query, conn), body)
    }

    #[test]
    fn create_then_check_room() {
        let state = state();
        let created = post(&state, "/api/create-room", None, None, "");
        assert_eq!(
            created.body,
            ReplyBody::Json(json!({"roomId": "room-1", "memberId": "member-2"}))
        );

        let exists = get(&state, "/api/room-exists/room-1", None);
        assert_eq!(
            exists.body,
            ReplyBody::Json(json!({"roomExists": true, "full": false, "memberId": "member-3"}))
        );
        let missing = get(&state, "/api/room-exists/nope", None);
        assert_eq!(missing.body, ReplyBody::Json(json!({"roomExists": false})));
    }

    #[test]
    fn member_info_reports_errors_in_the_body() {
        let state = state();
        post(&state, "/api/create-room", None, None, "");

        let reply = get(&state, "/api/member-info/member-2", Some("roomId=room-1"));
        assert_eq!(reply.status, 200);
        assert_eq!(
            reply.body,
            ReplyBody::Json(json!({"err": "Member member-2 not found"}))
        );

        post(&state, "/connect", Some("roomId=room-1&memberId=member-2&role=host"), None, "");
        let reply = get(&state, "/api/member-info/member-2", Some("roomId=room-1"));
        assert_eq!(
            reply.body,
            ReplyBody::Json(json!({"memberInfo": {
                "memberId": "member-2",
                "roomId": "room-1",
                "connectionId": "conn-3",
                "role": "host",
                "isRoomHost": true
            }}))
        );

        let reply = get(&state, "/api/member-info/member-2", None);
        assert_eq!(
            reply.body,
            ReplyBody::Json(json!({"err": "Missing parameter: roomId"}))
        );
    }

    #[test]
    fn joining_a_missing_room_closes_the_connection() {
        let state = state();
        let reply = post(&state, "/connect", Some("roomId=ghost&memberId=m1"), None, "");
        assert_eq!(reply.status, 410);
        assert_eq!(reply.body, ReplyBody::Empty);
    }

    #[test]
    fn bad_requests_get_400() {
        let state = state();
        assert_eq!(post(&state, "/connect", Some("roomId=r"), None, "").status, 400);
        assert_eq!(post(&state, "/emit", None, Some("c"), "{}").status, 400);
        assert_eq!(
            post(&state, "/emit", None, Some("c"), r#"{"event":"ROOM_DISBAND"}"#).status,
            400
        );
    }

    #[test]
    fn unknown_connections_are_gone_and_disconnect_is_idempotent() {
        let state = state();
        assert_eq!(get(&state, "/poll", Some("connectionId=c9")).status, 410);
        assert_eq!(
            post(
                &state,
                "/emit",
                None,
                Some("c9"),
                r#"{"event":"SEND_CHAT_MESSAGE","data":{"content":"hi"}}"#
            )
            .status,
            410
        );
        assert_eq!(post(&state, "/disconnect", None, Some("c9"), "").status, 200);
        assert_eq!(post(&state, "/disconnect", None, Some("c9"), "").status, 200);
    }

    #[test]
    fn preflight_and_plain_routes() {
        let state = state();
        let reply = dispatch(&state, Route::parse("OPTIONS", "/emit", None, None), "");
        assert_eq!(reply.status, 204);
        assert!(reply.headers.iter().any(|(k, _)| *k == "access-control-allow-headers"));
        assert_eq!(get(&state, "/health", None).body, ReplyBody::Text("OK".into()));
        assert_eq!(get(&state, "/nowhere", None).status, 404);
    }
}
