//! HTTP route parsing, independent of the HTTP implementation

use crate::error::ClientRequestError;
use crate::model::{ConnectionId, MemberId, RoomId};
use crate::protocol::Handshake;
use percent_encoding::percent_decode_str;

/// Header carrying the caller's connection id
pub const CONNECTION_HEADER: &str = "x-connection-id";

/// Role assumed when the handshake does not name one
pub const DEFAULT_ROLE: &str = "guest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Health,
    Info,
    RoomExists(RoomId),
    CreateRoom,
    MemberInfo {
        member_id: MemberId,
        room_id: Option<RoomId>,
    },
    Connect(Handshake),
    Poll(ConnectionId),
    Emit(ConnectionId),
    Disconnect(ConnectionId),
    NotFound,
}

/// Percent-decode a path segment
fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Decode a form-encoded query value: `+` is a space
fn decode_query(raw: &str) -> String {
    decode(&raw.replace('+', " "))
}

/// Get query parameter from URI
fn get_query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        let v = parts.next()?;
        if k == key && !v.is_empty() {
            Some(decode_query(v))
        } else {
            None
        }
    })
}

/// The single non-empty path segment after `prefix`
fn segment_after(path: &str, prefix: &str) -> Option<String> {
    let rest = path.strip_prefix(prefix)?.trim_end_matches('/');
    if rest.is_empty() || rest.contains('/') {
        None
    } else {
        Some(decode(rest))
    }
}

fn connection_id(
    query: Option<&str>,
    header: Option<&str>,
) -> Result<ConnectionId, ClientRequestError> {
    header
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .or_else(|| get_query_param(query, "connectionId"))
        .map(ConnectionId)
        .ok_or(ClientRequestError::MissingParameter("connectionId"))
}

impl Route {
    /// Work out what a request asks for.
    ///
    /// `connection_header` is the value of [`CONNECTION_HEADER`], if sent.
    pub fn parse(
        method: &str,
        path: &str,
        query: Option<&str>,
        connection_header: Option<&str>,
    ) -> Result<Route, ClientRequestError> {
        let route = match method {
            "OPTIONS" => Route::Preflight,
            "GET" => {
                if path == "/" {
                    Route::Info
                } else if path == "/health" {
                    Route::Health
                } else if path == "/api/create-room" {
                    Route::CreateRoom
                } else if path == "/poll" {
                    Route::Poll(connection_id(query, connection_header)?)
                } else if let Some(room_id) = segment_after(path, "/api/room-exists/") {
                    Route::RoomExists(RoomId(room_id))
                } else if let Some(member_id) = segment_after(path, "/api/member-info/") {
                    Route::MemberInfo {
                        member_id: MemberId(member_id),
                        room_id: get_query_param(query, "roomId").map(RoomId),
                    }
                } else {
                    Route::NotFound
                }
            }
            "POST" => match path {
                "/api/create-room" => Route::CreateRoom,
                "/connect" => Route::Connect(Handshake {
                    room_id: get_query_param(query, "roomId")
                        .map(RoomId)
                        .ok_or(ClientRequestError::MissingParameter("roomId"))?,
                    member_id: get_query_param(query, "memberId")
                        .map(MemberId)
                        .ok_or(ClientRequestError::MissingParameter("memberId"))?,
                    role: get_query_param(query, "role")
                        .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
                }),
                "/emit" => Route::Emit(connection_id(query, connection_header)?),
                "/disconnect" => Route::Disconnect(connection_id(query, connection_header)?),
                _ => Route::NotFound,
            },
            _ => Route::NotFound,
        };
        Ok(route)
    }
}
