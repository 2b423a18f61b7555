//! HTTP glue between wstd and the relay
//!
//! Parses the request into a [`Route`], reads the body for POSTs, lets
//! [`api::dispatch`] do the work, and turns the [`Reply`] into a response.
//! Every response allows any origin.

use crate::api::{self, Reply, ReplyBody};
use crate::error::ClientRequestError;
use crate::route::{CONNECTION_HEADER, Route};
use crate::state::ServerState;
use wstd::http::{Body, Method, Request, Response};

/// Build the response for a reply
fn respond(reply: Reply) -> Response<Body> {
    let mut builder = Response::builder()
        .status(reply.status)
        .header("access-control-allow-origin", "*");
    for (name, value) in reply.headers {
        builder = builder.header(name, value);
    }
    let body = match reply.body {
        ReplyBody::Empty => Body::empty(),
        ReplyBody::Text(text) => {
            builder = builder.header("content-type", "text/plain");
            Body::from(text)
        }
        ReplyBody::Json(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
    };
    builder
        .body(body)
        .expect("status and header names are static and valid")
}

/// Handle an HTTP request - main router
pub async fn handle_request(
    request: Request<Body>,
    state: &ServerState,
) -> Result<Response<Body>, wstd::http::Error> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let connection_header = request
        .headers()
        .get(CONNECTION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let route = Route::parse(
        method.as_str(),
        uri.path(),
        uri.query(),
        connection_header.as_deref(),
    );

    let body = if method == Method::POST {
        let mut body = request.into_body();
        match body.str_contents().await {
            Ok(s) => s.to_string(),
            Err(e) => {
                let error = ClientRequestError::Body(format!("{e:?}"));
                return Ok(respond(Reply::from(&error)));
            }
        }
    } else {
        String::new()
    };

    Ok(respond(api::dispatch(state, route, &body)))
}
