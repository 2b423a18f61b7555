//! WASI HTTP server entry point for the long-polling relay
//!
//! This module provides the main entry point when running as a WASI HTTP component
//! using `wasmtime serve`.

#[cfg(target_os = "wasi")]
use room_relay::{RelayConfig, ServerState, handle_request, logging};
#[cfg(target_os = "wasi")]
use std::cell::RefCell;
#[cfg(target_os = "wasi")]
use wstd::http::{Body, Request, Response};

// Thread-local state for the server (WASI is single-threaded)
#[cfg(target_os = "wasi")]
thread_local! {
    static STATE: RefCell<Option<ServerState>> = const { RefCell::new(None) };
}

#[cfg(target_os = "wasi")]
fn get_or_init_state() -> ServerState {
    STATE.with(|s| {
        s.borrow_mut()
            .get_or_insert_with(|| {
                let config = RelayConfig::from_env();
                let filter = config
                    .as_ref()
                    .map(|c| c.log_filter.clone())
                    .unwrap_or_else(|_| "info".to_string());
                logging::init(&filter);
                let config = config.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "invalid configuration, using defaults");
                    RelayConfig::default()
                });
                ServerState::new(config)
            })
            .clone()
    })
}

/// The main HTTP handler for WASI
///
/// This function is called by the WASI runtime for each incoming HTTP request.
#[cfg(target_os = "wasi")]
#[wstd::http_server]
async fn main(request: Request<Body>) -> Result<Response<Body>, wstd::http::Error> {
    let state = get_or_init_state();
    handle_request(request, &state).await
}

#[cfg(not(target_os = "wasi"))]
fn main() {
    eprintln!("room-relay-wasm runs as a WASI HTTP component; build it for wasm32-wasip2");
    std::process::exit(1);
}
