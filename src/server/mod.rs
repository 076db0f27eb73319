//! Network surfaces: the WebSocket session endpoint and the static host.

pub mod static_host;
pub mod ws;

pub use ws::{router, serve_ws, AppState};
