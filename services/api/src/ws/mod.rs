//! WebSocket Voice Sessions
//!
//! This module exposes a running voice session to a browser client:
//!
//! - `protocol`: the frame format between client and server.
//! - `session`: the connection lifecycle, from upgrade to teardown.
//! - `provider`: connections to third-party realtime voice APIs (OpenAI, Gemini).

pub mod protocol;
pub mod provider;
pub mod session;

pub use session::ws_handler;
