//! Recipe Road API Library Crate
//!
//! Configuration, HTTP handlers, the voice WebSocket endpoint, the realtime
//! providers and routing. The `api` binary is a thin wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
