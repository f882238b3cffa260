//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the session registry
//! and the service collaborators every handler needs.

use recipe_road_core::{
    RealtimeProvider, SessionConfig, formatter::RecipeFormatter, registry::SessionRegistry,
    search::RecipeSearch,
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn SessionRegistry>,
    pub search: Arc<dyn RecipeSearch>,
    pub formatter: Arc<dyn RecipeFormatter>,
    /// Opens the upstream speech-model connection for each voice session.
    pub realtime: Arc<dyn RealtimeProvider>,
    pub session_config: SessionConfig,
}
