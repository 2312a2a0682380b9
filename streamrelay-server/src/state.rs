//! Application state for the relay server.

use std::sync::Arc;

use streamrelay_core::RelayManager;

/// Shared state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RelayManager>,
}

impl AppState {
    pub fn from_arc(manager: Arc<RelayManager>) -> Self {
        Self { manager }
    }
}
