//! Router builder for the relay endpoints.

use std::sync::Arc;

use axum::{
    body::Body,
    http::Request,
    routing::{get, post},
    Router,
};
use streamrelay_core::RelayManager;
use tower_http::trace::TraceLayer;

use crate::error::BuildError;
use crate::handler::{cancel_handler, generation_handler, health_handler};
use crate::state::AppState;

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/healthz";

/// Builder for the relay HTTP endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use streamrelay_core::{HttpSource, RelayConfig, RelayManager};
/// use streamrelay_server::RelayRouter;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = RelayManager::new(HttpSource::from_env()?, RelayConfig::default());
///
/// // NDJSON relay at /api/generate, cancel at /api/generate/cancel
/// let app = RelayRouter::new(manager)
///     .with_generations("/api/generate")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RelayRouter {
    manager: Arc<RelayManager>,
    generation_path: Option<String>,
    cancel_path: Option<String>,
}

impl RelayRouter {
    pub fn new(manager: RelayManager) -> Self {
        Self::from_arc(Arc::new(manager))
    }

    /// Use a manager that is shared with other parts of the application.
    pub fn from_arc(manager: Arc<RelayManager>) -> Self {
        Self {
            manager,
            generation_path: None,
            cancel_path: None,
        }
    }

    /// Serve the generation endpoint at `path`.
    ///
    /// This also enables the cancel endpoint at `{path}/cancel`; use
    /// [`cancel_path`](Self::cancel_path) to move it.
    pub fn with_generations(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.cancel_path = Some(format!("{}/cancel", path.trim_end_matches('/')));
        self.generation_path = Some(path);
        self
    }

    pub fn cancel_path(mut self, path: impl Into<String>) -> Self {
        self.cancel_path = Some(path.into());
        self
    }

    /// Build the router with all configured endpoints.
    ///
    /// `GET /healthz` is always served. Every request runs inside a
    /// `request` span carrying a fresh request id.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if
    /// [`with_generations`](Self::with_generations) was not called.
    pub fn build(self) -> Result<Router, BuildError> {
        let generation_path = self.generation_path.ok_or(BuildError::NoEndpoints)?;

        let state = AppState::from_arc(self.manager);
        let mut router = Router::new()
            .route(&generation_path, post(generation_handler))
            .route(HEALTH_PATH, get(health_handler));

        if let Some(cancel_path) = self.cancel_path {
            router = router.route(&cancel_path, post(cancel_handler));
        }

        let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %uuid::Uuid::new_v4(),
            )
        });

        Ok(router.with_state(state).layer(trace))
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::NoEndpoints`] if no endpoints were configured.
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
