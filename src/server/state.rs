//! Application state for the HTTP server.

use crate::coordinator::RegistrationCoordinator;
use std::sync::Arc;

/// State shared across all HTTP handlers. Cloned (cheaply via `Arc`) per
/// request.
#[derive(Clone)]
pub struct AppState {
    /// The reconciliation coordinator all handlers delegate to.
    pub coordinator: Arc<RegistrationCoordinator>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(coordinator: Arc<RegistrationCoordinator>) -> Self {
        Self { coordinator }
    }
}
