//! HTTP server wiring: router, shared state, health checks, error mapping.

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
