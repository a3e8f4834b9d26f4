//! Configuration management.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration. The store falls back to the in-memory
    /// implementation when no URL is set.
    pub postgres: PostgresConfig,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Payment gateway configuration.
    pub gateway: GatewayConfig,
}

/// `PostgreSQL` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Connection URL. `None` selects the in-memory store.
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection acquire timeout in seconds.
    pub connect_timeout: u64,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

/// Payment gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway API base URL. `None` selects the mock gateway.
    pub base_url: Option<String>,
    /// API key id for basic auth.
    pub key_id: String,
    /// API key secret. Also the HMAC secret for checkout confirmations.
    pub key_secret: String,
    /// Separate HMAC secret for webhook deliveries.
    pub webhook_secret: String,
    /// Per-call timeout in seconds for gateway requests.
    pub request_timeout: u64,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            postgres: PostgresConfig {
                url: env::var("DATABASE_URL").ok(),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                connect_timeout: env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
            gateway: GatewayConfig {
                base_url: env::var("GATEWAY_BASE_URL").ok(),
                key_id: env::var("GATEWAY_KEY_ID").unwrap_or_else(|_| "rzp_test_key".to_string()),
                key_secret: env::var("GATEWAY_KEY_SECRET")
                    .unwrap_or_else(|_| "dev-secret-change-in-production".to_string()),
                webhook_secret: env::var("GATEWAY_WEBHOOK_SECRET")
                    .unwrap_or_else(|_| "dev-webhook-secret".to_string()),
                request_timeout: env::var("GATEWAY_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
        }
    }
}
