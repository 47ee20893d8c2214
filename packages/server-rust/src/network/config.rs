//! Network configuration for the wallet server.

use std::time::Duration;

/// Header carrying the caller's tenant.
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
/// Header carrying the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the caller's correlation token.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";
/// Header carrying the caller's idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "x-idempotency-key";

/// Every identity header, in extraction order.
pub const IDENTITY_HEADERS: [&str; 4] = [
    TENANT_ID_HEADER,
    USER_ID_HEADER,
    CORRELATION_ID_HEADER,
    IDEMPOTENCY_KEY_HEADER,
];

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any.
    pub cors_origins: Vec<String>,
    /// Maximum time to wait for an HTTP request to complete.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight top-ups.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
