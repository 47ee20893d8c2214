//! Networking: configuration, identity headers, HTTP handlers and shutdown control.

pub mod config;
pub mod handlers;
pub mod headers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use handlers::AppState;
pub use headers::HeaderIdentity;
pub use module::NetworkModule;
pub use shutdown::*;
