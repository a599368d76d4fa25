//! Switchyard - reverse-proxy load balancer
//!
//! The decision core of a reverse proxy fronting multiple logical
//! applications behind one entry point:
//! - Ordered host- and path-keyed routing tables built once from configuration
//! - Least-connections selection over health-checked backend pools
//! - Per-host header/parameter rewriting and forwarded-path rewriting
//! - Per-host IP/path firewall filtering
//! - Background health probing decoupled from the request path

pub mod balancer;
pub mod config;
pub mod dispatcher;
pub mod firewall;
pub mod forward;
pub mod health;
pub mod http_listener;
pub mod registry;
pub mod rules;

// Re-export commonly used types
pub use config::ProxyConfig;
pub use dispatcher::{DispatchOutcome, Dispatcher, InboundRequest};
pub use forward::{Forwarder, HttpForwarder, UpstreamResponse};
pub use health::HealthMonitor;
pub use http_listener::run_http_listener;
pub use registry::{Backend, ConnectionGuard, Registry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
