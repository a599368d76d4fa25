//! Backend model and routing registry
//!
//! The registry is built once at startup from the parsed configuration and is
//! never mutated afterwards: only the per-backend health flag and connection
//! counter change during the process lifetime.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::info;

use crate::config::ProxyConfig;

/// Health state of a single backend, guarded by a lock so probe writes and
/// dispatcher reads never tear.
#[derive(Clone, Debug)]
pub struct BackendHealth {
    /// Whether the backend passed its last probe
    pub healthy: bool,
    /// When the last probe completed
    pub last_check: Instant,
}

impl Default for BackendHealth {
    fn default() -> Self {
        // Backends start healthy; the first probe round corrects this.
        Self {
            healthy: true,
            last_check: Instant::now(),
        }
    }
}

/// A single upstream instance with mutable health and load state
pub struct Backend {
    /// host:port address; the backend's identity
    pub endpoint: String,
    /// Path probed by the health monitor
    pub healthcheck_path: String,
    /// Per-probe timeout
    pub probe_timeout: Duration,
    /// In-flight requests currently forwarded to this backend
    pub open_connections: AtomicU32,
    health: RwLock<BackendHealth>,
}

impl Backend {
    pub fn new(endpoint: String, healthcheck_path: String, probe_timeout: Duration) -> Self {
        Self {
            endpoint,
            healthcheck_path,
            probe_timeout,
            open_connections: AtomicU32::new(0),
            health: RwLock::new(BackendHealth::default()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.health.read().healthy
    }

    /// Overwrite the health flag and stamp the check time
    pub fn set_healthy(&self, healthy: bool) {
        let mut health = self.health.write();
        health.healthy = healthy;
        health.last_check = Instant::now();
    }

    pub fn health_snapshot(&self) -> BackendHealth {
        self.health.read().clone()
    }
}

/// Equality is determined solely by endpoint; health and connection count
/// are excluded from identity.
impl PartialEq for Backend {
    fn eq(&self, other: &Self) -> bool {
        self.endpoint == other.endpoint
    }
}

impl Eq for Backend {}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Backend: {} healthy={} open={}>",
            self.endpoint,
            self.is_healthy(),
            self.open_connections.load(Ordering::Relaxed)
        )
    }
}

/// One routing table row: a key bound to its ordered backend list
struct RegistryEntry {
    key: String,
    backends: Vec<Arc<Backend>>,
}

/// Ordered routing tables: all host entries first, then all path entries,
/// each in original configuration order. The first entry whose key matches
/// terminates a lookup; later matching entries are never consulted.
pub struct Registry {
    hosts: Vec<RegistryEntry>,
    paths: Vec<RegistryEntry>,
}

impl Registry {
    /// Build the registry from parsed configuration. One backend is created
    /// per server endpoint, in listed order; shared endpoints across entries
    /// get independent Backend instances, matching one-probe-per-occurrence
    /// health semantics.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let build_backends = |servers: &[String]| -> Vec<Arc<Backend>> {
            servers
                .iter()
                .map(|endpoint| {
                    Arc::new(Backend::new(
                        endpoint.clone(),
                        config.health.path.clone(),
                        config.health.probe_timeout(),
                    ))
                })
                .collect()
        };

        let hosts: Vec<RegistryEntry> = config
            .hosts
            .iter()
            .map(|entry| RegistryEntry {
                key: entry.host.clone(),
                backends: build_backends(&entry.servers),
            })
            .collect();

        let paths: Vec<RegistryEntry> = config
            .paths
            .iter()
            .map(|entry| RegistryEntry {
                key: entry.path.clone(),
                backends: build_backends(&entry.servers),
            })
            .collect();

        let total: usize = hosts
            .iter()
            .chain(paths.iter())
            .map(|e| e.backends.len())
            .sum();
        info!(
            "Registry built: {} host entries, {} path entries, {} backends",
            hosts.len(),
            paths.len(),
            total
        );

        Self { hosts, paths }
    }

    /// Backends for the first host entry matching `host`
    pub fn host_backends(&self, host: &str) -> Option<&[Arc<Backend>]> {
        self.hosts
            .iter()
            .find(|entry| entry.key == host)
            .map(|entry| entry.backends.as_slice())
    }

    /// Backends for the first path entry matching `path` exactly
    pub fn path_backends(&self, path: &str) -> Option<&[Arc<Backend>]> {
        self.paths
            .iter()
            .find(|entry| entry.key == path)
            .map(|entry| entry.backends.as_slice())
    }

    /// Every backend occurrence, host entries first then path entries,
    /// in configuration order. Used by the health monitor.
    pub fn backends(&self) -> impl Iterator<Item = &Arc<Backend>> {
        self.hosts
            .iter()
            .chain(self.paths.iter())
            .flat_map(|entry| entry.backends.iter())
    }

    /// Routing keys in lookup order (hosts first, then paths)
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.hosts
            .iter()
            .chain(self.paths.iter())
            .map(|entry| entry.key.as_str())
    }
}

/// RAII connection accounting: increments the backend's counter on acquire
/// and decrements it on drop, so the decrement runs on every exit path
/// including forwarding failures.
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    pub fn acquire(backend: Arc<Backend>) -> Self {
        backend.open_connections.fetch_add(1, Ordering::Relaxed);
        Self { backend }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.open_connections.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostConfig, PathConfig};

    fn test_backend(endpoint: &str) -> Backend {
        Backend::new(
            endpoint.to_string(),
            "/healthcheck".to_string(),
            Duration::from_secs(1),
        )
    }

    fn host_entry(host: &str, servers: &[&str]) -> HostConfig {
        HostConfig {
            host: host.to_string(),
            servers: servers.iter().map(|s| s.to_string()).collect(),
            header_rules: Vec::new(),
            param_rules: Vec::new(),
            rewrite_rules: None,
            firewall_rules: None,
        }
    }

    #[test]
    fn equality_is_endpoint_only() {
        let a = test_backend("localhost:8081");
        let b = test_backend("localhost:8081");
        let c = test_backend("localhost:8082");

        b.set_healthy(false);
        b.open_connections.store(10, Ordering::Relaxed);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn backends_start_healthy() {
        let backend = test_backend("localhost:8081");
        assert!(backend.is_healthy());
        backend.set_healthy(false);
        assert!(!backend.is_healthy());
    }

    #[test]
    fn registry_preserves_configuration_order() {
        let config = ProxyConfig {
            hosts: vec![
                host_entry("www.mango.com", &["localhost:8081", "localhost:8082"]),
                host_entry("www.apple.com", &["localhost:9081"]),
            ],
            paths: vec![PathConfig {
                path: "/orange".to_string(),
                servers: vec!["localhost:1111".to_string(), "localhost:1212".to_string()],
            }],
            ..ProxyConfig::default()
        };

        let registry = Registry::from_config(&config);

        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, vec!["www.mango.com", "www.apple.com", "/orange"]);

        let mango = registry.host_backends("www.mango.com").unwrap();
        assert_eq!(mango[0].endpoint, "localhost:8081");
        assert_eq!(mango[1].endpoint, "localhost:8082");

        let orange = registry.path_backends("/orange").unwrap();
        assert_eq!(orange[0].endpoint, "localhost:1111");

        assert!(registry.host_backends("www.nowhere.com").is_none());
        assert!(registry.path_backends("/nowhere").is_none());
        assert_eq!(registry.backends().count(), 5);
    }

    #[test]
    fn connection_guard_decrements_on_drop() {
        let backend = Arc::new(test_backend("localhost:8081"));

        let guard = ConnectionGuard::acquire(backend.clone());
        assert_eq!(backend.open_connections.load(Ordering::Relaxed), 1);

        let second = ConnectionGuard::acquire(backend.clone());
        assert_eq!(backend.open_connections.load(Ordering::Relaxed), 2);

        drop(guard);
        drop(second);
        assert_eq!(backend.open_connections.load(Ordering::Relaxed), 0);
    }
}
