//! Configuration module with TOML parsing and startup validation
//!
//! All routing behavior is externalized: routing tables, rewrite/firewall
//! rules, health-check cadence, and the rewrite trigger segment all come from
//! the configuration file. Malformed configuration is a startup fault, not a
//! runtime one.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Main proxy configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener bind configuration
    pub server: ServerConfig,
    /// Health probing configuration
    pub health: HealthConfig,
    /// Host-keyed routing entries, in priority order
    pub hosts: Vec<HostConfig>,
    /// Path-keyed routing entries, in priority order
    pub paths: Vec<PathConfig>,
}

/// Listener bind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the inbound listener
    pub bind_address: String,
    /// TCP port for the inbound listener
    pub port: u16,
    /// Path segment that triggers per-host rewrite rules
    pub rewrite_trigger: String,
    /// Timeout for proxied backend requests (seconds)
    pub forward_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            rewrite_trigger: "v1".to_string(),
            forward_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Parse the bind address and port into a socket address
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address: {}", e))
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_timeout_secs)
    }
}

/// Health probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between background probe rounds (seconds)
    pub interval_secs: u64,
    /// Per-probe timeout (seconds)
    pub probe_timeout_secs: u64,
    /// Path probed on every backend
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            probe_timeout_secs: 1,
            path: "/healthcheck".to_string(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// A host-keyed routing entry: one virtual host and the backends serving it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Exact-match virtual host name (compared against the Host header)
    pub host: String,
    /// Backend endpoints (host:port), in priority order
    pub servers: Vec<String>,
    /// Header transformations, applied in declared order
    #[serde(default)]
    pub header_rules: Vec<RuleInstruction>,
    /// Query-parameter transformations, applied in declared order
    #[serde(default)]
    pub param_rules: Vec<RuleInstruction>,
    /// Forwarded-path rewrite rules
    #[serde(default)]
    pub rewrite_rules: Option<RewriteRules>,
    /// Per-host access filtering
    #[serde(default)]
    pub firewall_rules: Option<FirewallRules>,
}

/// A path-keyed routing entry: one exact path and the backends serving it.
/// No rule blocks apply to path entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Exact-match request path (leading slash)
    pub path: String,
    /// Backend endpoints (host:port), in priority order
    pub servers: Vec<String>,
}

/// One header/param transformation instruction.
///
/// Instructions are kept as an ordered list rather than a map so that `add`
/// and `remove` steps execute in exactly the order they are declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleInstruction {
    /// Merge these name/value pairs into the field set, overwriting on collision
    Add(HashMap<String, String>),
    /// Delete these names from the field set; absent names are a no-op
    Remove(Vec<String>),
}

/// Forwarded-path rewrite rules for a host entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRules {
    /// Ordered substring replacements. Only the first pair is applied;
    /// one rewrite rule per host is the documented contract.
    pub replace: Vec<ReplacePair>,
}

/// A single substring replacement (plain substring, not a regex)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacePair {
    pub from: String,
    pub to: String,
}

/// Per-host access filtering rules. Membership in either list rejects the
/// request; there is no allow-override.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallRules {
    /// Client IPs to reject
    pub ip_reject: Vec<IpAddr>,
    /// Request paths to reject
    pub path_reject: Vec<String>,
}

impl ProxyConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Validate the configuration. Called once at startup; any error here
    /// aborts the process before the listener binds.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.hosts.is_empty() && self.paths.is_empty() {
            warn!("No host or path entries configured - every request will return 404");
        }

        let mut seen_keys = HashSet::new();

        for entry in &self.hosts {
            if entry.host.is_empty() {
                anyhow::bail!("Host entry with empty host name");
            }
            if !seen_keys.insert(entry.host.clone()) {
                anyhow::bail!("Duplicate routing key '{}'", entry.host);
            }
            validate_servers(&entry.host, &entry.servers)?;
            if let Some(ref rewrite) = entry.rewrite_rules {
                if rewrite.replace.is_empty() {
                    anyhow::bail!(
                        "Host '{}' declares rewrite_rules with no replace pairs",
                        entry.host
                    );
                }
                if rewrite.replace.len() > 1 {
                    warn!(
                        "Host '{}' declares {} replace pairs - only the first is applied",
                        entry.host,
                        rewrite.replace.len()
                    );
                }
            }
        }

        for entry in &self.paths {
            if !entry.path.starts_with('/') {
                anyhow::bail!("Path entry '{}' must start with '/'", entry.path);
            }
            if !seen_keys.insert(entry.path.clone()) {
                anyhow::bail!("Duplicate routing key '{}'", entry.path);
            }
            validate_servers(&entry.path, &entry.servers)?;
        }

        if self.server.rewrite_trigger.is_empty() {
            anyhow::bail!("server.rewrite_trigger must not be empty");
        }

        Ok(())
    }
}

/// Check that a routing entry has at least one endpoint and that every
/// endpoint looks like host:port. Reachability is not checked at load time.
fn validate_servers(key: &str, servers: &[String]) -> anyhow::Result<()> {
    if servers.is_empty() {
        anyhow::bail!("Routing entry '{}' has no servers", key);
    }
    for endpoint in servers {
        let Some((host, port)) = endpoint.rsplit_once(':') else {
            anyhow::bail!(
                "Routing entry '{}': endpoint '{}' is not host:port",
                key,
                endpoint
            );
        };
        if host.is_empty() {
            anyhow::bail!(
                "Routing entry '{}': endpoint '{}' has an empty host",
                key,
                endpoint
            );
        }
        if port.parse::<u16>().is_err() {
            anyhow::bail!(
                "Routing entry '{}': endpoint '{}' has an invalid port",
                key,
                endpoint
            );
        }
    }
    Ok(())
}
