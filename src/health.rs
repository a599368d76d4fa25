//! Background health probing
//!
//! Each backend is probed with a GET to its healthcheck path under its own
//! timeout. A 2xx response marks the backend healthy; any other status,
//! connect failure, or timeout marks it unhealthy. Probe errors are absorbed
//! into the health flag and never surface to request handling.
//!
//! Probing runs as an independent periodic task over the whole registry, so
//! in-flight requests only ever read the latest flag and never pay for
//! O(registry) network calls themselves.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::registry::{Backend, Registry};

/// Probes backends and updates their health flags in place
pub struct HealthMonitor {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Probe one backend and overwrite its health flag. Never fails; all
    /// probe errors become `healthy = false`.
    pub async fn probe(&self, backend: &Backend) {
        let url = format!("http://{}{}", backend.endpoint, backend.healthcheck_path);

        let healthy = match self.fetch_status(&url, backend.probe_timeout).await {
            Ok(status) => status.is_success(),
            Err(e) => {
                debug!("Probe of {} failed: {}", backend.endpoint, e);
                false
            }
        };

        let was_healthy = backend.is_healthy();
        backend.set_healthy(healthy);

        if healthy && !was_healthy {
            info!("Backend {} is reachable again - marking healthy", backend.endpoint);
        } else if !healthy && was_healthy {
            warn!("Backend {} failed its probe - marking unhealthy", backend.endpoint);
        }
    }

    async fn fetch_status(&self, url: &str, timeout: Duration) -> anyhow::Result<StatusCode> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(url)
            .body(Full::new(Bytes::new()))?;

        let response = tokio::time::timeout(timeout, self.client.request(request))
            .await
            .map_err(|_| anyhow::anyhow!("probe timed out"))??;

        Ok(response.status())
    }

    /// Probe every backend occurrence in the registry, host entries first
    /// then path entries. Backends shared across entries are probed once per
    /// occurrence.
    pub async fn refresh(&self, registry: &Registry) {
        for backend in registry.backends() {
            self.probe(backend).await;
        }
    }

    /// Spawn the periodic probe task. The immediate first tick is skipped:
    /// startup runs one `refresh` before the listener binds, so the
    /// healthy-by-default flags are already corrected when this task starts.
    pub fn spawn(registry: Arc<Registry>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let monitor = Self::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                monitor.refresh(&registry).await;
            }
        })
    }
}
