//! Per-request orchestration
//!
//! Composes the firewall gate, the two-pass registry lookup, least-connections
//! selection, the rule engine, and outbound forwarding into one decision.
//! Health state is maintained by the background monitor; the dispatcher only
//! reads the latest flag.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::balancer;
use crate::config::ProxyConfig;
use crate::firewall;
use crate::forward::Forwarder;
use crate::registry::{ConnectionGuard, Registry};
use crate::rules::{self, RuleKind};

/// An inbound request reduced to the values the routing decision needs
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Host header value
    pub host: String,
    /// Request path without the leading slash; empty for `/`
    pub segment: String,
    /// Client address the firewall filters on
    pub client_ip: IpAddr,
    /// Inbound request headers
    pub headers: HashMap<String, String>,
    /// Inbound query parameters
    pub params: HashMap<String, String>,
}

/// Terminal outcome of a dispatch
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Firewall rejected the request (403)
    Forbidden,
    /// No host or path entry matched (404)
    NotFound,
    /// A routing entry matched but no backend is healthy (503)
    ServiceUnavailable,
    /// Forwarding failed with a connectivity error or timeout (502)
    BadGateway,
    /// Upstream responded; status and body are relayed verbatim
    Proxied { status: u16, body: Bytes },
}

/// Routing decision core, generic over the outbound HTTP capability
pub struct Dispatcher<F> {
    config: Arc<ProxyConfig>,
    registry: Arc<Registry>,
    forwarder: F,
}

impl<F: Forwarder> Dispatcher<F> {
    pub fn new(config: Arc<ProxyConfig>, registry: Arc<Registry>, forwarder: F) -> Self {
        Self {
            config,
            registry,
            forwarder,
        }
    }

    /// Route one request to a terminal outcome.
    pub async fn dispatch(&self, request: InboundRequest) -> DispatchOutcome {
        let path = format!("/{}", request.segment);

        debug!(
            "Dispatching {} {} from {}",
            request.host, path, request.client_ip
        );

        if !firewall::allow(&self.config.hosts, &request.host, request.client_ip, &path) {
            return DispatchOutcome::Forbidden;
        }

        // Host-table pass: first entry whose host matches terminates the
        // search, even when its whole pool is down.
        if let Some(backends) = self.registry.host_backends(&request.host) {
            let Some(backend) = balancer::least_connections(backends) else {
                warn!("No healthy backend for host {}", request.host);
                return DispatchOutcome::ServiceUnavailable;
            };

            let headers = rules::apply_field_rules(
                &self.config.hosts,
                &request.host,
                request.headers,
                RuleKind::Header,
            );
            let params = rules::apply_field_rules(
                &self.config.hosts,
                &request.host,
                request.params,
                RuleKind::Param,
            );

            // Only the designated trigger segment invokes the host's rewrite
            // rules; every other path forwards to the backend root.
            let rewritten = if request.segment == self.config.server.rewrite_trigger {
                rules::apply_rewrite(&self.config.hosts, &request.host, &request.segment)
                    .unwrap_or_default()
            } else {
                String::new()
            };

            let url = format!("http://{}/{}", backend.endpoint, rewritten);
            let _guard = ConnectionGuard::acquire(backend.clone());
            return self.forward(&url, &headers, &params).await;
        }

        // Path-table pass: exact match, no rule blocks apply.
        if let Some(backends) = self.registry.path_backends(&path) {
            let Some(backend) = balancer::least_connections(backends) else {
                warn!("No healthy backend for path {}", path);
                return DispatchOutcome::ServiceUnavailable;
            };

            let url = format!("http://{}", backend.endpoint);
            let _guard = ConnectionGuard::acquire(backend.clone());
            return self
                .forward(&url, &HashMap::new(), &HashMap::new())
                .await;
        }

        DispatchOutcome::NotFound
    }

    async fn forward(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> DispatchOutcome {
        match self.forwarder.get(url, headers, params).await {
            Ok(upstream) => DispatchOutcome::Proxied {
                status: upstream.status,
                body: upstream.body,
            },
            Err(e) => {
                warn!("Forwarding to {} failed: {}", url, e);
                DispatchOutcome::BadGateway
            }
        }
    }
}
