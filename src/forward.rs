//! Outbound forwarding to backend servers
//!
//! The dispatcher talks to backends through the `Forwarder` trait so tests
//! can substitute a stub; the production implementation is a pooled hyper
//! client issuing plain-HTTP GETs with a configurable timeout.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

/// Verbatim upstream status and body
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Outbound HTTP capability. An `Err` means connectivity failure or timeout,
/// never an HTTP error status: upstream 4xx/5xx come back as `Ok` and are
/// relayed verbatim.
pub trait Forwarder: Send + Sync {
    fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> impl Future<Output = anyhow::Result<UpstreamResponse>> + Send;
}

/// Pooled hyper client forwarder
pub struct HttpForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(100)
            .build(HttpConnector::new());
        Self { client, timeout }
    }
}

impl Forwarder for HttpForwarder {
    async fn get(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        params: &HashMap<String, String>,
    ) -> anyhow::Result<UpstreamResponse> {
        let url = if params.is_empty() {
            url.to_string()
        } else {
            let query = serde_urlencoded::to_string(params)
                .map_err(|e| anyhow::anyhow!("Failed to encode query params: {}", e))?;
            format!("{url}?{query}")
        };

        debug!("Forwarding GET {}", url);

        let mut builder = Request::builder().method(Method::GET).uri(url.as_str());
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| anyhow::anyhow!("Failed to build upstream request: {}", e))?;

        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| anyhow::anyhow!("Upstream request to {} timed out", url))?
            .map_err(|e| anyhow::anyhow!("Upstream request to {} failed: {}", url, e))?;

        let status = response.status().as_u16();
        let body = response.into_body().collect().await?.to_bytes();

        Ok(UpstreamResponse { status, body })
    }
}
