//! Inbound HTTP/1.1 listener
//!
//! A thin axum front-end over the dispatcher: extracts the Host header, path,
//! client address, and query parameters, and maps dispatch outcomes to HTTP
//! responses. Only GET is forwarded; other methods answer 405.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Host, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::dispatcher::{DispatchOutcome, Dispatcher, InboundRequest};
use crate::forward::HttpForwarder;

/// Shared listener state
#[derive(Clone)]
pub struct ListenerState {
    pub dispatcher: Arc<Dispatcher<HttpForwarder>>,
}

/// Bind and serve the inbound listener until the process shuts down.
pub async fn run_http_listener(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher<HttpForwarder>>,
) -> anyhow::Result<()> {
    let state = ListenerState { dispatcher };

    let app = Router::new()
        .fallback(any(proxy_handler))
        .with_state(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn proxy_handler(
    State(state): State<ListenerState>,
    Host(host): Host,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response();
    }

    let segment = uri.path().trim_start_matches('/').to_string();

    let params: HashMap<String, String> = match uri.query() {
        Some(query) => match serde_urlencoded::from_str(query) {
            Ok(params) => params,
            Err(e) => {
                debug!("Ignoring malformed query string {:?}: {}", query, e);
                HashMap::new()
            }
        },
        None => HashMap::new(),
    };

    // Non-UTF-8 header values cannot be forwarded as string rules operate
    // on text; they are dropped here.
    let header_map: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let request = InboundRequest {
        host,
        segment,
        client_ip: client_addr.ip(),
        headers: header_map,
        params,
    };

    match state.dispatcher.dispatch(request).await {
        DispatchOutcome::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
        DispatchOutcome::NotFound => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        DispatchOutcome::ServiceUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            "No backend servers available.",
        )
            .into_response(),
        DispatchOutcome::BadGateway => (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response(),
        DispatchOutcome::Proxied { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Body::from(body)).into_response()
        }
    }
}
