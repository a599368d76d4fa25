//! Switchyard - reverse-proxy load balancer
//!
//! Routes inbound GET requests to configured backend pools under a
//! least-connections policy, with per-host header/param/path rewriting and
//! IP/path firewall filtering. Backend health is probed by a background task.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use switchyard::config::ProxyConfig;
use switchyard::dispatcher::Dispatcher;
use switchyard::forward::HttpForwarder;
use switchyard::health::HealthMonitor;
use switchyard::http_listener::run_http_listener;
use switchyard::registry::Registry;

/// Switchyard - reverse-proxy load balancer
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "switchyard.toml", env = "SWITCHYARD_CONFIG")]
    config: PathBuf,

    /// Override the listen address (e.g. 0.0.0.0:8080)
    #[arg(short, long, env = "SWITCHYARD_LISTEN")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SWITCHYARD_LOG_LEVEL")]
    log_level: String,

    /// Enable JSON log format
    #[arg(long, env = "SWITCHYARD_JSON_LOGS")]
    json_logs: bool,

    /// Run configuration validation only (don't start the proxy)
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Switchyard v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {:?}", args.config);

    let config = ProxyConfig::load(&args.config)?;
    config.validate()?;
    info!("Configuration validated successfully");

    if args.validate {
        info!("Configuration validation successful, exiting");
        return Ok(());
    }

    let bind_addr = match args.listen {
        Some(addr) => {
            info!("Listen address overridden to: {}", addr);
            addr
        }
        None => config.server.socket_addr()?,
    };

    let config = Arc::new(config);
    let registry = Arc::new(Registry::from_config(&config));

    // Probe once before the listener binds so a dead backend never receives
    // traffic on the strength of its healthy-by-default flag.
    HealthMonitor::new().refresh(&registry).await;
    info!("Initial health probe round complete");

    // Background probing owns health state; request handling only reads it.
    let health_handle = HealthMonitor::spawn(registry.clone(), config.health.interval());
    info!(
        "Health monitor started (interval: {}s, probe timeout: {}s)",
        config.health.interval_secs, config.health.probe_timeout_secs
    );

    let forwarder = HttpForwarder::new(config.server.forward_timeout());
    let dispatcher = Arc::new(Dispatcher::new(config.clone(), registry, forwarder));

    print_startup_summary(&config, bind_addr);

    let listener_handle = tokio::spawn(async move {
        if let Err(e) = run_http_listener(bind_addr, dispatcher).await {
            error!("HTTP listener error: {}", e);
        }
    });

    info!("Press Ctrl+C to shutdown gracefully");
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating shutdown...");
        }
    }

    health_handle.abort();
    listener_handle.abort();

    info!("Switchyard shutdown complete");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}

/// Wait for OS shutdown signal
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
    sigterm.recv().await;
    info!("Received SIGTERM");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await;
}

/// Print startup summary
fn print_startup_summary(config: &ProxyConfig, bind_addr: SocketAddr) {
    info!("═══════════════════════════════════════════════");
    info!("  Switchyard v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════");
    info!("  Listener:        {}", bind_addr);
    info!("  Host entries:    {} configured", config.hosts.len());
    info!("  Path entries:    {} configured", config.paths.len());
    info!("  Rewrite trigger: /{}", config.server.rewrite_trigger);
    info!("  Health interval: {}s", config.health.interval_secs);
    info!("═══════════════════════════════════════════════");
}
