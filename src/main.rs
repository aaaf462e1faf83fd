use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use corsway::config::GatewayConfig;
use corsway::proxy::cache::spawn_purge_task;
use corsway::proxy::{HttpTransport, ProxyOrchestrator};
use corsway::server;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = GatewayConfig::load().context("failed to load configuration")?;

    let transport = HttpTransport::new(CONNECT_TIMEOUT).context("failed to create HTTP client")?;
    let orchestrator = Arc::new(ProxyOrchestrator::from_config(&cfg, transport)?);

    tracing::info!(
        routes = cfg.routes.len(),
        cache_enabled = cfg.cache.enabled,
        max_retries = cfg.proxy.max_retries,
        timeout_ms = cfg.proxy.timeout_ms,
        "Gateway configured"
    );

    let purge = spawn_purge_task(orchestrator.cache().clone(), cfg.purge_interval());

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&orchestrator))?;

    tokio::select! {
        res = server::listener::run(&cfg.server.listen_addr, Arc::clone(&orchestrator)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    purge.abort();
    Ok(())
}

/// Re-reads the configuration on SIGHUP and swaps it in atomically.
/// A configuration that fails to load or validate is logged and ignored.
#[cfg(unix)]
fn spawn_reload_on_hangup(orchestrator: Arc<ProxyOrchestrator<HttpTransport>>) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match GatewayConfig::load().and_then(|cfg| orchestrator.reload(&cfg)) {
                Ok(()) => {}
                Err(e) => tracing::error!(error = %e, "Configuration reload rejected"),
            }
        }
    });
    Ok(())
}
