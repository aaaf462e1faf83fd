use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::proxy::orchestrator::ProxyOrchestrator;
use crate::proxy::transport::Transport;

pub async fn run<T>(listen_addr: &str, orchestrator: Arc<ProxyOrchestrator<T>>) -> anyhow::Result<()>
where
    T: Transport + 'static,
{
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    info!("Listening on {}", listen_addr);

    serve(listener, orchestrator).await
}

/// Accepts connections on an already bound listener until an accept fails.
pub async fn serve<T>(listener: TcpListener, orchestrator: Arc<ProxyOrchestrator<T>>) -> anyhow::Result<()>
where
    T: Transport + 'static,
{
    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!("Accepted connection from {}", peer);

        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let mut conn = Connection::new(socket, orchestrator);
            if let Err(e) = conn.run().await {
                tracing::error!("Connection error from {}: {}", peer, e);
            }
        });
    }
}
