use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sledraft::file_io::create_dir_if_not_exist;
use sledraft::http;
use sledraft::metrics;
use sledraft::Error;
use sledraft::Node;
use sledraft::RaftKvConfig;
use sledraft::RaftNode;
use sledraft::Result;
use sledraft::SystemError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = RaftKvConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.cluster.local_id(), &settings.cluster.log_dir)?;
    info!("starting with {:?}", settings);

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());

    let node = Arc::new(RaftNode::open(&settings).await?);
    if settings.cluster.bootstrap {
        if let Err(e) = node.wait_for_leader(Duration::from_secs(5)).await {
            warn!("node did not become leader after bootstrap: {:?}", e);
        }
    }

    if settings.monitoring.prometheus_enabled {
        let port = settings.monitoring.prometheus_port;
        let shutdown_signal = graceful_rx.clone();
        tokio::spawn(async move {
            metrics::start_server(port, shutdown_signal).await;
        });
    }

    let api: Arc<dyn Node> = node.clone();
    let server = tokio::spawn(http::serve(api, settings.cluster.http_address, graceful_rx));

    info!("Application started. Waiting for CTRL+C signal...");
    tokio::spawn(async {
        if let Err(e) = graceful_shutdown(graceful_tx).await {
            error!("Failed to shutdown: {:?}", e);
        }
    });

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("http server stopped: {:?}", e),
        Err(e) => error!("http server task failed: {:?}", e),
    }

    node.shutdown().await?;
    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(graceful_tx: watch::Sender<()>) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
    }

    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {e}"))
    })?;

    info!("Shutdown signal sent");
    Ok(())
}

pub fn init_observability(
    node_id: &str,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    // node ids default to host:port, which is not a portable directory name
    let node_dir = log_dir.join(node_id.replace([':', '/'], "_"));
    create_dir_if_not_exist(&node_dir)?;

    let file_appender = tracing_appender::rolling::never(&node_dir, "sledraft.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(EnvFilter::from_default_env());
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| SystemError::NodeStartFailed(format!("logger init: {e}")))?;

    Ok(guard)
}
