use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    /// Commands applied by the state machine, by op (`set`, `del`, `noop`)
    pub static ref APPLIED_COMMANDS: IntCounterVec = IntCounterVec::new(
        Opts::new("applied_commands", "Committed commands applied to the cache"),
        &["op"]
    )
    .expect("metric can not be created");

    /// Snapshot attempts, by outcome (`persisted`, `cancelled`, `failed`)
    pub static ref SNAPSHOTS: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshots", "Snapshot attempts"),
        &["outcome"]
    )
    .expect("metric can not be created");

    /// Writes rejected before reaching the engine, by reason
    pub static ref WRITE_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("write_rejections", "Writes rejected at the cluster facade"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    for collector in [
        APPLIED_COMMANDS.clone(),
        SNAPSHOTS.clone(),
        WRITE_REJECTIONS.clone(),
    ] {
        match registry.register(Box::new(collector)) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => error!("collector can not be registered: {:?}", e),
        }
    }
}

/// `GET /metrics`
pub fn metrics_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("metrics").and(warp::get()).and_then(metrics_handler)
}

/// Serves `/metrics` on `port` until `shutdown_signal` fires.
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);
    info!("metrics server listening on 0.0.0.0:{}", port);

    let (_, server) =
        warp::serve(metrics_route()).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    let mut res = encode_registry(&REGISTRY);
    res.push_str(&get_metrics_body());
    Ok(res)
}

pub(crate) fn encode_registry(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

/// Export autometrics series for Prometheus to scrape
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
