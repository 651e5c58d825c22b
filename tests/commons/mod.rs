use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sledraft::RaftKvConfig;
use sledraft::RaftNode;
use sledraft::Result;
use tracing_subscriber::EnvFilter;

pub const WAIT_FOR_LEADER: Duration = Duration::from_secs(2);

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

/// Default settings rooted at `data_dir`.
pub fn node_config(data_dir: &Path) -> RaftKvConfig {
    let mut config = RaftKvConfig::default();
    config.cluster.data_dir = data_dir.to_path_buf();
    config
}

/// Opens a node and waits for it to take leadership.
pub async fn start_leader(config: &RaftKvConfig) -> Result<Arc<RaftNode>> {
    let node = Arc::new(RaftNode::open(config).await?);
    node.wait_for_leader(WAIT_FOR_LEADER).await?;
    Ok(node)
}
