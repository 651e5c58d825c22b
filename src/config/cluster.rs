use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use super::validate_directory;
use crate::Member;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClusterConfig {
    /// Member identity inside the cluster configuration. Empty means "use
    /// `raft_address`", which is how single-address deployments identify nodes.
    #[serde(default)]
    pub node_id: String,

    /// Address other members reach this node's consensus engine on
    #[serde(default = "default_raft_address")]
    pub raft_address: String,

    /// Address the HTTP API listens on
    #[serde(default = "default_http_address")]
    pub http_address: SocketAddr,

    /// Bootstrap a new single-member cluster on first start
    #[serde(default = "default_bootstrap")]
    pub bootstrap: bool,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            raft_address: default_raft_address(),
            http_address: default_http_address(),
            bootstrap: default_bootstrap(),
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl ClusterConfig {
    /// Validates cluster configuration consistency
    pub fn validate(&self) -> Result<()> {
        if self.raft_address.trim().is_empty() {
            return Err(invalid("raft_address cannot be empty"));
        }

        if self.http_address.port() == 0 {
            return Err(invalid("http_address must specify a non-zero port"));
        }

        validate_directory(&self.data_dir, "data_dir")?;
        validate_directory(&self.log_dir, "log_dir")?;
        Ok(())
    }

    /// Effective member identity.
    pub fn local_id(&self) -> &str {
        if self.node_id.is_empty() {
            &self.raft_address
        } else {
            &self.node_id
        }
    }

    /// This node as a cluster member.
    pub fn local_member(&self) -> Member {
        Member::new(self.local_id(), &self.raft_address)
    }
}

fn default_raft_address() -> String {
    "127.0.0.1:8902".to_string()
}
fn default_http_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8901))
}
fn default_bootstrap() -> bool {
    true
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}
