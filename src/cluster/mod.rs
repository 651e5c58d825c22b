//! Command interface consumed by the request layer.
//!
//! [`RaftNode`] turns `set`/`delete` into replicated commands, serves `get`
//! from the local cache and rejects writes early on followers through the
//! [`LeadershipGate`].

pub mod http;

#[cfg(test)]
mod cluster_test;
#[cfg(test)]
mod http_test;

use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
#[cfg(test)]
use mockall::automock;
use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::metrics::WRITE_REJECTIONS;
use crate::ConsensusEngine;
use crate::ConsensusError;
use crate::FileSnapshotStore;
use crate::KvCache;
use crate::KvStateMachine;
use crate::LeaderNotifier;
use crate::LeadershipGate;
use crate::LogEntryData;
use crate::MemCache;
use crate::Member;
use crate::RaftConfig;
use crate::RaftKvConfig;
use crate::Result;
use crate::SledStore;
use crate::SoloRaft;
use crate::SystemError;
use crate::API_SLO;

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait Node: Send + Sync + 'static {
    /// Replicates `key = value` and waits for it to be applied.
    async fn set(
        &self,
        key: String,
        value: String,
    ) -> Result<()>;

    /// Replicates the removal of `key`. Removing an absent key succeeds.
    async fn delete(
        &self,
        key: String,
    ) -> Result<()>;

    /// Local read; may be stale on a follower or a lagging leader.
    fn get(
        &self,
        key: &str,
    ) -> Option<String>;

    /// Adds a voting member with identity `id` reachable at `address`.
    async fn join(
        &self,
        id: String,
        address: String,
    ) -> Result<()>;

    fn members(&self) -> Vec<Member>;

    fn is_leader(&self) -> bool;
}

pub struct RaftNode {
    engine: Arc<dyn ConsensusEngine>,
    cache: Arc<dyn KvCache>,
    gate: LeadershipGate,
    config: RaftConfig,
}

impl std::fmt::Debug for RaftNode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RaftNode")
            .field("is_leader", &self.gate.is_leader())
            .field("keys", &self.cache.len())
            .finish()
    }
}

impl RaftNode {
    /// Opens the stores under `cluster.data_dir`, recovers state, bootstraps
    /// a single-member cluster when configured to, and starts the engine.
    pub async fn open(config: &RaftKvConfig) -> Result<Self> {
        let data_dir = &config.cluster.data_dir;
        let local = config.cluster.local_member();
        info!("opening node {} at {:?}", local.id, data_dir);

        let logs = Arc::new(SledStore::open_log_store(data_dir, &config.storage)?);
        let stable = Arc::new(SledStore::open_stable_store(data_dir, &config.storage)?);
        let snapshots = FileSnapshotStore::open(data_dir)?;

        let cache = Arc::new(MemCache::new());
        let fsm = Arc::new(KvStateMachine::new(cache.clone()));
        let notifier = LeaderNotifier::new();

        let engine = SoloRaft::open(
            local.clone(),
            config.raft.clone(),
            logs,
            stable,
            fsm,
            snapshots,
            notifier.sender(),
        )
        .map_err(|e| {
            error!("failed to recover engine state: {:?}", e);
            SystemError::NodeStartFailed(e.to_string())
        })?;

        if config.cluster.bootstrap {
            engine.bootstrap(crate::Configuration::single(local)).await?;
        }
        engine.start().await?;

        Ok(Self::with_engine(
            engine,
            cache,
            notifier.subscribe(),
            config.raft.clone(),
        ))
    }

    /// Facade over any engine. `leader_rx` must carry the engine's
    /// leadership transitions.
    pub fn with_engine(
        engine: Arc<dyn ConsensusEngine>,
        cache: Arc<dyn KvCache>,
        leader_rx: watch::Receiver<bool>,
        config: RaftConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            gate: LeadershipGate::spawn(leader_rx),
            config,
        }
    }

    /// Waits until the gate reports leadership.
    pub async fn wait_for_leader(
        &self,
        timeout: Duration,
    ) -> Result<()> {
        let wait = async {
            while !self.gate.is_leader() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ConsensusError::Timeout { duration: timeout }.into())
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down node");
        self.engine.shutdown().await?;
        self.gate.shutdown().await
    }

    fn ensure_leader(
        &self,
        operation: &str,
    ) -> Result<()> {
        if self.gate.is_leader() {
            return Ok(());
        }
        debug!("rejecting {} on follower", operation);
        WRITE_REJECTIONS.with_label_values(&["not_leader"]).inc();
        Err(ConsensusError::NotLeader.into())
    }

    async fn submit(
        &self,
        data: LogEntryData,
    ) -> Result<()> {
        self.ensure_leader(&data.op.to_string())?;

        let command = data.encode()?;
        match self.engine.apply(command, self.config.apply_timeout()).await {
            Ok(outcome) => {
                debug!(?outcome, key = %data.key, "write applied");
                Ok(())
            }
            Err(e) => {
                if e.is_timeout() {
                    WRITE_REJECTIONS.with_label_values(&["timeout"]).inc();
                }
                error!("apply {} {} failed: {:?}", data.op, data.key, e);
                Err(e)
            }
        }
    }

    #[autometrics(objective = API_SLO)]
    pub async fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.submit(LogEntryData::set(key, value)).await
    }

    #[autometrics(objective = API_SLO)]
    pub async fn delete(
        &self,
        key: &str,
    ) -> Result<()> {
        self.submit(LogEntryData::del(key)).await
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<String> {
        self.cache.get(key)
    }

    #[autometrics(objective = API_SLO)]
    pub async fn join(
        &self,
        id: &str,
        address: &str,
    ) -> Result<()> {
        self.ensure_leader("join")?;
        self.engine
            .add_voter(id.to_string(), address.to_string(), self.config.join_timeout())
            .await
            .map_err(|e| {
                warn!("join of {} at {} failed: {:?}", id, address, e);
                e
            })
    }

    pub fn members(&self) -> Vec<Member> {
        self.engine.configuration().members
    }

    pub fn is_leader(&self) -> bool {
        self.gate.is_leader()
    }
}

#[async_trait::async_trait]
impl Node for RaftNode {
    async fn set(
        &self,
        key: String,
        value: String,
    ) -> Result<()> {
        RaftNode::set(self, &key, &value).await
    }

    async fn delete(
        &self,
        key: String,
    ) -> Result<()> {
        RaftNode::delete(self, &key).await
    }

    fn get(
        &self,
        key: &str,
    ) -> Option<String> {
        RaftNode::get(self, key)
    }

    async fn join(
        &self,
        id: String,
        address: String,
    ) -> Result<()> {
        RaftNode::join(self, &id, &address).await
    }

    fn members(&self) -> Vec<Member> {
        RaftNode::members(self)
    }

    fn is_leader(&self) -> bool {
        RaftNode::is_leader(self)
    }
}
