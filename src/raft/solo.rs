use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::constants::KEY_CURRENT_TERM;
use crate::constants::KEY_LAST_VOTE_CAND;
use crate::constants::KEY_LAST_VOTE_TERM;
use crate::ApplyOutcome;
use crate::Configuration;
use crate::ConsensusEngine;
use crate::ConsensusError;
use crate::Error;
use crate::FileSnapshotStore;
use crate::LogRecord;
use crate::LogStore;
use crate::LogType;
use crate::Member;
use crate::MembershipError;
use crate::RaftConfig;
use crate::Result;
use crate::SnapshotMeta;
use crate::StableStore;
use crate::StateMachine;
use crate::StorageError;

/// Progress counters of a [`SoloRaft`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SoloStats {
    pub current_term: u64,
    pub last_index: u64,
    pub applied_index: u64,
    pub last_snapshot_index: u64,
    pub is_leader: bool,
}

#[derive(Debug, Default)]
pub(super) struct SoloState {
    current_term: u64,
    last_index: u64,
    last_term: u64,
    applied_index: u64,
    last_snapshot_index: u64,
    is_leader: bool,
    shutdown: bool,
}

impl SoloState {
    fn stats(&self) -> SoloStats {
        SoloStats {
            current_term: self.current_term,
            last_index: self.last_index,
            applied_index: self.applied_index,
            last_snapshot_index: self.last_snapshot_index,
            is_leader: self.is_leader,
        }
    }
}

/// Called when the state machine cannot apply a committed entry.
pub type FatalHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Consensus engine for a cluster whose only voter is the local node.
///
/// With a single voter every appended entry is committed as soon as it is
/// durable, so `apply` stores the record and hands it straight to the state
/// machine. The engine still keeps the full contract: term and vote are
/// persisted, the log is replayed on open, snapshots compact the log, and
/// leadership transitions are announced on the leader channel.
///
/// All log appends and state machine calls happen under one async mutex,
/// which gives the ordering the state machine relies on: applies never
/// overlap each other, a snapshot capture or a restore.
///
/// A committed entry the state machine cannot apply halts the node: the
/// engine stops serving and the fatal handler runs, which aborts the process
/// unless replaced with [`set_fatal_handler`](Self::set_fatal_handler).
pub struct SoloRaft {
    me: Weak<SoloRaft>,
    local: Member,
    config: RaftConfig,
    logs: Arc<dyn LogStore>,
    stable: Arc<dyn StableStore>,
    fsm: Arc<dyn StateMachine>,
    snapshots: FileSnapshotStore,
    pub(super) state: Mutex<SoloState>,
    membership: ArcSwap<Configuration>,
    leader_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    ticker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    on_fatal: parking_lot::Mutex<FatalHandler>,
}

impl std::fmt::Debug for SoloRaft {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SoloRaft")
            .field("local", &self.local)
            .field("membership", &self.membership.load())
            .finish()
    }
}

impl SoloRaft {
    /// Recovers engine state from the stores.
    ///
    /// Restores the newest snapshot into `fsm`, then replays every log entry
    /// after it. Nothing is elected and no background work starts until
    /// [`start`](Self::start).
    pub fn open(
        local: Member,
        config: RaftConfig,
        logs: Arc<dyn LogStore>,
        stable: Arc<dyn StableStore>,
        fsm: Arc<dyn StateMachine>,
        snapshots: FileSnapshotStore,
        leader_tx: watch::Sender<bool>,
    ) -> Result<Arc<Self>> {
        let mut state = SoloState {
            current_term: read_uint64_or_zero(stable.as_ref(), KEY_CURRENT_TERM)?,
            ..Default::default()
        };
        let mut membership = Configuration::default();

        if let Some((meta, mut reader)) = snapshots.open_latest()? {
            info!("restoring snapshot {} at index {}", meta.id, meta.index);
            fsm.restore(&mut reader)?;
            state.applied_index = meta.index;
            state.last_index = meta.index;
            state.last_term = meta.term;
            state.last_snapshot_index = meta.index;
            membership = meta.configuration;
        }

        let first = logs.first_index()?;
        let last = logs.last_index()?;
        if last > state.applied_index && first > state.applied_index + 1 {
            return Err(StorageError::DataCorruption {
                location: format!(
                    "log starts at {} but state is only recovered up to {}",
                    first, state.applied_index
                ),
            }
            .into());
        }

        let mut replayed = 0;
        for index in (state.applied_index + 1)..=last {
            let record = logs.get_log(index)?;
            if record.log_type == LogType::Configuration {
                membership = serde_json::from_slice(&record.data)?;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| fsm.apply(&record))).is_err() {
                error!("state machine cannot apply log entry {}", index);
                return Err(StorageError::DataCorruption {
                    location: format!("log entry {index}"),
                }
                .into());
            }
            state.applied_index = index;
            state.last_index = index;
            state.last_term = record.term;
            replayed += 1;
        }
        state.current_term = state.current_term.max(state.last_term);

        info!(
            term = state.current_term,
            last_index = state.last_index,
            replayed,
            "engine recovered"
        );

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            local,
            config,
            logs,
            stable,
            fsm,
            snapshots,
            state: Mutex::new(state),
            membership: ArcSwap::from_pointee(membership),
            leader_tx,
            cancel: CancellationToken::new(),
            ticker: parking_lot::Mutex::new(None),
            on_fatal: parking_lot::Mutex::new(Arc::new(abort_process)),
        }))
    }

    /// Replaces what happens after the state machine failed to apply a
    /// committed entry. The engine is already halted when `handler` runs.
    pub fn set_fatal_handler(
        &self,
        handler: impl Fn(&str) + Send + Sync + 'static,
    ) {
        *self.on_fatal.lock() = Arc::new(handler);
    }

    /// Writes `configuration` as the first log entry of a brand new cluster.
    ///
    /// Returns `false` without touching anything when the stores already hold
    /// state.
    #[instrument(skip(self))]
    pub async fn bootstrap(
        &self,
        configuration: Configuration,
    ) -> Result<bool> {
        if configuration.is_empty() {
            let reason = "empty bootstrap configuration".to_string();
            return Err(MembershipError::UpdateFailed(reason).into());
        }

        let mut state = self.state.lock().await;
        if state.last_index > 0 || state.current_term > 0 {
            info!("cluster already initialised, skipping bootstrap");
            return Ok(false);
        }

        let record = LogRecord {
            index: 1,
            term: 1,
            log_type: LogType::Configuration,
            data: serde_json::to_vec(&configuration)?,
        };
        self.stable.set_uint64(KEY_CURRENT_TERM, 1)?;
        state.current_term = 1;
        self.commit(&mut state, record).await?;
        self.membership.store(Arc::new(configuration));

        info!("bootstrapped cluster");
        Ok(true)
    }

    /// Campaigns if the local node is the sole voter and starts periodic
    /// snapshotting.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.campaign().await?;

        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.run_snapshot_ticker().await });
        if let Some(previous) = self.ticker.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn campaign(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(ConsensusError::Shutdown.into());
        }
        if state.is_leader {
            return Ok(());
        }
        if !self.membership.load().is_sole_voter(&self.local.id) {
            warn!("local node {} is not the sole voter, staying follower", self.local.id);
            return Ok(());
        }

        let term = state.current_term + 1;
        self.stable.set_uint64(KEY_CURRENT_TERM, term)?;
        self.stable.set_uint64(KEY_LAST_VOTE_TERM, term)?;
        self.stable.set(KEY_LAST_VOTE_CAND, self.local.id.as_bytes())?;

        // commit an entry of the new term before serving writes
        let noop = LogRecord::noop(state.last_index + 1, term);
        state.current_term = term;
        self.commit(&mut state, noop).await?;
        state.is_leader = true;
        self.leader_tx.send_replace(true);

        info!(term, "became leader");
        Ok(())
    }

    async fn apply_inner(
        &self,
        command: Vec<u8>,
    ) -> Result<ApplyOutcome> {
        let mut state = self.state.lock().await;
        if state.shutdown {
            return Err(ConsensusError::Shutdown.into());
        }
        if !state.is_leader {
            return Err(ConsensusError::NotLeader.into());
        }

        let record = LogRecord::command(state.last_index + 1, state.current_term, command);
        let index = record.index;
        let outcome = self.commit(&mut state, record).await?;
        debug!(index, ?outcome, "committed");
        Ok(outcome)
    }

    /// Stores `record` and applies it, off the async workers.
    ///
    /// `state` advances only once the record is durable. An apply failure
    /// halts the engine.
    async fn commit(
        &self,
        state: &mut SoloState,
        record: LogRecord,
    ) -> Result<ApplyOutcome> {
        let logs = self.logs.clone();
        let fsm = self.fsm.clone();
        let (index, term) = (record.index, record.term);

        let applied = tokio::task::spawn_blocking(
            move || -> Result<std::thread::Result<ApplyOutcome>> {
                logs.store_log(&record)?;
                Ok(panic::catch_unwind(AssertUnwindSafe(|| fsm.apply(&record))))
            },
        )
        .await??;

        state.last_index = index;
        state.last_term = term;
        match applied {
            Ok(outcome) => {
                state.applied_index = index;
                Ok(outcome)
            }
            Err(_) => {
                let reason = format!("state machine failed to apply committed entry {index}");
                error!("{}, halting", reason);
                state.shutdown = true;
                state.is_leader = false;
                self.leader_tx.send_replace(false);
                self.cancel.cancel();

                let handler = self.on_fatal.lock().clone();
                handler(&reason);
                Err(Error::Fatal(reason))
            }
        }
    }

    async fn add_voter_inner(
        &self,
        id: String,
        address: String,
    ) -> Result<()> {
        let state = self.state.lock().await;
        if state.shutdown {
            return Err(ConsensusError::Shutdown.into());
        }
        if !state.is_leader {
            return Err(ConsensusError::NotLeader.into());
        }
        if self.membership.load().get(&id).is_some_and(|m| m.address == address) {
            debug!("{} at {} is already a voter", id, address);
            return Ok(());
        }
        // no transport to replicate to anyone else
        Err(MembershipError::Unsupported { id, address }.into())
    }

    /// Snapshots the state machine if anything was applied since the last
    /// snapshot, then compacts the log behind it.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<Option<SnapshotMeta>> {
        let (fsm_snapshot, index, term) = {
            let state = self.state.lock().await;
            if state.shutdown {
                return Err(ConsensusError::Shutdown.into());
            }
            if state.applied_index == state.last_snapshot_index {
                return Ok(None);
            }
            (self.fsm.snapshot()?, state.applied_index, state.last_term)
        };

        // persist runs while later entries keep applying
        let mut sink = self.snapshots.create(index, term, self.configuration())?;
        let meta = tokio::task::spawn_blocking(move || -> Result<SnapshotMeta> {
            let mut fsm_snapshot = fsm_snapshot;
            let result = fsm_snapshot.persist(&mut sink);
            fsm_snapshot.release();
            result.map(|()| sink.meta().clone())
        })
        .await??;

        let reaped = self.snapshots.reap(self.config.snapshot_retain)?;
        self.compact(index)?;

        let mut state = self.state.lock().await;
        state.last_snapshot_index = state.last_snapshot_index.max(index);
        info!(index, term, reaped, "snapshot {} complete", meta.id);
        Ok(Some(meta))
    }

    fn compact(
        &self,
        snapshot_index: u64,
    ) -> Result<()> {
        if snapshot_index <= self.config.trailing_logs {
            return Ok(());
        }
        let max = snapshot_index - self.config.trailing_logs;
        let first = self.logs.first_index()?;
        if first == 0 || first > max {
            return Ok(());
        }
        debug!("compacting log [{}, {}]", first, max);
        self.logs.delete_range(first, max)
    }

    async fn run_snapshot_ticker(&self) {
        let mut interval = tokio::time::interval(self.config.snapshot_interval());
        // first tick fires immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("snapshot ticker stopped");
                    break;
                }
                _ = interval.tick() => {
                    let due = {
                        let state = self.state.lock().await;
                        state.applied_index - state.last_snapshot_index >= self.config.snapshot_threshold
                    };
                    if !due {
                        continue;
                    }
                    if let Err(e) = self.snapshot().await {
                        error!("periodic snapshot failed: {:?}", e);
                    }
                }
            }
        }
    }

    pub async fn stats(&self) -> SoloStats {
        self.state.lock().await.stats()
    }

    pub fn local(&self) -> &Member {
        &self.local
    }
}

#[async_trait::async_trait]
impl ConsensusEngine for SoloRaft {
    async fn apply(
        &self,
        command: Vec<u8>,
        timeout: Duration,
    ) -> Result<ApplyOutcome> {
        let engine = self.me.upgrade().ok_or(ConsensusError::Shutdown)?;
        // a timed out caller leaves the commit running, so the entry either
        // lands whole or not at all
        let commit = tokio::spawn(async move { engine.apply_inner(command).await });
        match tokio::time::timeout(timeout, commit).await {
            Ok(joined) => joined?,
            Err(_) => Err(ConsensusError::Timeout { duration: timeout }.into()),
        }
    }

    async fn add_voter(
        &self,
        id: String,
        address: String,
        timeout: Duration,
    ) -> Result<()> {
        match tokio::time::timeout(timeout, self.add_voter_inner(id, address)).await {
            Ok(result) => result,
            Err(_) => Err(ConsensusError::Timeout { duration: timeout }.into()),
        }
    }

    fn configuration(&self) -> Configuration {
        self.membership.load().as_ref().clone()
    }

    async fn shutdown(&self) -> Result<()> {
        self.cancel.cancel();
        let ticker = self.ticker.lock().take();
        if let Some(handle) = ticker {
            handle.await?;
        }

        let mut state = self.state.lock().await;
        if state.shutdown {
            return Ok(());
        }
        state.shutdown = true;
        state.is_leader = false;
        self.leader_tx.send_replace(false);

        self.logs.flush()?;
        self.stable.flush()?;
        info!("engine shut down at index {}", state.last_index);
        Ok(())
    }
}

fn abort_process(reason: &str) {
    error!("aborting: {}", reason);
    std::process::abort();
}

fn read_uint64_or_zero(
    stable: &dyn StableStore,
    key: &[u8],
) -> Result<u64> {
    match stable.get_uint64(key) {
        Ok(v) => Ok(v),
        Err(e) if e.is_not_found() => Ok(0),
        Err(e) => Err(e),
    }
}
