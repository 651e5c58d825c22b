//! # Case: snapshots and log compaction on a running node
//!
//! ## Setup
//! 1. A leader configured to snapshot every 5 applied entries, checked
//!    every 20ms, keeping 2 trailing entries and 2 snapshots
//! 2. 30 writes
//!
//! ## Criterias
//! 1. finished snapshots exist on disk, no more than retained
//! 2. the log behind the latest snapshot is compacted
//! 3. a restart restores the snapshot plus the log tail

use std::time::Duration;

use sledraft::FileSnapshotStore;
use sledraft::LogStore;
use sledraft::SledStore;
use sledraft::StorageConfig;

use crate::commons::enable_logger;
use crate::commons::node_config;
use crate::commons::start_leader;

#[tokio::test]
async fn test_periodic_snapshot_and_recovery() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut config = node_config(dir.path());
    config.raft.snapshot_threshold = 5;
    config.raft.snapshot_interval_ms = 20;
    config.raft.trailing_logs = 2;
    config.raft.snapshot_retain = 2;

    {
        let node = start_leader(&config).await.unwrap();
        for i in 0..30 {
            node.set(&format!("k{i}"), &i.to_string()).await.unwrap();
        }
        // give the ticker a few rounds
        tokio::time::sleep(Duration::from_millis(300)).await;
        node.shutdown().await.unwrap();
    }

    let snapshots = FileSnapshotStore::open(dir.path()).unwrap().list().unwrap();
    assert!(!snapshots.is_empty());
    assert!(snapshots.len() <= 2);
    let latest = &snapshots[0];
    assert!(latest.index >= 5);

    {
        let logs = SledStore::open_log_store(dir.path(), &StorageConfig::default()).unwrap();
        let first = logs.first_index().unwrap();
        assert!(first > 1, "log was not compacted, first index {first}");
        assert!(first <= latest.index - 2 + 1);
        assert_eq!(logs.last_index().unwrap(), 32);
    }

    let node = start_leader(&config).await.unwrap();
    for i in 0..30 {
        assert_eq!(node.get(&format!("k{i}")), Some(i.to_string()));
    }
    node.shutdown().await.unwrap();
}
