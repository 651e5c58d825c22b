use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::*;
use crate::test_utils::enable_logger;
use crate::ApplyOutcome;
use crate::Configuration;
use crate::Error;
use crate::MemCache;
use crate::MembershipError;
use crate::MockConsensusEngine;
use crate::Op;

fn node_with(
    engine: MockConsensusEngine,
    leader: bool,
) -> (RaftNode, Arc<MemCache>, watch::Sender<bool>) {
    let cache = Arc::new(MemCache::new());
    let (tx, rx) = watch::channel(leader);
    let node = RaftNode::with_engine(Arc::new(engine), cache.clone(), rx, RaftConfig::default());
    (node, cache, tx)
}

/// Lets the gate task copy the channel's initial value.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test]
async fn test_set_submits_encoded_command() {
    enable_logger();
    let mut engine = MockConsensusEngine::new();
    engine
        .expect_apply()
        .withf(|command, timeout| {
            let data = LogEntryData::decode(command).unwrap();
            data.op == Op::Set
                && data.key == "a"
                && data.value == "1"
                && *timeout == Duration::from_millis(5000)
        })
        .times(1)
        .returning(|_, _| Ok(ApplyOutcome::Set));

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    node.set("a", "1").await.unwrap();
}

#[tokio::test]
async fn test_delete_submits_del_command() {
    let mut engine = MockConsensusEngine::new();
    engine
        .expect_apply()
        .withf(|command, _| {
            let data = LogEntryData::decode(command).unwrap();
            data.op == Op::Del && data.key == "a" && data.value.is_empty()
        })
        .times(1)
        .returning(|_, _| Ok(ApplyOutcome::Deleted));

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    node.delete("a").await.unwrap();
}

#[tokio::test]
async fn test_follower_rejects_writes_without_engine() {
    let mut engine = MockConsensusEngine::new();
    engine.expect_apply().times(0);
    engine.expect_add_voter().times(0);

    let (node, _, _tx) = node_with(engine, false);
    settle().await;

    assert!(node.set("a", "1").await.unwrap_err().is_not_leader());
    assert!(node.delete("a").await.unwrap_err().is_not_leader());
    assert!(node.join("n2", "10.0.0.2:8902").await.unwrap_err().is_not_leader());
}

#[tokio::test]
async fn test_engine_errors_propagate_unchanged() {
    let mut engine = MockConsensusEngine::new();
    engine.expect_apply().times(1).returning(|_, timeout| {
        Err(ConsensusError::Timeout { duration: timeout }.into())
    });

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    let err = node.set("a", "1").await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_get_reads_local_cache() {
    let engine = MockConsensusEngine::new();
    let (node, cache, _tx) = node_with(engine, false);

    cache.set("a", "1").unwrap();

    assert_eq!(node.get("a"), Some("1".to_string()));
    assert_eq!(node.get("b"), None);
}

#[tokio::test]
async fn test_join_passes_id_and_address() {
    let mut engine = MockConsensusEngine::new();
    engine
        .expect_add_voter()
        .withf(|id, address, timeout| {
            id == "n2" && address == "10.0.0.2:8902" && *timeout == Duration::from_millis(5000)
        })
        .times(1)
        .returning(|_, _, _| Ok(()));

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    node.join("n2", "10.0.0.2:8902").await.unwrap();
}

#[tokio::test]
async fn test_join_failure_is_returned() {
    let mut engine = MockConsensusEngine::new();
    engine.expect_add_voter().returning(|id, address, _| {
        Err(MembershipError::Unsupported { id, address }.into())
    });

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    let err = node.join("n2", "x").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Consensus(ConsensusError::Membership(MembershipError::Unsupported { .. }))
    ));
}

#[tokio::test]
async fn test_members_come_from_engine() {
    let mut engine = MockConsensusEngine::new();
    engine
        .expect_configuration()
        .returning(|| Configuration::single(Member::new("n1", "127.0.0.1:8902")));

    let (node, _, _tx) = node_with(engine, false);

    assert_eq!(node.members(), vec![Member::new("n1", "127.0.0.1:8902")]);
}

#[tokio::test]
async fn test_leadership_follows_channel() {
    let engine = MockConsensusEngine::new();
    let (node, _, tx) = node_with(engine, false);
    settle().await;
    assert!(!node.is_leader());

    tx.send(true).unwrap();
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();
    assert!(node.is_leader());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_leader_times_out() {
    let engine = MockConsensusEngine::new();
    let (node, _, _tx) = node_with(engine, false);

    let err = node
        .wait_for_leader(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_shutdown_stops_engine_and_gate() {
    let mut engine = MockConsensusEngine::new();
    engine.expect_shutdown().times(1).returning(|| Ok(()));

    let (node, _, _tx) = node_with(engine, true);
    node.wait_for_leader(Duration::from_secs(1)).await.unwrap();

    node.shutdown().await.unwrap();
    assert!(!node.is_leader());
}

/// # Case: single-node cluster end to end
///
/// ## Setup:
/// 1. open a node on a fresh data directory with bootstrap enabled
///
/// ## Criterias:
/// 1. the node becomes leader
/// 2. set/get/delete behave as a key-value map
/// 3. members is exactly the bootstrap node
#[tokio::test]
async fn test_single_node_scenario() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut config = RaftKvConfig::default();
    config.cluster.node_id = "n1".to_string();
    config.cluster.data_dir = dir.path().to_path_buf();

    let node = RaftNode::open(&config).await.unwrap();
    node.wait_for_leader(Duration::from_secs(2)).await.unwrap();

    node.set("a", "1").await.unwrap();
    assert_eq!(node.get("a"), Some("1".to_string()));

    node.delete("a").await.unwrap();
    assert_eq!(node.get("a"), None);

    // absent key
    node.delete("a").await.unwrap();

    assert_eq!(
        node.members(),
        vec![Member::new("n1", &config.cluster.raft_address)]
    );

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reopen_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RaftKvConfig::default();
    config.cluster.data_dir = dir.path().to_path_buf();

    {
        let node = RaftNode::open(&config).await.unwrap();
        node.wait_for_leader(Duration::from_secs(2)).await.unwrap();
        node.set("k", "v").await.unwrap();
        node.shutdown().await.unwrap();
    }

    let node = RaftNode::open(&config).await.unwrap();
    assert_eq!(node.get("k"), Some("v".to_string()));
    node.wait_for_leader(Duration::from_secs(2)).await.unwrap();
    node.shutdown().await.unwrap();
}
