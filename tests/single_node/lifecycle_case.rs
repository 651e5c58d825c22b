//! # Case: single node lifecycle
//!
//! ## Setup
//! 1. A node opened on an empty data dir with `bootstrap = true`
//!
//! ## Criterias
//! 1. it elects itself and accepts writes
//! 2. reads reflect applied writes and deletes
//! 3. data and membership survive a restart
//! 4. a node that never bootstrapped stays follower and rejects writes

use std::time::Duration;

use sledraft::Member;
use sledraft::RaftNode;

use crate::commons::enable_logger;
use crate::commons::node_config;
use crate::commons::start_leader;

#[tokio::test]
async fn test_bootstrap_set_get_delete() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());

    let node = start_leader(&config).await.unwrap();
    assert!(node.is_leader());

    node.set("hello", "world").await.unwrap();
    node.set("a", "1").await.unwrap();
    node.set("a", "2").await.unwrap();
    assert_eq!(node.get("hello"), Some("world".to_string()));
    assert_eq!(node.get("a"), Some("2".to_string()));

    node.delete("hello").await.unwrap();
    assert_eq!(node.get("hello"), None);

    // deleting an absent key is not an error
    node.delete("never-set").await.unwrap();

    assert_eq!(
        node.members(),
        vec![Member::new(config.cluster.local_id(), &config.cluster.raft_address)]
    );

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_recovers_state() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());

    {
        let node = start_leader(&config).await.unwrap();
        for i in 0..20 {
            node.set(&format!("key-{i}"), &format!("value-{i}")).await.unwrap();
        }
        node.delete("key-3").await.unwrap();
        node.shutdown().await.unwrap();
    }

    let node = start_leader(&config).await.unwrap();
    for i in 0..20 {
        let expected = (i != 3).then(|| format!("value-{i}"));
        assert_eq!(node.get(&format!("key-{i}")), expected, "key-{i}");
    }
    assert_eq!(node.members().len(), 1);

    // the recovered node keeps accepting writes
    node.set("after-restart", "ok").await.unwrap();
    assert_eq!(node.get("after-restart"), Some("ok".to_string()));
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unbootstrapped_node_stays_follower() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut config = node_config(dir.path());
    config.cluster.bootstrap = false;

    let node = RaftNode::open(&config).await.unwrap();
    assert!(node.wait_for_leader(Duration::from_millis(200)).await.unwrap_err().is_timeout());
    assert!(!node.is_leader());
    assert!(node.members().is_empty());

    assert!(node.set("a", "1").await.unwrap_err().is_not_leader());
    assert!(node.delete("a").await.unwrap_err().is_not_leader());
    assert!(node.join("n2", "10.0.0.2:8902").await.unwrap_err().is_not_leader());
    assert_eq!(node.get("a"), None);

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_join_of_self_is_accepted() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());
    let node = start_leader(&config).await.unwrap();

    let local = config.cluster.local_member();
    node.join(&local.id, &local.address).await.unwrap();
    assert_eq!(node.members(), vec![local]);

    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_writes_rejected_after_shutdown() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());
    let node = start_leader(&config).await.unwrap();

    node.set("a", "1").await.unwrap();
    node.shutdown().await.unwrap();

    assert!(!node.is_leader());
    assert!(node.set("b", "2").await.is_err());
    // reads keep serving the last applied state
    assert_eq!(node.get("a"), Some("1".to_string()));
}
