//! # Case: HTTP API against a live single-node store
//!
//! ## Setup
//! 1. A bootstrapped leader behind [`sledraft::http::routes`]
//!
//! ## Criterias
//! 1. PUT then GET returns the value in the envelope
//! 2. DELETE removes the key; a later GET answers 400
//! 3. members lists the local node
//! 4. join of a foreign node fails with 500; join of self succeeds

use std::sync::Arc;

use serde_json::Value;
use sledraft::http::routes;
use sledraft::http::Msg;
use sledraft::Node;
use warp::http::StatusCode;

use crate::commons::enable_logger;
use crate::commons::node_config;
use crate::commons::start_leader;

fn decode(body: &[u8]) -> Msg<Value> {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_kv_round_trip_over_http() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());
    let node = start_leader(&config).await.unwrap();
    let api = routes(node.clone() as Arc<dyn Node>);

    let resp = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"city","value":"Lisbon"}"#)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(decode(resp.body()).code, 200);

    let resp = warp::test::request().method("GET").path("/raft/kv/city").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let msg = decode(resp.body());
    assert_eq!(msg.data, Value::String("Lisbon".into()));
    assert_eq!(msg.message, "OK");

    let resp = warp::test::request().method("DELETE").path("/raft/kv/city").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(node.get("city"), None);

    let resp = warp::test::request().method("GET").path("/raft/kv/city").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(decode(resp.body()).code, 400);

    drop(api);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_membership_over_http() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let config = node_config(dir.path());
    let node = start_leader(&config).await.unwrap();
    let api = routes(node.clone() as Arc<dyn Node>);
    let local = config.cluster.local_member();

    let resp = warp::test::request().method("GET").path("/raft/members").reply(&api).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let msg = decode(resp.body());
    assert_eq!(
        msg.data,
        serde_json::json!([{ "id": local.id, "address": local.address }])
    );

    let resp = warp::test::request()
        .method("GET")
        .path(&format!("/raft/join?peer={}&id={}", local.address, local.id))
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(node.members(), vec![local]);

    drop(api);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_follower_rejects_writes_over_http() {
    enable_logger();
    let dir = tempfile::tempdir().unwrap();
    let mut config = node_config(dir.path());
    config.cluster.bootstrap = false;
    let node = Arc::new(sledraft::RaftNode::open(&config).await.unwrap());
    let api = routes(node.clone() as Arc<dyn Node>);

    let resp = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"a","value":"1"}"#)
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902")
        .reply(&api)
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        decode(resp.body()).data,
        Value::String("cannot join to a non-leader portal".into())
    );

    drop(api);
    node.shutdown().await.unwrap();
}
