use std::sync::Arc;

use serde_json::Value;
use warp::http::StatusCode;

use super::http::routes;
use super::*;
use crate::test_utils::enable_logger;
use crate::MembershipError;

fn body(res: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
    serde_json::from_slice(res.body()).unwrap()
}

fn filter(
    node: MockNode
) -> impl warp::Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    routes(Arc::new(node))
}

#[tokio::test]
async fn test_get_existing_key() {
    enable_logger();
    let mut node = MockNode::new();
    node.expect_get()
        .withf(|key: &str| key == "a")
        .returning(|_| Some("1".to_string()));

    let res = warp::test::request()
        .method("GET")
        .path("/raft/kv/a")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let json = body(&res);
    assert_eq!(json["code"], 200);
    assert_eq!(json["data"], "1");
    assert_eq!(json["message"], "OK");
}

#[tokio::test]
async fn test_get_unknown_key_is_bad_request() {
    let mut node = MockNode::new();
    node.expect_get().returning(|_| None);

    let res = warp::test::request()
        .method("GET")
        .path("/raft/kv/missing")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = body(&res);
    assert_eq!(json["code"], 400);
    assert_eq!(json["message"], "Bad Request");
}

#[tokio::test]
async fn test_get_without_key_is_bad_request() {
    let node = MockNode::new();

    let res = warp::test::request()
        .method("GET")
        .path("/raft/kv")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_on_leader() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| true);
    node.expect_set()
        .withf(|key, value| key == "a" && value == "1")
        .times(1)
        .returning(|_, _| Ok(()));

    let res = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"a","value":"1"}"#)
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body(&res)["code"], 200);
}

#[tokio::test]
async fn test_put_on_follower_is_rejected() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| false);
    node.expect_set().times(0);

    let res = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"a","value":"1"}"#)
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_malformed_body() {
    for payload in [r#"{"key":"a"}"#, "not json", ""] {
        let mut node = MockNode::new();
        node.expect_is_leader().returning(|| true);
        node.expect_set().times(0);

        let res = warp::test::request()
            .method("PUT")
            .path("/raft/kv")
            .body(payload)
            .reply(&filter(node))
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "payload {payload:?}");
    }
}

#[tokio::test]
async fn test_put_engine_failure_is_internal_error() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| true);
    node.expect_set().returning(|_, _| {
        Err(crate::StorageError::DbError("disk".to_string()).into())
    });

    let res = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"a","value":"1"}"#)
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body(&res)["message"], "Internal Server Error");
}

#[tokio::test]
async fn test_put_not_leader_from_node_is_bad_request() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| true);
    node.expect_set()
        .returning(|_, _| Err(ConsensusError::NotLeader.into()));

    let res = warp::test::request()
        .method("PUT")
        .path("/raft/kv")
        .body(r#"{"key":"a","value":"1"}"#)
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_outcomes() {
    let mut ok = MockNode::new();
    ok.expect_delete()
        .withf(|key| key == "a")
        .returning(|_| Ok(()));
    let res = warp::test::request()
        .method("DELETE")
        .path("/raft/kv/a")
        .reply(&filter(ok))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let mut follower = MockNode::new();
    follower
        .expect_delete()
        .returning(|_| Err(ConsensusError::NotLeader.into()));
    let res = warp::test::request()
        .method("DELETE")
        .path("/raft/kv/a")
        .reply(&filter(follower))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let mut broken = MockNode::new();
    broken
        .expect_delete()
        .returning(|_| Err(crate::StorageError::DbError("disk".to_string()).into()));
    let res = warp::test::request()
        .method("DELETE")
        .path("/raft/kv/a")
        .reply(&filter(broken))
        .await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_join_uses_peer_as_id_by_default() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| true);
    node.expect_join()
        .withf(|id, address| id == "10.0.0.2:8902" && address == "10.0.0.2:8902")
        .times(1)
        .returning(|_, _| Ok(()));

    let res = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_join_with_explicit_id() {
    let mut node = MockNode::new();
    node.expect_is_leader().returning(|| true);
    node.expect_join()
        .withf(|id, address| id == "n2" && address == "10.0.0.2:8902")
        .times(1)
        .returning(|_, _| Ok(()));

    let res = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902&id=n2")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_join_rejections() {
    let mut follower = MockNode::new();
    follower.expect_is_leader().returning(|| false);
    follower.expect_join().times(0);
    let res = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902")
        .reply(&filter(follower))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(&res)["data"], "cannot join to a non-leader portal");

    let mut no_peer = MockNode::new();
    no_peer.expect_is_leader().returning(|| true);
    no_peer.expect_join().times(0);
    let res = warp::test::request()
        .method("GET")
        .path("/raft/join")
        .reply(&filter(no_peer))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let mut unsupported = MockNode::new();
    unsupported.expect_is_leader().returning(|| true);
    unsupported
        .expect_join()
        .returning(|id, address| Err(MembershipError::Unsupported { id, address }.into()));
    let res = warp::test::request()
        .method("GET")
        .path("/raft/join?peer=10.0.0.2:8902")
        .reply(&filter(unsupported))
        .await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_members_lists_id_and_address() {
    let mut node = MockNode::new();
    node.expect_members().returning(|| {
        vec![
            Member::new("n1", "127.0.0.1:8902"),
            Member::new("n2", "127.0.0.1:9902"),
        ]
    });

    let res = warp::test::request()
        .method("GET")
        .path("/raft/members")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    let json = body(&res);
    assert_eq!(
        json["data"],
        serde_json::json!([
            {"id": "n1", "address": "127.0.0.1:8902"},
            {"id": "n2", "address": "127.0.0.1:9902"}
        ])
    );
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let node = MockNode::new();

    let res = warp::test::request()
        .method("GET")
        .path("/raft/nothing")
        .reply(&filter(node))
        .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
