//! HTTP surface under `/raft`.
//!
//! | Route                         | Success                |
//! |-------------------------------|------------------------|
//! | `GET /raft/kv/{key}`          | value in `data`        |
//! | `PUT /raft/kv` `{key,value}`  | empty `data`           |
//! | `DELETE /raft/kv/{key}`       | empty `data`           |
//! | `GET /raft/join?peer=&id=`    | empty `data`           |
//! | `GET /raft/members`           | `[{id, address}]`      |
//!
//! Client mistakes (unknown key, malformed body, write to a follower) answer
//! 400; engine and storage failures answer 500.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::Error;
use crate::Member;
use crate::Node;
use crate::Result;
use crate::SystemError;

const MAX_BODY_BYTES: u64 = 1024 * 1024;

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Msg<T> {
    pub code: u16,
    pub data: T,
    pub message: String,
}

impl<T> Msg<T> {
    pub fn new(
        status: StatusCode,
        data: T,
    ) -> Self {
        Self {
            code: status.as_u16(),
            data,
            message: status.canonical_reason().unwrap_or_default().to_string(),
        }
    }
}

/// `PUT /raft/kv` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvBody {
    pub key: String,
    pub value: String,
}

type JsonReply = warp::reply::WithStatus<warp::reply::Json>;

fn reply<T: Serialize>(
    status: StatusCode,
    data: T,
) -> JsonReply {
    warp::reply::with_status(warp::reply::json(&Msg::new(status, data)), status)
}

fn status_of(err: &Error) -> StatusCode {
    if err.is_not_leader() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn with_node(
    node: Arc<dyn Node>
) -> impl Filter<Extract = (Arc<dyn Node>,), Error = Infallible> + Clone {
    warp::any().map(move || node.clone())
}

pub fn routes(node: Arc<dyn Node>) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let get = warp::path!("raft" / "kv" / String)
        .and(warp::get())
        .and(with_node(node.clone()))
        .and_then(get_handler);

    let missing_key = warp::path!("raft" / "kv")
        .and(warp::get().or(warp::delete()).unify())
        .map(|| reply(StatusCode::BAD_REQUEST, "missing key"));

    let put = warp::path!("raft" / "kv")
        .and(warp::put())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_node(node.clone()))
        .and_then(set_handler);

    let delete = warp::path!("raft" / "kv" / String)
        .and(warp::delete())
        .and(with_node(node.clone()))
        .and_then(delete_handler);

    let join = warp::path!("raft" / "join")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_node(node.clone()))
        .and_then(join_handler);

    let members = warp::path!("raft" / "members")
        .and(warp::get())
        .and(with_node(node))
        .and_then(members_handler);

    get.or(put).or(delete).or(missing_key).or(join).or(members)
}

/// Serves [`routes`] on `addr` until `shutdown` fires.
pub async fn serve(
    node: Arc<dyn Node>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    let (bound, server) = warp::serve(routes(node))
        .try_bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown.changed().await;
        })
        .map_err(|e| SystemError::NodeStartFailed(format!("http bind {addr}: {e}")))?;

    info!("http api listening on {}", bound);
    server.await;
    Ok(())
}

async fn get_handler(
    key: String,
    node: Arc<dyn Node>,
) -> std::result::Result<JsonReply, Rejection> {
    if key.is_empty() {
        return Ok(reply(StatusCode::BAD_REQUEST, "missing key"));
    }
    Ok(match node.get(&key) {
        Some(value) => reply(StatusCode::OK, value),
        None => reply(StatusCode::BAD_REQUEST, ""),
    })
}

async fn set_handler(
    body: Bytes,
    node: Arc<dyn Node>,
) -> std::result::Result<JsonReply, Rejection> {
    if !node.is_leader() {
        warn!("http write to follower");
        return Ok(reply(StatusCode::BAD_REQUEST, "not leader"));
    }

    let kv: KvBody = match serde_json::from_slice(&body) {
        Ok(kv) => kv,
        Err(e) => {
            warn!("malformed set body: {}", e);
            return Ok(reply(StatusCode::BAD_REQUEST, "malformed body"));
        }
    };

    Ok(match node.set(kv.key, kv.value).await {
        Ok(()) => reply(StatusCode::OK, ""),
        Err(e) => {
            error!("set failed: {:?}", e);
            reply(status_of(&e), e.to_string())
        }
    })
}

async fn delete_handler(
    key: String,
    node: Arc<dyn Node>,
) -> std::result::Result<JsonReply, Rejection> {
    if key.is_empty() {
        return Ok(reply(StatusCode::BAD_REQUEST, "missing key"));
    }
    Ok(match node.delete(key).await {
        Ok(()) => reply(StatusCode::OK, ""),
        Err(e) => {
            error!("delete failed: {:?}", e);
            reply(status_of(&e), e.to_string())
        }
    })
}

async fn join_handler(
    params: HashMap<String, String>,
    node: Arc<dyn Node>,
) -> std::result::Result<JsonReply, Rejection> {
    if !node.is_leader() {
        return Ok(reply(StatusCode::BAD_REQUEST, "cannot join to a non-leader portal"));
    }

    let Some(address) = params.get("peer").filter(|p| !p.is_empty()).cloned() else {
        error!("invalid peer addr");
        return Ok(reply(StatusCode::BAD_REQUEST, "missing peer"));
    };
    let id = params
        .get("id")
        .filter(|id| !id.is_empty())
        .cloned()
        .unwrap_or_else(|| address.clone());

    Ok(match node.join(id, address).await {
        Ok(()) => reply(StatusCode::OK, ""),
        Err(e) => {
            error!("join failed: {:?}", e);
            reply(status_of(&e), e.to_string())
        }
    })
}

async fn members_handler(node: Arc<dyn Node>) -> std::result::Result<JsonReply, Rejection> {
    let members: Vec<Member> = node.members();
    Ok(reply(StatusCode::OK, members))
}
