//! Replication-storage integration layer of a replicated key-value store.
//!
//! - [`storage`]: durable replicated log and consensus metadata on sled
//! - [`cache`]: live key-value state
//! - [`fsm`]: deterministic state machine and snapshot writer
//! - [`snapshot`]: on-disk snapshot store
//! - [`leadership`]: cheap leadership flag for write admission
//! - [`raft`]: consensus engine contract and a single-voter engine
//! - [`cluster`]: the facade consumed by the HTTP layer

pub mod cache;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod errors;
pub mod fsm;
pub mod leadership;
pub mod metrics;
pub mod raft;
pub mod snapshot;
pub mod storage;
pub mod utils;

pub use cache::*;
pub use cluster::*;
pub use config::*;
pub use errors::*;
pub use fsm::*;
pub use leadership::*;
pub use raft::*;
pub use snapshot::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
