//! Contract between the integration layer and a consensus engine.
//!
//! The engine owns leader election, replication and quorum commit. The
//! integration layer hands it opaque commands and receives committed entries
//! through [`StateMachine::apply`](crate::StateMachine::apply).

mod membership;
mod solo;


pub use membership::*;
pub use solo::*;

use std::time::Duration;

#[cfg(test)]
use mockall::automock;

use crate::ApplyOutcome;
use crate::Result;

#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ConsensusEngine: Send + Sync + 'static {
    /// Submits an opaque command and waits up to `timeout` for it to commit
    /// and be applied.
    ///
    /// A `ConsensusError::Timeout` means the outcome is unknown: the command
    /// may still commit.
    async fn apply(
        &self,
        command: Vec<u8>,
        timeout: Duration,
    ) -> Result<ApplyOutcome>;

    /// Adds a voting member.
    async fn add_voter(
        &self,
        id: String,
        address: String,
        timeout: Duration,
    ) -> Result<()>;

    /// Current cluster membership.
    fn configuration(&self) -> Configuration;

    /// Stops background work and releases leadership.
    async fn shutdown(&self) -> Result<()>;
}
