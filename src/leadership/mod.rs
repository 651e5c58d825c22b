//! Cheap local view of "is this node the leader".
//!
//! The consensus engine publishes leadership transitions on a latest-value
//! `watch` channel ([`LeaderNotifier`]). A [`LeadershipGate`] owns one task
//! that mirrors the latest value into an atomic flag, so request handlers can
//! reject writes on followers without asking the engine. The flag may lag the
//! engine briefly; the engine still rejects writes it cannot commit.

mod gate;
mod leader_notifier;


pub use gate::*;
pub use leader_notifier::*;
