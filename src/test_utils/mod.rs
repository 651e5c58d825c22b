//! Helpers shared by unit tests.
mod common;

pub use common::*;
