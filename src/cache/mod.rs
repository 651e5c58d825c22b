//! Live key-value application state.
//!
//! The cache is the only mutable application state on a node: the state
//! machine writes it on apply, replaces it wholesale on restore, and the
//! snapshot path serializes it.

mod mem_cache;


pub use mem_cache::*;

use std::collections::BTreeMap;
use std::io::Read;

use crate::Result;

pub trait KvCache: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> Option<String>;

    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Removing an absent key is not an error.
    fn del(
        &self,
        key: &str,
    );

    /// Copy of the current contents, taken under a read lock.
    fn entries(&self) -> BTreeMap<String, String>;

    /// Deterministic encoding of the full contents.
    fn marshal(&self) -> Result<Vec<u8>>;

    /// Replaces the full contents with the decoded stream. On a decode error
    /// the current contents are left untouched.
    fn unmarshal(
        &self,
        serialized: &mut dyn Read,
    ) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
