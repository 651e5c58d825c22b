use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::Read;

use parking_lot::RwLock;
use tracing::debug;

use crate::KvCache;
use crate::Result;

/// `HashMap` cache behind a single reader/writer lock.
#[derive(Debug, Default)]
pub struct MemCache {
    kv: RwLock<HashMap<String, String>>,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            kv: RwLock::new(entries.into_iter().collect()),
        }
    }
}

impl KvCache for MemCache {
    fn get(
        &self,
        key: &str,
    ) -> Option<String> {
        self.kv.read().get(key).cloned()
    }

    fn set(
        &self,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.kv.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn del(
        &self,
        key: &str,
    ) {
        self.kv.write().remove(key);
    }

    fn entries(&self) -> BTreeMap<String, String> {
        let kv = self.kv.read();
        kv.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn marshal(&self) -> Result<Vec<u8>> {
        // BTreeMap gives a stable key order
        Ok(serde_json::to_vec(&self.entries())?)
    }

    fn unmarshal(
        &self,
        serialized: &mut dyn Read,
    ) -> Result<()> {
        let new_data: HashMap<String, String> = serde_json::from_reader(serialized)?;
        debug!("unmarshal cache with {} keys", new_data.len());

        *self.kv.write() = new_data;
        Ok(())
    }

    fn len(&self) -> usize {
        self.kv.read().len()
    }
}
