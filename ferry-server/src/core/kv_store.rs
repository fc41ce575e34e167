use super::error::{FerryError, Result};
use super::types::KVStats;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};
use std::sync::Arc;
use tracing::debug;

/// Key-Value store using radix trie for memory-efficient storage
#[derive(Clone, Default)]
pub struct KVStore {
    data: Arc<RwLock<Trie<String, Vec<u8>>>>,
    stats: Arc<RwLock<KVStats>>,
}

impl KVStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key-value pair
    pub fn set(&self, key: &str, value: Vec<u8>) {
        debug!("SET key={}, size={}", key, value.len());

        let entry_size = Self::estimate_entry_size(key, &value);
        let mut data = self.data.write();
        let previous = data.insert(key.to_string(), value);

        let mut stats = self.stats.write();
        stats.sets += 1;
        match previous {
            Some(old) => {
                stats.total_memory_bytes = stats
                    .total_memory_bytes
                    .saturating_sub(Self::estimate_entry_size(key, &old))
                    + entry_size;
            }
            None => {
                stats.total_keys += 1;
                stats.total_memory_bytes += entry_size;
            }
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.stats.write().gets += 1;
        self.data.read().get(key).cloned()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.data.read().get(key).is_some()
    }

    /// Delete keys, returning how many existed
    pub fn delete(&self, keys: &[String]) -> usize {
        let mut data = self.data.write();
        let mut stats = self.stats.write();
        let mut removed = 0;

        for key in keys {
            if let Some(old) = data.remove(key.as_str()) {
                removed += 1;
                stats.total_keys = stats.total_keys.saturating_sub(1);
                stats.total_memory_bytes = stats
                    .total_memory_bytes
                    .saturating_sub(Self::estimate_entry_size(key, &old));
            }
        }
        stats.dels += removed as u64;

        debug!("DEL keys={}, removed={}", keys.len(), removed);
        removed
    }

    /// Increment the integer stored at `key` (missing keys count as 0)
    pub fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let current = match self.data.read().get(key) {
            Some(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or(FerryError::NotAnInteger)?,
            None => 0,
        };

        let next = current.checked_add(amount).ok_or(FerryError::NotAnInteger)?;
        self.set(key, next.to_string().into_bytes());
        Ok(next)
    }

    /// Move a value to a new key, replacing any existing value there
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let value = {
            let mut data = self.data.write();
            let value = data.remove(from).ok_or(FerryError::KeyNotFound)?;
            let mut stats = self.stats.write();
            stats.total_keys = stats.total_keys.saturating_sub(1);
            stats.total_memory_bytes = stats
                .total_memory_bytes
                .saturating_sub(Self::estimate_entry_size(from, &value));
            value
        };
        self.set(to, value);
        Ok(())
    }

    /// Keys matching a prefix, in sorted order
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        let data = self.data.read();
        match prefix {
            Some(prefix) => data
                .get_raw_descendant(prefix)
                .map(|sub| {
                    sub.keys()
                        .filter(|k| k.starts_with(prefix))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
            None => data.keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stats.read().total_keys
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every key
    pub fn flush_all(&self) -> usize {
        let mut data = self.data.write();
        let mut stats = self.stats.write();
        let removed = stats.total_keys;

        *data = Trie::new();
        stats.total_keys = 0;
        stats.total_memory_bytes = 0;

        removed
    }

    pub fn stats(&self) -> KVStats {
        self.stats.read().clone()
    }

    fn estimate_entry_size(key: &str, value: &[u8]) -> usize {
        key.len() + value.len() + 64
    }
}
