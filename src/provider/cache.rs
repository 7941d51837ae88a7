//! Path cache
//!
//! Last-known decoded values keyed by flattened path. The cache is advisory:
//! providers may bypass it, and it is never a synchronization point.
//!
//! Invalidation rule: touching a path evicts the entry itself, every strict
//! ancestor (an ancestor's decoded value embeds the child), and every
//! descendant (a bulk store can replace an entire subtree).

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::path::path_key;
use crate::value::Value;

/// Cache of decoded values keyed by joined path
#[derive(Default)]
pub struct PathCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self, path: &[String]) -> Option<Value> {
        self.entries.read().get(&path_key(path)).cloned()
    }

    /// Invalidate around `path`, then cache `value` for it
    pub fn write(&self, path: &[String], value: Value) {
        let mut entries = self.entries.write();
        Self::evict(&mut entries, path);
        entries.insert(path_key(path), value);
    }

    /// Invalidate around `path` without caching anything new
    pub fn invalidate(&self, path: &[String]) {
        let mut entries = self.entries.write();
        Self::evict(&mut entries, path);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn evict(entries: &mut HashMap<String, Value>, path: &[String]) {
        for depth in 0..path.len() {
            entries.remove(&path_key(&path[..depth]));
        }
        let base = path_key(path);
        let prefix = format!("{}.", base);
        entries.retain(|key, _| key != &base && !key.starts_with(&prefix));
    }
}
