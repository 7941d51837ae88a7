//! In-memory fallback provider
//!
//! Volatile provider over a plain nested [`Value`] tree. Used automatically
//! when no backend is configured or the configured one fails to come up.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::path::path_key;
use crate::provider::cache::PathCache;
use crate::provider::SyncProvider;
use crate::value::Value;

/// Volatile provider backed by a nested in-memory object
pub struct MemoryProvider {
    data: RwLock<Value>,
    cache: PathCache,
    fail_if_missing: bool,
}

impl MemoryProvider {
    pub fn new(fail_if_missing: bool) -> Self {
        warn!("using fallback memory provider, all data will be lost on restart");
        Self {
            data: RwLock::new(Value::Object(BTreeMap::new())),
            cache: PathCache::new(),
            fail_if_missing,
        }
    }

    /// Descend one level, by member key on objects and numeric index on
    /// arrays
    fn descend<'a>(node: &'a Value, segment: &str) -> Option<&'a Value> {
        match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Write `value` at `path` below `node`, lazily creating intermediate
    /// objects and overwriting any non-container in the way
    fn store_in(node: &mut Value, path: &[String], value: &Value) {
        let Some((segment, rest)) = path.split_first() else {
            return;
        };
        // Arrays stay in place when the segment is a usable index
        if let Value::Array(items) = node {
            if let Some(slot) = segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
            {
                if rest.is_empty() {
                    *slot = value.clone();
                } else {
                    if !slot.is_container() {
                        *slot = Value::Object(BTreeMap::new());
                    }
                    Self::store_in(slot, rest, value);
                }
                return;
            }
        }
        if !matches!(node, Value::Object(_)) {
            *node = Value::Object(BTreeMap::new());
        }
        if let Value::Object(map) = node {
            if rest.is_empty() {
                map.insert(segment.clone(), value.clone());
            } else {
                let child = map
                    .entry(segment.clone())
                    .or_insert_with(|| Value::Object(BTreeMap::new()));
                if !child.is_container() {
                    *child = Value::Object(BTreeMap::new());
                }
                Self::store_in(child, rest, value);
            }
        }
    }

    /// Remove the leaf at `path` below `node`; true when something existed
    fn remove_in(node: &mut Value, path: &[String]) -> bool {
        let Some((segment, rest)) = path.split_first() else {
            return false;
        };
        if rest.is_empty() {
            return match node {
                Value::Object(map) => map.remove(segment).is_some(),
                Value::Array(items) => match segment.parse::<usize>() {
                    Ok(index) if index < items.len() => {
                        items.remove(index);
                        true
                    }
                    _ => false,
                },
                _ => false,
            };
        }
        let child = match node {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => {
                segment.parse::<usize>().ok().and_then(|i| items.get_mut(i))
            }
            _ => None,
        };
        match child {
            Some(child) => Self::remove_in(child, rest),
            None => false,
        }
    }
}

impl SyncProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_volatile(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn fail_if_missing(&self) -> bool {
        self.fail_if_missing
    }

    fn read_path_sync(&self, path: &[String]) -> Result<Option<Value>> {
        if let Some(cached) = self.cache.read(path) {
            return Ok(Some(cached));
        }
        let value = {
            let data = self.data.read();
            let mut node = &*data;
            for segment in path {
                match Self::descend(node, segment) {
                    Some(child) => node = child,
                    None => {
                        if self.fail_if_missing {
                            return Err(StoreError::PathNotFound(path_key(path)));
                        }
                        return Ok(None);
                    }
                }
            }
            node.clone()
        };
        self.cache.write(path, value.clone());
        Ok(Some(value))
    }

    fn store_path_sync(&self, path: &[String], value: &Value) -> Result<bool> {
        if path.is_empty() {
            // Replacing the root wholesale only makes sense for a new tree
            return match value {
                Value::Object(_) => {
                    *self.data.write() = value.clone();
                    self.cache.clear();
                    Ok(true)
                }
                _ => Ok(false),
            };
        }
        Self::store_in(&mut self.data.write(), path, value);
        self.cache.write(path, value.clone());
        Ok(true)
    }

    fn has_path_sync(&self, path: &[String]) -> Result<bool> {
        let data = self.data.read();
        let mut node = &*data;
        for segment in path {
            match Self::descend(node, segment) {
                Some(child) => node = child,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    fn remove_path_sync(&self, path: &[String]) -> Result<bool> {
        if path.is_empty() {
            return Ok(false);
        }
        let removed = Self::remove_in(&mut self.data.write(), path);
        if removed {
            self.cache.invalidate(path);
        }
        Ok(removed)
    }
}
