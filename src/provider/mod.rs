//! Provider contract
//!
//! The uniform interface every storage backend satisfies, plus the shared
//! concerns: path parsing, prefetch fan-out, and the whole-object store
//! helper with its recursion guard.
//!
//! Backends come in two shapes. Inherently asynchronous ones implement
//! [`Provider`] directly; simple synchronous ones implement [`SyncProvider`]
//! and are wrapped in a [`SyncAdapter`], which satisfies the async contract
//! by forwarding.

pub mod cache;
pub mod memory;
pub mod sled;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::codec::MAX_OBJECT_DEPTH;
use crate::error::{Result, StoreError};
use crate::path::{parse_path, sanitize_segment};
use crate::value::Value;

pub use cache::PathCache;
pub use memory::MemoryProvider;
pub use self::sled::{SledOptions, SledProvider};

// =============================================================================
// Async Contract
// =============================================================================

/// Capability interface over a storage backend
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name, used for backend resolution and logs
    fn name(&self) -> &'static str;

    /// Data does not survive a restart
    fn is_volatile(&self) -> bool {
        false
    }

    /// Backend is open and usable
    fn is_ready(&self) -> bool;

    /// Backend already contained data when it was opened
    fn is_initialized(&self) -> bool;

    /// Reads of missing paths fail instead of returning `None`
    fn fail_if_missing(&self) -> bool;

    /// Open the backend. Called once; later calls are no-ops.
    async fn init(&self) -> Result<()>;

    async fn read_path(&self, path: &[String]) -> Result<Option<Value>>;

    /// All-or-nothing write of `value` at `path`. `false` means the write
    /// was a no-op (nothing stored and nothing to delete).
    async fn store_path(&self, path: &[String], value: &Value) -> Result<bool>;

    async fn has_path(&self, path: &[String]) -> Result<bool>;

    /// Remove the value and everything nested under it
    async fn remove_path(&self, path: &[String]) -> Result<bool>;

    /// Backend observed an external modification under `path`
    async fn is_path_modified(&self, _path: &[String]) -> Result<bool> {
        Ok(false)
    }

    /// Commit buffered backend state; a no-op for unbuffered backends
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // String-path conveniences
    // -------------------------------------------------------------------------

    async fn read(&self, path: &str) -> Result<Option<Value>> {
        self.read_path(&parse_path(path)).await
    }

    async fn read_root(&self) -> Result<Option<Value>> {
        self.read_path(&[]).await
    }

    async fn store(&self, path: &str, value: &Value) -> Result<bool> {
        self.store_path(&parse_path(path), value).await
    }

    async fn has(&self, path: &str) -> Result<bool> {
        self.has_path(&parse_path(path)).await
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        self.remove_path(&parse_path(path)).await
    }

    /// Batched lookup of several paths.
    ///
    /// Each requested path maps to its current value, or `None` when
    /// absent. Existence is probed first so a missing path never poisons
    /// the result, even when the provider fails missing reads.
    async fn prefetch(&self, paths: &[String]) -> Result<HashMap<String, Option<Value>>> {
        let mut data = HashMap::with_capacity(paths.len());
        for path in paths {
            let value = if self.has(path).await? {
                self.read(path).await?
            } else {
                None
            };
            data.insert(path.clone(), value);
        }
        Ok(data)
    }

    /// Store an object member-by-member (a merge, unlike `store_path`,
    /// which replaces the whole subtree).
    ///
    /// The object is flattened to scalar leaves before anything is written,
    /// so nesting beyond [`MAX_OBJECT_DEPTH`] fails without touching the
    /// backend.
    async fn store_object(&self, path: &[String], value: &Value) -> Result<bool> {
        let leaves = flatten_object(path, value)?;
        let mut stored = true;
        for (leaf_path, leaf) in leaves {
            stored &= self.store_path(&leaf_path, &leaf).await?;
        }
        Ok(stored)
    }
}

/// Flatten nested objects into `(path, scalar-or-array)` leaves,
/// enforcing the recursion guard along the way
fn flatten_object(path: &[String], value: &Value) -> Result<Vec<(Vec<String>, Value)>> {
    fn walk(
        path: Vec<String>,
        value: &Value,
        depth: usize,
        out: &mut Vec<(Vec<String>, Value)>,
    ) -> Result<()> {
        if let Value::Object(map) = value {
            if depth > MAX_OBJECT_DEPTH {
                return Err(StoreError::RecursionLimit);
            }
            for (key, member) in map {
                let mut child = path.clone();
                child.push(sanitize_segment(key));
                walk(child, member, depth + 1, out)?;
            }
            Ok(())
        } else {
            out.push((path, value.clone()));
            Ok(())
        }
    }

    let mut leaves = Vec::new();
    walk(path.to_vec(), value, 0, &mut leaves)?;
    Ok(leaves)
}

// =============================================================================
// Sync Contract
// =============================================================================

/// Synchronous backend surface, the override point for simple backends.
/// Wrap implementations in [`SyncAdapter`] to satisfy [`Provider`].
pub trait SyncProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_volatile(&self) -> bool {
        false
    }

    fn is_ready(&self) -> bool;

    fn is_initialized(&self) -> bool;

    fn fail_if_missing(&self) -> bool;

    fn init_sync(&self) -> Result<()> {
        Ok(())
    }

    fn read_path_sync(&self, path: &[String]) -> Result<Option<Value>>;

    fn store_path_sync(&self, path: &[String], value: &Value) -> Result<bool>;

    fn has_path_sync(&self, path: &[String]) -> Result<bool>;

    fn remove_path_sync(&self, path: &[String]) -> Result<bool>;

    fn is_path_modified_sync(&self, _path: &[String]) -> Result<bool> {
        Ok(false)
    }

    fn flush_sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Adapts any [`SyncProvider`] to the async [`Provider`] contract
pub struct SyncAdapter<P> {
    inner: P,
}

impl<P> SyncAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: SyncProvider> Provider for SyncAdapter<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn is_volatile(&self) -> bool {
        self.inner.is_volatile()
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    fn fail_if_missing(&self) -> bool {
        self.inner.fail_if_missing()
    }

    async fn init(&self) -> Result<()> {
        self.inner.init_sync()
    }

    async fn read_path(&self, path: &[String]) -> Result<Option<Value>> {
        self.inner.read_path_sync(path)
    }

    async fn store_path(&self, path: &[String], value: &Value) -> Result<bool> {
        self.inner.store_path_sync(path, value)
    }

    async fn has_path(&self, path: &[String]) -> Result<bool> {
        self.inner.has_path_sync(path)
    }

    async fn remove_path(&self, path: &[String]) -> Result<bool> {
        self.inner.remove_path_sync(path)
    }

    async fn is_path_modified(&self, path: &[String]) -> Result<bool> {
        self.inner.is_path_modified_sync(path)
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush_sync()
    }
}
