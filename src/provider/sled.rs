//! Ordered-KV provider backed by sled
//!
//! Values live as codec records in a single sled tree. Subtree reads and
//! deletes are range scans over `[key, key + ('.' + 1))`; every mutation is
//! one atomic batch, so a concurrent reader never observes a half-applied
//! write.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use sled::{Batch, Db, IVec};
use tracing::{debug, warn};

use crate::codec::{self, Tag};
use crate::error::{Result, StoreError};
use crate::path::path_key;
use crate::provider::cache::PathCache;
use crate::provider::Provider;
use crate::value::Value;

/// Key byte one past the path separator; `[key, key + SCAN_END)` covers
/// exactly the subtree rooted at `key`
const SCAN_END: u8 = b'.' + 1;

const DEFAULT_DB_PATH: &str = "sled";

/// Backend options for [`SledProvider`]
#[derive(Debug, Clone)]
pub struct SledOptions {
    /// Filesystem root for backend files
    pub root: PathBuf,

    /// Database directory, resolved against `root` when relative
    pub path: Option<PathBuf>,

    /// Fail reads of missing paths instead of returning `None`
    pub fail_if_missing: bool,
}

impl Default for SledOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            path: None,
            fail_if_missing: true,
        }
    }
}

/// Provider over a sled tree using the storage codec
pub struct SledProvider {
    db_path: PathBuf,
    fail_if_missing: bool,
    db: RwLock<Option<Db>>,
    ready: AtomicBool,
    initialized: AtomicBool,
    cache: PathCache,
}

impl SledProvider {
    pub fn new(options: SledOptions) -> Self {
        let relative = options.path.unwrap_or_else(|| {
            warn!("database path not specified, using default path");
            PathBuf::from(DEFAULT_DB_PATH)
        });
        let db_path = if relative.is_absolute() {
            relative
        } else {
            options.root.join(relative)
        };
        Self {
            db_path,
            fail_if_missing: options.fail_if_missing,
            db: RwLock::new(None),
            ready: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            cache: PathCache::new(),
        }
    }

    /// Database directory in use
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Handle to the open database; cheap to clone (sled shares internally)
    fn db(&self) -> Result<Db> {
        self.db
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| StoreError::Access("database is not open".to_string()))
    }

    /// All subtree keys under `base`, for tests and debugging
    pub fn subtree_keys(&self, base: &str) -> Result<Vec<String>> {
        let db = self.db()?;
        Ok(self
            .scan_subtree(&db, base, false)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Range-scan the subtree rooted at `base`.
    ///
    /// The range `[base, base + SCAN_END)` also covers sibling keys like
    /// `base!x` that merely share the prefix bytes, so matches are filtered
    /// down to `base` itself and `base.`-prefixed keys.
    fn scan_subtree(
        &self,
        db: &Db,
        base: &str,
        with_values: bool,
    ) -> Result<Vec<(String, Bytes)>> {
        let mut end = base.as_bytes().to_vec();
        end.push(SCAN_END);
        let child_prefix = format!("{}.", base);

        let mut records = Vec::new();
        for entry in db.range(base.as_bytes().to_vec()..end) {
            let (key, value) = entry?;
            let key = String::from_utf8_lossy(&key).into_owned();
            if key != base && !key.starts_with(&child_prefix) {
                continue;
            }
            let value = if with_values {
                Bytes::copy_from_slice(&value)
            } else {
                Bytes::new()
            };
            records.push((key, value));
        }
        Ok(records)
    }

    /// First byte of the record at an exact key, if any. An unrecognized
    /// tag byte still counts as an existing non-container record.
    fn record_head(&self, db: &Db, key: &str) -> Result<Option<u8>> {
        match db.get(key)? {
            Some(raw) => raw
                .first()
                .copied()
                .map(Some)
                .ok_or_else(|| StoreError::Corruption(key.to_string())),
            None => Ok(None),
        }
    }

    /// Keys to delete so the write at `base` leaves no stale records behind.
    ///
    /// A container already at `base` means a full subtree replace: its whole
    /// prior key set joins the delete side of the batch. Otherwise the
    /// nearest existing ancestor is probed; a scalar there is being promoted
    /// to a container, and its subtree (the scalar record plus any strays)
    /// must go in the same batch.
    fn stale_keys(&self, db: &Db, path: &[String], base: &str) -> Result<Vec<String>> {
        let is_container =
            |byte: u8| Tag::from_byte(byte).is_some_and(Tag::is_container);
        if let Some(head) = self.record_head(db, base)? {
            if is_container(head) {
                return Ok(self
                    .scan_subtree(db, base, false)?
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect());
            }
            return Ok(Vec::new());
        }
        for depth in (1..path.len()).rev() {
            let ancestor = path_key(&path[..depth]);
            if let Some(head) = self.record_head(db, &ancestor)? {
                if !is_container(head) {
                    return Ok(self
                        .scan_subtree(db, &ancestor, false)?
                        .into_iter()
                        .map(|(key, _)| key)
                        .collect());
                }
                break;
            }
        }
        Ok(Vec::new())
    }

    /// Apply deletes and puts as one atomic batch; `false` when there was
    /// nothing to do
    fn bulk_op(&self, db: &Db, puts: Vec<(String, Bytes)>, deletes: Vec<String>) -> Result<bool> {
        let mut batch = Batch::default();
        let mut ops = 0usize;
        for key in deletes {
            if puts.iter().any(|(put_key, _)| put_key == &key) {
                continue;
            }
            batch.remove(key.as_bytes());
            ops += 1;
        }
        for (key, value) in puts {
            batch.insert(key.as_bytes(), IVec::from(value.as_ref()));
            ops += 1;
        }
        if ops == 0 {
            return Ok(false);
        }
        db.apply_batch(batch)?;
        Ok(true)
    }
}

#[async_trait]
impl Provider for SledProvider {
    fn name(&self) -> &'static str {
        "sled"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn fail_if_missing(&self) -> bool {
        self.fail_if_missing
    }

    /// Open the database, retrying once on failure (sled replays its own
    /// log on open, so the retry doubles as the repair attempt). A second
    /// failure is permanent. After opening, a single-entry probe decides
    /// whether the backend already holds data.
    async fn init(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let db = match sled::open(&self.db_path) {
            Ok(db) => db,
            Err(first) => {
                warn!(error = %first, path = %self.db_path.display(),
                    "failed to open database, attempting to repair");
                sled::open(&self.db_path)?
            }
        };
        let has_data = db.first()?.is_some();
        self.initialized.store(has_data, Ordering::Release);
        *self.db.write() = Some(db);
        self.ready.store(true, Ordering::Release);
        debug!(path = %self.db_path.display(), initialized = has_data, "database open");
        Ok(())
    }

    async fn read_path(&self, path: &[String]) -> Result<Option<Value>> {
        if let Some(cached) = self.cache.read(path) {
            return Ok(Some(cached));
        }
        let base = path_key(path);
        let db = self.db()?;
        let records = self.scan_subtree(&db, &base, true)?;
        let value = codec::decode(&base, &records, self.fail_if_missing)?;
        if let Some(decoded) = &value {
            self.cache.write(path, decoded.clone());
        }
        Ok(value)
    }

    async fn store_path(&self, path: &[String], value: &Value) -> Result<bool> {
        let base = path_key(path);
        let db = self.db()?;
        let deletes = self.stale_keys(&db, path, &base)?;
        let puts = codec::encode(&base, value);
        let changed = self.bulk_op(&db, puts, deletes)?;
        self.cache.invalidate(path);
        Ok(changed)
    }

    async fn has_path(&self, path: &[String]) -> Result<bool> {
        let base = path_key(path);
        let db = self.db()?;
        let mut end = base.as_bytes().to_vec();
        end.push(SCAN_END);
        let child_prefix = format!("{}.", base);
        for entry in db.range(base.as_bytes().to_vec()..end) {
            let (key, _) = entry?;
            let key = String::from_utf8_lossy(&key);
            if key == base.as_str() || key.starts_with(&child_prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn remove_path(&self, path: &[String]) -> Result<bool> {
        let base = path_key(path);
        let db = self.db()?;
        let deletes = self
            .scan_subtree(&db, &base, false)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let changed = self.bulk_op(&db, Vec::new(), deletes)?;
        self.cache.invalidate(path);
        Ok(changed)
    }

    async fn flush(&self) -> Result<()> {
        let db = self.db()?;
        db.flush_async().await?;
        Ok(())
    }
}
