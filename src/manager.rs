//! Store manager
//!
//! Resolves the configured backend (falling back to the volatile in-memory
//! provider), translates context-relative logical paths onto concrete
//! storage paths, bootstraps and migrates the root record, and hands out
//! context-bound facades so callers cannot wander out of their namespace.
//!
//! ## Path translation
//!
//! ```text
//! module           -> global.moduleData.<module>    (global data for module)
//! guild            -> guilds.<gID>                  (guild data)
//! guild.module     -> guilds.<gID>.moduleData.<module>
//! guild.user       -> guilds.<gID>.users.<uID>
//! guild.user.module-> guilds.<gID>.users.<uID>.moduleData.<module>
//! user             -> users.<uID>                   (user data)
//! user.module      -> users.<uID>.moduleData.<module>
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::config::{BackendConfig, StoreConfig};
use crate::error::{Result, StoreError};
use crate::object;
use crate::path::sanitize_segment;
use crate::provider::{
    MemoryProvider, Provider, SledOptions, SledProvider, SyncAdapter,
};
use crate::value::Value;

/// Version stamped into freshly seeded root records; a stored version that
/// differs triggers the update path on startup
pub const SCHEMA_VERSION: i64 = 0;

const DEFAULT_RECONNECT_TIME: u64 = 30;

/// Translation context: which tenant, end user, and module a logical path
/// is relative to
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub module: Option<String>,
    pub guild: Option<String>,
    pub user: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_guild(mut self, guild: impl Into<String>) -> Self {
        self.guild = Some(guild.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}

// =============================================================================
// Path Translation
// =============================================================================

/// Resolve a context-relative logical path into a concrete storage path.
/// `None` when a needed piece of context is missing.
pub fn translate_path(path: &str, ctx: &Context) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let mut segments: Vec<String> = path.split('.').map(str::to_string).collect();
    let seg = |segments: &[String], i: usize| -> Option<String> {
        segments.get(i).cloned()
    };

    // Bare module paths are global module data
    if seg(&segments, 0).as_deref() == Some("module") {
        segments.insert(0, "global".to_string());
    }

    if seg(&segments, 0).as_deref() == Some("guild") {
        let guild = ctx.guild.as_deref().filter(|s| !s.is_empty())?;
        segments.splice(0..1, ["guilds".to_string(), guild.to_string()]);
    }

    let user_index = if seg(&segments, 0).as_deref() == Some("user") {
        Some(0)
    } else if seg(&segments, 0).as_deref() == Some("guilds")
        && seg(&segments, 2).as_deref() == Some("user")
    {
        Some(2)
    } else {
        None
    };
    if let Some(index) = user_index {
        let user = ctx.user.as_deref().filter(|s| !s.is_empty())?;
        segments.splice(index..index + 1, ["users".to_string(), user.to_string()]);
    }

    if let Some(index) = module_position(&segments) {
        let module = ctx.module.as_deref().filter(|s| !s.is_empty())?;
        segments.splice(
            index..index + 1,
            ["moduleData".to_string(), lowercase_first(module)],
        );
    }

    Some(segments.join("."))
}

/// Index of a `module` segment sitting right after one of the recognized
/// prefix forms: `global`, `guilds.<id>`, `users.<id>`,
/// `guilds.<id>.users.<id>`
fn module_position(segments: &[String]) -> Option<usize> {
    let seg = |i: usize| segments.get(i).map(String::as_str);
    match seg(0) {
        Some("global") if seg(1) == Some("module") => Some(1),
        Some("users") if seg(2) == Some("module") => Some(2),
        Some("guilds") => {
            if seg(2) == Some("module") {
                Some(2)
            } else if seg(2) == Some("users") && seg(4) == Some("module") {
                Some(4)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Module names key module data with their first character lowercased
fn lowercase_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Provider Resolution
// =============================================================================

enum ProviderKind {
    Sled,
    Memory,
}

/// Match a configured provider name against the registry, trying the
/// conventional variants `name`, `DBname`, `nameDB`, `nameProvider`,
/// `nameDBProvider`
fn resolve_provider(name: &str) -> Option<ProviderKind> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned != name {
        warn!(assumed = %cleaned, "invalid database provider name");
    }
    let cleaned = cleaned.to_ascii_lowercase();
    let candidates = [
        cleaned.clone(),
        format!("db{}", cleaned),
        format!("{}db", cleaned),
        format!("{}provider", cleaned),
        format!("{}dbprovider", cleaned),
    ];
    for candidate in candidates {
        match candidate.as_str() {
            "sled" | "sleddb" => return Some(ProviderKind::Sled),
            "memory" | "memorydb" | "object" | "objectdb" => {
                return Some(ProviderKind::Memory)
            }
            _ => {}
        }
    }
    None
}

/// Construct and initialize the configured provider, falling back to the
/// volatile in-memory provider on any failure
async fn open_provider(backend: &BackendConfig) -> Arc<dyn Provider> {
    match resolve_provider(&backend.provider) {
        Some(ProviderKind::Sled) => {
            let provider = SledProvider::new(SledOptions {
                root: backend.root.clone(),
                path: backend.path.clone(),
                fail_if_missing: backend.fail_if_missing.unwrap_or(true),
            });
            match provider.init().await {
                Ok(()) => return Arc::new(provider),
                Err(e) => {
                    warn!(error = %e, "failed to initialize database provider, using fallback")
                }
            }
        }
        Some(ProviderKind::Memory) => {
            return Arc::new(SyncAdapter::new(MemoryProvider::new(
                backend.fail_if_missing.unwrap_or(false),
            )));
        }
        None => {
            warn!(provider = %backend.provider, "failed to find database provider, using fallback")
        }
    }
    Arc::new(SyncAdapter::new(MemoryProvider::new(false)))
}

// =============================================================================
// Manager
// =============================================================================

/// Owns the provider and the effective bot-wide settings, and fronts every
/// read/store with context translation
pub struct StoreManager {
    config: StoreConfig,
    provider: Arc<dyn Provider>,
}

impl StoreManager {
    /// Resolve the backend, initialize it, and run bootstrap: seed the root
    /// record on an empty backend, otherwise pick up stored settings and
    /// version-check
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let provider = open_provider(&config.backend).await;
        let mut manager = Self { config, provider };
        manager.bootstrap().await?;
        Ok(manager)
    }

    /// The provider behind this manager
    pub fn provider(&self) -> Arc<dyn Provider> {
        Arc::clone(&self.provider)
    }

    // -------------------------------------------------------------------------
    // Effective Settings
    // -------------------------------------------------------------------------

    /// Command prefix, defaulting to empty
    pub fn prefix(&self) -> String {
        self.config.prefix.clone().unwrap_or_default()
    }

    /// Credential/token; tokens too short to be real are treated as unset
    pub fn token(&self) -> Option<String> {
        self.config
            .token
            .as_ref()
            .filter(|t| t.len() > 5)
            .cloned()
    }

    /// Reconnect delay in seconds
    pub fn reconnect_time(&self) -> u64 {
        self.config.reconnect_time.unwrap_or(DEFAULT_RECONNECT_TIME)
    }

    /// Owner id list
    pub fn owners(&self) -> &[String] {
        &self.config.owners
    }

    // -------------------------------------------------------------------------
    // Bootstrap
    // -------------------------------------------------------------------------

    async fn bootstrap(&mut self) -> Result<()> {
        if self.provider.is_initialized() {
            if self.config.use_db_config {
                self.load_db_config().await?;
            }
            self.check_db_updates().await
        } else {
            if self.config.use_db_config {
                if self.token().is_none() || self.config.prefix.is_none() {
                    error!("unable to fetch bot config from uninitialized store");
                    return Err(StoreError::Config("config prefetch failed".to_string()));
                }
                warn!("database bot config is uninitialized, using saved config");
            }
            self.init_db_data().await
        }
    }

    /// Pull bot-wide settings out of the store into the effective config
    async fn load_db_config(&mut self) -> Result<()> {
        let paths = ["global.prefix".to_string(), "global.token".to_string()];
        match self.provider.prefetch(&paths).await {
            Ok(mut data) => {
                if let Some(Value::String(prefix)) = data.remove("global.prefix").flatten() {
                    self.config.prefix = Some(prefix);
                }
                if let Some(Value::String(token)) = data.remove("global.token").flatten() {
                    self.config.token = Some(token);
                }
            }
            Err(e) => {
                if self.token().is_none() || self.config.prefix.is_none() {
                    error!(error = %e, "failed to prefetch bot config from store");
                    return Err(StoreError::Config("config prefetch failed".to_string()));
                }
                warn!(error = %e, "failed to prefetch bot config from store, using saved config");
            }
        }
        if self.provider.has("global.reconnectTime").await? {
            if let Some(stored) = self.provider.read("global.reconnectTime").await? {
                if let Some(seconds) = stored.as_i64() {
                    self.config.reconnect_time = Some(seconds.max(0) as u64);
                }
            }
        }
        if self.provider.has("global.owners").await? {
            if let Some(Value::Array(items)) = self.provider.read("global.owners").await? {
                self.config.owners = items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
            }
        }
        Ok(())
    }

    /// Seed the root record on an empty backend
    async fn init_db_data(&self) -> Result<()> {
        let mut global = BTreeMap::new();
        global.insert("configInitTS".to_string(), Value::Int(now_millis()));
        global.insert("version".to_string(), Value::Int(SCHEMA_VERSION));
        if self.config.save_db_config {
            global.insert("prefix".to_string(), Value::String(self.prefix()));
            global.insert(
                "token".to_string(),
                self.token().map(Value::String).unwrap_or(Value::Null),
            );
            global.insert(
                "reconnectTime".to_string(),
                Value::Int(self.reconnect_time() as i64),
            );
            global.insert(
                "owners".to_string(),
                Value::Array(
                    self.config.owners.iter().cloned().map(Value::String).collect(),
                ),
            );
        }
        debug!("seeding root record");
        self.provider.store("global", &Value::Object(global)).await?;
        Ok(())
    }

    /// Compare the stored schema version against the running one and run
    /// the update path on mismatch. A failed version read re-seeds
    /// best-effort instead of failing startup.
    async fn check_db_updates(&self) -> Result<()> {
        match self.provider.read("global.version").await {
            Ok(stored) => {
                let version = stored.as_ref().and_then(Value::as_i64);
                if version != Some(SCHEMA_VERSION) {
                    self.update_db_data(version).await
                } else if !self.provider.has("global.configInitTS").await? {
                    // Missing marker means seeding never finished
                    self.update_db_data(version).await
                } else {
                    Ok(())
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read store version, attempting to reinitialize");
                self.init_db_data().await
            }
        }
    }

    /// Bring an out-of-date root record up to the running schema
    async fn update_db_data(&self, _old_version: Option<i64>) -> Result<()> {
        let global = self.provider.read("global").await?;
        let has_token = global.as_ref().and_then(|g| g.get("token")).is_some();
        if self.config.save_db_config && !has_token {
            self.provider
                .store("global.prefix", &Value::String(self.prefix()))
                .await?;
            self.provider
                .store(
                    "global.token",
                    &self.token().map(Value::String).unwrap_or(Value::Null),
                )
                .await?;
            self.provider
                .store(
                    "global.reconnectTime",
                    &Value::Int(self.reconnect_time() as i64),
                )
                .await?;
            self.provider
                .store(
                    "global.owners",
                    &Value::Array(
                        self.config.owners.iter().cloned().map(Value::String).collect(),
                    ),
                )
                .await?;
        }
        // TODO: apply version-specific migrations once SCHEMA_VERSION moves
        // past 0
        self.provider
            .store("global.version", &Value::Int(SCHEMA_VERSION))
            .await?;
        Ok(())
    }

    /// Seed a tenant's root record if it doesn't exist yet; `true` when a
    /// record was seeded
    pub async fn init_guild_db(&self, guild_id: &str) -> Result<bool> {
        if guild_id.is_empty() {
            return Err(StoreError::Access("invalid guild id".to_string()));
        }
        let key = format!("guilds.{}", sanitize_segment(guild_id));
        if self.provider.has(&key).await? {
            return Ok(false);
        }
        let guild = object! {
            "prefix" => "",
            "version" => SCHEMA_VERSION,
            "initTS" => now_millis(),
            "moduleData" => object! {},
            "users" => object! {},
        };
        self.provider.store(&key, &guild).await?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Context-translated Operations
    // -------------------------------------------------------------------------

    fn resolve(&self, path: &str, ctx: &Context) -> Result<String> {
        translate_path(path, ctx).ok_or_else(|| StoreError::UnresolvablePath(path.to_string()))
    }

    pub async fn read(&self, path: &str, ctx: &Context) -> Result<Option<Value>> {
        let resolved = self.resolve(path, ctx)?;
        self.provider.read(&resolved).await
    }

    pub async fn store(&self, path: &str, value: &Value, ctx: &Context) -> Result<bool> {
        let resolved = self.resolve(path, ctx)?;
        self.provider.store(&resolved, value).await
    }

    pub async fn has(&self, path: &str, ctx: &Context) -> Result<bool> {
        let resolved = self.resolve(path, ctx)?;
        self.provider.has(&resolved).await
    }

    pub async fn remove(&self, path: &str, ctx: &Context) -> Result<bool> {
        let resolved = self.resolve(path, ctx)?;
        self.provider.remove(&resolved).await
    }

    /// Batched lookup keyed by the *requested* logical paths. Fails up
    /// front, naming the paths that don't translate.
    pub async fn prefetch(
        &self,
        paths: &[String],
        ctx: &Context,
    ) -> Result<HashMap<String, Option<Value>>> {
        let requested: Vec<String> = paths
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if requested.is_empty() {
            return Ok(HashMap::new());
        }
        let mut translated = Vec::with_capacity(requested.len());
        let mut unresolved = Vec::new();
        for path in &requested {
            match translate_path(path, ctx) {
                Some(resolved) => translated.push(resolved),
                None => unresolved.push(path.clone()),
            }
        }
        if !unresolved.is_empty() {
            return Err(StoreError::UnresolvablePath(unresolved.join(", ")));
        }
        let data = self.provider.prefetch(&translated).await?;
        let mut result = HashMap::with_capacity(requested.len());
        for (logical, resolved) in requested.into_iter().zip(&translated) {
            result.insert(logical, data.get(resolved).cloned().flatten());
        }
        Ok(result)
    }

    /// Facade bound to a fixed context, so unrelated callers can't read or
    /// write each other's namespace without going through translation
    pub fn scoped(&self, ctx: Context) -> ScopedStore<'_> {
        ScopedStore { manager: self, ctx }
    }
}

// =============================================================================
// Scoped Facade
// =============================================================================

/// Context-bound view over a [`StoreManager`]
#[derive(Clone)]
pub struct ScopedStore<'a> {
    manager: &'a StoreManager,
    ctx: Context,
}

impl ScopedStore<'_> {
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn read(&self, path: &str) -> Result<Option<Value>> {
        self.manager.read(path, &self.ctx).await
    }

    pub async fn store(&self, path: &str, value: &Value) -> Result<bool> {
        self.manager.store(path, value, &self.ctx).await
    }

    pub async fn has(&self, path: &str) -> Result<bool> {
        self.manager.has(path, &self.ctx).await
    }

    pub async fn remove(&self, path: &str) -> Result<bool> {
        self.manager.remove(path, &self.ctx).await
    }

    pub async fn prefetch(&self, paths: &[String]) -> Result<HashMap<String, Option<Value>>> {
        self.manager.prefetch(paths, &self.ctx).await
    }
}

/// Current time as integer epoch millis
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
