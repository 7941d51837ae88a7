//! Manager Tests
//!
//! Tests for path translation, bootstrap/migration, tenant initialization,
//! provider resolution fallback, and the scoped facade.

use pathstore::{
    object, translate_path, Context, Provider, StoreConfig, StoreManager, Value,
    SCHEMA_VERSION,
};
use tempfile::TempDir;

fn full_ctx() -> Context {
    Context::new()
        .with_guild("G1")
        .with_user("U1")
        .with_module("Economy")
}

fn sled_config(dir: &TempDir) -> StoreConfig {
    StoreConfig::builder()
        .provider("sled")
        .root(dir.path())
        .db_path("db")
        .build()
}

// =============================================================================
// Config Loading
// =============================================================================

#[test]
fn test_config_loads_from_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "backend": { "provider": "sled", "root": "/tmp/store", "path": "db" },
            "use_db_config": true,
            "prefix": "!",
            "owners": ["100"]
        }"#,
    )
    .unwrap();

    let config = StoreConfig::load(&path).unwrap();
    assert_eq!(config.backend.provider, "sled");
    assert_eq!(config.backend.path.as_deref(), Some(std::path::Path::new("db")));
    assert!(config.use_db_config);
    assert!(!config.save_db_config);
    assert_eq!(config.prefix.as_deref(), Some("!"));
    assert_eq!(config.owners, vec!["100"]);
}

// =============================================================================
// Path Translation
// =============================================================================

#[test]
fn test_translate_guild_user_module() {
    let resolved = translate_path("guild.user.module.setting", &full_ctx());
    assert_eq!(
        resolved.as_deref(),
        Some("guilds.G1.users.U1.moduleData.economy.setting")
    );
}

#[test]
fn test_translate_bare_module_is_global() {
    let resolved = translate_path("module.setting", &full_ctx());
    assert_eq!(
        resolved.as_deref(),
        Some("global.moduleData.economy.setting")
    );
}

#[test]
fn test_translate_guild_only() {
    assert_eq!(
        translate_path("guild", &full_ctx()).as_deref(),
        Some("guilds.G1")
    );
    assert_eq!(
        translate_path("guild.prefix", &full_ctx()).as_deref(),
        Some("guilds.G1.prefix")
    );
}

#[test]
fn test_translate_user_module() {
    assert_eq!(
        translate_path("user.module.score", &full_ctx()).as_deref(),
        Some("users.U1.moduleData.economy.score")
    );
}

#[test]
fn test_translate_module_name_lowercases_first_char() {
    let ctx = Context::new().with_module("MyMod");
    assert_eq!(
        translate_path("module.x", &ctx).as_deref(),
        Some("global.moduleData.myMod.x")
    );
}

#[test]
fn test_translate_missing_context_is_unresolvable() {
    let no_guild = Context::new().with_user("U1").with_module("m");
    assert_eq!(translate_path("guild.setting", &no_guild), None);

    let no_user = Context::new().with_guild("G1").with_module("m");
    assert_eq!(translate_path("guild.user.x", &no_user), None);

    let no_module = Context::new().with_guild("G1").with_user("U1");
    assert_eq!(translate_path("module.x", &no_module), None);
}

#[test]
fn test_translate_plain_paths_pass_through() {
    assert_eq!(
        translate_path("global.prefix", &Context::new()).as_deref(),
        Some("global.prefix")
    );
    // A module segment that is not in prefix position stays literal
    assert_eq!(
        translate_path("settings.module.x", &Context::new()).as_deref(),
        Some("settings.module.x")
    );
}

// =============================================================================
// Bootstrap
// =============================================================================

#[tokio::test]
async fn test_bootstrap_seeds_root_record() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let provider = manager.provider();

    assert!(provider.has("global.configInitTS").await.unwrap());
    assert_eq!(
        provider.read("global.version").await.unwrap(),
        Some(Value::Int(SCHEMA_VERSION))
    );
}

#[tokio::test]
async fn test_bootstrap_leaves_existing_data_alone() {
    let dir = TempDir::new().unwrap();
    {
        let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
        let provider = manager.provider();
        provider
            .store("global.canary", &Value::from("alive"))
            .await
            .unwrap();
        provider.flush().await.unwrap();
    }
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let provider = manager.provider();

    // A re-seed would have replaced the whole root record
    assert_eq!(
        provider.read("global.canary").await.unwrap(),
        Some(Value::from("alive"))
    );
    assert_eq!(
        provider.read("global.version").await.unwrap(),
        Some(Value::Int(SCHEMA_VERSION))
    );
}

#[tokio::test]
async fn test_bootstrap_snapshots_settings_when_saving() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .provider("sled")
        .root(dir.path())
        .db_path("db")
        .save_db_config(true)
        .prefix("!")
        .token("secret-token")
        .owner("100")
        .owner("200")
        .build();
    let manager = StoreManager::open(config).await.unwrap();
    let provider = manager.provider();

    assert_eq!(
        provider.read("global.prefix").await.unwrap(),
        Some(Value::from("!"))
    );
    assert_eq!(
        provider.read("global.token").await.unwrap(),
        Some(Value::from("secret-token"))
    );
    assert_eq!(
        provider.read("global.owners").await.unwrap(),
        Some(Value::Array(vec![Value::from("100"), Value::from("200")]))
    );
}

#[tokio::test]
async fn test_bootstrap_picks_up_stored_settings() {
    let dir = TempDir::new().unwrap();
    {
        let config = StoreConfig::builder()
            .provider("sled")
            .root(dir.path())
            .db_path("db")
            .save_db_config(true)
            .prefix("!")
            .token("secret-token")
            .build();
        let manager = StoreManager::open(config).await.unwrap();
        manager.provider().flush().await.unwrap();
    }
    let config = StoreConfig::builder()
        .provider("sled")
        .root(dir.path())
        .db_path("db")
        .use_db_config(true)
        .build();
    let manager = StoreManager::open(config).await.unwrap();

    assert_eq!(manager.prefix(), "!");
    assert_eq!(manager.token().as_deref(), Some("secret-token"));
}

#[tokio::test]
async fn test_bootstrap_uninitialized_db_config_needs_local_fallback() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .provider("sled")
        .root(dir.path())
        .db_path("db")
        .use_db_config(true)
        .build();
    // No saved token or prefix to fall back on
    assert!(StoreManager::open(config).await.is_err());
}

// =============================================================================
// Tenant Initialization
// =============================================================================

#[tokio::test]
async fn test_init_guild_db_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();

    assert!(manager.init_guild_db("G1").await.unwrap());
    assert!(!manager.init_guild_db("G1").await.unwrap());

    let provider = manager.provider();
    assert_eq!(
        provider.read("guilds.G1.version").await.unwrap(),
        Some(Value::Int(SCHEMA_VERSION))
    );
    assert_eq!(
        provider.read("guilds.G1.prefix").await.unwrap(),
        Some(Value::from(""))
    );
    assert_eq!(
        provider.read("guilds.G1.moduleData").await.unwrap(),
        Some(object! {})
    );
    assert!(provider.has("guilds.G1.initTS").await.unwrap());
}

#[tokio::test]
async fn test_init_guild_db_keeps_existing_record() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();

    manager.init_guild_db("G1").await.unwrap();
    manager
        .provider()
        .store("guilds.G1.prefix", &Value::from("?"))
        .await
        .unwrap();

    assert!(!manager.init_guild_db("G1").await.unwrap());
    assert_eq!(
        manager.provider().read("guilds.G1.prefix").await.unwrap(),
        Some(Value::from("?"))
    );
}

// =============================================================================
// Provider Resolution
// =============================================================================

#[tokio::test]
async fn test_unknown_provider_falls_back_to_memory() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::builder()
        .provider("bogus")
        .root(dir.path())
        .build();
    let manager = StoreManager::open(config).await.unwrap();

    assert!(manager.provider().is_volatile());
    let ctx = Context::new();
    manager
        .store("global.x", &Value::Int(1), &ctx)
        .await
        .unwrap();
    assert_eq!(
        manager.read("global.x", &ctx).await.unwrap(),
        Some(Value::Int(1))
    );
}

#[tokio::test]
async fn test_provider_name_conventions_resolve() {
    let config = StoreConfig::builder().provider("object").build();
    let manager = StoreManager::open(config).await.unwrap();
    assert_eq!(manager.provider().name(), "memory");
}

// =============================================================================
// Context Operations and Scoped Facade
// =============================================================================

#[tokio::test]
async fn test_scoped_store_lands_in_module_namespace() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let scoped = manager.scoped(full_ctx());

    scoped
        .store("guild.module.points", &Value::Int(42))
        .await
        .unwrap();
    assert_eq!(
        manager
            .provider()
            .read("guilds.G1.moduleData.economy.points")
            .await
            .unwrap(),
        Some(Value::Int(42))
    );
    assert_eq!(
        scoped.read("guild.module.points").await.unwrap(),
        Some(Value::Int(42))
    );
    assert!(scoped.has("guild.module.points").await.unwrap());
    assert!(scoped.remove("guild.module.points").await.unwrap());
    assert!(!scoped.has("guild.module.points").await.unwrap());
}

#[tokio::test]
async fn test_scoped_without_context_is_unresolvable() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let scoped = manager.scoped(Context::new());

    let err = scoped.store("guild.x", &Value::Int(1)).await.unwrap_err();
    assert!(matches!(err, pathstore::StoreError::UnresolvablePath(_)));
}

#[tokio::test]
async fn test_manager_prefetch_keys_by_logical_path() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let scoped = manager.scoped(full_ctx());

    scoped
        .store("guild.module.score", &Value::Int(9))
        .await
        .unwrap();
    let paths = vec![
        "guild.module.score".to_string(),
        "guild.module.missing".to_string(),
    ];
    let data = scoped.prefetch(&paths).await.unwrap();

    assert_eq!(
        data.get("guild.module.score").cloned().flatten(),
        Some(Value::Int(9))
    );
    assert_eq!(data.get("guild.module.missing").cloned().flatten(), None);
}

#[tokio::test]
async fn test_manager_prefetch_rejects_unresolvable_paths() {
    let dir = TempDir::new().unwrap();
    let manager = StoreManager::open(sled_config(&dir)).await.unwrap();
    let scoped = manager.scoped(Context::new().with_guild("G1"));

    let paths = vec!["guild.ok".to_string(), "guild.user.bad".to_string()];
    let err = scoped.prefetch(&paths).await.unwrap_err();
    assert!(matches!(err, pathstore::StoreError::UnresolvablePath(_)));
}
