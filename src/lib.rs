//! # pathstore
//!
//! A hierarchical, path-addressed document store over ordered key-value
//! backends, with:
//! - JSON-like values at dotted logical paths
//! - Atomic subtree replace and delete via backend batches
//! - Context translation for multi-tenant (guild/user/module) data
//! - A volatile in-memory fallback when no durable backend comes up
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Callers                               │
//! │              (modules, bound to a context)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                    StoreManager                              │
//! │        (path translation, bootstrap, migration)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ SledProvider│          │MemoryProvider│
//!   │   (codec)   │          │  (fallback)  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │    sled     │
//!   │ (ordered KV)│
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod path;
pub mod value;
pub mod codec;
pub mod provider;
pub mod manager;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StoreError};
pub use config::{BackendConfig, StoreConfig};
pub use value::Value;
pub use provider::{MemoryProvider, Provider, SledProvider, SyncAdapter, SyncProvider};
pub use manager::{translate_path, Context, ScopedStore, StoreManager, SCHEMA_VERSION};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pathstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
