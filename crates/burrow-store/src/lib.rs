//! Hierarchical cached object store.
//!
//! A [`Store`] holds a tree of named folders. Each folder carries named
//! items (opaque [`Payload`]s), an optional icon and subfolders. Everything
//! is loaded lazily from a persistence backend and kept in a bounded
//! [`FolderCache`].
//!
//! # Write Staging
//!
//! Mutations always apply to memory at once. The active [`Modifier`] decides
//! when the backend hears about them:
//!
//! - [`ManualModifier`] -- staged per folder until `save` / `save_all`
//! - [`AutoModifier`] -- written through immediately
//! - [`NoOpModifier`] -- memory only, forced for the no-op backend
//!
//! # Design Rules
//!
//! 1. At most one live [`Folder`] node exists per path in a store.
//! 2. Cache eviction drops listings, never a handle a caller holds.
//! 3. Every path-taking operation on a missing folder returns
//!    [`StoreError::NotFound`].
//! 4. Removing a folder detaches every handle at or below it.
//!
//! [`Payload`]: burrow_types::Payload

pub mod cache;
pub mod config;
pub mod error;
pub mod folder;
pub mod modifier;
pub mod store;

pub use cache::{CacheStats, FolderCache};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use folder::Folder;
pub use modifier::{AutoModifier, ManualModifier, Modifier, ModifierKind, NoOpModifier};
pub use store::Store;

pub use burrow_backend::{BackendKind, InlineExecutor, LaneExecutor, WriteExecutor};
pub use burrow_types::{FolderPath, Payload};
