//! The store façade.
//!
//! [`Store`] wires a persistence backend, a write-staging modifier and the
//! folder cache together. Every operation takes a caller-supplied path string,
//! normalizes it, resolves it through the cache and then delegates the
//! mutation to the active modifier.

use std::collections::BTreeMap;
use std::sync::Arc;

use burrow_backend::{
    Backend, BackendKind, InlineExecutor, LaneExecutor, MultiFileBackend, NoOpBackend,
    SingleDocumentBackend, WriteExecutor,
};
use burrow_types::{validate_name, FolderPath, PathError, Payload};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStats, FolderCache};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::folder::Folder;
use crate::modifier::{self, Modifier, ModifierKind};

type IconFn = Box<dyn Fn(&Folder) -> Payload>;

fn default_icon(folder: &Folder) -> Payload {
    Payload::from(format!("icon:{}", folder.name()))
}

/// A hierarchical store of folders and items.
///
/// # Example
///
/// ```no_run
/// use burrow_store::{Store, StoreConfig};
///
/// let mut store = Store::open(StoreConfig::new("data/skins").with_root_name("lib"))?;
/// store.add_folder("lib", "skins")?;
/// store.add_item("lib/skins", "gold", "payload")?;
/// store.save_all();
/// # Ok::<(), burrow_store::StoreError>(())
/// ```
pub struct Store {
    config: StoreConfig,
    backend: Box<dyn Backend>,
    modifier: Box<dyn Modifier>,
    cache: FolderCache,
    default_icon: IconFn,
}

impl Store {
    /// Open a store as described by `config`.
    ///
    /// File backends get a [`LaneExecutor`] with `config.write_lanes` lanes.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let executor: Arc<dyn WriteExecutor> = match config.backend {
            BackendKind::NoOp => Arc::new(InlineExecutor::new()),
            _ => Arc::new(LaneExecutor::new(config.write_lanes)?),
        };
        Self::open_with_executor(config, executor)
    }

    /// Open a store whose physical writes run on `executor`.
    pub fn open_with_executor(
        config: StoreConfig,
        executor: Arc<dyn WriteExecutor>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::SingleDocument => Box::new(SingleDocumentBackend::open(
                &config.base_path,
                &config.document_extension,
                executor,
            )?),
            BackendKind::MultiFile => Box::new(MultiFileBackend::open(
                &config.base_path,
                &config.icon_key,
                &config.item_extension,
                executor,
            )?),
            BackendKind::NoOp => Box::new(NoOpBackend::new()),
        };
        Self::with_backend(config, backend)
    }

    /// Build a store around an already constructed backend.
    ///
    /// `config.backend` is overwritten with the backend's own kind.
    pub fn with_backend(mut config: StoreConfig, backend: Box<dyn Backend>) -> StoreResult<Self> {
        config.validate()?;
        config.backend = backend.kind();

        let root = Folder::new(FolderPath::root(&config.root_name)?);
        let memory_only = config.backend == BackendKind::NoOp;
        let cache = FolderCache::new(root, config.cache_capacity, memory_only);
        let modifier = modifier::select(config.backend, config.auto_write);

        info!(
            root = %config.root_name,
            backend = %config.backend,
            modifier = %modifier.kind(),
            capacity = config.cache_capacity,
            "store opened"
        );
        Ok(Self {
            config,
            backend,
            modifier,
            cache,
            default_icon: Box::new(default_icon),
        })
    }

    // ---- queries ----

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The root folder. Never evicted.
    pub fn root(&self) -> Folder {
        self.cache.root().clone()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn modifier_kind(&self) -> ModifierKind {
        self.modifier.kind()
    }

    pub fn auto_write(&self) -> bool {
        self.config.auto_write
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Look up a folder, returning `None` if it does not exist.
    pub fn get_folder(&mut self, path: &str) -> StoreResult<Option<Folder>> {
        let path = FolderPath::normalize(path)?;
        Ok(self.lookup(&path))
    }

    /// Subfolders of the folder at `path`, in name order.
    pub fn subfolders(&mut self, path: &str) -> StoreResult<Vec<Folder>> {
        let folder = self.resolve(path)?;
        Ok(self.listing(&folder).into_values().collect())
    }

    /// Every item of the folder at `path`.
    pub fn items(&mut self, path: &str) -> StoreResult<BTreeMap<String, Payload>> {
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        Ok(folder.items())
    }

    pub fn get_item(&mut self, path: &str, name: &str) -> StoreResult<Option<Payload>> {
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        Ok(folder.loaded_item(name))
    }

    pub fn has_item(&mut self, path: &str, name: &str) -> StoreResult<bool> {
        Ok(self.get_item(path, name)?.is_some())
    }

    /// Name of the first item, in name order, whose payload equals `payload`.
    pub fn item_name_of(&mut self, path: &str, payload: &Payload) -> StoreResult<Option<String>> {
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        Ok(folder
            .items()
            .into_iter()
            .find(|(_, value)| value == payload)
            .map(|(name, _)| name))
    }

    /// The folder's icon, or the generated default if none is set.
    pub fn get_folder_icon(&mut self, path: &str) -> StoreResult<Payload> {
        let folder = self.resolve(path)?;
        if !folder.is_icon_loaded() {
            let icon = self.backend.load_icon(folder.path()).unwrap_or_else(|e| {
                warn!(path = %folder.path(), error = %e, "failed to load icon");
                None
            });
            folder.set_icon(icon);
        }
        Ok(folder
            .icon()
            .flatten()
            .unwrap_or_else(|| (self.default_icon)(&folder)))
    }

    /// Whether the folder at `path` has staged changes not yet saved.
    pub fn has_pending_changes(&self, path: &str) -> StoreResult<bool> {
        let path = FolderPath::normalize(path)?;
        Ok(self.modifier.has_pending(&path))
    }

    // ---- items ----

    /// Add or replace an item.
    pub fn add_item(&mut self, path: &str, name: &str, payload: impl Into<Payload>) -> StoreResult<()> {
        validate_name(name)?;
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        self.modifier
            .add_item(&folder, name, payload.into(), self.backend.as_mut());
        Ok(())
    }

    /// Remove an item, returning its payload if it existed.
    pub fn remove_item(&mut self, path: &str, name: &str) -> StoreResult<Option<Payload>> {
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        Ok(self.modifier.remove_item(&folder, name, self.backend.as_mut()))
    }

    /// Remove every item, returning how many were removed.
    pub fn clear_items(&mut self, path: &str) -> StoreResult<usize> {
        let folder = self.resolve(path)?;
        self.ensure_items(&folder);
        Ok(self.modifier.clear_items(&folder, self.backend.as_mut()))
    }

    // ---- folders ----

    /// Create the subfolder `name` under `path`.
    ///
    /// If it already exists the existing handle is returned unchanged.
    pub fn add_folder(&mut self, path: &str, name: &str) -> StoreResult<Folder> {
        validate_name(name)?;
        self.backend
            .validate_folder_name(name)
            .map_err(|e| PathError::InvalidName {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        let parent = self.resolve(path)?;
        if let Some(existing) = self.listing(&parent).get(name) {
            return Ok(existing.clone());
        }

        let child_path = parent.path().child(name)?;
        let child = self.cache.intern(&child_path);
        child.init_empty();
        self.modifier
            .add_folder(&parent, &child, self.backend.as_mut());
        self.cache.pin(&child);
        debug!(path = %child_path, "folder added");
        Ok(child)
    }

    /// Remove the subfolder `name` and everything below it.
    ///
    /// Returns `false` if there was no such subfolder.
    pub fn remove_folder(&mut self, path: &str, name: &str) -> StoreResult<bool> {
        let parent = self.resolve(path)?;
        self.listing(&parent);
        let Some(child) = self
            .modifier
            .remove_folder(&parent, name, self.backend.as_mut())
        else {
            return Ok(false);
        };
        self.cache.invalidate_subtree(child.path());
        debug!(path = %child.path(), "folder removed");
        Ok(true)
    }

    /// Remove every subfolder, returning how many were removed.
    pub fn clear_folders(&mut self, path: &str) -> StoreResult<usize> {
        let parent = self.resolve(path)?;
        self.listing(&parent);
        let removed = self
            .modifier
            .clear_folders(&parent, self.backend.as_mut());
        for child in &removed {
            self.cache.invalidate_subtree(child.path());
        }
        Ok(removed.len())
    }

    // ---- icons ----

    pub fn set_folder_icon(&mut self, path: &str, icon: impl Into<Payload>) -> StoreResult<()> {
        let folder = self.resolve(path)?;
        self.modifier
            .set_icon(&folder, Some(icon.into()), self.backend.as_mut());
        Ok(())
    }

    /// Remove the folder's icon so the default applies again.
    pub fn clear_folder_icon(&mut self, path: &str) -> StoreResult<()> {
        let folder = self.resolve(path)?;
        self.modifier.set_icon(&folder, None, self.backend.as_mut());
        Ok(())
    }

    /// Replace the generator used when a folder has no icon.
    pub fn set_default_icon(&mut self, icon: impl Fn(&Folder) -> Payload + 'static) {
        self.default_icon = Box::new(icon);
    }

    // ---- persistence ----

    /// Flush the staged changes of one folder. A no-op unless staging manually.
    pub fn save(&mut self, path: &str) -> StoreResult<()> {
        let folder = self.resolve(path)?;
        self.modifier.save(folder.path(), self.backend.as_mut());
        Ok(())
    }

    /// Flush every folder's staged changes. A no-op unless staging manually.
    pub fn save_all(&mut self) {
        self.modifier.save_all(self.backend.as_mut());
    }

    /// Block until every queued background write has reached storage.
    pub fn flush(&mut self) -> StoreResult<()> {
        self.backend.flush()?;
        Ok(())
    }

    /// Switch between write-through and manual staging.
    ///
    /// Changes staged under manual mode are not flushed by the switch; call
    /// [`save_all`](Self::save_all) first to keep them.
    pub fn set_auto_write(&mut self, auto_write: bool) {
        self.config.auto_write = auto_write;
        let next = modifier::select(self.backend.kind(), auto_write);
        if next.kind() == self.modifier.kind() {
            return;
        }
        let pending = self.modifier.pending_count();
        if pending > 0 {
            warn!(
                pending,
                from = %self.modifier.kind(),
                to = %next.kind(),
                "write mode switched with unsaved changes; they will not be written"
            );
        }
        info!(modifier = %next.kind(), "write mode changed");
        self.modifier = next;
    }

    // ---- internals ----

    fn lookup(&mut self, path: &FolderPath) -> Option<Folder> {
        self.cache
            .get_or_load(path, self.backend.as_ref(), self.modifier.as_ref())
    }

    fn resolve(&mut self, raw: &str) -> StoreResult<Folder> {
        let path = FolderPath::normalize(raw)?;
        self.lookup(&path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn listing(&mut self, folder: &Folder) -> BTreeMap<String, Folder> {
        self.cache
            .get_or_load_children(folder, self.backend.as_ref(), self.modifier.as_ref())
    }

    fn ensure_items(&self, folder: &Folder) {
        if folder.is_items_loaded() {
            return;
        }
        let items = self.backend.load_items(folder.path()).unwrap_or_else(|e| {
            warn!(path = %folder.path(), error = %e, "failed to load items");
            BTreeMap::new()
        });
        folder.set_items(items);
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let pending = self.modifier.pending_count();
        if pending > 0 {
            warn!(pending, "store closed with unsaved changes");
        }
        if let Err(e) = self.backend.flush() {
            error!(error = %e, "failed to flush writes on close");
        }
        info!(root = %self.config.root_name, "store closed");
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("config", &self.config)
            .field("modifier", &self.modifier.kind())
            .field("cache", &self.cache)
            .finish()
    }
}
