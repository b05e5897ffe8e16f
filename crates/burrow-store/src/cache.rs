//! Bounded folder cache.
//!
//! The cache pins the most recently used folders in an LRU. When a folder
//! falls out of the LRU its subfolder listing is dropped, which releases the
//! children it was holding; the next enumeration rebuilds the listing from the
//! backend. Items stay with the node for as long as anyone holds a handle.
//!
//! Alongside the LRU the cache keeps a weak registry of every live node, so a
//! path that is still referenced somewhere (by a caller, a parent listing or a
//! staged change) always resolves to that same node instead of a fresh copy.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::rc::Weak;

use burrow_backend::Backend;
use burrow_types::FolderPath;
use lru::LruCache;
use tracing::{debug, warn};

use crate::folder::{Folder, FolderNode};
use crate::modifier::Modifier;

/// Minimum registry size before dead entries are swept.
const PRUNE_FLOOR: usize = 64;

/// Counters describing cache behaviour since the store was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a pinned folder or a loaded listing.
    pub hits: u64,
    /// Lookups that had to consult the backend or the live registry.
    pub misses: u64,
    /// Folders pushed out of the LRU.
    pub evictions: u64,
    /// Misses resolved to a node that was still alive outside the LRU.
    pub repins: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, or 0.0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU of folder handles plus the registry of live nodes.
pub struct FolderCache {
    root: Folder,
    pins: LruCache<FolderPath, Folder>,
    live: HashMap<FolderPath, Weak<FolderNode>>,
    /// Registry size that triggers the next sweep of dead entries.
    sweep_at: usize,
    retain_listings: bool,
    stats: CacheStats,
}

impl FolderCache {
    /// Cache rooted at `root`, pinning at most `capacity` folders.
    ///
    /// With `retain_listings`, eviction never drops a listing. Used when the
    /// backend cannot rebuild what was dropped.
    pub fn new(root: Folder, capacity: usize, retain_listings: bool) -> Self {
        let mut live = HashMap::new();
        live.insert(root.path().clone(), root.downgrade());
        let pins = LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN));
        Self {
            root,
            sweep_at: PRUNE_FLOOR.max(pins.cap().get() * 4),
            pins,
            live,
            retain_listings,
            stats: CacheStats::default(),
        }
    }

    pub fn root(&self) -> &Folder {
        &self.root
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of pinned folders.
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pins.cap().get()
    }

    pub fn is_pinned(&self, path: &FolderPath) -> bool {
        self.pins.contains(path)
    }

    /// Resolve `path` to a folder handle, loading it if needed.
    ///
    /// Returns `None` if the folder does not exist, either in the backend or
    /// after staged changes are taken into account.
    pub fn get_or_load(
        &mut self,
        path: &FolderPath,
        backend: &dyn Backend,
        modifier: &dyn Modifier,
    ) -> Option<Folder> {
        if path == self.root.path() {
            return Some(self.root.clone());
        }
        if !path.is_within(self.root.path()) {
            return None;
        }
        if let Some(folder) = self.pins.get(path) {
            self.stats.hits += 1;
            return Some(folder.clone());
        }
        self.stats.misses += 1;

        let staged = modifier.staged_presence(path);
        if staged == Some(false) {
            return None;
        }

        // A loaded parent listing is authoritative.
        if let Some(parent) = path.parent().and_then(|p| self.lookup_live(&p)) {
            if let Some(listed) = parent.listed_child(path.name()) {
                let folder = listed?;
                self.pin(&folder);
                return Some(folder);
            }
        }

        if let Some(folder) = self.upgrade_live(path) {
            self.stats.repins += 1;
            self.pin(&folder);
            return Some(folder);
        }

        if staged.is_none() {
            let exists = backend.folder_exists(path).unwrap_or_else(|e| {
                warn!(path = %path, error = %e, "existence check failed; treating as absent");
                false
            });
            if !exists {
                return None;
            }
        }

        let folder = self.intern(path);
        self.pin(&folder);
        Some(folder)
    }

    /// The subfolders of `folder`, enumerating the backend if the listing is
    /// not loaded.
    pub fn get_or_load_children(
        &mut self,
        folder: &Folder,
        backend: &dyn Backend,
        modifier: &dyn Modifier,
    ) -> BTreeMap<String, Folder> {
        if let Some(listing) = folder.listing() {
            self.stats.hits += 1;
            self.touch(folder);
            return listing;
        }
        self.stats.misses += 1;
        if folder.is_detached() {
            return BTreeMap::new();
        }

        let names = backend.load_subfolders(folder.path()).unwrap_or_else(|e| {
            warn!(path = %folder.path(), error = %e, "failed to enumerate subfolders");
            Vec::new()
        });
        let mut listing = BTreeMap::new();
        for name in names {
            match folder.path().child(&name) {
                Ok(path) => {
                    listing.insert(name, self.intern(&path));
                }
                Err(e) => warn!(path = %folder.path(), error = %e, "skipping invalid subfolder"),
            }
        }
        modifier.overlay_listing(folder.path(), &mut listing);

        folder.set_listing(listing.clone());
        self.pin(folder);
        listing
    }

    /// The live node for `path`, or a new unloaded one registered under it.
    pub(crate) fn intern(&mut self, path: &FolderPath) -> Folder {
        if let Some(folder) = self.upgrade_live(path) {
            return folder;
        }
        let folder = Folder::new(path.clone());
        self.live.insert(path.clone(), folder.downgrade());
        if self.live.len() > self.sweep_at {
            self.live.retain(|_, weak| weak.strong_count() > 0);
            // Survivors are reachable; wait until the registry doubles again.
            self.sweep_at = PRUNE_FLOOR
                .max(self.capacity() * 4)
                .max(self.live.len() * 2);
        }
        folder
    }

    /// Mark `folder` as most recently used, evicting the oldest pin if full.
    pub(crate) fn pin(&mut self, folder: &Folder) {
        if folder.is_root() || folder.is_detached() {
            return;
        }
        let Some((evicted_path, evicted)) = self.pins.push(folder.path().clone(), folder.clone())
        else {
            return;
        };
        if evicted_path == *folder.path() {
            return;
        }
        if !self.retain_listings {
            evicted.forget_listing();
        }
        self.stats.evictions += 1;
        debug!(evicted = %evicted_path, "folder evicted from cache");
    }

    /// Detach and forget every folder at or below `path`.
    pub(crate) fn invalidate_subtree(&mut self, path: &FolderPath) {
        let doomed: Vec<FolderPath> = self
            .pins
            .iter()
            .filter(|(p, _)| p.is_within(path))
            .map(|(p, _)| p.clone())
            .collect();
        for p in &doomed {
            self.pins.pop(p);
        }
        self.live.retain(|p, weak| {
            if !p.is_within(path) {
                return true;
            }
            if let Some(folder) = Folder::upgrade(weak) {
                folder.detach();
            }
            false
        });
        debug!(path = %path, "subtree invalidated");
    }

    fn touch(&mut self, folder: &Folder) {
        if self.pins.get(folder.path()).is_none() {
            self.pin(folder);
        }
    }

    fn upgrade_live(&self, path: &FolderPath) -> Option<Folder> {
        self.live
            .get(path)
            .and_then(Folder::upgrade)
            .filter(|folder| !folder.is_detached())
    }

    fn lookup_live(&self, path: &FolderPath) -> Option<Folder> {
        if path == self.root.path() {
            return Some(self.root.clone());
        }
        self.pins
            .peek(path)
            .cloned()
            .or_else(|| self.upgrade_live(path))
    }
}

impl std::fmt::Debug for FolderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderCache")
            .field("root", self.root.path())
            .field("pinned", &self.pins.len())
            .field("capacity", &self.capacity())
            .field("live", &self.live.len())
            .field("stats", &self.stats)
            .finish()
    }
}
