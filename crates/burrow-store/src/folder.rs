//! Folder handles.
//!
//! A [`Folder`] is a cheap, reference-counted handle to one node of the tree.
//! Each piece of a node's state is loaded lazily and remembers whether it has
//! been loaded: `None` means "not loaded yet", which is different from a
//! loaded empty map.
//!
//! Handles are read-only to callers. All mutation goes through the store's
//! active modifier.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use burrow_types::{FolderPath, Payload};

pub(crate) struct FolderNode {
    path: FolderPath,
    icon: RefCell<Option<Option<Payload>>>,
    items: RefCell<Option<BTreeMap<String, Payload>>>,
    listing: RefCell<Option<BTreeMap<String, Folder>>>,
    detached: Cell<bool>,
}

/// Handle to a folder in a [`Store`](crate::Store).
///
/// Clones share the same node. Within one store, at most one live node exists
/// per path, so two handles for the same path always observe the same items.
#[derive(Clone)]
pub struct Folder(Rc<FolderNode>);

impl Folder {
    pub(crate) fn new(path: FolderPath) -> Self {
        Self(Rc::new(FolderNode {
            path,
            icon: RefCell::new(None),
            items: RefCell::new(None),
            listing: RefCell::new(None),
            detached: Cell::new(false),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<FolderNode> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<FolderNode>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// The folder's own name.
    pub fn name(&self) -> &str {
        self.0.path.name()
    }

    /// Full path from the store root.
    pub fn path(&self) -> &FolderPath {
        &self.0.path
    }

    pub fn is_root(&self) -> bool {
        self.0.path.is_root()
    }

    /// Returns `true` once the folder has been removed from the tree.
    pub fn is_detached(&self) -> bool {
        self.0.detached.get()
    }

    pub fn is_items_loaded(&self) -> bool {
        self.0.items.borrow().is_some()
    }

    pub fn is_listing_loaded(&self) -> bool {
        self.0.listing.borrow().is_some()
    }

    pub fn is_icon_loaded(&self) -> bool {
        self.0.icon.borrow().is_some()
    }

    /// The items, if they have been loaded.
    pub fn loaded_items(&self) -> Option<BTreeMap<String, Payload>> {
        self.0.items.borrow().clone()
    }

    /// One item, if items have been loaded and it is present.
    pub fn loaded_item(&self, name: &str) -> Option<Payload> {
        self.0.items.borrow().as_ref()?.get(name).cloned()
    }

    /// Names of the subfolders, if the listing is currently loaded.
    pub fn loaded_subfolder_names(&self) -> Option<Vec<String>> {
        self.0
            .listing
            .borrow()
            .as_ref()
            .map(|listing| listing.keys().cloned().collect())
    }

    /// Returns `true` if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Folder) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ---- items ----

    pub(crate) fn set_items(&self, items: BTreeMap<String, Payload>) {
        *self.0.items.borrow_mut() = Some(items);
    }

    pub(crate) fn items(&self) -> BTreeMap<String, Payload> {
        self.0.items.borrow().clone().unwrap_or_default()
    }

    /// Callers load items before mutating them.
    pub(crate) fn insert_item(&self, name: &str, payload: Payload) -> Option<Payload> {
        self.0
            .items
            .borrow_mut()
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), payload)
    }

    pub(crate) fn remove_item(&self, name: &str) -> Option<Payload> {
        self.0.items.borrow_mut().as_mut()?.remove(name)
    }

    pub(crate) fn take_items(&self) -> BTreeMap<String, Payload> {
        self.0
            .items
            .borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    // ---- subfolder listing ----

    pub(crate) fn set_listing(&self, listing: BTreeMap<String, Folder>) {
        *self.0.listing.borrow_mut() = Some(listing);
    }

    pub(crate) fn listing(&self) -> Option<BTreeMap<String, Folder>> {
        self.0.listing.borrow().clone()
    }

    /// `None` if the listing is not loaded, otherwise whether `name` is in it.
    pub(crate) fn listed_child(&self, name: &str) -> Option<Option<Folder>> {
        self.0
            .listing
            .borrow()
            .as_ref()
            .map(|listing| listing.get(name).cloned())
    }

    pub(crate) fn forget_listing(&self) {
        self.0.listing.borrow_mut().take();
    }

    pub(crate) fn insert_child(&self, child: Folder) {
        self.0
            .listing
            .borrow_mut()
            .get_or_insert_with(BTreeMap::new)
            .insert(child.name().to_string(), child);
    }

    pub(crate) fn remove_child(&self, name: &str) -> Option<Folder> {
        self.0.listing.borrow_mut().as_mut()?.remove(name)
    }

    pub(crate) fn take_children(&self) -> BTreeMap<String, Folder> {
        self.0
            .listing
            .borrow_mut()
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    // ---- icon ----

    pub(crate) fn icon(&self) -> Option<Option<Payload>> {
        self.0.icon.borrow().clone()
    }

    pub(crate) fn set_icon(&self, icon: Option<Payload>) {
        *self.0.icon.borrow_mut() = Some(icon);
    }

    // ---- lifecycle ----

    /// Mark a freshly created folder as fully loaded and empty.
    pub(crate) fn init_empty(&self) {
        self.set_items(BTreeMap::new());
        self.set_listing(BTreeMap::new());
        self.set_icon(None);
    }

    pub(crate) fn detach(&self) {
        self.0.detached.set(true);
        self.forget_listing();
    }
}

impl fmt::Debug for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Folder")
            .field("path", &self.0.path)
            .field("items_loaded", &self.is_items_loaded())
            .field("listing_loaded", &self.is_listing_loaded())
            .field("icon_loaded", &self.is_icon_loaded())
            .field("detached", &self.is_detached())
            .finish()
    }
}
