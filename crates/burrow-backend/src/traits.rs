//! The [`Backend`] trait defining the persistence interface.

use std::collections::BTreeMap;
use std::fmt;

use burrow_types::{FolderPath, Payload};
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

/// Which persistence layout a backend uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The whole tree in one document file.
    #[default]
    SingleDocument,
    /// One directory per folder, one file per item.
    MultiFile,
    /// Nothing is persisted.
    NoOp,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleDocument => write!(f, "single-document"),
            Self::MultiFile => write!(f, "multi-file"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// Persistence strategy for a folder tree.
///
/// All implementations must satisfy these invariants:
/// - Loads never invent entries. A folder with nothing stored loads as an
///   empty map, `None`, or `false`.
/// - Loads return what the in-memory tree last told the backend, even when
///   the physical write of that change is still queued.
/// - `save_*` and `delete_*` outside a batch take effect immediately or are
///   scheduled immediately.
/// - Between `begin_batch` and the matching `end_batch`, physical writes may
///   be held back and committed together. Batches nest; only the outermost
///   `end_batch` commits.
/// - Deleting something that does not exist is not an error.
pub trait Backend {
    /// The layout this backend implements.
    fn kind(&self) -> BackendKind;

    /// Refuse folder names the layout cannot represent.
    ///
    /// Called before any in-memory mutation, so a refusal leaves the tree
    /// untouched.
    fn validate_folder_name(&self, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    /// Persisted items of a folder, keyed by item name.
    fn load_items(&self, folder: &FolderPath) -> BackendResult<BTreeMap<String, Payload>>;

    /// Names of the persisted child folders of a folder, in stored order.
    fn load_subfolders(&self, folder: &FolderPath) -> BackendResult<Vec<String>>;

    /// Whether a folder exists at `folder`, without enumerating its parent.
    fn folder_exists(&self, folder: &FolderPath) -> BackendResult<bool>;

    /// The persisted icon of a folder, if any.
    fn load_icon(&self, folder: &FolderPath) -> BackendResult<Option<Payload>>;

    /// Create or replace an item.
    fn save_item(&mut self, folder: &FolderPath, name: &str, payload: &Payload) -> BackendResult<()>;

    /// Create a folder (and any missing ancestors).
    fn save_folder(&mut self, folder: &FolderPath) -> BackendResult<()>;

    /// Set a folder's icon, or clear it with `None`.
    fn save_icon(&mut self, folder: &FolderPath, icon: Option<&Payload>) -> BackendResult<()>;

    /// Delete an item.
    fn delete_item(&mut self, folder: &FolderPath, name: &str) -> BackendResult<()>;

    /// Delete a folder together with everything beneath it.
    fn delete_folder(&mut self, folder: &FolderPath) -> BackendResult<()>;

    /// Open a batch.
    fn begin_batch(&mut self);

    /// Close a batch, committing it if this was the outermost one.
    fn end_batch(&mut self) -> BackendResult<()>;

    /// Block until every queued physical write has completed.
    fn flush(&mut self) -> BackendResult<()>;
}
