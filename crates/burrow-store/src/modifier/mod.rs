//! Write-staging strategies.
//!
//! Every modifier applies a mutation to the in-memory folder immediately. They
//! differ only in when the backend hears about it:
//!
//! - [`ManualModifier`] -- staged per folder until `save` / `save_all`
//! - [`AutoModifier`] -- forwarded at once; bulk calls are batched
//! - [`NoOpModifier`] -- never forwarded

mod auto;
mod manual;
mod noop;

use std::collections::BTreeMap;
use std::fmt;

use burrow_backend::{Backend, BackendKind, BackendResult};
use burrow_types::{FolderPath, Payload};
use tracing::error;

use crate::folder::Folder;

pub use auto::AutoModifier;
pub use manual::ManualModifier;
pub use noop::NoOpModifier;

/// Which staging strategy is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModifierKind {
    Manual,
    Auto,
    NoOp,
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
            Self::NoOp => write!(f, "no-op"),
        }
    }
}

/// Strategy deciding when in-memory mutations reach the backend.
///
/// Callers guarantee that a folder's items are loaded before item mutations
/// and that its listing is loaded before folder mutations.
pub trait Modifier {
    fn kind(&self) -> ModifierKind;

    fn add_item(&mut self, folder: &Folder, name: &str, payload: Payload, backend: &mut dyn Backend);

    /// Returns the removed payload, or `None` if no such item existed.
    fn remove_item(&mut self, folder: &Folder, name: &str, backend: &mut dyn Backend) -> Option<Payload>;

    /// Returns the number of items removed.
    fn clear_items(&mut self, folder: &Folder, backend: &mut dyn Backend) -> usize;

    fn add_folder(&mut self, parent: &Folder, child: &Folder, backend: &mut dyn Backend);

    /// Returns the detached child, or `None` if no such subfolder existed.
    fn remove_folder(&mut self, parent: &Folder, name: &str, backend: &mut dyn Backend) -> Option<Folder>;

    /// Returns every detached child.
    fn clear_folders(&mut self, parent: &Folder, backend: &mut dyn Backend) -> Vec<Folder>;

    /// Set the icon, or clear it with `None`.
    fn set_icon(&mut self, folder: &Folder, icon: Option<Payload>, backend: &mut dyn Backend);

    /// Flush staged changes of one folder.
    fn save(&mut self, _folder: &FolderPath, _backend: &mut dyn Backend) {}

    /// Flush staged changes of every folder.
    fn save_all(&mut self, _backend: &mut dyn Backend) {}

    /// Whether `folder` has staged changes.
    fn has_pending(&self, _folder: &FolderPath) -> bool {
        false
    }

    /// Number of folders with staged changes.
    fn pending_count(&self) -> usize {
        0
    }

    /// `Some(true)` if a staged change created `path`, `Some(false)` if a
    /// staged change removed it or an ancestor, `None` if nothing staged says.
    fn staged_presence(&self, _path: &FolderPath) -> Option<bool> {
        None
    }

    /// Apply staged folder additions and removals to a listing freshly
    /// enumerated from the backend.
    fn overlay_listing(&self, _parent: &FolderPath, _listing: &mut BTreeMap<String, Folder>) {}
}

/// Pick the modifier for a backend and write mode.
///
/// A no-op backend always gets the no-op modifier.
pub fn select(backend: BackendKind, auto_write: bool) -> Box<dyn Modifier> {
    match (backend, auto_write) {
        (BackendKind::NoOp, _) => Box::new(NoOpModifier),
        (_, true) => Box::new(AutoModifier),
        (_, false) => Box::new(ManualModifier::new()),
    }
}

/// Log a failed backend write. The in-memory tree has already changed, so the
/// failure cannot be undone, only reported.
pub(crate) fn report(result: BackendResult<()>, op: &str, path: &FolderPath) {
    if let Err(e) = result {
        error!(op, path = %path, error = %e, "backend write failed");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;

    use burrow_backend::{Backend, BackendKind, BackendResult};
    use burrow_types::{FolderPath, Payload};

    use crate::folder::Folder;

    /// One recorded backend call.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Call {
        SaveItem(String, String),
        SaveFolder(String),
        SaveIcon(String, bool),
        DeleteItem(String, String),
        DeleteFolder(String),
        Begin,
        End,
    }

    /// Backend that records calls and stores nothing.
    #[derive(Debug, Default)]
    pub struct RecordingBackend {
        pub calls: Vec<Call>,
    }

    impl RecordingBackend {
        pub fn batches(&self) -> usize {
            self.calls.iter().filter(|c| **c == Call::Begin).count()
        }

        pub fn writes(&self) -> Vec<Call> {
            self.calls
                .iter()
                .filter(|c| !matches!(c, Call::Begin | Call::End))
                .cloned()
                .collect()
        }
    }

    impl Backend for RecordingBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::SingleDocument
        }
        fn load_items(&self, _: &FolderPath) -> BackendResult<BTreeMap<String, Payload>> {
            Ok(BTreeMap::new())
        }
        fn load_subfolders(&self, _: &FolderPath) -> BackendResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn folder_exists(&self, _: &FolderPath) -> BackendResult<bool> {
            Ok(false)
        }
        fn load_icon(&self, _: &FolderPath) -> BackendResult<Option<Payload>> {
            Ok(None)
        }
        fn save_item(&mut self, folder: &FolderPath, name: &str, _: &Payload) -> BackendResult<()> {
            self.calls.push(Call::SaveItem(folder.to_string(), name.to_string()));
            Ok(())
        }
        fn save_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
            self.calls.push(Call::SaveFolder(folder.to_string()));
            Ok(())
        }
        fn save_icon(&mut self, folder: &FolderPath, icon: Option<&Payload>) -> BackendResult<()> {
            self.calls.push(Call::SaveIcon(folder.to_string(), icon.is_some()));
            Ok(())
        }
        fn delete_item(&mut self, folder: &FolderPath, name: &str) -> BackendResult<()> {
            self.calls.push(Call::DeleteItem(folder.to_string(), name.to_string()));
            Ok(())
        }
        fn delete_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
            self.calls.push(Call::DeleteFolder(folder.to_string()));
            Ok(())
        }
        fn begin_batch(&mut self) {
            self.calls.push(Call::Begin);
        }
        fn end_batch(&mut self) -> BackendResult<()> {
            self.calls.push(Call::End);
            Ok(())
        }
        fn flush(&mut self) -> BackendResult<()> {
            Ok(())
        }
    }

    /// A loaded, empty folder at `raw`.
    pub fn loaded(raw: &str) -> Folder {
        let folder = Folder::new(FolderPath::normalize(raw).unwrap());
        folder.init_empty();
        folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_rule() {
        assert_eq!(select(BackendKind::NoOp, true).kind(), ModifierKind::NoOp);
        assert_eq!(select(BackendKind::NoOp, false).kind(), ModifierKind::NoOp);
        assert_eq!(select(BackendKind::MultiFile, true).kind(), ModifierKind::Auto);
        assert_eq!(select(BackendKind::SingleDocument, false).kind(), ModifierKind::Manual);
    }
}
