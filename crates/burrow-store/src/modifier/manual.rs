use std::collections::{BTreeMap, BTreeSet};

use burrow_backend::Backend;
use burrow_types::{FolderPath, Payload};
use tracing::{debug, error};

use super::{report, Modifier, ModifierKind};
use crate::folder::Folder;

/// Changes staged against one folder since its last save.
#[derive(Debug)]
struct StagedDiff {
    /// Held so the node, and the changes applied to it, outlive cache eviction.
    folder: Folder,
    items_added: BTreeMap<String, Payload>,
    items_removed: BTreeSet<String>,
    folders_added: BTreeMap<String, Folder>,
    folders_removed: BTreeMap<String, FolderPath>,
    icon: Option<Option<Payload>>,
}

impl StagedDiff {
    fn new(folder: &Folder) -> Self {
        Self {
            folder: folder.clone(),
            items_added: BTreeMap::new(),
            items_removed: BTreeSet::new(),
            folders_added: BTreeMap::new(),
            folders_removed: BTreeMap::new(),
            icon: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.items_added.is_empty()
            && self.items_removed.is_empty()
            && self.folders_added.is_empty()
            && self.folders_removed.is_empty()
            && self.icon.is_none()
    }

    /// Removals go first so that a folder deleted and re-created in the same
    /// session comes back empty.
    fn flush(self, backend: &mut dyn Backend) {
        let path = self.folder.path();
        for removed in self.folders_removed.values() {
            report(backend.delete_folder(removed), "delete_folder", removed);
        }
        for child in self.folders_added.values() {
            report(backend.save_folder(child.path()), "save_folder", child.path());
        }
        for name in &self.items_removed {
            report(backend.delete_item(path, name), "delete_item", path);
        }
        for (name, payload) in &self.items_added {
            report(backend.save_item(path, name, payload), "save_item", path);
        }
        if let Some(icon) = &self.icon {
            report(backend.save_icon(path, icon.as_ref()), "save_icon", path);
        }
    }
}

/// Stages changes per folder until [`save`](Modifier::save) or
/// [`save_all`](Modifier::save_all).
///
/// Staged state lives in the folder nodes themselves, so reads see it at once.
/// The diffs only record what the backend still has to hear.
#[derive(Debug, Default)]
pub struct ManualModifier {
    diffs: BTreeMap<FolderPath, StagedDiff>,
}

impl ManualModifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn diff(&mut self, folder: &Folder) -> &mut StagedDiff {
        self.diffs
            .entry(folder.path().clone())
            .or_insert_with(|| StagedDiff::new(folder))
    }

    fn stage_folder_removal(&mut self, parent: &Folder, child: &Folder) {
        let diff = self.diff(parent);
        diff.folders_added.remove(child.name());
        diff.folders_removed
            .insert(child.name().to_string(), child.path().clone());
        // Anything staged inside the removed subtree is moot now.
        self.diffs.retain(|path, _| !path.is_within(child.path()));
    }

    /// Whether `path` or one of its ancestors was removed by a staged change,
    /// which makes whatever the backend still holds below it stale.
    fn shadowed(&self, path: &FolderPath) -> bool {
        let mut current = path.clone();
        while let Some(parent) = current.parent() {
            if let Some(diff) = self.diffs.get(&parent) {
                if diff.folders_removed.contains_key(current.name()) {
                    return true;
                }
            }
            current = parent;
        }
        false
    }

    /// Flush the staged removal and creation of `path` and of each of its
    /// ancestors, outermost first, leaving the rest of those diffs staged.
    ///
    /// A folder's own writes must not land in a storage node that a pending
    /// delete of it, or of an ancestor, would later wipe.
    fn flush_structure(&mut self, path: &FolderPath, backend: &mut dyn Backend) {
        let mut chain = Vec::new();
        let mut current = path.clone();
        while let Some(parent) = current.parent() {
            chain.push((parent.clone(), current.name().to_string()));
            current = parent;
        }

        for (parent, name) in chain.into_iter().rev() {
            let Some(diff) = self.diffs.get_mut(&parent) else {
                continue;
            };
            if let Some(removed) = diff.folders_removed.remove(&name) {
                report(backend.delete_folder(&removed), "delete_folder", &removed);
            }
            if let Some(added) = diff.folders_added.remove(&name) {
                report(backend.save_folder(added.path()), "save_folder", added.path());
            }
            if diff.is_empty() {
                self.diffs.remove(&parent);
            }
        }
    }
}

impl Modifier for ManualModifier {
    fn kind(&self) -> ModifierKind {
        ModifierKind::Manual
    }

    fn add_item(&mut self, folder: &Folder, name: &str, payload: Payload, _backend: &mut dyn Backend) {
        folder.insert_item(name, payload.clone());
        let diff = self.diff(folder);
        diff.items_removed.remove(name);
        diff.items_added.insert(name.to_string(), payload);
    }

    fn remove_item(&mut self, folder: &Folder, name: &str, _backend: &mut dyn Backend) -> Option<Payload> {
        let removed = folder.remove_item(name)?;
        let diff = self.diff(folder);
        diff.items_added.remove(name);
        diff.items_removed.insert(name.to_string());
        Some(removed)
    }

    fn clear_items(&mut self, folder: &Folder, _backend: &mut dyn Backend) -> usize {
        let removed = folder.take_items();
        if removed.is_empty() {
            return 0;
        }
        let diff = self.diff(folder);
        for name in removed.keys() {
            diff.items_added.remove(name);
            diff.items_removed.insert(name.clone());
        }
        removed.len()
    }

    fn add_folder(&mut self, parent: &Folder, child: &Folder, _backend: &mut dyn Backend) {
        parent.insert_child(child.clone());
        self.diff(parent)
            .folders_added
            .insert(child.name().to_string(), child.clone());
    }

    fn remove_folder(&mut self, parent: &Folder, name: &str, _backend: &mut dyn Backend) -> Option<Folder> {
        let child = parent.remove_child(name)?;
        self.stage_folder_removal(parent, &child);
        Some(child)
    }

    fn clear_folders(&mut self, parent: &Folder, _backend: &mut dyn Backend) -> Vec<Folder> {
        let children: Vec<Folder> = parent.take_children().into_values().collect();
        for child in &children {
            self.stage_folder_removal(parent, child);
        }
        children
    }

    fn set_icon(&mut self, folder: &Folder, icon: Option<Payload>, _backend: &mut dyn Backend) {
        folder.set_icon(icon.clone());
        self.diff(folder).icon = Some(icon);
    }

    fn save(&mut self, folder: &FolderPath, backend: &mut dyn Backend) {
        let Some(diff) = self.diffs.remove(folder) else {
            return;
        };
        backend.begin_batch();
        self.flush_structure(folder, backend);
        diff.flush(backend);
        report(backend.end_batch(), "end_batch", folder);
        debug!(path = %folder, "staged changes saved");
    }

    fn save_all(&mut self, backend: &mut dyn Backend) {
        if self.diffs.is_empty() {
            return;
        }
        let diffs = std::mem::take(&mut self.diffs);
        let count = diffs.len();
        // Path order puts every parent before its children.
        backend.begin_batch();
        for diff in diffs.into_values() {
            diff.flush(backend);
        }
        if let Err(e) = backend.end_batch() {
            error!(error = %e, "backend write failed during save_all");
        }
        debug!(folders = count, "all staged changes saved");
    }

    fn has_pending(&self, folder: &FolderPath) -> bool {
        self.diffs.contains_key(folder)
    }

    fn pending_count(&self) -> usize {
        self.diffs.len()
    }

    fn staged_presence(&self, path: &FolderPath) -> Option<bool> {
        let mut current = path.clone();
        while let Some(parent) = current.parent() {
            if let Some(diff) = self.diffs.get(&parent) {
                let name = current.name();
                if current == *path && diff.folders_added.contains_key(name) {
                    return Some(true);
                }
                if diff.folders_removed.contains_key(name) {
                    return Some(false);
                }
            }
            current = parent;
        }
        None
    }

    fn overlay_listing(&self, parent: &FolderPath, listing: &mut BTreeMap<String, Folder>) {
        if self.shadowed(parent) {
            listing.clear();
        }
        let Some(diff) = self.diffs.get(parent) else {
            return;
        };
        for name in diff.folders_removed.keys() {
            listing.remove(name);
        }
        for (name, child) in &diff.folders_added {
            listing.insert(name.clone(), child.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::testing::{loaded, Call, RecordingBackend};

    fn path(raw: &str) -> FolderPath {
        FolderPath::normalize(raw).unwrap()
    }

    #[test]
    fn nothing_reaches_backend_before_save() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let folder = loaded("lib");

        modifier.add_item(&folder, "gold", Payload::from("g"), &mut backend);
        modifier.set_icon(&folder, Some(Payload::from("i")), &mut backend);

        assert!(backend.calls.is_empty());
        assert_eq!(folder.loaded_item("gold"), Some(Payload::from("g")));
        assert!(modifier.has_pending(folder.path()));
        assert_eq!(modifier.pending_count(), 1);
    }

    #[test]
    fn save_flushes_one_folder_in_one_batch() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let a = loaded("lib/a");
        let b = loaded("lib/b");
        modifier.add_item(&a, "x", Payload::from("1"), &mut backend);
        modifier.add_item(&b, "y", Payload::from("2"), &mut backend);

        modifier.save(a.path(), &mut backend);

        assert_eq!(
            backend.calls,
            vec![Call::Begin, Call::SaveItem("lib/a".into(), "x".into()), Call::End]
        );
        assert!(!modifier.has_pending(a.path()));
        assert!(modifier.has_pending(b.path()));
    }

    #[test]
    fn add_then_remove_becomes_a_delete() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let folder = loaded("lib");
        modifier.add_item(&folder, "gold", Payload::from("g"), &mut backend);
        modifier.remove_item(&folder, "gold", &mut backend);

        modifier.save_all(&mut backend);
        assert_eq!(backend.writes(), vec![Call::DeleteItem("lib".into(), "gold".into())]);
    }

    #[test]
    fn removed_then_readded_folder_is_deleted_first() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        let old = loaded("lib/skins");
        modifier.add_folder(&parent, &old, &mut backend);
        modifier.save_all(&mut backend);
        backend.calls.clear();

        modifier.remove_folder(&parent, "skins", &mut backend);
        let fresh = loaded("lib/skins");
        modifier.add_folder(&parent, &fresh, &mut backend);
        modifier.save_all(&mut backend);

        assert_eq!(
            backend.writes(),
            vec![
                Call::DeleteFolder("lib/skins".into()),
                Call::SaveFolder("lib/skins".into())
            ]
        );
    }

    #[test]
    fn removing_a_folder_discards_changes_inside_it() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        let child = loaded("lib/a");
        let grandchild = loaded("lib/a/b");
        modifier.add_folder(&parent, &child, &mut backend);
        modifier.add_folder(&child, &grandchild, &mut backend);
        modifier.add_item(&grandchild, "x", Payload::from("1"), &mut backend);

        modifier.remove_folder(&parent, "a", &mut backend);

        assert!(!modifier.has_pending(child.path()));
        assert!(!modifier.has_pending(grandchild.path()));
        assert_eq!(modifier.pending_count(), 1);
    }

    #[test]
    fn saving_recreated_child_first_replays_its_recreation() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        parent.insert_child(loaded("lib/skins"));
        modifier.add_item(&parent, "top", Payload::from("t"), &mut backend);
        modifier.remove_folder(&parent, "skins", &mut backend);
        let fresh = loaded("lib/skins");
        modifier.add_folder(&parent, &fresh, &mut backend);
        modifier.add_item(&fresh, "gold", Payload::from("g"), &mut backend);

        modifier.save(fresh.path(), &mut backend);
        assert_eq!(
            backend.writes(),
            vec![
                Call::DeleteFolder("lib/skins".into()),
                Call::SaveFolder("lib/skins".into()),
                Call::SaveItem("lib/skins".into(), "gold".into())
            ]
        );
        assert_eq!(backend.batches(), 1);
        assert_eq!(modifier.staged_presence(fresh.path()), None);

        // The parent keeps its unrelated change but no longer replays the delete.
        backend.calls.clear();
        assert!(modifier.has_pending(parent.path()));
        modifier.save(parent.path(), &mut backend);
        assert_eq!(backend.writes(), vec![Call::SaveItem("lib".into(), "top".into())]);
    }

    #[test]
    fn structural_only_parent_diff_is_dropped_once_replayed() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        let child = loaded("lib/a");
        modifier.add_folder(&parent, &child, &mut backend);
        modifier.add_item(&child, "x", Payload::from("1"), &mut backend);

        modifier.save(child.path(), &mut backend);
        assert_eq!(modifier.pending_count(), 0);
        assert_eq!(
            backend.writes(),
            vec![Call::SaveFolder("lib/a".into()), Call::SaveItem("lib/a".into(), "x".into())]
        );
    }

    #[test]
    fn save_all_uses_one_outer_batch() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        for name in ["a", "b", "c"] {
            let folder = loaded(&format!("lib/{name}"));
            modifier.add_item(&folder, "x", Payload::from("1"), &mut backend);
        }

        modifier.save_all(&mut backend);
        assert_eq!(backend.batches(), 1);
        assert_eq!(backend.writes().len(), 3);
        assert_eq!(modifier.pending_count(), 0);

        backend.calls.clear();
        modifier.save_all(&mut backend);
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn staged_presence_tracks_adds_and_removes() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        modifier.add_folder(&parent, &loaded("lib/new"), &mut backend);
        parent.insert_child(loaded("lib/old"));
        modifier.remove_folder(&parent, "old", &mut backend);

        assert_eq!(modifier.staged_presence(&path("lib/new")), Some(true));
        assert_eq!(modifier.staged_presence(&path("lib/old")), Some(false));
        assert_eq!(modifier.staged_presence(&path("lib/old/deep")), Some(false));
        assert_eq!(modifier.staged_presence(&path("lib/other")), None);
        assert_eq!(modifier.staged_presence(&path("lib")), None);
    }

    #[test]
    fn overlay_applies_staged_listing_changes() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        parent.insert_child(loaded("lib/gone"));
        modifier.remove_folder(&parent, "gone", &mut backend);
        modifier.add_folder(&parent, &loaded("lib/fresh"), &mut backend);

        let mut listing = BTreeMap::from([
            ("gone".to_string(), loaded("lib/gone")),
            ("kept".to_string(), loaded("lib/kept")),
        ]);
        modifier.overlay_listing(parent.path(), &mut listing);

        let names: Vec<_> = listing.keys().cloned().collect();
        assert_eq!(names, vec!["fresh", "kept"]);
    }

    #[test]
    fn overlay_hides_stale_children_of_recreated_folder() {
        let mut backend = RecordingBackend::default();
        let mut modifier = ManualModifier::new();
        let parent = loaded("lib");
        parent.insert_child(loaded("lib/skins"));
        modifier.remove_folder(&parent, "skins", &mut backend);
        modifier.add_folder(&parent, &loaded("lib/skins"), &mut backend);

        let mut listing = BTreeMap::from([("old".to_string(), loaded("lib/skins/old"))]);
        modifier.overlay_listing(&path("lib/skins"), &mut listing);
        assert!(listing.is_empty());
    }
}
