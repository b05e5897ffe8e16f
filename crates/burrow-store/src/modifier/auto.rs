use burrow_backend::Backend;
use burrow_types::Payload;
use tracing::debug;

use super::{report, Modifier, ModifierKind};
use crate::folder::Folder;

/// Writes every change through to the backend as it happens.
///
/// Bulk operations open one batch around all of their deletes so the backend
/// can coalesce them.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoModifier;

impl Modifier for AutoModifier {
    fn kind(&self) -> ModifierKind {
        ModifierKind::Auto
    }

    fn add_item(&mut self, folder: &Folder, name: &str, payload: Payload, backend: &mut dyn Backend) {
        report(backend.save_item(folder.path(), name, &payload), "save_item", folder.path());
        folder.insert_item(name, payload);
    }

    fn remove_item(&mut self, folder: &Folder, name: &str, backend: &mut dyn Backend) -> Option<Payload> {
        let removed = folder.remove_item(name)?;
        report(backend.delete_item(folder.path(), name), "delete_item", folder.path());
        Some(removed)
    }

    fn clear_items(&mut self, folder: &Folder, backend: &mut dyn Backend) -> usize {
        let removed = folder.take_items();
        if removed.is_empty() {
            return 0;
        }
        backend.begin_batch();
        for name in removed.keys() {
            report(backend.delete_item(folder.path(), name), "delete_item", folder.path());
        }
        report(backend.end_batch(), "end_batch", folder.path());
        debug!(path = %folder.path(), count = removed.len(), "items cleared");
        removed.len()
    }

    fn add_folder(&mut self, parent: &Folder, child: &Folder, backend: &mut dyn Backend) {
        parent.insert_child(child.clone());
        report(backend.save_folder(child.path()), "save_folder", child.path());
    }

    fn remove_folder(&mut self, parent: &Folder, name: &str, backend: &mut dyn Backend) -> Option<Folder> {
        let child = parent.remove_child(name)?;
        report(backend.delete_folder(child.path()), "delete_folder", child.path());
        Some(child)
    }

    fn clear_folders(&mut self, parent: &Folder, backend: &mut dyn Backend) -> Vec<Folder> {
        let children: Vec<Folder> = parent.take_children().into_values().collect();
        if children.is_empty() {
            return children;
        }
        backend.begin_batch();
        for child in &children {
            report(backend.delete_folder(child.path()), "delete_folder", child.path());
        }
        report(backend.end_batch(), "end_batch", parent.path());
        children
    }

    fn set_icon(&mut self, folder: &Folder, icon: Option<Payload>, backend: &mut dyn Backend) {
        report(backend.save_icon(folder.path(), icon.as_ref()), "save_icon", folder.path());
        folder.set_icon(icon);
    }
}
