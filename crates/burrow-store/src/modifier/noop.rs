use burrow_backend::Backend;
use burrow_types::Payload;

use super::{Modifier, ModifierKind};
use crate::folder::Folder;

/// Keeps changes in memory only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpModifier;

impl Modifier for NoOpModifier {
    fn kind(&self) -> ModifierKind {
        ModifierKind::NoOp
    }

    fn add_item(&mut self, folder: &Folder, name: &str, payload: Payload, _backend: &mut dyn Backend) {
        folder.insert_item(name, payload);
    }

    fn remove_item(&mut self, folder: &Folder, name: &str, _backend: &mut dyn Backend) -> Option<Payload> {
        folder.remove_item(name)
    }

    fn clear_items(&mut self, folder: &Folder, _backend: &mut dyn Backend) -> usize {
        folder.take_items().len()
    }

    fn add_folder(&mut self, parent: &Folder, child: &Folder, _backend: &mut dyn Backend) {
        parent.insert_child(child.clone());
    }

    fn remove_folder(&mut self, parent: &Folder, name: &str, _backend: &mut dyn Backend) -> Option<Folder> {
        parent.remove_child(name)
    }

    fn clear_folders(&mut self, parent: &Folder, _backend: &mut dyn Backend) -> Vec<Folder> {
        parent.take_children().into_values().collect()
    }

    fn set_icon(&mut self, folder: &Folder, icon: Option<Payload>, _backend: &mut dyn Backend) {
        folder.set_icon(icon);
    }
}
