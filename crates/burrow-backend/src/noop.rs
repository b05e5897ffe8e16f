use std::collections::BTreeMap;

use burrow_types::{FolderPath, Payload};

use crate::error::BackendResult;
use crate::traits::{Backend, BackendKind};

/// Backend that persists nothing.
///
/// Loads return empty results and every save or delete is discarded. Used for
/// purely in-memory trees.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpBackend;

impl NoOpBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NoOpBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NoOp
    }

    fn load_items(&self, _folder: &FolderPath) -> BackendResult<BTreeMap<String, Payload>> {
        Ok(BTreeMap::new())
    }

    fn load_subfolders(&self, _folder: &FolderPath) -> BackendResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn folder_exists(&self, _folder: &FolderPath) -> BackendResult<bool> {
        Ok(false)
    }

    fn load_icon(&self, _folder: &FolderPath) -> BackendResult<Option<Payload>> {
        Ok(None)
    }

    fn save_item(&mut self, _folder: &FolderPath, _name: &str, _payload: &Payload) -> BackendResult<()> {
        Ok(())
    }

    fn save_folder(&mut self, _folder: &FolderPath) -> BackendResult<()> {
        Ok(())
    }

    fn save_icon(&mut self, _folder: &FolderPath, _icon: Option<&Payload>) -> BackendResult<()> {
        Ok(())
    }

    fn delete_item(&mut self, _folder: &FolderPath, _name: &str) -> BackendResult<()> {
        Ok(())
    }

    fn delete_folder(&mut self, _folder: &FolderPath) -> BackendResult<()> {
        Ok(())
    }

    fn begin_batch(&mut self) {}

    fn end_batch(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        Ok(())
    }
}
