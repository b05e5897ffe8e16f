//! The whole folder tree in one JSON document.
//!
//! Layout of `<base_path>.<ext>`:
//!
//! ```text
//! {
//!   "lib": {
//!     "name": "lib",
//!     "icon": "<hex>",                  (optional)
//!     "folders": ["skins"],             (ordered child names)
//!     "items": { "gold": "<hex>" },
//!     "skins": { "name": "skins", "folders": [], "items": {} }
//!   }
//! }
//! ```
//!
//! Child nodes are keyed by their segment inside the parent node, and the
//! parent's `folders` list names them explicitly so enumeration never scans
//! the document. Adding or removing a folder updates both in one write.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use burrow_types::{FolderPath, Payload};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult};
use crate::executor::WriteExecutor;
use crate::fs_util::write_atomic;
use crate::traits::{Backend, BackendKind};

const KEY_NAME: &str = "name";
const KEY_ICON: &str = "icon";
const KEY_FOLDERS: &str = "folders";
const KEY_ITEMS: &str = "items";

/// Node keys that a child folder may not use as its name.
pub const RESERVED_KEYS: &[&str] = &[KEY_NAME, KEY_ICON, KEY_FOLDERS, KEY_ITEMS];

/// Backend storing the whole tree in a single JSON document.
///
/// The document lives in memory and is the source of truth for loads. Every
/// mutation marks it dirty; serialization to disk is queued on the executor
/// and coalesced, so a burst of mutations produces one write. Inside a batch
/// nothing is queued until the outermost `end_batch`.
pub struct SingleDocumentBackend {
    file: PathBuf,
    document: Arc<Mutex<Value>>,
    executor: Arc<dyn WriteExecutor>,
    write_queued: Arc<AtomicBool>,
    batch_depth: usize,
    dirty_in_batch: bool,
}

impl SingleDocumentBackend {
    /// Open the document at `<base_path>.<extension>`, or start empty if the
    /// file does not exist yet.
    pub fn open(
        base_path: &Path,
        extension: &str,
        executor: Arc<dyn WriteExecutor>,
    ) -> BackendResult<Self> {
        let file = document_file(base_path, extension);
        let document = match std::fs::read(&file) {
            Ok(bytes) => {
                let value: Value = serde_json::from_slice(&bytes)
                    .map_err(|e| BackendError::corrupt(file.display(), e.to_string()))?;
                if !value.is_object() {
                    return Err(BackendError::corrupt(
                        file.display(),
                        "top level is not an object",
                    ));
                }
                value
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Value::Object(Map::new()),
            Err(e) => return Err(e.into()),
        };

        info!(file = %file.display(), "single-document backend opened");
        Ok(Self {
            file,
            document: Arc::new(Mutex::new(document)),
            executor,
            write_queued: Arc::new(AtomicBool::new(false)),
            batch_depth: 0,
            dirty_in_batch: false,
        })
    }

    /// Path of the backing document file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// A copy of the in-memory document.
    pub fn snapshot(&self) -> BackendResult<Value> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, Value>> {
        lock_document(&self.document)
    }

    fn mark_dirty(&mut self) {
        if self.batch_depth > 0 {
            self.dirty_in_batch = true;
        } else {
            self.queue_write();
        }
    }

    fn queue_write(&self) {
        if self.write_queued.swap(true, Ordering::AcqRel) {
            // A queued write has not snapshotted yet and will pick this up.
            return;
        }

        let document = Arc::clone(&self.document);
        let queued = Arc::clone(&self.write_queued);
        let file = self.file.clone();
        let key = self.file.to_string_lossy().into_owned();

        self.executor.submit(
            &key,
            Box::new(move || {
                queued.store(false, Ordering::Release);
                let bytes = {
                    let doc = lock_document(&document)?;
                    serde_json::to_vec_pretty(&*doc)?
                };
                write_atomic(&file, &bytes)?;
                debug!(file = %file.display(), bytes = bytes.len(), "document written");
                Ok(())
            }),
        );
    }
}

fn lock_document(document: &Mutex<Value>) -> BackendResult<MutexGuard<'_, Value>> {
    document
        .lock()
        .map_err(|e| BackendError::Poisoned(e.to_string()))
}

fn document_file(base_path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(base_path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn empty_node(name: &str) -> Value {
    let mut node = Map::new();
    node.insert(KEY_NAME.into(), Value::String(name.to_string()));
    node.insert(KEY_FOLDERS.into(), Value::Array(Vec::new()));
    node.insert(KEY_ITEMS.into(), Value::Object(Map::new()));
    Value::Object(node)
}

fn node<'a>(doc: &'a Value, folder: &FolderPath) -> Option<&'a Map<String, Value>> {
    let mut current = doc.as_object()?;
    for segment in folder.segments() {
        current = current.get(segment)?.as_object()?;
    }
    Some(current)
}

fn node_mut<'a>(doc: &'a mut Value, folder: &FolderPath) -> Option<&'a mut Map<String, Value>> {
    let mut current = doc.as_object_mut()?;
    for segment in folder.segments() {
        current = current.get_mut(segment)?.as_object_mut()?;
    }
    Some(current)
}

/// Find or create the node for `folder`, creating missing ancestors and
/// registering every created node in its parent's `folders` list.
fn ensure_node<'a>(
    doc: &'a mut Value,
    folder: &FolderPath,
) -> BackendResult<&'a mut Map<String, Value>> {
    let mut current = doc
        .as_object_mut()
        .ok_or_else(|| BackendError::corrupt(folder, "top level is not an object"))?;

    for (depth, segment) in folder.segments().enumerate() {
        if depth > 0 {
            register_child(current, segment, folder)?;
        }
        current = current
            .entry(segment.to_string())
            .or_insert_with(|| empty_node(segment))
            .as_object_mut()
            .ok_or_else(|| BackendError::corrupt(folder, "folder node is not an object"))?;
    }
    Ok(current)
}

fn register_child(
    parent: &mut Map<String, Value>,
    name: &str,
    folder: &FolderPath,
) -> BackendResult<()> {
    let list = parent
        .entry(KEY_FOLDERS)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| BackendError::corrupt(folder, "folders list is not an array"))?;
    if !list.iter().any(|v| v.as_str() == Some(name)) {
        list.push(Value::String(name.to_string()));
    }
    Ok(())
}

impl Backend for SingleDocumentBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SingleDocument
    }

    fn validate_folder_name(&self, name: &str) -> BackendResult<()> {
        if RESERVED_KEYS.contains(&name) {
            return Err(BackendError::ReservedName {
                name: name.to_string(),
                backend: self.kind(),
            });
        }
        Ok(())
    }

    fn load_items(&self, folder: &FolderPath) -> BackendResult<BTreeMap<String, Payload>> {
        let doc = self.lock()?;
        let Some(items) = node(&doc, folder)
            .and_then(|n| n.get(KEY_ITEMS))
            .and_then(Value::as_object)
        else {
            return Ok(BTreeMap::new());
        };

        let mut loaded = BTreeMap::new();
        for (name, value) in items {
            match value.as_str().map(Payload::from_hex) {
                Some(Ok(payload)) => {
                    loaded.insert(name.clone(), payload);
                }
                _ => warn!(folder = %folder, item = %name, "skipping undecodable item"),
            }
        }
        Ok(loaded)
    }

    fn load_subfolders(&self, folder: &FolderPath) -> BackendResult<Vec<String>> {
        let doc = self.lock()?;
        let Some(parent) = node(&doc, folder) else {
            return Ok(Vec::new());
        };
        let Some(list) = parent.get(KEY_FOLDERS).and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut names = Vec::with_capacity(list.len());
        for entry in list {
            let Some(name) = entry.as_str() else {
                warn!(folder = %folder, "skipping non-string folder entry");
                continue;
            };
            if parent.get(name).is_some_and(Value::is_object) {
                names.push(name.to_string());
            } else {
                warn!(folder = %folder, child = name, "folder list names a missing node");
            }
        }
        Ok(names)
    }

    fn folder_exists(&self, folder: &FolderPath) -> BackendResult<bool> {
        let doc = self.lock()?;
        let Some(parent) = folder.parent() else {
            return Ok(node(&doc, folder).is_some());
        };
        // Reachable only if the parent still lists it.
        let listed = node(&doc, &parent)
            .and_then(|n| n.get(KEY_FOLDERS))
            .and_then(Value::as_array)
            .is_some_and(|list| list.iter().any(|v| v.as_str() == Some(folder.name())));
        Ok(listed && node(&doc, folder).is_some())
    }

    fn load_icon(&self, folder: &FolderPath) -> BackendResult<Option<Payload>> {
        let doc = self.lock()?;
        match node(&doc, folder).and_then(|n| n.get(KEY_ICON)) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(hex)) => Payload::from_hex(hex)
                .map(Some)
                .map_err(|e| BackendError::corrupt(folder, format!("icon: {e}"))),
            Some(_) => Err(BackendError::corrupt(folder, "icon is not a string")),
        }
    }

    fn save_item(&mut self, folder: &FolderPath, name: &str, payload: &Payload) -> BackendResult<()> {
        {
            let mut doc = self.lock()?;
            let node = ensure_node(&mut doc, folder)?;
            let items = node
                .entry(KEY_ITEMS)
                .or_insert_with(|| Value::Object(Map::new()))
                .as_object_mut()
                .ok_or_else(|| BackendError::corrupt(folder, "items is not an object"))?;
            items.insert(name.to_string(), Value::String(payload.to_hex()));
        }
        self.mark_dirty();
        Ok(())
    }

    fn save_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
        {
            let mut doc = self.lock()?;
            ensure_node(&mut doc, folder)?;
        }
        self.mark_dirty();
        Ok(())
    }

    fn save_icon(&mut self, folder: &FolderPath, icon: Option<&Payload>) -> BackendResult<()> {
        {
            let mut doc = self.lock()?;
            let node = ensure_node(&mut doc, folder)?;
            match icon {
                Some(icon) => {
                    node.insert(KEY_ICON.into(), Value::String(icon.to_hex()));
                }
                None => {
                    node.remove(KEY_ICON);
                }
            }
        }
        self.mark_dirty();
        Ok(())
    }

    fn delete_item(&mut self, folder: &FolderPath, name: &str) -> BackendResult<()> {
        let removed = {
            let mut doc = self.lock()?;
            node_mut(&mut doc, folder)
                .and_then(|n| n.get_mut(KEY_ITEMS))
                .and_then(Value::as_object_mut)
                .and_then(|items| items.remove(name))
                .is_some()
        };
        if removed {
            self.mark_dirty();
        }
        Ok(())
    }

    fn delete_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
        let removed = {
            let mut doc = self.lock()?;
            match folder.parent() {
                None => doc
                    .as_object_mut()
                    .and_then(|top| top.remove(folder.name()))
                    .is_some(),
                Some(parent) => match node_mut(&mut doc, &parent) {
                    None => false,
                    Some(parent_node) => {
                        let name = folder.name();
                        if let Some(list) = parent_node.get_mut(KEY_FOLDERS).and_then(Value::as_array_mut) {
                            list.retain(|v| v.as_str() != Some(name));
                        }
                        parent_node.remove(name).is_some()
                    }
                },
            }
        };
        if removed {
            self.mark_dirty();
        }
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    fn end_batch(&mut self) -> BackendResult<()> {
        if self.batch_depth == 0 {
            warn!(file = %self.file.display(), "end_batch without begin_batch");
            return Ok(());
        }
        self.batch_depth -= 1;
        if self.batch_depth == 0 && self.dirty_in_batch {
            self.dirty_in_batch = false;
            debug!(file = %self.file.display(), "batch committed");
            self.queue_write();
        }
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.executor.flush();
        Ok(())
    }
}

impl std::fmt::Debug for SingleDocumentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleDocumentBackend")
            .field("file", &self.file)
            .field("batch_depth", &self.batch_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{InlineExecutor, LaneExecutor};
    use std::sync::atomic::AtomicUsize;

    fn path(raw: &str) -> FolderPath {
        FolderPath::normalize(raw).unwrap()
    }

    fn open_inline(base: &Path) -> SingleDocumentBackend {
        SingleDocumentBackend::open(base, "json", Arc::new(InlineExecutor::new())).unwrap()
    }

    /// Counts submissions and runs them inline.
    #[derive(Default)]
    struct CountingExecutor {
        submitted: AtomicUsize,
    }

    impl WriteExecutor for CountingExecutor {
        fn submit(&self, _key: &str, job: crate::executor::WriteJob) {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            job().unwrap();
        }
        fn barrier(&self, _key: &str) {}
        fn flush(&self) {}
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_inline(&dir.path().join("store"));
        assert_eq!(backend.file(), dir.path().join("store.json"));
        assert!(backend.load_items(&path("lib")).unwrap().is_empty());
        assert!(backend.load_subfolders(&path("lib")).unwrap().is_empty());
        assert!(!backend.folder_exists(&path("lib/skins")).unwrap());
    }

    #[test]
    fn save_folder_registers_in_parent_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = open_inline(&dir.path().join("store"));
        backend.save_folder(&path("lib/skins")).unwrap();
        backend.save_folder(&path("lib/hats")).unwrap();

        assert_eq!(
            backend.load_subfolders(&path("lib")).unwrap(),
            vec!["skins".to_string(), "hats".to_string()]
        );
        assert!(backend.folder_exists(&path("lib/skins")).unwrap());

        let doc = backend.snapshot().unwrap();
        assert_eq!(doc["lib"]["folders"], serde_json::json!(["skins", "hats"]));
        assert_eq!(doc["lib"]["skins"]["name"], "skins");
    }

    #[test]
    fn items_and_icon_roundtrip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("store");
        {
            let mut backend = open_inline(&base);
            backend
                .save_item(&path("lib/skins"), "gold", &Payload::from("x"))
                .unwrap();
            backend
                .save_icon(&path("lib/skins"), Some(&Payload::from("chest")))
                .unwrap();
        }

        let backend = open_inline(&base);
        let items = backend.load_items(&path("lib/skins")).unwrap();
        assert_eq!(items.get("gold"), Some(&Payload::from("x")));
        assert_eq!(
            backend.load_icon(&path("lib/skins")).unwrap(),
            Some(Payload::from("chest"))
        );
        assert_eq!(backend.load_subfolders(&path("lib")).unwrap(), vec!["skins"]);
    }

    #[test]
    fn delete_folder_updates_parent_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = open_inline(&dir.path().join("store"));
        backend.save_folder(&path("lib/skins/old")).unwrap();
        backend.delete_folder(&path("lib/skins")).unwrap();

        assert!(backend.load_subfolders(&path("lib")).unwrap().is_empty());
        assert!(!backend.folder_exists(&path("lib/skins")).unwrap());
        assert!(!backend.folder_exists(&path("lib/skins/old")).unwrap());
        let doc = backend.snapshot().unwrap();
        assert!(doc["lib"].get("skins").is_none());
    }

    #[test]
    fn dangling_list_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("store");
        std::fs::write(
            dir.path().join("store.json"),
            r#"{"lib":{"name":"lib","folders":["ghost","real"],"items":{},"real":{"name":"real","folders":[],"items":{}}}}"#,
        )
        .unwrap();

        let backend = open_inline(&base);
        assert_eq!(backend.load_subfolders(&path("lib")).unwrap(), vec!["real"]);
        assert!(!backend.folder_exists(&path("lib/ghost")).unwrap());
    }

    #[test]
    fn orphaned_nodes_are_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("store.json"),
            r#"{"lib":{"name":"lib","folders":[],"items":{},"orphan":{"name":"orphan","folders":[],"items":{}}}}"#,
        )
        .unwrap();

        let backend = open_inline(&dir.path().join("store"));
        assert!(backend.load_subfolders(&path("lib")).unwrap().is_empty());
        assert!(!backend.folder_exists(&path("lib/orphan")).unwrap());
    }

    #[test]
    fn corrupt_document_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("store.json"), b"{ not json").unwrap();
        let result =
            SingleDocumentBackend::open(&dir.path().join("store"), "json", Arc::new(InlineExecutor));
        assert!(matches!(result, Err(BackendError::CorruptDocument { .. })));
    }

    #[test]
    fn undecodable_items_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("store.json"),
            r#"{"lib":{"name":"lib","folders":[],"items":{"ok":"6869","bad":"zz"}}}"#,
        )
        .unwrap();
        let backend = open_inline(&dir.path().join("store"));
        let items = backend.load_items(&path("lib")).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items["ok"], Payload::from("hi"));
    }

    #[test]
    fn reserved_names_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let backend = open_inline(&dir.path().join("store"));
        assert!(matches!(
            backend.validate_folder_name("items"),
            Err(BackendError::ReservedName { .. })
        ));
        assert!(backend.validate_folder_name("skins").is_ok());
    }

    #[test]
    fn batch_coalesces_into_one_write() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let mut backend =
            SingleDocumentBackend::open(&dir.path().join("store"), "json", executor.clone()).unwrap();

        backend.begin_batch();
        for i in 0..10 {
            backend
                .save_item(&path("lib"), &format!("item{i}"), &Payload::from("v"))
                .unwrap();
        }
        assert_eq!(executor.submitted.load(Ordering::SeqCst), 0);
        backend.end_batch().unwrap();
        assert_eq!(executor.submitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_batches_commit_at_outermost_end() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let mut backend =
            SingleDocumentBackend::open(&dir.path().join("store"), "json", executor.clone()).unwrap();

        backend.begin_batch();
        backend.begin_batch();
        backend.save_folder(&path("lib/a")).unwrap();
        backend.end_batch().unwrap();
        assert_eq!(executor.submitted.load(Ordering::SeqCst), 0);
        backend.end_batch().unwrap();
        assert_eq!(executor.submitted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let mut backend =
            SingleDocumentBackend::open(&dir.path().join("store"), "json", executor.clone()).unwrap();
        backend.begin_batch();
        backend.end_batch().unwrap();
        assert_eq!(executor.submitted.load(Ordering::SeqCst), 0);
        assert!(!backend.file().exists());
    }

    #[test]
    fn background_writes_land_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("store");
        let executor: Arc<dyn WriteExecutor> = Arc::new(LaneExecutor::new(2).unwrap());
        let mut backend = SingleDocumentBackend::open(&base, "json", executor).unwrap();

        for i in 0..20 {
            backend
                .save_item(&path("lib"), &format!("item{i}"), &Payload::from(format!("{i}")))
                .unwrap();
        }
        backend.flush().unwrap();

        let reopened = open_inline(&base);
        let items = reopened.load_items(&path("lib")).unwrap();
        assert_eq!(items.len(), 20);
        assert_eq!(items["item19"], Payload::from("19"));
    }
}
