//! One directory per folder, one file per item.
//!
//! Layout under `<base_path>/`:
//!
//! ```text
//! <base_path>/                 root folder
//! <base_path>/gold.bin         item "gold" of the root
//! <base_path>/_icon.bin        icon of the root
//! <base_path>/skins/           child folder "skins"
//! <base_path>/skins/iron.bin   item "iron" of "skins"
//! ```
//!
//! The icon is stored as an item under a reserved key. A real item with that
//! name is indistinguishable from the icon.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use burrow_types::{is_valid_name, FolderPath, Payload};
use tracing::{debug, info, warn};

use crate::error::{BackendError, BackendResult};
use crate::executor::WriteExecutor;
use crate::fs_util::{remove_dir_if_exists, remove_file_if_exists, write_atomic};
use crate::traits::{Backend, BackendKind};

/// A single physical file system operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileOp {
    CreateDir(PathBuf),
    WriteFile(PathBuf, Payload),
    DeleteDir(PathBuf),
    DeleteFile(PathBuf),
}

impl FileOp {
    /// Perform the operation. Deleting a missing target succeeds.
    pub fn apply(&self) -> BackendResult<()> {
        match self {
            Self::CreateDir(dir) => fs::create_dir_all(dir)?,
            Self::WriteFile(file, payload) => write_atomic(file, payload.as_bytes())?,
            Self::DeleteDir(dir) => remove_dir_if_exists(dir)?,
            Self::DeleteFile(file) => remove_file_if_exists(file)?,
        }
        Ok(())
    }
}

/// Operations collected by an open batch, grouped by ordering key.
#[derive(Debug, Default)]
struct Batch {
    depth: usize,
    groups: BTreeMap<String, Vec<FileOp>>,
}

/// Backend storing each folder as a directory and each item as a file.
///
/// Writes run on the executor keyed by the folder's subtree key, so a folder
/// delete is ordered against every write beneath it. Outside a batch each
/// call queues its own job; a batch queues one job per subtree key at the
/// outermost `end_batch`. Loads wait on the subtree's lane first so they see
/// every write queued before them.
pub struct MultiFileBackend {
    root_dir: PathBuf,
    icon_key: String,
    extension: String,
    executor: Arc<dyn WriteExecutor>,
    batch: Batch,
}

impl MultiFileBackend {
    /// Open the tree rooted at `root_dir`. The directory is created lazily on
    /// the first write.
    pub fn open(
        root_dir: &Path,
        icon_key: &str,
        extension: &str,
        executor: Arc<dyn WriteExecutor>,
    ) -> BackendResult<Self> {
        if !is_valid_name(icon_key) {
            return Err(BackendError::ReservedName {
                name: icon_key.to_string(),
                backend: BackendKind::MultiFile,
            });
        }
        if root_dir.exists() && !root_dir.is_dir() {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", root_dir.display()),
            )));
        }

        info!(root = %root_dir.display(), "multi-file backend opened");
        Ok(Self {
            root_dir: root_dir.to_path_buf(),
            icon_key: icon_key.to_string(),
            extension: extension.to_string(),
            executor,
            batch: Batch::default(),
        })
    }

    /// Directory backing the root folder.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Directory backing `folder`.
    pub fn folder_dir(&self, folder: &FolderPath) -> PathBuf {
        folder
            .relative_segments()
            .fold(self.root_dir.clone(), |dir, segment| dir.join(segment))
    }

    /// File backing item `name` of `folder`.
    pub fn item_file(&self, folder: &FolderPath, name: &str) -> PathBuf {
        self.folder_dir(folder)
            .join(format!("{name}.{}", self.extension))
    }

    fn wait_for_writes(&self, folder: &FolderPath) {
        self.executor.barrier(folder.subtree_key());
    }

    fn enqueue(&mut self, folder: &FolderPath, op: FileOp) {
        let key = folder.subtree_key().to_string();
        if self.batch.depth > 0 {
            self.batch.groups.entry(key).or_default().push(op);
            return;
        }
        self.executor.submit(
            &key,
            Box::new(move || {
                op.apply()?;
                debug!(?op, "file operation applied");
                Ok(())
            }),
        );
    }

    fn item_name_of(&self, file: &Path) -> Option<String> {
        if file.extension()?.to_str()? != self.extension {
            return None;
        }
        let stem = file.file_stem()?.to_str()?;
        is_valid_name(stem).then(|| stem.to_string())
    }
}

fn read_dir_or_empty(dir: &Path) -> BackendResult<Vec<fs::DirEntry>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(entries.collect::<Result<Vec<_>, _>>()?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

impl Backend for MultiFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MultiFile
    }

    fn load_items(&self, folder: &FolderPath) -> BackendResult<BTreeMap<String, Payload>> {
        self.wait_for_writes(folder);

        let mut items = BTreeMap::new();
        for entry in read_dir_or_empty(&self.folder_dir(folder))? {
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file = entry.path();
            let Some(name) = self.item_name_of(&file) else {
                continue;
            };
            if name == self.icon_key {
                continue;
            }
            match fs::read(&file) {
                Ok(bytes) => {
                    items.insert(name, Payload::from(bytes));
                }
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable item"),
            }
        }
        Ok(items)
    }

    fn load_subfolders(&self, folder: &FolderPath) -> BackendResult<Vec<String>> {
        self.wait_for_writes(folder);

        let mut names = Vec::new();
        for entry in read_dir_or_empty(&self.folder_dir(folder))? {
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_str() {
                Some(name) if is_valid_name(name) => names.push(name.to_string()),
                _ => warn!(folder = %folder, entry = ?entry.file_name(), "skipping unusable directory name"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn folder_exists(&self, folder: &FolderPath) -> BackendResult<bool> {
        self.wait_for_writes(folder);
        Ok(self.folder_dir(folder).is_dir())
    }

    fn load_icon(&self, folder: &FolderPath) -> BackendResult<Option<Payload>> {
        self.wait_for_writes(folder);
        match fs::read(self.item_file(folder, &self.icon_key)) {
            Ok(bytes) => Ok(Some(Payload::from(bytes))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_item(&mut self, folder: &FolderPath, name: &str, payload: &Payload) -> BackendResult<()> {
        let file = self.item_file(folder, name);
        self.enqueue(folder, FileOp::WriteFile(file, payload.clone()));
        Ok(())
    }

    fn save_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
        let dir = self.folder_dir(folder);
        self.enqueue(folder, FileOp::CreateDir(dir));
        Ok(())
    }

    fn save_icon(&mut self, folder: &FolderPath, icon: Option<&Payload>) -> BackendResult<()> {
        let file = self.item_file(folder, &self.icon_key);
        let op = match icon {
            Some(icon) => FileOp::WriteFile(file, icon.clone()),
            None => FileOp::DeleteFile(file),
        };
        self.enqueue(folder, op);
        Ok(())
    }

    fn delete_item(&mut self, folder: &FolderPath, name: &str) -> BackendResult<()> {
        let file = self.item_file(folder, name);
        self.enqueue(folder, FileOp::DeleteFile(file));
        Ok(())
    }

    fn delete_folder(&mut self, folder: &FolderPath) -> BackendResult<()> {
        let dir = self.folder_dir(folder);
        self.enqueue(folder, FileOp::DeleteDir(dir));
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.batch.depth += 1;
    }

    fn end_batch(&mut self) -> BackendResult<()> {
        if self.batch.depth == 0 {
            warn!(root = %self.root_dir.display(), "end_batch without begin_batch");
            return Ok(());
        }
        self.batch.depth -= 1;
        if self.batch.depth > 0 {
            return Ok(());
        }

        for (key, ops) in std::mem::take(&mut self.batch.groups) {
            debug!(key = %key, ops = ops.len(), "batch committed");
            self.executor.submit(
                &key,
                Box::new(move || {
                    let mut first_error = None;
                    for op in &ops {
                        if let Err(e) = op.apply() {
                            warn!(?op, error = %e, "batched file operation failed");
                            first_error.get_or_insert(e);
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                }),
            );
        }
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.executor.flush();
        Ok(())
    }
}

impl std::fmt::Debug for MultiFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiFileBackend")
            .field("root_dir", &self.root_dir)
            .field("icon_key", &self.icon_key)
            .field("extension", &self.extension)
            .field("batch_depth", &self.batch.depth)
            .finish()
    }
}
