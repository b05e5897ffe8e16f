use std::path::{Path, PathBuf};

use burrow_backend::BackendKind;
use burrow_types::validate_name;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Configuration for a [`Store`](crate::Store).
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// base_path = "data/skins"
/// root_name = "lib"
/// backend = "multi_file"
/// auto_write = false
/// cache_capacity = 32
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage location. The document file is `<base_path>.<document_extension>`;
    /// the multi-file tree is rooted at `<base_path>/`.
    pub base_path: PathBuf,
    /// Name of the root folder.
    pub root_name: String,
    /// Persistence layout.
    pub backend: BackendKind,
    /// Write changes through immediately instead of staging them until save.
    pub auto_write: bool,
    /// Number of folder listings kept in the cache.
    pub cache_capacity: usize,
    /// Reserved item name under which the multi-file backend stores icons.
    pub icon_key: String,
    /// Extension of item files in the multi-file backend.
    pub item_extension: String,
    /// Extension of the single-document backend's file.
    pub document_extension: String,
    /// Number of sequential background write lanes.
    pub write_lanes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data"),
            root_name: "root".into(),
            backend: BackendKind::default(),
            auto_write: true,
            cache_capacity: 10,
            icon_key: "_icon".into(),
            item_extension: "bin".into(),
            document_extension: "json".into(),
            write_lanes: 4,
        }
    }
}

impl StoreConfig {
    /// Default configuration stored at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn with_root_name(mut self, root_name: impl Into<String>) -> Self {
        self.root_name = root_name.into();
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_auto_write(mut self, auto_write: bool) -> Self {
        self.auto_write = auto_write;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML text.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Check that the configuration can open a store.
    pub fn validate(&self) -> StoreResult<()> {
        validate_name(&self.root_name)
            .map_err(|e| StoreError::Config(format!("root_name: {e}")))?;
        validate_name(&self.icon_key)
            .map_err(|e| StoreError::Config(format!("icon_key: {e}")))?;
        if self.cache_capacity == 0 {
            return Err(StoreError::Config("cache_capacity must be at least 1".into()));
        }
        if self.write_lanes == 0 {
            return Err(StoreError::Config("write_lanes must be at least 1".into()));
        }
        for (field, ext) in [
            ("item_extension", &self.item_extension),
            ("document_extension", &self.document_extension),
        ] {
            if ext.is_empty() || ext.contains(&['.', '/', '\\'][..]) {
                return Err(StoreError::Config(format!("{field} {ext:?} is not a bare extension")));
            }
        }
        Ok(())
    }
}
