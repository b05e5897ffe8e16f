//! Folder paths and name validation.
//!
//! A folder path is the slash-joined list of folder names from the store root
//! down to the folder itself. The root folder's path is its name alone.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not be `.` or `..`
//! - Must not contain `/`, `\` or NUL
//! - Must parse as exactly one normal component on the host filesystem

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PathError;

/// Separator between the segments of a [`FolderPath`].
pub const SEPARATOR: char = '/';

/// Characters that are forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Additional characters the Windows filesystem refuses in a path segment.
#[cfg(windows)]
const FORBIDDEN_HOST_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Validate a folder or item name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use burrow_types::validate_name;
///
/// assert!(validate_name("skins").is_ok());
/// assert!(validate_name("").is_err());
/// assert!(validate_name("..").is_err());
/// assert!(validate_name("a/b").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() {
        return Err(PathError::name(name, "name must not be empty"));
    }

    if name == "." || name == ".." {
        return Err(PathError::name(name, "name must not be a relative segment"));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(PathError::name(
                name,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
    }

    #[cfg(windows)]
    {
        for ch in FORBIDDEN_HOST_CHARS {
            if name.contains(*ch) {
                return Err(PathError::name(
                    name,
                    format!("contains forbidden character: {ch:?}"),
                ));
            }
        }
        if name.ends_with('.') || name.ends_with(' ') {
            return Err(PathError::name(name, "must not end with '.' or ' '"));
        }
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == name => Ok(()),
        _ => Err(PathError::name(
            name,
            "not a single filesystem path segment",
        )),
    }
}

/// Returns `true` if `name` passes [`validate_name`].
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

/// Normalized path of a folder, rooted at the store's root folder.
///
/// Construction always validates, so every segment of a `FolderPath` is a
/// valid name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FolderPath(String);

impl FolderPath {
    /// Path of a root folder with the given name.
    pub fn root(name: &str) -> Result<Self, PathError> {
        validate_name(name)?;
        Ok(Self(name.to_string()))
    }

    /// Normalize a caller-supplied path.
    ///
    /// Platform separators are converted to `/`. Fails if any segment is
    /// empty, `.`, `..`, or otherwise not a valid name.
    pub fn normalize(raw: &str) -> Result<Self, PathError> {
        let converted: String = raw
            .chars()
            .map(|ch| {
                if ch == '\\' || ch == std::path::MAIN_SEPARATOR {
                    SEPARATOR
                } else {
                    ch
                }
            })
            .collect();

        if converted.is_empty() {
            return Err(PathError::path(raw, "path must not be empty"));
        }

        for segment in converted.split(SEPARATOR) {
            if segment.is_empty() {
                return Err(PathError::path(raw, "path segments must not be empty"));
            }
            if let Err(PathError::InvalidName { reason, .. }) = validate_name(segment) {
                return Err(PathError::path(raw, format!("segment {segment:?}: {reason}")));
            }
        }

        Ok(Self(converted))
    }

    /// The full path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment: the folder's own name.
    pub fn name(&self) -> &str {
        self.0
            .rsplit_once(SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }

    /// Iterate over all segments, starting with the root name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    /// Segments below the root folder.
    pub fn relative_segments(&self) -> impl Iterator<Item = &str> {
        self.segments().skip(1)
    }

    /// Number of segments. The root has depth 1.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// Returns `true` if this path names a root folder.
    pub fn is_root(&self) -> bool {
        !self.0.contains(SEPARATOR)
    }

    /// Path of the parent folder, or `None` for a root.
    pub fn parent(&self) -> Option<FolderPath> {
        self.0
            .rsplit_once(SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// Path of the child folder `name`.
    pub fn child(&self, name: &str) -> Result<FolderPath, PathError> {
        validate_name(name)?;
        Ok(Self(format!("{}{SEPARATOR}{name}", self.0)))
    }

    /// Returns `true` if `self` equals `ancestor` or lies beneath it.
    pub fn is_within(&self, ancestor: &FolderPath) -> bool {
        match self.0.strip_prefix(ancestor.as_str()) {
            Some("") => true,
            Some(rest) => rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// The root plus the first segment below it.
    ///
    /// Every path within one top-level subtree shares this key, so work keyed
    /// by it is ordered against deletes of any ancestor below the root.
    pub fn subtree_key(&self) -> &str {
        match self.0.match_indices(SEPARATOR).nth(1) {
            Some((index, _)) => &self.0[..index],
            None => &self.0,
        }
    }
}

impl fmt::Debug for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FolderPath({:?})", self.0)
    }
}

impl fmt::Display for FolderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FolderPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s)
    }
}

impl TryFrom<String> for FolderPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::normalize(&value)
    }
}

impl From<FolderPath> for String {
    fn from(path: FolderPath) -> Self {
        path.0
    }
}

impl AsRef<str> for FolderPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
