//! Foundation types for burrow, a hierarchical cached object store.
//!
//! Every other burrow crate depends on `burrow-types`.
//!
//! # Key Types
//!
//! - [`FolderPath`] -- Normalized, slash-separated path of a folder in the tree
//! - [`Payload`] -- Opaque item value compared by byte equality
//! - [`PathError`] -- Malformed path or name supplied by a caller

pub mod error;
pub mod path;
pub mod payload;

pub use error::PathError;
pub use path::{is_valid_name, validate_name, FolderPath, SEPARATOR};
pub use payload::Payload;
