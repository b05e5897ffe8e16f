//! Persistence backends for burrow.
//!
//! A backend translates folder and item state to and from physical storage.
//! Backends never hold folder handles: they speak in [`FolderPath`]s and
//! [`Payload`]s, and the store layer turns what they load into handles.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`SingleDocumentBackend`] -- the whole tree in one JSON document
//! - [`MultiFileBackend`] -- one directory per folder, one file per item
//! - [`NoOpBackend`] -- loads nothing, saves nothing
//!
//! # Write Execution
//!
//! Physical writes leave the caller's thread through a [`WriteExecutor`].
//! [`LaneExecutor`] runs them on a tokio runtime with one sequential lane per
//! ordering key, so two writes to the same path are never reordered.
//! [`InlineExecutor`] runs them immediately on the caller's thread.
//!
//! [`FolderPath`]: burrow_types::FolderPath
//! [`Payload`]: burrow_types::Payload

pub mod error;
pub mod executor;
mod fs_util;
pub mod multi_file;
pub mod noop;
pub mod single_document;
pub mod traits;

pub use error::{BackendError, BackendResult};
pub use executor::{InlineExecutor, LaneExecutor, WriteExecutor, WriteJob};
pub use multi_file::{FileOp, MultiFileBackend};
pub use noop::NoOpBackend;
pub use single_document::SingleDocumentBackend;
pub use traits::{Backend, BackendKind};
