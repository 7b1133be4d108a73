//! Photo catalog engine.
//!
//! Keeps an in-memory hierarchy of albums, tags, saved searches and date
//! groupings in step with a catalog database and the filesystem, and runs
//! sidecar-aware copy/move/rename/delete operations on catalogued files.

pub mod album;
pub mod cache;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fileops;
pub mod logging;
pub mod sidecar;
pub mod tasks;
pub mod trash;
pub mod watch;

pub use album::{AlbumHandle, AlbumKind, AlbumManager, AlbumTree, GlobalId};
pub use config::Config;
pub use error::{AlbumError, OperationError};
pub use events::{CatalogEvent, EventBus};
pub use fileops::FileOperations;
