//! Typed failures returned synchronously to callers.
//!
//! Plumbing (store, config, filesystem) keeps using `anyhow`; these enums only
//! cover validation failures a caller is expected to show or branch on.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("No catalog database is available")]
    NoDatabase,

    #[error("{0}")]
    InvalidName(String),

    #[error("{0}")]
    NameConflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidOperation(String),

    /// Filesystem refusal while creating or renaming an album directory.
    #[error("{0}")]
    Filesystem(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum OperationError {
    #[error("No catalog database is available")]
    NoDatabase,

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{0}")]
    NameConflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<std::io::Error> for AlbumError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let message = match err.kind() {
            ErrorKind::AlreadyExists => "Another file or folder with same name exists".to_string(),
            ErrorKind::PermissionDenied => "Access denied to path".to_string(),
            ErrorKind::StorageFull => "Disk is full".to_string(),
            _ => format!("Filesystem error: {}", err),
        };
        AlbumError::Filesystem(message)
    }
}
