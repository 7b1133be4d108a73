//! Trash: a holding directory that deleted files and albums move into.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::TrashConfig;
use crate::fileops::job::{copy_path, remove_path};

#[derive(Debug, Clone)]
pub struct TrashManager {
    config: TrashConfig,
}

impl TrashManager {
    pub fn new(config: TrashConfig) -> Self {
        Self { config }
    }

    pub fn trash_path(&self) -> &Path {
        &self.config.path
    }

    /// `<stem>_<unix time>_<sequence><.ext>` inside the trash directory.
    fn entry_name(&self, source: &Path) -> PathBuf {
        static SEQUENCE: AtomicU64 = AtomicU64::new(0);

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".into());
        let extension = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        self.config
            .path
            .join(format!("{}_{}_{}{}", stem, Utc::now().timestamp(), seq, extension))
    }

    /// Move a file or directory into the trash and return where it landed.
    pub fn move_to_trash(&self, path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            anyhow::bail!("{} does not exist", path.display());
        }
        fs::create_dir_all(&self.config.path).with_context(|| {
            format!("Failed to create trash directory {}", self.config.path.display())
        })?;

        let entry = self.entry_name(path);
        relocate(path, &entry).with_context(|| format!("Failed to trash {}", path.display()))?;
        tracing::debug!("Trashed {} as {}", path.display(), entry.display());
        Ok(entry)
    }

    /// Put a trash entry back. Never overwrites.
    pub fn restore(&self, entry: &Path, destination: &Path) -> Result<()> {
        if destination.exists() {
            anyhow::bail!("Cannot restore: {} already exists", destination.display());
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        relocate(entry, destination)
            .with_context(|| format!("Failed to restore {}", destination.display()))
    }

    /// Entries currently in the trash, sorted by path.
    pub fn list_trash_entries(&self) -> Result<Vec<PathBuf>> {
        if !self.config.path.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.config.path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        Ok(entries)
    }
}

/// Rename, falling back to copy and remove across filesystems.
fn relocate(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_path(from, to).context("copy failed")?;
    remove_path(from).context("removing the source failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(dir: &Path) -> TrashManager {
        TrashManager::new(TrashConfig {
            path: dir.join(".trash"),
        })
    }

    #[test]
    fn test_move_file_to_trash_and_restore() {
        let dir = tempdir().unwrap();
        let trash = manager(dir.path());
        let file = dir.path().join("a.jpg");
        fs::write(&file, b"img").unwrap();

        let trashed = trash.move_to_trash(&file).unwrap();
        assert!(!file.exists());
        assert!(trashed.starts_with(trash.trash_path()));
        assert!(trashed.to_string_lossy().ends_with(".jpg"));
        assert_eq!(trash.list_trash_entries().unwrap(), vec![trashed.clone()]);

        trash.restore(&trashed, &file).unwrap();
        assert_eq!(fs::read(&file).unwrap(), b"img");
    }

    #[test]
    fn test_move_directory_to_trash() {
        let dir = tempdir().unwrap();
        let trash = manager(dir.path());
        let album = dir.path().join("album");
        fs::create_dir_all(album.join("sub")).unwrap();
        fs::write(album.join("sub").join("b.jpg"), b"img").unwrap();

        let trashed = trash.move_to_trash(&album).unwrap();
        assert!(!album.exists());
        assert!(trashed.join("sub").join("b.jpg").exists());
    }

    #[test]
    fn test_same_name_gets_distinct_trash_names() {
        let dir = tempdir().unwrap();
        let trash = manager(dir.path());
        let file = dir.path().join("c.jpg");

        fs::write(&file, b"1").unwrap();
        let first = trash.move_to_trash(&file).unwrap();
        fs::write(&file, b"2").unwrap();
        let second = trash.move_to_trash(&file).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn test_restore_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let trash = manager(dir.path());
        let file = dir.path().join("d.jpg");
        fs::write(&file, b"1").unwrap();
        let trashed = trash.move_to_trash(&file).unwrap();
        fs::write(&file, b"new").unwrap();

        assert!(trash.restore(&trashed, &file).is_err());
    }

    #[test]
    fn test_missing_source_is_an_error() {
        let dir = tempdir().unwrap();
        let trash = manager(dir.path());
        assert!(trash.move_to_trash(&dir.path().join("nope")).is_err());
    }
}
