//! Directory watch over available album roots.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Source of dirty-path notifications for album roots.
pub trait DirectoryWatch: Send {
    fn add_dir(&mut self, path: &Path) -> Result<()>;
    fn remove_dir(&mut self, path: &Path) -> Result<()>;
    fn contains(&self, path: &Path) -> bool;
}

/// Recursive watch built on the platform's recommended `notify` backend.
/// Every create, modify or remove event turns into one dirty path per
/// affected file on the receiver returned by [`NotifyWatch::new`].
pub struct NotifyWatch {
    watcher: RecommendedWatcher,
    dirs: HashSet<PathBuf>,
}

impl NotifyWatch {
    pub fn new() -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let (tx, rx) = mpsc::channel();

        let watcher = notify::recommended_watcher(move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                if !is_relevant(&event.kind) {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Err(e) => tracing::warn!("Directory watch error: {}", e),
        })
        .context("Failed to create directory watcher")?;

        Ok((
            Self {
                watcher,
                dirs: HashSet::new(),
            },
            rx,
        ))
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

impl DirectoryWatch for NotifyWatch {
    fn add_dir(&mut self, path: &Path) -> Result<()> {
        if self.dirs.contains(path) {
            return Ok(());
        }
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
        self.dirs.insert(path.to_path_buf());
        tracing::debug!("Watching {}", path.display());
        Ok(())
    }

    fn remove_dir(&mut self, path: &Path) -> Result<()> {
        if !self.dirs.remove(path) {
            return Ok(());
        }
        // The directory may already be gone, which also ends the watch.
        if let Err(e) = self.watcher.unwatch(path) {
            tracing::warn!("Failed to unwatch {}: {}", path.display(), e);
        }
        Ok(())
    }

    fn contains(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }
}
