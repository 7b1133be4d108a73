//! Progress tracking for file operations.
//!
//! Jobs of the same kind share one progress item while it is running, so the
//! user sees a single "Moving" entry no matter how many moves are queued.

pub mod manager;

use std::time::Instant;

use crate::fileops::job::JobId;

pub use manager::ProgressManager;

/// Unique identifier for a progress item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

impl ProgressId {
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ProgressId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ProgressId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of file operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Copy,
    Move,
    Rename,
    Trash,
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Copy,
        OperationKind::Move,
        OperationKind::Rename,
        OperationKind::Trash,
        OperationKind::Delete,
    ];

    /// Short display name for status lines.
    pub fn short_name(&self) -> &'static str {
        match self {
            OperationKind::Copy => "C",
            OperationKind::Move => "M",
            OperationKind::Rename => "R",
            OperationKind::Trash => "T",
            OperationKind::Delete => "D",
        }
    }

    /// Full display name for progress listings.
    pub fn display_name(&self) -> &'static str {
        match self {
            OperationKind::Copy => "Copying",
            OperationKind::Move => "Moving",
            OperationKind::Rename => "Renaming",
            OperationKind::Trash => "Trashing",
            OperationKind::Delete => "Deleting",
        }
    }
}

/// Progress counters for an item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    /// Progress percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            0
        } else {
            ((self.current as f64 / self.total as f64) * 100.0).min(100.0) as u8
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Running,
    Completed,
}

/// Shared progress of all running jobs of one kind.
#[derive(Debug, Clone)]
pub struct ProgressItem {
    pub id: ProgressId,
    pub kind: OperationKind,
    pub state: ProgressState,
    pub progress: Progress,
    /// Jobs still reporting into this item.
    pub jobs: Vec<JobId>,
    pub started_at: Instant,
}

impl ProgressItem {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            id: ProgressId::new(),
            kind,
            state: ProgressState::Running,
            progress: Progress::default(),
            jobs: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == ProgressState::Running
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(Progress { current: 0, total: 0 }.percent(), 0);
        assert_eq!(Progress { current: 1, total: 4 }.percent(), 25);
        assert_eq!(Progress { current: 9, total: 4 }.percent(), 100);
    }

    #[test]
    fn test_progress_ids_are_unique() {
        assert_ne!(ProgressId::new(), ProgressId::new());
    }
}
