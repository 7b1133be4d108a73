//! Progress manager: one shared item per operation kind.

use std::collections::HashMap;

use super::{OperationKind, ProgressId, ProgressItem, ProgressState};
use crate::fileops::job::JobId;

pub struct ProgressManager {
    items: HashMap<OperationKind, ProgressItem>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
        }
    }

    /// Attach a job with `count` items to the running item of `kind`, creating
    /// a fresh item when there is none or the previous one has settled.
    pub fn attach(&mut self, kind: OperationKind, job: JobId, count: usize) -> ProgressId {
        let reuse = self.items.get(&kind).is_some_and(|item| item.is_running());
        if !reuse {
            self.items.insert(kind, ProgressItem::new(kind));
        }

        let item = self
            .items
            .entry(kind)
            .or_insert_with(|| ProgressItem::new(kind));
        item.progress.total += count;
        item.jobs.push(job);
        item.id
    }

    /// Advance the item `job` is attached to. Reports from jobs no longer
    /// attached, such as cancelled ones, are ignored.
    pub fn advance(&mut self, job: JobId, count: usize) {
        let Some(item) = self
            .items
            .values_mut()
            .find(|item| item.is_running() && item.jobs.contains(&job))
        else {
            return;
        };
        item.progress.current = (item.progress.current + count).min(item.progress.total);
    }

    /// Detach a finished job. The item settles once its last job is gone.
    /// Returns true when this call settled it.
    pub fn job_finished(&mut self, kind: OperationKind, job: JobId) -> bool {
        let Some(item) = self.items.get_mut(&kind) else {
            return false;
        };
        if !item.jobs.contains(&job) {
            return false;
        }
        item.jobs.retain(|j| *j != job);
        if !item.jobs.is_empty() {
            return false;
        }
        if item.is_running() {
            item.state = ProgressState::Completed;
        }
        true
    }

    /// Settle the item of `kind` and detach its jobs. Returns the jobs that
    /// must be told to stop.
    pub fn cancel(&mut self, kind: OperationKind) -> Vec<JobId> {
        match self.items.get_mut(&kind) {
            Some(item) if item.is_running() => {
                item.state = ProgressState::Completed;
                std::mem::take(&mut item.jobs)
            }
            _ => Vec::new(),
        }
    }

    pub fn get(&self, kind: OperationKind) -> Option<&ProgressItem> {
        self.items.get(&kind)
    }

    /// Items still running, in a stable kind order.
    pub fn running_items(&self) -> Vec<&ProgressItem> {
        OperationKind::ALL
            .iter()
            .filter_map(|kind| self.items.get(kind))
            .filter(|item| item.is_running())
            .collect()
    }

    pub fn has_running_items(&self) -> bool {
        self.items.values().any(|item| item.is_running())
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}
