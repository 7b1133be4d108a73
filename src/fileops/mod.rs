//! Entry point for every catalogued file mutation.
//!
//! Validation and catalog updates run synchronously on the caller's thread;
//! the physical work is handed to a [`JobFacility`] and its reports are
//! drained with [`FileOperations::poll`]. Deletes are the exception: their
//! rows go only once the jobs are done and the files are really gone.

pub mod grouping;
pub mod job;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use url::Url;

use crate::album::PhysicalLocation;
use crate::cache::CacheInvalidator;
use crate::collection::{resolve_album_path, LocationResolver};
use crate::config::SidecarConfig;
use crate::db::{with_transaction, CatalogStore, ItemInfo};
use crate::error::OperationError;
use crate::events::{CatalogEvent, EventBus};
use crate::sidecar::SidecarFinder;
use crate::tasks::{OperationKind, ProgressManager};

pub use grouping::GroupedItemsFinder;
pub use job::{JobEvent, JobFacility, JobId, JobRequest, ThreadJobFacility};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Move to the trash directory.
    Trash,
    Permanent,
}

impl DeleteMode {
    fn kind(self) -> OperationKind {
        match self {
            DeleteMode::Trash => OperationKind::Trash,
            DeleteMode::Permanent => OperationKind::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveJob {
    kind: OperationKind,
    keep_errors: bool,
    /// Rename of a primary file; sidecar renames stay silent.
    notify_rename: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogRow {
    Item(i64),
    Album(i64),
}

/// Rows waiting for the jobs of one delete to finish.
struct PendingRemoval {
    jobs: HashSet<JobId>,
    rows: Vec<(PathBuf, CatalogRow)>,
}

pub struct FileOperations {
    store: Option<Arc<dyn CatalogStore>>,
    resolver: Arc<dyn LocationResolver>,
    facility: Box<dyn JobFacility>,
    job_events: mpsc::Receiver<JobEvent>,
    sidecars: SidecarConfig,
    progress: ProgressManager,
    jobs: HashMap<JobId, ActiveJob>,
    removals: Vec<PendingRemoval>,
    caches: Vec<Box<dyn CacheInvalidator>>,
    events: EventBus,
}

impl FileOperations {
    pub fn new(
        store: Option<Arc<dyn CatalogStore>>,
        resolver: Arc<dyn LocationResolver>,
        facility: Box<dyn JobFacility>,
        job_events: mpsc::Receiver<JobEvent>,
        sidecars: SidecarConfig,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            resolver,
            facility,
            job_events,
            sidecars,
            progress: ProgressManager::new(),
            jobs: HashMap::new(),
            removals: Vec::new(),
            caches: Vec::new(),
            events,
        }
    }

    pub fn add_cache(&mut self, cache: Box<dyn CacheInvalidator>) {
        self.caches.push(cache);
    }

    pub fn progress(&self) -> &ProgressManager {
        &self.progress
    }

    /// Jobs submitted but not yet finished.
    pub fn has_pending_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    fn store(&self) -> Result<&dyn CatalogStore, OperationError> {
        self.store.as_deref().ok_or(OperationError::NoDatabase)
    }

    // ========================================================================
    // URL resolution
    // ========================================================================

    fn location_url(&self, album_root_id: i32, relative_path: &str) -> Result<Url, OperationError> {
        let path = resolve_album_path(self.resolver.as_ref(), album_root_id, relative_path)
            .ok_or_else(|| {
                OperationError::NotFound(format!("Unknown album root {}", album_root_id))
            })?;
        Url::from_file_path(&path)
            .map_err(|_| OperationError::NotFound(format!("{} is not absolute", path.display())))
    }

    fn album_url(&self, album: &PhysicalLocation) -> Result<Url, OperationError> {
        self.location_url(album.album_root_id, &album.relative_path)
    }

    fn item_url(&self, item: &ItemInfo) -> Result<Url, OperationError> {
        self.location_url(item.album_root_id, &item.relative_path())
    }

    // ========================================================================
    // Album to album
    // ========================================================================

    pub fn copy_album(&mut self, src: &PhysicalLocation, dst: &PhysicalLocation) -> Result<JobId, OperationError> {
        self.album_to_album(OperationKind::Copy, src, dst)
    }

    pub fn move_album(&mut self, src: &PhysicalLocation, dst: &PhysicalLocation) -> Result<JobId, OperationError> {
        self.album_to_album(OperationKind::Move, src, dst)
    }

    fn album_to_album(
        &mut self,
        kind: OperationKind,
        src: &PhysicalLocation,
        dst: &PhysicalLocation,
    ) -> Result<JobId, OperationError> {
        let src_url = self.album_url(src)?;
        let dst_url = self.album_url(dst)?;
        if let (Ok(src_dir), Ok(dst_dir)) = (src_url.to_file_path(), dst_url.to_file_path()) {
            if dst_dir.starts_with(&src_dir) {
                return Err(OperationError::InvalidOperation(format!(
                    "{} {} into itself is not possible",
                    kind.display_name(),
                    src_dir.display()
                )));
            }
        }

        if let Some(store) = &self.store {
            store.hint_album_transfer(src.album_id, dst.album_id);
        }

        self.create_job(kind, vec![src_url], Some(dst_url), true, false)
    }

    // ========================================================================
    // Items to album
    // ========================================================================

    pub fn copy_items(&mut self, items: &[ItemInfo], dst: &PhysicalLocation) -> Result<Vec<JobId>, OperationError> {
        self.items_to_album(OperationKind::Copy, items, dst)
    }

    pub fn move_items(&mut self, items: &[ItemInfo], dst: &PhysicalLocation) -> Result<Vec<JobId>, OperationError> {
        self.items_to_album(OperationKind::Move, items, dst)
    }

    fn items_to_album(
        &mut self,
        kind: OperationKind,
        items: &[ItemInfo],
        dst: &PhysicalLocation,
    ) -> Result<Vec<JobId>, OperationError> {
        let store = self.store.clone().ok_or(OperationError::NoDatabase)?;
        let grouped = GroupedItemsFinder::new(store.as_ref(), items)?;
        let dst_url = self.album_url(dst)?;
        let dst_dir = dst_url
            .to_file_path()
            .map_err(|_| OperationError::NotFound(format!("{} is not local", dst_url)))?;

        if kind == OperationKind::Move {
            with_transaction(store.as_ref(), |store| -> Result<(), OperationError> {
                for item in &grouped.items {
                    if !dst_dir.join(&item.name).exists() {
                        store.move_item(item.id, dst.album_id, &item.name)?;
                    }
                }
                Ok(())
            })?;
        }

        store.hint_items_transfer(&grouped.ids(), dst.album_id);

        let urls = grouped
            .items
            .iter()
            .map(|item| self.item_url(item))
            .collect::<Result<Vec<_>, _>>()?;
        self.process_job(kind, &urls, Some(dst_url))
    }

    // ========================================================================
    // External files to album
    // ========================================================================

    pub fn copy_files(&mut self, files: &[Url], dst: &PhysicalLocation) -> Result<Vec<JobId>, OperationError> {
        let dst_url = self.album_url(dst)?;
        self.process_job(OperationKind::Copy, files, Some(dst_url))
    }

    pub fn move_files(&mut self, files: &[Url], dst: &PhysicalLocation) -> Result<Vec<JobId>, OperationError> {
        let dst_url = self.album_url(dst)?;
        self.process_job(OperationKind::Move, files, Some(dst_url))
    }

    // ========================================================================
    // Rename
    // ========================================================================

    /// Rename one item. `new_name` is a base name; the item keeps its
    /// extension and each sidecar becomes `<new_name><suffix>`.
    pub fn rename(&mut self, items: &[ItemInfo], new_name: &str) -> Result<Vec<JobId>, OperationError> {
        let [item] = items else {
            return Err(OperationError::InvalidOperation(format!(
                "rename takes exactly one item, got {}",
                items.len()
            )));
        };
        if new_name.is_empty() || new_name.contains('/') {
            return Err(OperationError::InvalidOperation(format!(
                "\"{}\" is not a valid file name",
                new_name
            )));
        }

        let store = self.store.clone().ok_or(OperationError::NoDatabase)?;
        let src_url = self.item_url(item)?;
        let (base, file_name) = renamed_file_name(&item.name, new_name);
        let dst_url = sibling_url(&src_url, &file_name)?;

        if let Ok(dst_path) = dst_url.to_file_path() {
            if dst_path.exists() {
                return Err(OperationError::NameConflict(format!(
                    "{} already exists",
                    dst_path.display()
                )));
            }
        }

        store.move_item(item.id, item.album_id, &file_name)?;
        store.hint_item_rename(item.id, &file_name);

        let finder = SidecarFinder::new(std::slice::from_ref(&src_url), &self.sidecars);
        let mut ids = Vec::new();

        for (sidecar, suffix) in finder.local_sidecars() {
            let target = sibling_url(sidecar, &format!("{}{}", base, suffix))?;
            ids.push(self.create_job(OperationKind::Rename, vec![sidecar.clone()], Some(target), true, false)?);
        }
        for (sidecar, suffix) in finder
            .possible_remote_sidecars
            .iter()
            .zip(finder.possible_remote_sidecar_suffixes.iter())
        {
            let target = sibling_url(sidecar, &format!("{}{}", base, suffix))?;
            ids.push(self.create_job(OperationKind::Rename, vec![sidecar.clone()], Some(target), false, false)?);
        }

        ids.push(self.create_job(OperationKind::Rename, vec![src_url], Some(dst_url), true, true)?);
        Ok(ids)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete items. Their rows are dropped once the jobs finish, for every
    /// file that no longer exists.
    pub fn delete_items(&mut self, items: &[ItemInfo], mode: DeleteMode) -> Result<Vec<JobId>, OperationError> {
        self.store()?;
        let urls = items
            .iter()
            .map(|item| self.item_url(item))
            .collect::<Result<Vec<_>, _>>()?;

        let rows = urls
            .iter()
            .zip(items)
            .filter_map(|(url, item)| Some((url.to_file_path().ok()?, CatalogRow::Item(item.id))))
            .collect();

        let ids = self.process_job(mode.kind(), &urls, None)?;
        self.queue_removal(&ids, rows);
        Ok(ids)
    }

    /// Delete an album directory and the rows of the album and its sub-albums.
    pub fn delete_album(&mut self, album: &PhysicalLocation, mode: DeleteMode) -> Result<Vec<JobId>, OperationError> {
        let store = self.store.clone().ok_or(OperationError::NoDatabase)?;
        let url = self.album_url(album)?;

        let prefix = format!("{}/", album.relative_path.trim_end_matches('/'));
        let doomed: Vec<i64> = store
            .scan_albums()?
            .into_iter()
            .filter(|a| {
                a.album_root_id == album.album_root_id
                    && (a.id == album.album_id || a.relative_path.starts_with(&prefix))
            })
            .map(|a| a.id)
            .collect();

        let rows = match url.to_file_path() {
            Ok(path) => doomed
                .into_iter()
                .map(|id| (path.clone(), CatalogRow::Album(id)))
                .collect(),
            Err(()) => Vec::new(),
        };

        let ids = self.process_job(mode.kind(), &[url], None)?;
        self.queue_removal(&ids, rows);
        Ok(ids)
    }

    fn queue_removal(&mut self, jobs: &[JobId], rows: Vec<(PathBuf, CatalogRow)>) {
        if jobs.is_empty() || rows.is_empty() {
            return;
        }
        self.removals.push(PendingRemoval {
            jobs: jobs.iter().copied().collect(),
            rows,
        });
    }

    /// Drop the rows of a delete whose jobs have all finished, keeping those
    /// whose file survived a failure or a cancel.
    fn job_done_for_removals(&mut self, job: JobId) {
        let mut ready = Vec::new();
        self.removals.retain_mut(|removal| {
            removal.jobs.remove(&job);
            if removal.jobs.is_empty() {
                ready.append(&mut removal.rows);
                false
            } else {
                true
            }
        });
        if ready.is_empty() {
            return;
        }

        let Some(store) = self.store.clone() else {
            return;
        };
        let gone: Vec<CatalogRow> = ready
            .into_iter()
            .filter(|(path, _)| !path.exists())
            .map(|(_, row)| row)
            .collect();
        if gone.is_empty() {
            return;
        }
        let result = with_transaction(store.as_ref(), |store| -> Result<(), OperationError> {
            for row in &gone {
                match *row {
                    CatalogRow::Item(id) => store.delete_item(id)?,
                    CatalogRow::Album(id) => store.delete_album(id)?,
                }
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!("Cannot drop catalog rows of deleted files: {}", e);
        }
    }

    /// Delete files that are not necessarily catalogued.
    pub fn delete_files(&mut self, files: &[Url], mode: DeleteMode) -> Result<Vec<JobId>, OperationError> {
        self.process_job(mode.kind(), files, None)
    }

    // ========================================================================
    // Job submission
    // ========================================================================

    /// Expand sidecars and submit local files, remote files and speculative
    /// remote sidecars as separate jobs.
    fn process_job(
        &mut self,
        kind: OperationKind,
        files: &[Url],
        destination: Option<Url>,
    ) -> Result<Vec<JobId>, OperationError> {
        let finder = SidecarFinder::new(files, &self.sidecars);
        let mut ids = Vec::new();

        if !finder.local_files.is_empty() {
            ids.push(self.create_job(kind, finder.local_files, destination.clone(), true, false)?);
        }

        if !finder.remote_files.is_empty() {
            ids.push(self.create_job(kind, finder.remote_files, destination.clone(), true, false)?);

            if !finder.possible_remote_sidecars.is_empty() {
                ids.push(self.create_job(
                    kind,
                    finder.possible_remote_sidecars,
                    destination,
                    false,
                    false,
                )?);
            }
        }

        Ok(ids)
    }

    fn create_job(
        &mut self,
        kind: OperationKind,
        sources: Vec<Url>,
        destination: Option<Url>,
        keep_errors: bool,
        notify_rename: bool,
    ) -> Result<JobId, OperationError> {
        if kind == OperationKind::Rename && sources.len() != 1 {
            return Err(OperationError::InvalidOperation(
                "a rename job takes exactly one source".into(),
            ));
        }

        let id = JobId::new();
        self.progress.attach(kind, id, sources.len());

        let request = JobRequest {
            id,
            operation: kind,
            sources,
            destination,
            keep_errors,
        };
        if let Err(e) = self.facility.submit(request) {
            self.progress.job_finished(kind, id);
            return Err(e.into());
        }

        self.jobs.insert(
            id,
            ActiveJob {
                kind,
                keep_errors,
                notify_rename,
            },
        );
        Ok(id)
    }

    // ========================================================================
    // Job reports
    // ========================================================================

    /// Drain pending job reports. Returns the number of jobs that finished.
    pub fn poll(&mut self) -> usize {
        let mut finished = 0;

        while let Ok(event) = self.job_events.try_recv() {
            let Some(job) = self.jobs.get(&event.job()).copied() else {
                continue;
            };

            match event {
                JobEvent::OneProcessed { job: id } => {
                    self.progress.advance(id, 1);
                }
                JobEvent::Renamed { from, to, .. } => {
                    if job.notify_rename {
                        for cache in &self.caches {
                            cache.delete_thumbnail(&from);
                            cache.file_changed(&to);
                        }
                        self.events.emit(CatalogEvent::RenameSucceeded(from));
                    }
                }
                JobEvent::RenameFailed { from, .. } => {
                    if job.notify_rename {
                        self.events.emit(CatalogEvent::RenameFailed(from));
                    }
                }
                JobEvent::Finished { job: id, errors } => {
                    self.jobs.remove(&id);
                    self.progress.job_finished(job.kind, id);
                    self.job_done_for_removals(id);
                    finished += 1;

                    if job.keep_errors && !errors.is_empty() {
                        let message = errors.join("\n");
                        tracing::error!("{} finished with errors:\n{}", job.kind.display_name(), message);
                        self.events.emit(CatalogEvent::OperationFailed {
                            kind: job.kind,
                            message,
                        });
                    }
                }
            }
        }

        finished
    }

    /// Cancel every job attached to the progress item of `kind`.
    pub fn cancel(&mut self, kind: OperationKind) {
        for job in self.progress.cancel(kind) {
            self.facility.cancel(job);
        }
    }
}

/// Split a rename into the sidecar base and the new primary file name.
/// `photo.nef` renamed to `photo2` gives (`photo2`, `photo2.nef`).
fn renamed_file_name(old_name: &str, new_name: &str) -> (String, String) {
    let extension = Path::new(old_name)
        .extension()
        .map(|e| e.to_string_lossy().to_string());

    match extension {
        Some(ext) => {
            let suffix = format!(".{}", ext);
            let split = new_name
                .len()
                .checked_sub(suffix.len())
                .filter(|&at| at > 0)
                .and_then(|at| Some((new_name.get(..at)?, new_name.get(at..)?)));
            match split {
                Some((base, tail)) if tail.to_lowercase() == suffix.to_lowercase() => {
                    (base.to_string(), new_name.to_string())
                }
                _ => (new_name.to_string(), format!("{}{}", new_name, suffix)),
            }
        }
        None => (new_name.to_string(), new_name.to_string()),
    }
}

/// `url` with its last path segment replaced by `name`.
fn sibling_url(url: &Url, name: &str) -> Result<Url, OperationError> {
    let mut sibling = url.clone();
    sibling
        .path_segments_mut()
        .map_err(|_| OperationError::InvalidOperation(format!("{} has no path", url)))?
        .pop()
        .push(name);
    Ok(sibling)
}
