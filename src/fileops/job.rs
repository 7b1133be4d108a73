//! Physical file jobs.
//!
//! A job is a list of sources plus an operation. The thread facility runs one
//! worker thread per job and reports back over a single channel.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use url::Url;
use walkdir::WalkDir;

use crate::tasks::OperationKind;
use crate::trash::TrashManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl JobId {
    pub fn new() -> Self {
        use std::sync::atomic::AtomicU64;
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        JobId(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub id: JobId,
    pub operation: OperationKind,
    pub sources: Vec<Url>,
    /// Target directory for copy and move, new location for rename, unused
    /// for trash and delete.
    pub destination: Option<Url>,
    /// False when the sources may not exist; their errors are not reported.
    pub keep_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    OneProcessed { job: JobId },
    Renamed { job: JobId, from: Url, to: Url },
    RenameFailed { job: JobId, from: Url },
    Finished { job: JobId, errors: Vec<String> },
}

impl JobEvent {
    pub fn job(&self) -> JobId {
        match self {
            JobEvent::OneProcessed { job }
            | JobEvent::Renamed { job, .. }
            | JobEvent::RenameFailed { job, .. }
            | JobEvent::Finished { job, .. } => *job,
        }
    }
}

/// Executes jobs off the controlling thread.
pub trait JobFacility: Send {
    fn submit(&mut self, request: JobRequest) -> Result<()>;

    /// Ask a job to stop; it settles with a `Finished` event covering whatever completed.
    fn cancel(&mut self, job: JobId);
}

pub struct ThreadJobFacility {
    sender: mpsc::Sender<JobEvent>,
    trash: TrashManager,
    cancel_flags: HashMap<JobId, Arc<AtomicBool>>,
}

impl ThreadJobFacility {
    /// Returns the facility and the receiver its jobs report to.
    pub fn new(trash: TrashManager) -> (Self, mpsc::Receiver<JobEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                sender,
                trash,
                cancel_flags: HashMap::new(),
            },
            receiver,
        )
    }
}

impl JobFacility for ThreadJobFacility {
    fn submit(&mut self, request: JobRequest) -> Result<()> {
        // Worker threads drop their clone when done.
        self.cancel_flags.retain(|_, flag| Arc::strong_count(flag) > 1);

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flags.insert(request.id, cancel_flag.clone());

        let tx = self.sender.clone();
        let trash = self.trash.clone();

        tracing::debug!(
            "Submitting {:?} job {} with {} source(s)",
            request.operation,
            request.id.0,
            request.sources.len()
        );

        std::thread::Builder::new()
            .name(format!("photocat-job-{}", request.id.0))
            .spawn(move || run_job(request, cancel_flag, trash, tx))?;
        Ok(())
    }

    fn cancel(&mut self, job: JobId) {
        if let Some(flag) = self.cancel_flags.get(&job) {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

fn run_job(
    request: JobRequest,
    cancel_flag: Arc<AtomicBool>,
    trash: TrashManager,
    tx: mpsc::Sender<JobEvent>,
) {
    let job = request.id;
    let mut errors = Vec::new();

    for source in &request.sources {
        if cancel_flag.load(Ordering::SeqCst) {
            tracing::info!("Job {} cancelled", job.0);
            break;
        }

        match process_one(&request, source, &trash) {
            Ok(()) => {
                if request.operation == OperationKind::Rename {
                    if let Some(to) = request.destination.clone() {
                        let _ = tx.send(JobEvent::Renamed {
                            job,
                            from: source.clone(),
                            to,
                        });
                    }
                }
                let _ = tx.send(JobEvent::OneProcessed { job });
            }
            Err(e) => {
                if request.keep_errors {
                    tracing::error!("{:?} failed for {}: {:#}", request.operation, source, e);
                }
                if request.operation == OperationKind::Rename {
                    let _ = tx.send(JobEvent::RenameFailed {
                        job,
                        from: source.clone(),
                    });
                }
                errors.push(format!("{:#}", e));
            }
        }
    }

    let _ = tx.send(JobEvent::Finished { job, errors });
}

fn local_path(url: &Url) -> Result<PathBuf> {
    if url.scheme() != "file" {
        return Err(anyhow!("{} is not a local file", url));
    }
    url.to_file_path()
        .map_err(|_| anyhow!("{} is not a local file", url))
}

fn process_one(request: &JobRequest, source: &Url, trash: &TrashManager) -> Result<()> {
    let src = local_path(source)?;
    if !src.exists() {
        return Err(anyhow!("{} does not exist", src.display()));
    }

    match request.operation {
        OperationKind::Copy | OperationKind::Move => {
            let dir = request
                .destination
                .as_ref()
                .ok_or_else(|| anyhow!("No destination given"))
                .and_then(local_path)?;
            let name = src
                .file_name()
                .ok_or_else(|| anyhow!("{} has no file name", src.display()))?;
            let target = dir.join(name);
            if target.exists() {
                return Err(anyhow!("{} already exists", target.display()));
            }
            let result = if request.operation == OperationKind::Copy {
                copy_path(&src, &target)
            } else {
                move_path(&src, &target)
            };
            result.map_err(|e| anyhow!("{}: {}", src.display(), e))
        }
        OperationKind::Rename => {
            let target = request
                .destination
                .as_ref()
                .ok_or_else(|| anyhow!("No destination given"))
                .and_then(local_path)?;
            if target.exists() {
                return Err(anyhow!("{} already exists", target.display()));
            }
            move_path(&src, &target).map_err(|e| anyhow!("{}: {}", src.display(), e))
        }
        OperationKind::Trash => trash.move_to_trash(&src).map(|_| ()),
        OperationKind::Delete => remove_path(&src).map_err(|e| anyhow!("{}: {}", src.display(), e)),
    }
}

/// Copy a file, or a directory tree. A directory is never copied into itself.
pub(crate) fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        fs::copy(src, dst)?;
        return Ok(());
    }
    if dst.starts_with(src) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cannot copy {} into itself", src.display()),
        ));
    }

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file, or a directory tree.
pub(crate) fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Rename, falling back to copy and remove across filesystems.
pub(crate) fn move_path(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_path(src, dst)?;
            remove_path(src)
        }
        Err(e) => Err(e),
    }
}
