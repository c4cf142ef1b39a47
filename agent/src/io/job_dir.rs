//! Reads and writes of the job directory protocol files.
//!
//! The status file is the only cross-process synchronization point, so every
//! write goes through a temp file and a rename: a concurrent poller sees either
//! the old token or the new one, never a partial write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::core::layout::JobLayout;
use crate::core::status::JobStatus;
use crate::error::{JobError, JobResult};

/// Task used when a worker starts in a directory without a task file.
pub const DEFAULT_TASK: &str =
    "Create a simple 'Hello World' Python script that prints a greeting message.";

/// Read the task, creating the placeholder task file when none exists.
pub fn read_task(layout: &JobLayout) -> JobResult<String> {
    let path = &layout.task_path;
    match fs::read_to_string(path) {
        Ok(contents) => {
            let task = contents.trim();
            if task.is_empty() {
                return Err(JobError::InvalidTask(format!(
                    "task file is empty: {}",
                    path.display()
                )));
            }
            Ok(task.to_string())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            write_atomic(path, DEFAULT_TASK)?;
            info!(path = %path.display(), "created default task file");
            Ok(DEFAULT_TASK.to_string())
        }
        Err(err) => Err(JobError::io(format!("read task {}", path.display()), err)),
    }
}

/// Write the task file for a freshly created job directory.
pub fn write_task(layout: &JobLayout, task: &str) -> JobResult<()> {
    write_atomic(&layout.task_path, task)
}

/// Current persisted status, or `None` when no status file exists yet.
pub fn read_status(layout: &JobLayout) -> JobResult<Option<JobStatus>> {
    let path = &layout.status_path;
    match fs::read_to_string(path) {
        Ok(contents) => contents.parse::<JobStatus>().map(Some).map_err(|err| {
            JobError::io(
                format!("parse status {}", path.display()),
                std::io::Error::new(ErrorKind::InvalidData, err),
            )
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(JobError::io(format!("read status {}", path.display()), err)),
    }
}

/// Persist `next` after checking it is a legal transition from the stored status.
pub fn write_status(layout: &JobLayout, next: JobStatus) -> JobResult<()> {
    let current = read_status(layout)?.unwrap_or(JobStatus::Pending);
    if !current.can_transition_to(next) {
        return Err(JobError::io(
            format!("update status {}", layout.status_path.display()),
            std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("illegal status transition {current} -> {next}"),
            ),
        ));
    }
    write_atomic(&layout.status_path, next.as_str())?;
    debug!(from = %current, to = %next, "status updated");
    Ok(())
}

/// Write `contents` to a uniquely named sibling temp file and rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> JobResult<()> {
    let parent = path.parent().ok_or_else(|| {
        JobError::io(
            format!("resolve parent of {}", path.display()),
            std::io::Error::new(ErrorKind::InvalidInput, "path has no parent"),
        )
    })?;
    fs::create_dir_all(parent)
        .map_err(|err| JobError::io(format!("create directory {}", parent.display()), err))?;
    let mut tmp = NamedTempFile::new_in(parent)
        .map_err(|err| JobError::io(format!("create temp file in {}", parent.display()), err))?;
    tmp.write_all(contents.as_bytes())
        .map_err(|err| JobError::io(format!("write temp file {}", tmp.path().display()), err))?;
    tmp.persist(path)
        .map_err(|err| JobError::io(format!("replace {}", path.display()), err.error))?;
    Ok(())
}
