//! Size-bounded job log (`log.txt`).
//!
//! The log is appended to by the tracing file layer (see [`crate::logging`]).
//! Before a run starts the worker prunes it, keeping the most recent lines.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{JobError, JobResult};
use crate::io::job_dir::write_atomic;

/// Outcome of a prune check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    Missing,
    WithinLimit,
    Pruned { kept_lines: usize },
}

/// Rewrite `path` with its last `max_lines` lines when it exceeds `max_bytes`.
pub fn prune_if_needed(path: &Path, max_bytes: u64, max_lines: usize) -> JobResult<PruneOutcome> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(PruneOutcome::Missing),
        Err(err) => return Err(JobError::io(format!("stat log {}", path.display()), err)),
    };
    if size <= max_bytes {
        return Ok(PruneOutcome::WithinLimit);
    }

    let bytes = fs::read(path).map_err(|err| JobError::io(format!("read log {}", path.display()), err))?;
    let contents = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = contents.lines().collect();
    let keep = &lines[lines.len().saturating_sub(max_lines)..];
    let mut pruned = keep.join("\n");
    if !pruned.is_empty() {
        pruned.push('\n');
    }
    write_atomic(path, &pruned)?;
    Ok(PruneOutcome::Pruned {
        kept_lines: keep.len(),
    })
}
