//! Job directory protocol: the well-known files that make up a job's state.
//!
//! A job is a directory holding up to four protocol files. The scheduler writes
//! the task file; the worker writes the status, log, and artifact files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_TASK_FILE: &str = "task.txt";
pub const DEFAULT_STATUS_FILE: &str = "status.txt";
pub const DEFAULT_LOG_FILE: &str = "log.txt";
pub const DEFAULT_ARTIFACT_FILE: &str = "output.zip";

/// Names of the protocol files inside a job directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolFiles {
    pub task: String,
    pub status: String,
    pub log: String,
    pub artifact: String,
}

impl Default for ProtocolFiles {
    fn default() -> Self {
        Self {
            task: DEFAULT_TASK_FILE.to_string(),
            status: DEFAULT_STATUS_FILE.to_string(),
            log: DEFAULT_LOG_FILE.to_string(),
            artifact: DEFAULT_ARTIFACT_FILE.to_string(),
        }
    }
}

impl ProtocolFiles {
    pub fn names(&self) -> [&str; 4] {
        [&self.task, &self.status, &self.log, &self.artifact]
    }

    /// Exact-name membership test; generated files sharing a protocol name lose.
    pub fn is_protocol_file(&self, name: &str) -> bool {
        self.names().contains(&name)
    }
}

/// Resolved paths for one job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLayout {
    pub root: PathBuf,
    pub task_path: PathBuf,
    pub status_path: PathBuf,
    pub log_path: PathBuf,
    pub artifact_path: PathBuf,
}

impl JobLayout {
    pub fn new(root: &Path, files: &ProtocolFiles) -> Self {
        Self {
            root: root.to_path_buf(),
            task_path: root.join(&files.task),
            status_path: root.join(&files.status),
            log_path: root.join(&files.log),
            artifact_path: root.join(&files.artifact),
        }
    }

    /// Layout with the default protocol file names.
    pub fn with_defaults(root: &Path) -> Self {
        Self::new(root, &ProtocolFiles::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_uses_wire_names() {
        let layout = JobLayout::with_defaults(Path::new("/jobs/abc"));
        assert_eq!(layout.task_path, Path::new("/jobs/abc/task.txt"));
        assert_eq!(layout.status_path, Path::new("/jobs/abc/status.txt"));
        assert_eq!(layout.log_path, Path::new("/jobs/abc/log.txt"));
        assert_eq!(layout.artifact_path, Path::new("/jobs/abc/output.zip"));
    }

    #[test]
    fn protocol_file_membership_is_exact() {
        let files = ProtocolFiles::default();
        assert!(files.is_protocol_file("log.txt"));
        assert!(files.is_protocol_file("output.zip"));
        assert!(!files.is_protocol_file("log.txt.bak"));
        assert!(!files.is_protocol_file("Task.txt"));
    }
}
