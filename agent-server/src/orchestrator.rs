//! Scheduling, status, and download over the job directory protocol.
//!
//! Each job is `<jobs_dir>/<uuid>/`. The orchestrator writes the task file and hands the
//! directory to a [`WorkerLauncher`]; from then on it only reads what the worker leaves
//! behind.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use agent::core::layout::{JobLayout, ProtocolFiles};
use agent::core::status::JobStatus;
use agent::error::JobError;
use agent::io::job_dir::{read_status, write_task};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::launcher::WorkerLauncher;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("output for job '{0}' not found")]
    ArtifactNotFound(String),

    #[error("no task provided")]
    InvalidTask,

    #[error("failed to launch worker for job {job_id}: {reason}")]
    Launch { job_id: String, reason: String },

    #[error(transparent)]
    Job(#[from] JobError),
}

/// Coarse job state reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportedStatus {
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub status: ReportedStatus,
    /// Download route, present once a terminal job left an archive.
    pub download: Option<String>,
    /// Raw status token; distinguishes `complete` from `error` for terminal jobs.
    pub state: JobStatus,
}

pub struct Orchestrator {
    jobs_dir: PathBuf,
    files: ProtocolFiles,
    launcher: Arc<dyn WorkerLauncher>,
}

impl Orchestrator {
    pub fn new(jobs_dir: PathBuf, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self {
            jobs_dir,
            files: ProtocolFiles::default(),
            launcher,
        }
    }

    pub fn jobs_dir(&self) -> &std::path::Path {
        &self.jobs_dir
    }

    /// Create a job for `task` and launch its worker. Returns the new job id.
    #[instrument(skip_all)]
    pub fn schedule(&self, task: &str) -> Result<String, OrchestratorError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(OrchestratorError::InvalidTask);
        }

        let job_id = Uuid::new_v4().to_string();
        let job_dir = self.jobs_dir.join(&job_id);
        fs::create_dir_all(&job_dir)
            .map_err(|err| JobError::io(format!("create job dir {}", job_dir.display()), err))?;
        let layout = JobLayout::new(&job_dir, &self.files);
        write_task(&layout, task)?;
        info!(job_id, "job created");

        if let Err(err) = self.launcher.launch(&job_id, &job_dir) {
            error!(job_id, err = %format!("{err:#}"), "failed to launch worker");
            return Err(OrchestratorError::Launch {
                job_id,
                reason: format!("{err:#}"),
            });
        }

        info!(job_id, "worker launched");
        Ok(job_id)
    }

    /// Report the coarse status of `job_id`.
    pub fn status(&self, job_id: &str) -> Result<StatusReport, OrchestratorError> {
        let layout = self.layout(job_id)?;
        let state = read_status(&layout)?.unwrap_or(JobStatus::Pending);

        if !state.is_terminal() {
            return Ok(StatusReport {
                status: ReportedStatus::Running,
                download: None,
                state,
            });
        }

        let download = layout
            .artifact_path
            .is_file()
            .then(|| format!("/download/{job_id}"));
        Ok(StatusReport {
            status: ReportedStatus::Complete,
            download,
            state,
        })
    }

    /// Path of the finished archive for `job_id`.
    pub fn artifact_path(&self, job_id: &str) -> Result<PathBuf, OrchestratorError> {
        let layout = self.layout(job_id)?;
        if !layout.artifact_path.is_file() {
            return Err(OrchestratorError::ArtifactNotFound(job_id.to_string()));
        }
        Ok(layout.artifact_path)
    }

    /// Resolve an existing job directory. Ids that are not UUIDs never reach the filesystem.
    fn layout(&self, job_id: &str) -> Result<JobLayout, OrchestratorError> {
        let id = Uuid::parse_str(job_id)
            .map_err(|_| OrchestratorError::NotFound(job_id.to_string()))?;
        let job_dir = self.jobs_dir.join(id.hyphenated().to_string());
        if !job_dir.is_dir() {
            return Err(OrchestratorError::NotFound(job_id.to_string()));
        }
        Ok(JobLayout::new(&job_dir, &self.files))
    }
}
