//! Worker driver: one job run from task to terminal status.
//!
//! `running` is persisted first, then each step runs only if the previous one
//! succeeded: read task, render prompt, call the model, parse, write files,
//! run commands, package the archive. The first job-fatal error short-circuits
//! to `error`; success persists `complete`. Either way the job directory ends
//! in a terminal, inspectable state.

use std::fs;

use anyhow::{Context, Result};
use tracing::{error, info, instrument, warn};

use crate::core::layout::JobLayout;
use crate::core::response::parse_response;
use crate::core::security::SecurityPolicy;
use crate::core::status::JobStatus;
use crate::error::{JobError, JobResult};
use crate::io::archive::{ArchiveSummary, create_archive};
use crate::io::commands::{CommandExecutor, CommandReport};
use crate::io::config::AgentConfig;
use crate::io::files::{FileWriter, WrittenFile};
use crate::io::job_dir::{read_task, write_status};
use crate::io::job_log::{PruneOutcome, prune_if_needed};
use crate::io::model::ModelClient;
use crate::io::prompt::render_task_prompt;

/// Characters of the task echoed into the log.
const TASK_PREVIEW_CHARS: usize = 200;

/// What a job run produced.
#[derive(Debug)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub written: Vec<WrittenFile>,
    pub commands: Vec<CommandReport>,
    pub archive: Option<ArchiveSummary>,
    /// The job-fatal error, when `status` is [`JobStatus::Error`].
    pub error: Option<JobError>,
}

#[derive(Debug, Default)]
struct Progress {
    written: Vec<WrittenFile>,
    commands: Vec<CommandReport>,
    archive: Option<ArchiveSummary>,
}

/// Create the workspace and prune the job log. Runs before logging is installed.
pub fn prepare_workspace(cfg: &AgentConfig) -> Result<PruneOutcome> {
    fs::create_dir_all(&cfg.workspace)
        .with_context(|| format!("create workspace {}", cfg.workspace.display()))?;
    let layout = cfg.layout();
    let outcome = prune_if_needed(&layout.log_path, cfg.max_log_size, cfg.max_log_lines)?;
    Ok(outcome)
}

/// Execute one job. Returns `Err` only when the terminal status itself cannot be persisted.
#[instrument(skip_all, fields(workspace = %cfg.workspace.display()))]
pub fn run_job<M: ModelClient>(cfg: &AgentConfig, model: &M) -> Result<JobOutcome> {
    let layout = cfg.layout();
    let policy = SecurityPolicy::standard(cfg.enable_security);
    info!("coding agent started");

    let mut progress = Progress::default();
    let attempt = write_status(&layout, JobStatus::Running)
        .and_then(|()| execute(cfg, &layout, &policy, model, &mut progress));

    let (status, error) = match attempt {
        Ok(()) => (JobStatus::Complete, None),
        Err(err) => {
            error!(kind = err.kind(), "job failed: {err}");
            (JobStatus::Error, Some(err))
        }
    };

    write_status(&layout, status)
        .with_context(|| format!("persist terminal status {status}"))?;
    info!(status = %status, "status updated to: {status}");
    if status == JobStatus::Complete {
        info!("job completed successfully");
    }

    Ok(JobOutcome {
        status,
        written: progress.written,
        commands: progress.commands,
        archive: progress.archive,
        error,
    })
}

/// Persist `error` for a job that could not start (e.g. no model credentials).
pub fn fail_job(cfg: &AgentConfig, err: &JobError) -> Result<()> {
    error!(kind = err.kind(), "job failed before the model call: {err}");
    let layout = cfg.layout();
    write_status(&layout, JobStatus::Error).context("persist error status")?;
    Ok(())
}

fn execute<M: ModelClient>(
    cfg: &AgentConfig,
    layout: &JobLayout,
    policy: &SecurityPolicy,
    model: &M,
    progress: &mut Progress,
) -> JobResult<()> {
    let task = read_task(layout)?;
    info!("task: {}", preview(&task));
    for rule in policy.review_task(&task) {
        warn!(rule, "potentially dangerous pattern detected in task: {rule}");
    }

    let prompt = render_task_prompt(&task)?;
    let raw = model.complete(&prompt)?;
    info!(chars = raw.len(), "received response from LLM");

    let response = match parse_response(&raw) {
        Ok(response) => response,
        Err(err) => {
            error!("failed to parse LLM response: {err}");
            return Err(err.into());
        }
    };
    info!(
        files = response.files.len(),
        commands = response.shell.len(),
        "parsed response: {} files, {} commands",
        response.files.len(),
        response.shell.len()
    );

    progress.written = FileWriter::new(layout, &cfg.files, policy).write_all(&response.files)?;
    progress.commands = CommandExecutor::new(cfg, policy).run_all(&response.shell)?;
    progress.archive = Some(create_archive(layout, &cfg.files)?);
    Ok(())
}

fn preview(task: &str) -> String {
    let mut chars = task.chars();
    let head: String = chars.by_ref().take(TASK_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
