//! Runs the generated shell commands, strictly in order, inside the workspace.
//!
//! Policy: a command rejected by the security rules is never spawned and aborts
//! the job. A non-zero exit is logged and the sequence continues, unless
//! `fail_on_command_error` escalates it. A timeout is logged, its output is
//! discarded, and the sequence continues.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::core::security::SecurityPolicy;
use crate::error::{JobError, JobResult};
use crate::io::config::AgentConfig;
use crate::io::process::run_command_with_timeout;

/// How one command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Failed { exit_code: Option<i32> },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub command: String,
    pub outcome: CommandOutcome,
}

pub struct CommandExecutor<'a> {
    workdir: PathBuf,
    policy: &'a SecurityPolicy,
    timeout: Duration,
    output_limit_bytes: usize,
    fail_on_error: bool,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(cfg: &AgentConfig, policy: &'a SecurityPolicy) -> Self {
        Self {
            workdir: cfg.workspace.clone(),
            policy,
            timeout: cfg.command_timeout(),
            output_limit_bytes: cfg.command_output_limit_bytes,
            fail_on_error: cfg.fail_on_command_error,
        }
    }

    /// Override the per-command timeout (bypasses the configuration minimum).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[instrument(skip_all, fields(count = commands.len()))]
    pub fn run_all(&self, commands: &[String]) -> JobResult<Vec<CommandReport>> {
        if commands.is_empty() {
            info!("no shell commands to execute");
            return Ok(Vec::new());
        }

        info!("executing {} shell commands", commands.len());
        let mut reports = Vec::with_capacity(commands.len());
        for (i, command) in commands.iter().enumerate() {
            info!("command {}/{}: {}", i + 1, commands.len(), command);
            let outcome = self.run_one(command)?;
            if self.fail_on_error
                && let CommandOutcome::Failed { exit_code } = outcome
            {
                return Err(JobError::CommandFailed {
                    command: command.clone(),
                    exit_code,
                });
            }
            reports.push(CommandReport {
                command: command.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    fn run_one(&self, command: &str) -> JobResult<CommandOutcome> {
        self.policy.check_command(command)?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).current_dir(&self.workdir);

        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .map_err(|err| JobError::CommandSpawn {
                command: command.to_string(),
                reason: format!("{err:#}"),
            })?;

        if output.timed_out {
            error!(
                timeout_secs = self.timeout.as_secs(),
                "command timed out after {}s: {}",
                self.timeout.as_secs(),
                command
            );
            return Ok(CommandOutcome::TimedOut);
        }

        let stdout = output.stdout_lossy();
        if !stdout.is_empty() {
            info!("command output: {stdout}");
        }
        let stderr = output.stderr_lossy();
        if !stderr.is_empty() {
            warn!("command stderr: {stderr}");
        }

        if output.status.success() {
            debug!("command completed successfully");
            Ok(CommandOutcome::Succeeded)
        } else {
            let exit_code = output.status.code();
            warn!(exit_code = ?exit_code, "command failed with exit code {exit_code:?}");
            Ok(CommandOutcome::Failed { exit_code })
        }
    }
}
