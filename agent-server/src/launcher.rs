//! Worker launch backends.
//!
//! A launcher starts one detached worker for a prepared job directory and returns as soon
//! as the worker is running. Anything that happens after that is only visible through the
//! job directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use agent::io::process::run_command_with_timeout;
use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

/// Mount point of the job directory inside the worker container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Bytes of `docker run` output kept for diagnostics.
const DOCKER_OUTPUT_LIMIT_BYTES: usize = 16 * 1024;

/// Starts a worker for a job directory.
pub trait WorkerLauncher: Send + Sync {
    /// Launch the worker for `job_id`; `Ok` means the worker was started, not that it finished.
    fn launch(&self, job_id: &str, job_dir: &Path) -> Result<()>;
}

/// Runs each job in its own container through the `docker` CLI, with the job directory bind-mounted.
#[derive(Debug, Clone)]
pub struct DockerLauncher {
    image: String,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl DockerLauncher {
    pub fn new(image: impl Into<String>, env: Vec<(String, String)>) -> Self {
        Self {
            image: image.into(),
            env,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Arguments passed to `docker` for one job.
    pub fn run_args(&self, job_id: &str, job_dir: &Path) -> Vec<String> {
        let short_id: String = job_id.chars().take(8).collect();
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            format!("agent-{short_id}"),
            "-v".to_string(),
            format!("{}:{CONTAINER_WORKSPACE}", job_dir.display()),
            "-e".to_string(),
            format!("WORKSPACE_DIR={CONTAINER_WORKSPACE}"),
        ];
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args
    }
}

impl WorkerLauncher for DockerLauncher {
    #[instrument(skip_all, fields(job_id, image = %self.image))]
    fn launch(&self, job_id: &str, job_dir: &Path) -> Result<()> {
        let mut cmd = Command::new("docker");
        cmd.args(self.run_args(job_id, job_dir));

        let output = run_command_with_timeout(cmd, self.timeout, DOCKER_OUTPUT_LIMIT_BYTES)
            .context("run docker")?;
        if output.timed_out {
            bail!("docker run timed out after {}s", self.timeout.as_secs());
        }
        if !output.status.success() {
            bail!(
                "docker run exited with {}: {}",
                output.status,
                output.stderr_lossy()
            );
        }

        info!(container = %output.stdout_lossy(), "worker container started");
        Ok(())
    }
}

/// Spawns the local `agent` binary; for development hosts without a container runtime.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    agent_bin: PathBuf,
}

impl ProcessLauncher {
    pub fn new(agent_bin: PathBuf) -> Self {
        Self { agent_bin }
    }
}

impl WorkerLauncher for ProcessLauncher {
    #[instrument(skip_all, fields(job_id, agent_bin = %self.agent_bin.display()))]
    fn launch(&self, job_id: &str, job_dir: &Path) -> Result<()> {
        let mut child = Command::new(&self.agent_bin)
            .arg("run")
            .arg("--workspace")
            .arg(job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("spawn {}", self.agent_bin.display()))?;

        let pid = child.id();
        info!(pid, "worker process started");

        // Reap the child so finished workers do not linger as zombies.
        let job_id = job_id.to_string();
        thread::spawn(move || match child.wait() {
            Ok(status) => debug!(job_id, %status, "worker process exited"),
            Err(err) => warn!(job_id, err = %err, "failed to wait for worker process"),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_args_mount_job_dir_and_forward_env() {
        let launcher = DockerLauncher::new(
            "coding-agent",
            vec![("GROQ_API_KEY".to_string(), "gsk_test".to_string())],
        );
        let args = launcher.run_args(
            "0b0c6f64-2a55-4d5e-9f63-3b1f0c8f9a11",
            Path::new("/srv/jobs/0b0c6f64-2a55-4d5e-9f63-3b1f0c8f9a11"),
        );

        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "agent-0b0c6f64",
                "-v",
                "/srv/jobs/0b0c6f64-2a55-4d5e-9f63-3b1f0c8f9a11:/workspace",
                "-e",
                "WORKSPACE_DIR=/workspace",
                "-e",
                "GROQ_API_KEY=gsk_test",
                "coding-agent",
            ]
        );
    }

    #[test]
    fn docker_args_end_with_image_when_no_env_is_forwarded() {
        let launcher = DockerLauncher::new("custom/agent:1", Vec::new());
        let args = launcher.run_args("abc", Path::new("/jobs/abc"));

        assert_eq!(args[3], "agent-abc");
        assert_eq!(args.last().map(String::as_str), Some("custom/agent:1"));
        assert_eq!(args.iter().filter(|a| *a == "-e").count(), 1);
    }

    #[test]
    fn process_launcher_reports_missing_binary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let launcher = ProcessLauncher::new(dir.path().join("no-such-agent"));

        let err = launcher
            .launch("job", dir.path())
            .expect_err("missing binary");
        assert!(format!("{err:#}").contains("no-such-agent"));
    }
}
