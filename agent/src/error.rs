//! Error taxonomy for a single job run.
//!
//! Every variant is job-fatal: the pipeline stops at the first one and the job
//! ends in `error`. Command timeouts and non-zero exits are not errors; they are
//! recorded as [`crate::io::commands::CommandOutcome`] values.

use thiserror::Error;

use crate::core::response::ParseError;
use crate::core::security::SecurityRejection;
use crate::io::model::ModelCallError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("invalid task: {0}")]
    InvalidTask(String),
    #[error("security rejection: {0}")]
    SecurityRejection(#[from] SecurityRejection),
    #[error("failed to parse model response: {0}")]
    Parse(#[from] ParseError),
    #[error("model call failed: {0}")]
    ModelCall(#[from] ModelCallError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not run command '{command}': {reason}")]
    CommandSpawn { command: String, reason: String },
    #[error("command failed with exit code {exit_code:?}: {command}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
    },
}

impl JobError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short classification used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InvalidTask(_) => "task",
            Self::SecurityRejection(_) => "security",
            Self::Parse(_) => "parse",
            Self::ModelCall(_) => "model_call",
            Self::Io { .. } => "io",
            Self::CommandSpawn { .. } | Self::CommandFailed { .. } => "command",
        }
    }
}

pub type JobResult<T> = Result<T, JobError>;
