//! Job lifecycle state machine.
//!
//! A job moves `pending -> running -> {complete, error}`. Terminal states are
//! never left, and `running` never returns to `pending`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Persisted job status token (`status.txt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Whether `self -> next` is a legal forward transition.
    ///
    /// Re-asserting the current non-terminal state is allowed so writes stay idempotent.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Pending, _) => true,
            (Self::Running, Self::Pending) => false,
            (Self::Running, _) => true,
            (current, next) => current == next,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status token '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    /// Surrounding whitespace is ignored; the token itself is case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_display_and_parse() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Complete,
            JobStatus::Error,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>(), Ok(status));
        }
    }

    #[test]
    fn parse_tolerates_trailing_newline() {
        assert_eq!("complete\n".parse::<JobStatus>(), Ok(JobStatus::Complete));
    }

    #[test]
    fn parse_rejects_unknown_token() {
        let err = "done".parse::<JobStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown job status token 'done'");
    }

    #[test]
    fn running_never_returns_to_pending() {
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Complete));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Error));
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [JobStatus::Complete, JobStatus::Error] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(JobStatus::Running));
            assert!(!terminal.can_transition_to(JobStatus::Pending));
        }
        assert!(!JobStatus::Complete.can_transition_to(JobStatus::Error));
        assert!(JobStatus::Error.can_transition_to(JobStatus::Error));
    }
}
