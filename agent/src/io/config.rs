//! Worker configuration.
//!
//! Built once at worker start from an optional TOML file, then environment
//! overrides, then CLI flags, and passed by reference to every component.
//! Environment access is confined to [`load_config`], which takes a lookup
//! function so tests never touch the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::layout::{JobLayout, ProtocolFiles};
use crate::error::{JobError, JobResult};

pub const COMMAND_TIMEOUT_BOUNDS: (u64, u64) = (10, 3600);
pub const MAX_TOKENS_BOUNDS: (u32, u32) = (100, 32768);
pub const TEMPERATURE_BOUNDS: (f64, f64) = (0.0, 2.0);

/// Immutable settings for one job run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Job directory the worker operates in.
    pub workspace: PathBuf,
    /// Prune `log.txt` once it grows beyond this many bytes.
    pub max_log_size: u64,
    /// Lines kept when pruning.
    pub max_log_lines: usize,
    pub command_timeout_secs: u64,
    /// Captured stdout/stderr per command beyond this many bytes is discarded.
    pub command_output_limit_bytes: usize,
    pub max_tokens: u32,
    pub temperature: f64,
    pub enable_security: bool,
    /// Escalate a non-zero command exit to a job error.
    pub fail_on_command_error: bool,
    /// Protocol file names. Must stay the last field: TOML tables follow plain values.
    pub files: ProtocolFiles,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("./workspace"),
            max_log_size: 1_000_000,
            max_log_lines: 1000,
            command_timeout_secs: 120,
            command_output_limit_bytes: 100_000,
            max_tokens: 4096,
            temperature: 0.1,
            enable_security: true,
            fail_on_command_error: false,
            files: ProtocolFiles::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> JobResult<()> {
        let (lo, hi) = MAX_TOKENS_BOUNDS;
        if !(lo..=hi).contains(&self.max_tokens) {
            return Err(invalid(format!(
                "MAX_TOKENS must be between {lo} and {hi}, got: {}",
                self.max_tokens
            )));
        }
        let (lo, hi) = TEMPERATURE_BOUNDS;
        if !self.temperature.is_finite() || !(lo..=hi).contains(&self.temperature) {
            return Err(invalid(format!(
                "TEMPERATURE must be between {lo:.1} and {hi:.1}, got: {}",
                self.temperature
            )));
        }
        let (lo, hi) = COMMAND_TIMEOUT_BOUNDS;
        if !(lo..=hi).contains(&self.command_timeout_secs) {
            return Err(invalid(format!(
                "COMMAND_TIMEOUT must be between {lo} and {hi} seconds, got: {}",
                self.command_timeout_secs
            )));
        }
        if self.max_log_size == 0 {
            return Err(invalid("MAX_LOG_SIZE must be > 0".to_string()));
        }
        if self.max_log_lines == 0 {
            return Err(invalid("MAX_LOG_LINES must be > 0".to_string()));
        }
        if self.command_output_limit_bytes == 0 {
            return Err(invalid("command_output_limit_bytes must be > 0".to_string()));
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(invalid("workspace must not be empty".to_string()));
        }

        let names = self.files.names();
        for name in names {
            if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
                return Err(invalid(format!(
                    "protocol file name must be a single path component, got: {name:?}"
                )));
            }
        }
        for (i, name) in names.iter().enumerate() {
            if names[i + 1..].contains(name) {
                return Err(invalid(format!("protocol file name used twice: {name}")));
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> JobLayout {
        JobLayout::new(&self.workspace, &self.files)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn invalid(message: String) -> JobError {
    JobError::Configuration(message)
}

/// Load configuration: defaults, then `path` (if given), then environment overrides.
///
/// `env` resolves variable names; pass `|key| std::env::var(key).ok()` in binaries.
pub fn load_config<F>(path: Option<&Path>, env: F) -> JobResult<AgentConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match path {
        Some(path) => {
            let contents = fs::read_to_string(path)
                .map_err(|err| JobError::io(format!("read config {}", path.display()), err))?;
            toml::from_str(&contents)
                .map_err(|err| invalid(format!("parse {}: {err}", path.display())))?
        }
        None => AgentConfig::default(),
    };
    apply_env_overrides(&mut cfg, &env)?;
    cfg.validate()?;
    Ok(cfg)
}

fn apply_env_overrides<F>(cfg: &mut AgentConfig, env: &F) -> JobResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = env("WORKSPACE_DIR") {
        cfg.workspace = PathBuf::from(dir);
    }
    override_parsed(env, "MAX_LOG_SIZE", &mut cfg.max_log_size)?;
    override_parsed(env, "MAX_LOG_LINES", &mut cfg.max_log_lines)?;
    override_parsed(env, "COMMAND_TIMEOUT", &mut cfg.command_timeout_secs)?;
    override_parsed(env, "MAX_TOKENS", &mut cfg.max_tokens)?;
    override_parsed(env, "TEMPERATURE", &mut cfg.temperature)?;
    if let Some(raw) = env("ENABLE_SECURITY_VALIDATION") {
        cfg.enable_security = parse_bool(&raw);
    }
    if let Some(raw) = env("FAIL_ON_COMMAND_ERROR") {
        cfg.fail_on_command_error = parse_bool(&raw);
    }
    Ok(())
}

fn override_parsed<F, T>(env: &F, key: &str, slot: &mut T) -> JobResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = env(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|err| invalid(format!("{key}={raw:?} is not valid: {err}")))?;
    }
    Ok(())
}

/// `true|1|yes|on` (any case) are true; everything else is false.
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = load_config(None, env_from(&[])).expect("load");
        assert_eq!(cfg, AgentConfig::default());
        assert_eq!(cfg.command_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn env_overrides_apply() {
        let cfg = load_config(
            None,
            env_from(&[
                ("WORKSPACE_DIR", "/workspace"),
                ("COMMAND_TIMEOUT", "30"),
                ("MAX_TOKENS", "2048"),
                ("TEMPERATURE", "0.7"),
                ("ENABLE_SECURITY_VALIDATION", "off"),
                ("FAIL_ON_COMMAND_ERROR", "YES"),
            ]),
        )
        .expect("load");
        assert_eq!(cfg.workspace, PathBuf::from("/workspace"));
        assert_eq!(cfg.command_timeout_secs, 30);
        assert_eq!(cfg.max_tokens, 2048);
        assert!((cfg.temperature - 0.7).abs() < f64::EPSILON);
        assert!(!cfg.enable_security);
        assert!(cfg.fail_on_command_error);
    }

    #[test]
    fn out_of_bounds_values_are_configuration_errors() {
        for (key, value, needle) in [
            ("COMMAND_TIMEOUT", "5", "COMMAND_TIMEOUT"),
            ("COMMAND_TIMEOUT", "3601", "COMMAND_TIMEOUT"),
            ("MAX_TOKENS", "99", "MAX_TOKENS"),
            ("MAX_TOKENS", "40000", "MAX_TOKENS"),
            ("TEMPERATURE", "2.5", "TEMPERATURE"),
            ("TEMPERATURE", "NaN", "TEMPERATURE"),
        ] {
            let err = load_config(None, env_from(&[(key, value)])).unwrap_err();
            assert!(matches!(err, JobError::Configuration(_)), "{key}={value}");
            assert!(err.to_string().contains(needle), "{err}");
        }
    }

    #[test]
    fn unparsable_env_value_is_rejected() {
        let err = load_config(None, env_from(&[("MAX_TOKENS", "lots")])).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS=\"lots\""));
    }

    #[test]
    fn toml_file_is_read_before_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent.toml");
        fs::write(
            &path,
            "workspace = \"/jobs/1\"\nmax_tokens = 1000\n\n[files]\nlog = \"agent.log\"\n",
        )
        .expect("write");

        let cfg = load_config(Some(&path), env_from(&[("MAX_TOKENS", "1500")])).expect("load");
        assert_eq!(cfg.workspace, PathBuf::from("/jobs/1"));
        assert_eq!(cfg.max_tokens, 1500);
        assert_eq!(cfg.files.log, "agent.log");
        assert_eq!(cfg.files.task, "task.txt");
        assert_eq!(cfg.layout().log_path, PathBuf::from("/jobs/1/agent.log"));
    }

    #[test]
    fn duplicate_protocol_names_are_rejected() {
        let mut cfg = AgentConfig::default();
        cfg.files.log = cfg.files.task.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        for raw in ["true", "1", "Yes", "ON"] {
            assert!(parse_bool(raw));
        }
        for raw in ["false", "0", "no", "maybe", ""] {
            assert!(!parse_bool(raw));
        }
    }
}
