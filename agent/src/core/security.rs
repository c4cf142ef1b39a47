//! Pattern-based gate for task text, generated filenames, and shell commands.
//!
//! This is advisory-strength filtering, not a sandbox: it only catches
//! obviously dangerous input by pattern. Isolation is the container runtime's job.
//!
//! Task matches are reported and never block. Command matches block before the
//! process is spawned. Filenames are checked structurally (confinement inside
//! the workspace) and against reserved top-level directory names.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// A named, case-insensitive regular expression.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub name: &'static str,
    pub pattern: Regex,
}

impl PatternRule {
    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("(?i){pattern}"))?;
        Ok(Self { name, pattern })
    }

    /// Built-in table entry. Panics on an invalid pattern; the tables are constants.
    fn builtin(name: &'static str, pattern: &str) -> Self {
        Self::new(name, pattern)
            .unwrap_or_else(|err| panic!("security rule '{name}' has invalid pattern: {err}"))
    }

    pub fn is_match(&self, input: &str) -> bool {
        self.pattern.is_match(input)
    }
}

/// Ordered list of rules. The first matching rule is the reported one.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<PatternRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    /// Append a rule; later rules are consulted after earlier ones.
    pub fn push(&mut self, name: &'static str, pattern: &str) -> Result<(), regex::Error> {
        self.rules.push(PatternRule::new(name, pattern)?);
        Ok(())
    }

    pub fn first_match(&self, input: &str) -> Option<&PatternRule> {
        self.rules.iter().find(|rule| rule.is_match(input))
    }

    pub fn matches<'a>(&'a self, input: &'a str) -> impl Iterator<Item = &'a PatternRule> + 'a {
        self.rules.iter().filter(move |rule| rule.is_match(input))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

static TASK_RULES: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(vec![
        PatternRule::builtin("recursive-root-delete", r"rm\s+-rf\s+/"),
        PatternRule::builtin("sudo-delete", r"sudo\s+rm"),
        PatternRule::builtin("curl-pipe-shell", r"curl.*\|\s*bash"),
        PatternRule::builtin("wget-pipe-shell", r"wget.*\|\s*sh"),
        PatternRule::builtin("world-writable", r"chmod\s+777"),
        PatternRule::builtin("backgrounded-discard", r">/dev/null.*&"),
        PatternRule::builtin("netcat-listener", r"nc\s+-l"),
        PatternRule::builtin("python-os-oneliner", r"python.*-c.*import.*os"),
    ])
});

static COMMAND_RULES: LazyLock<RuleSet> = LazyLock::new(|| {
    RuleSet::new(vec![
        PatternRule::builtin("recursive-root-delete", r"rm\s+-rf\s+/"),
        PatternRule::builtin("sudo-delete", r"sudo\s+rm"),
        PatternRule::builtin("world-writable", r"chmod\s+777"),
        PatternRule::builtin("curl-pipe-shell", r"curl.*\|\s*(bash|sh)"),
        PatternRule::builtin("wget-pipe-shell", r"wget.*\|\s*(bash|sh)"),
        PatternRule::builtin("eval", r"eval\s+"),
        PatternRule::builtin("exec", r"exec\s+"),
        PatternRule::builtin("dev-tcp-socket", r"/dev/tcp"),
        PatternRule::builtin("netcat-listener", r"nc\s+-l"),
        PatternRule::builtin("python-os-oneliner", r"python.*-c.*import.*os"),
        PatternRule::builtin("backgrounded-discard", r">\s*/dev/null.*&"),
    ])
});

pub const RESERVED_TOP_LEVEL_DIRS: &[&str] = &["etc", "bin", "usr", "sys", "proc", "dev", "var"];
pub const EXECUTABLE_SUFFIXES: &[&str] = &["sh", "bat", "cmd", "exe", "scr"];

/// Blocking security failure for a generated filename or command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityRejection {
    #[error("dangerous command pattern '{rule}' detected: {command}")]
    Command { rule: &'static str, command: String },
    #[error("invalid filename (parent directory traversal): {0}")]
    ParentTraversal(String),
    #[error("invalid filename (absolute path): {0}")]
    AbsolutePath(String),
    #[error("invalid filename (reserved directory '{dir}'): {path}")]
    ReservedDirectory { dir: String, path: String },
    #[error("invalid filename (empty after normalization): {0:?}")]
    Empty(String),
    #[error("invalid filename (job protocol file): {0}")]
    ProtocolFile(String),
}

/// A filename that passed validation, normalized relative to the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedPath {
    pub relative: PathBuf,
    /// Suffix looks executable; allowed but worth a log line.
    pub executable: bool,
}

/// Rule tables plus the enable flag from configuration.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    enabled: bool,
    task_rules: RuleSet,
    command_rules: RuleSet,
}

impl SecurityPolicy {
    /// Built-in rule tables. With `enabled = false` only workspace confinement of
    /// filenames is enforced.
    pub fn standard(enabled: bool) -> Self {
        Self {
            enabled,
            task_rules: TASK_RULES.clone(),
            command_rules: COMMAND_RULES.clone(),
        }
    }

    pub fn with_rules(enabled: bool, task_rules: RuleSet, command_rules: RuleSet) -> Self {
        Self {
            enabled,
            task_rules,
            command_rules,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Names of task rules the text matches. Informational only.
    pub fn review_task(&self, task: &str) -> Vec<&'static str> {
        if !self.enabled {
            return Vec::new();
        }
        self.task_rules.matches(task).map(|rule| rule.name).collect()
    }

    pub fn check_command(&self, command: &str) -> Result<(), SecurityRejection> {
        if !self.enabled {
            return Ok(());
        }
        match self.command_rules.first_match(command) {
            Some(rule) => Err(SecurityRejection::Command {
                rule: rule.name,
                command: command.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn check_filename(&self, name: &str) -> Result<CheckedPath, SecurityRejection> {
        let relative = confine(name)?;
        if !self.enabled {
            return Ok(CheckedPath {
                relative,
                executable: false,
            });
        }

        if let Some(Component::Normal(first)) = relative.components().next() {
            let first = first.to_string_lossy();
            if let Some(dir) = RESERVED_TOP_LEVEL_DIRS
                .iter()
                .find(|dir| first.eq_ignore_ascii_case(dir))
            {
                return Err(SecurityRejection::ReservedDirectory {
                    dir: (*dir).to_string(),
                    path: name.to_string(),
                });
            }
        }

        let executable = relative
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                EXECUTABLE_SUFFIXES
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate))
            })
            .unwrap_or(false);

        Ok(CheckedPath {
            relative,
            executable,
        })
    }
}

/// Normalize `name` into a relative path that stays strictly inside the workspace.
fn confine(name: &str) -> Result<PathBuf, SecurityRejection> {
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(SecurityRejection::AbsolutePath(name.to_string()));
    }
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(segment) => relative.push(segment),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(SecurityRejection::ParentTraversal(name.to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityRejection::AbsolutePath(name.to_string()));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(SecurityRejection::Empty(name.to_string()));
    }
    Ok(relative)
}
