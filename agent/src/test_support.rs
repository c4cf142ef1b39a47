//! Test-only helpers: scripted model clients and job directory fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tempfile::TempDir;
use zip::ZipArchive;

use crate::core::layout::JobLayout;
use crate::io::config::AgentConfig;
use crate::io::job_dir::write_task;
use crate::io::model::{ModelCallError, ModelClient};

/// Model client that replays queued responses and records prompts.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    responses: RefCell<VecDeque<Result<String, ModelCallError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelCallError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Client that answers once with `raw`.
    pub fn replying(raw: &str) -> Self {
        Self::new(vec![Ok(raw.to_string())])
    }

    pub fn failing(err: ModelCallError) -> Self {
        Self::new(vec![Err(err)])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(&self, prompt: &str) -> Result<String, ModelCallError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ModelCallError::EmptyContent {
                    provider: "scripted".to_string(),
                })
            })
    }
}

/// A job directory in a temp dir with a config pointing at it.
pub struct JobFixture {
    _temp: TempDir,
    pub cfg: AgentConfig,
}

impl JobFixture {
    /// Create a job directory; `task` of `None` leaves the task file absent.
    pub fn new(task: Option<&str>) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = AgentConfig {
            workspace: temp.path().join("job"),
            ..AgentConfig::default()
        };
        std::fs::create_dir_all(&cfg.workspace).expect("create job dir");
        if let Some(task) = task {
            write_task(&cfg.layout(), task).expect("write task");
        }
        Self { _temp: temp, cfg }
    }

    pub fn root(&self) -> &Path {
        &self.cfg.workspace
    }

    pub fn layout(&self) -> JobLayout {
        self.cfg.layout()
    }
}

/// Read every entry of a zip archive as `(name, bytes)`, in archive order.
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = File::open(path).expect("open archive");
    let mut archive = ZipArchive::new(file).expect("read archive");
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).expect("archive entry");
        let mut body = Vec::new();
        entry.read_to_end(&mut body).expect("read entry");
        entries.push((entry.name().to_string(), body));
    }
    entries
}
