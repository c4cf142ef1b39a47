//! Prompt rendering for the model call.

use minijinja::{Environment, context};

use crate::error::{JobError, JobResult};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Command classes named in the prompt. A hint only; the security rules enforce.
const FORBIDDEN_HINTS: &[&str] = &["rm -rf", "sudo", "curl | sh", "chmod 777", "eval"];

/// Render the user prompt demanding a `{files, shell}` JSON object for `task`.
pub fn render_task_prompt(task: &str) -> JobResult<String> {
    let mut env = Environment::new();
    env.add_template("task", TASK_TEMPLATE)
        .map_err(|err| JobError::Configuration(format!("task prompt template: {err}")))?;
    let template = env
        .get_template("task")
        .map_err(|err| JobError::Configuration(format!("task prompt template: {err}")))?;
    template
        .render(context! {
            task => task.trim(),
            forbidden => FORBIDDEN_HINTS,
        })
        .map_err(|err| JobError::Configuration(format!("render task prompt: {err}")))
}
