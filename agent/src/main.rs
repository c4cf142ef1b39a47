//! Coding-agent worker.
//!
//! Runs one job inside a job directory (normally a container bind mount at
//! `/workspace`) and leaves `status.txt`, `log.txt`, and `output.zip` behind.

use std::fs;
use std::path::{Path, PathBuf};

use agent::core::response::parse_response;
use agent::core::status::JobStatus;
use agent::exit_codes;
use agent::io::config::{AgentConfig, load_config};
use agent::io::model::{ChatCompletionsClient, ProviderConfig};
use agent::logging;
use agent::pipeline::{JobOutcome, fail_job, prepare_workspace, run_job};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "agent",
    version,
    about = "Generate code with an LLM and execute it inside a job directory"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the job in the workspace directory to a terminal status.
    Run {
        /// Job directory (overrides `WORKSPACE_DIR` and the config file).
        #[arg(short, long)]
        workspace: Option<PathBuf>,
        /// Optional TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Parse a saved model response and print the normalized plan as JSON.
    Parse {
        /// File holding raw model output.
        file: PathBuf,
    },
    /// Validate configuration and print the effective values.
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run { workspace, config } => cmd_run(workspace, config.as_deref()),
        Command::Parse { file } => cmd_parse(&file),
        Command::CheckConfig { config } => cmd_check_config(config.as_deref()),
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn resolve_config(workspace: Option<PathBuf>, config: Option<&Path>) -> Result<AgentConfig> {
    let mut cfg = load_config(config, env_lookup)?;
    if let Some(workspace) = workspace {
        cfg.workspace = workspace;
        cfg.validate()?;
    }
    Ok(cfg)
}

fn cmd_run(workspace: Option<PathBuf>, config: Option<&Path>) -> Result<i32> {
    let cfg = resolve_config(workspace, config)?;
    let pruned = prepare_workspace(&cfg)?;
    logging::init(Some(&cfg.layout().log_path))?;
    tracing::debug!(?pruned, config = ?cfg, "configuration loaded");

    let client = ProviderConfig::from_env(env_lookup)
        .and_then(|provider| ChatCompletionsClient::new(provider, &cfg));
    let client = match client {
        Ok(client) => client,
        Err(err) => {
            fail_job(&cfg, &err)?;
            print_failure(&cfg);
            return Ok(exit_codes::JOB_FAILED);
        }
    };

    let outcome = run_job(&cfg, &client)?;
    Ok(report(&cfg, &outcome))
}

fn report(cfg: &AgentConfig, outcome: &JobOutcome) -> i32 {
    match outcome.status {
        JobStatus::Complete => {
            let layout = cfg.layout();
            println!("task completed successfully");
            println!("  generated files: {}", layout.root.display());
            println!("  download package: {}", layout.artifact_path.display());
            println!("  logs: {}", layout.log_path.display());
            exit_codes::OK
        }
        _ => {
            print_failure(cfg);
            exit_codes::JOB_FAILED
        }
    }
}

fn print_failure(cfg: &AgentConfig) {
    println!("task failed");
    println!("  1. check logs: {}", cfg.layout().log_path.display());
    println!("  2. verify GROQ_API_KEY / OPENAI_API_KEY");
    println!("  3. check task complexity and API limits");
    println!("  4. rerun with RUST_LOG=debug for detailed output");
}

fn cmd_parse(file: &Path) -> Result<i32> {
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file.display()))?;
    let response = parse_response(&raw)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&response).context("serialize response")?
    );
    Ok(exit_codes::OK)
}

fn cmd_check_config(config: Option<&Path>) -> Result<i32> {
    let cfg = resolve_config(None, config)?;
    print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
    Ok(exit_codes::OK)
}
