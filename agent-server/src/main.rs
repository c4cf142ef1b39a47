//! Coding agent API server - schedules jobs and serves their status and output.

mod launcher;
mod orchestrator;
mod routes;
mod state;

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::launcher::{DockerLauncher, ProcessLauncher, WorkerLauncher};
use crate::orchestrator::Orchestrator;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LauncherKind {
    /// One container per job.
    Docker,
    /// Local `agent` process per job.
    Process,
}

#[derive(Parser)]
#[command(name = "agent-server")]
#[command(about = "HTTP API for scheduling coding-agent jobs")]
struct Args {
    /// Address to bind the server to
    #[arg(long, env = "AGENT_SERVER_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "AGENT_SERVER_PORT", default_value = "8000")]
    port: u16,

    /// Directory holding one subdirectory per job
    #[arg(long, env = "JOBS_DIR", default_value = "./jobs")]
    jobs_dir: PathBuf,

    /// How workers are started
    #[arg(long, value_enum, default_value = "docker")]
    launcher: LauncherKind,

    /// Worker image for the docker launcher
    #[arg(long, env = "AGENT_IMAGE", default_value = "coding-agent")]
    image: String,

    /// Worker binary for the process launcher
    #[arg(long, env = "AGENT_BIN", default_value = "agent")]
    agent_bin: PathBuf,

    /// Environment variables passed through to each worker container
    #[arg(
        long = "forward-env",
        value_delimiter = ',',
        default_value = "GROQ_API_KEY,OPENAI_API_KEY,GROQ_BASE_URL"
    )]
    forward_env: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("agent_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    fs::create_dir_all(&args.jobs_dir)
        .with_context(|| format!("create jobs dir {}", args.jobs_dir.display()))?;
    // Bind mounts need an absolute host path.
    let jobs_dir = args
        .jobs_dir
        .canonicalize()
        .with_context(|| format!("resolve jobs dir {}", args.jobs_dir.display()))?;

    let launcher = build_launcher(&args);
    let orchestrator = Orchestrator::new(jobs_dir, launcher);
    info!(
        jobs_dir = %orchestrator.jobs_dir().display(),
        launcher = ?args.launcher,
        "starting agent-server"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::api_router()
        .layer(cors)
        .with_state(AppState::new(orchestrator));

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_launcher(args: &Args) -> Arc<dyn WorkerLauncher> {
    match args.launcher {
        LauncherKind::Docker => {
            let env = forwarded_env(&args.forward_env, |key| std::env::var(key).ok());
            info!(
                image = %args.image,
                forwarded = ?env.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>(),
                "using docker launcher"
            );
            Arc::new(DockerLauncher::new(args.image.clone(), env))
        }
        LauncherKind::Process => {
            info!(agent_bin = %args.agent_bin.display(), "using process launcher");
            Arc::new(ProcessLauncher::new(args.agent_bin.clone()))
        }
    }
}

/// Pairs for the named variables that are set and non-empty, in the order given.
fn forwarded_env<F>(names: &[String], lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .map(|value| (name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment() {
        let args = Args::parse_from(["agent-server"]);
        assert_eq!(args.port, 8000);
        assert_eq!(args.launcher, LauncherKind::Docker);
        assert_eq!(args.image, "coding-agent");
        assert_eq!(
            args.forward_env,
            vec!["GROQ_API_KEY", "OPENAI_API_KEY", "GROQ_BASE_URL"]
        );
    }

    #[test]
    fn process_launcher_flags_parse() {
        let args = Args::parse_from([
            "agent-server",
            "--launcher",
            "process",
            "--agent-bin",
            "/usr/local/bin/agent",
            "--forward-env",
            "OPENAI_API_KEY",
        ]);
        assert_eq!(args.launcher, LauncherKind::Process);
        assert_eq!(args.agent_bin, PathBuf::from("/usr/local/bin/agent"));
        assert_eq!(args.forward_env, vec!["OPENAI_API_KEY"]);
    }

    #[test]
    fn only_set_variables_are_forwarded() {
        let names = vec![
            "GROQ_API_KEY".to_string(),
            "OPENAI_API_KEY".to_string(),
            "GROQ_BASE_URL".to_string(),
        ];
        let env = forwarded_env(&names, |key| match key {
            "GROQ_API_KEY" => Some("gsk_1".to_string()),
            "GROQ_BASE_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(env, vec![("GROQ_API_KEY".to_string(), "gsk_1".to_string())]);
    }
}
