use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use desklink_server::{run_server, ServerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "desklink-server",
    about = "Helpdesk to GitHub issue-tracker bridge",
    version
)]
/// Command-line and environment configuration for the bridge server.
struct Cli {
    #[arg(
        long,
        env = "DESKLINK_BIND",
        default_value = "127.0.0.1:8090",
        help = "Address the HTTP server binds to"
    )]
    bind: String,

    #[arg(
        long = "state-dir",
        env = "DESKLINK_STATE_DIR",
        default_value = ".desklink",
        help = "Directory holding settings, bridge state, and the refresh cache"
    )]
    state_dir: PathBuf,

    #[arg(
        long = "github-token",
        env = "DESKLINK_GITHUB_TOKEN",
        help = "GitHub token override; the stored github.token setting is used when omitted"
    )]
    github_token: Option<String>,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_server(ServerConfig {
        bind: cli.bind,
        state_dir: cli.state_dir,
        github_token: cli.github_token,
    })
    .await
}
