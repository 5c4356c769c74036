use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use healthdesk::config::{CollectorBackend, ThreadBackend};
use healthdesk::issue::IssueReport;
use healthdesk::tools::mock::MockProfile;
use healthdesk::{gateway, HealthdeskConfig, Issue, SessionServices};

#[derive(Parser)]
#[command(name = "healthdesk-gateway")]
#[command(version)]
#[command(about = "Human-supervised diagnostic sessions over WebSocket")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway.
    Serve(ServeArgs),
    /// Print the identity key of an issue description.
    Identity(IdentityArgs),
}

#[derive(Parser)]
struct ServeArgs {
    #[arg(long, env = "HEALTHDESK_CONFIG", default_value = "healthdesk.toml")]
    config: PathBuf,

    #[arg(long, env = "HEALTHDESK_BIND_ADDR")]
    bind_addr: Option<SocketAddr>,

    #[arg(long, env = "HEALTHDESK_COLLECTORS", value_parser = parse_backend)]
    collectors: Option<CollectorBackend>,

    #[arg(long, env = "HEALTHDESK_MOCK_PROFILE")]
    mock_profile: Option<MockProfile>,

    #[arg(long, env = "HEALTHDESK_KUBE_CONTEXT")]
    kube_context: Option<String>,

    /// Persist threads as JSON lines under this directory.
    #[arg(long, env = "HEALTHDESK_THREADS_DIR")]
    threads_dir: Option<PathBuf>,

    #[arg(long, env = "HEALTHDESK_MAX_STEPS")]
    max_steps: Option<u32>,

    #[arg(long, env = "HEALTHDESK_MODEL")]
    model: Option<String>,
}

#[derive(Parser)]
struct IdentityArgs {
    /// JSON file holding one issue description.
    #[arg(long)]
    issue: PathBuf,
}

fn parse_backend(raw: &str) -> Result<CollectorBackend, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "mock" => Ok(CollectorBackend::Mock),
        "kubectl" => Ok(CollectorBackend::Kubectl),
        other => Err(format!("unknown collector backend '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Identity(args) => identity(args),
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = HealthdeskConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(addr) = args.bind_addr {
        config.gateway.bind_addr = addr;
    }
    if let Some(backend) = args.collectors {
        config.collectors.backend = backend;
    }
    if let Some(profile) = args.mock_profile {
        config.collectors.mock_profile = profile;
    }
    if let Some(context) = args.kube_context {
        config.collectors.kube_context = Some(context);
    }
    if let Some(dir) = args.threads_dir {
        config.threads.backend = ThreadBackend::File;
        config.threads.dir = dir;
    }
    if let Some(max_steps) = args.max_steps {
        config.limits.max_steps = max_steps;
    }
    if let Some(model) = args.model {
        config.engine.model = model;
    }
    config.validate()?;

    let services = Arc::new(SessionServices::from_config(&config).await?);
    let listener = TcpListener::bind(config.gateway.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.gateway.bind_addr))?;
    gateway::serve(listener, services)
        .await
        .context("gateway server error")
}

fn identity(args: IdentityArgs) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(&args.issue)
        .with_context(|| format!("reading {}", args.issue.display()))?;
    let report: IssueReport = serde_json::from_str(&content).context("parsing issue")?;
    let issue = Issue::new(report)?;
    println!("{}", issue.key());
    Ok(())
}
