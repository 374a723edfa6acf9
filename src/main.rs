//! `buildq`, an operator's view of the build queue.

use anyhow::Context as _;
use buildq::signing::Keys;
use buildq::{CancellationToken, Queue, Router, Setup, Worker};
use clap::Parser as _;
use std::io::Write as _;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Inspect and exercise a build queue.
#[derive(Debug, clap::Parser)]
#[command(name = "buildq", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Connect to the queue and ping it once.
    Ping(QueueArgs),

    /// Print the number of queued items, in total or on one route.
    Length(LengthArgs),

    /// Print the route a worker's pool selectors map to.
    Route(RouteArgs),

    /// Generate a new signing keypair.
    Keygen,
}

#[derive(Debug, clap::Args)]
struct QueueArgs {
    #[command(flatten)]
    setup: Setup,
}

#[derive(Debug, clap::Args)]
struct LengthArgs {
    #[command(flatten)]
    setup: Setup,

    /// Only count this route.
    #[arg(long)]
    route: Option<String>,
}

#[derive(Debug, clap::Args)]
struct RouteArgs {
    #[command(flatten)]
    setup: Setup,

    #[arg(long, default_value = "")]
    flavor: String,

    #[arg(long, default_value = "")]
    platform: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .init();

    match cli.command {
        Command::Ping(args) => ping(&args.setup).await,
        Command::Length(args) => length(&args.setup, args.route.as_deref()).await,
        Command::Route(args) => route(&args.setup, &Worker::new(args.flavor, args.platform)),
        Command::Keygen => keygen(),
    }
}

/// Opens the queue without requiring signing keys; an operator
/// inspecting the queue usually doesn't have the private key.
async fn open(setup: &Setup) -> anyhow::Result<Arc<dyn Queue>> {
    buildq::connect(setup)
        .await
        .context("failed to open the queue")
}

async fn ping(setup: &Setup) -> anyhow::Result<()> {
    let queue = open(setup).await?;
    queue
        .ping(&CancellationToken::new())
        .await
        .context("ping failed")?;

    writeln!(std::io::stdout().lock(), "PONG ({})", queue.driver())?;
    Ok(())
}

async fn length(setup: &Setup, route: Option<&str>) -> anyhow::Result<()> {
    let queue = open(setup).await?;
    let cancel = CancellationToken::new();

    let length = match route {
        Some(route) => queue.route_length(&cancel, route).await,
        None => queue.length(&cancel).await,
    }
    .context("failed to read the queue length")?;

    writeln!(std::io::stdout().lock(), "{length}")?;
    Ok(())
}

fn route(setup: &Setup, worker: &Worker) -> anyhow::Result<()> {
    let route = Router::new(setup.routes.clone()).route(worker)?;

    writeln!(std::io::stdout().lock(), "{route}")?;
    Ok(())
}

fn keygen() -> anyhow::Result<()> {
    let generated = Keys::generate();
    let mut stdout = std::io::stdout().lock();

    writeln!(stdout, "QUEUE_PRIVATE_KEY={}", generated.private_key)?;
    writeln!(stdout, "QUEUE_PUBLIC_KEY={}", generated.public_key)?;
    Ok(())
}
