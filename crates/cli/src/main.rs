mod commands;
mod config;
mod progress;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "bucketeer",
    version,
    about = "Object storage uploads, listings and pattern-based bulk deletion"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <config dir>/bucketeer/bucketeer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        commands::Command::Init(args) => commands::init::run(args, config).await,
        commands::Command::Upload(args) => commands::upload::run(args, config).await,
        commands::Command::Delete(args) => commands::delete::run(args, config).await,
        commands::Command::DeleteMany(args) => commands::delete_many::run(args, config).await,
        commands::Command::List(args) => commands::list::run(args, config).await,
        commands::Command::Versions(args) => commands::versions::run(args, config).await,
        commands::Command::Purge(args) => commands::purge::run(args, config).await,
    }
}
