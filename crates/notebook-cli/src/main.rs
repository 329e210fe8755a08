//! notebook: command-line host for a notebook stored as JSON files.
//!
//! Every invocation loads the notebook through the sync layer, runs one
//! command and pushes the result back.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notebook_cli::{Command, FileRemote, Session, load_config};
use notebook_core::{Identity, StaticIdentity, SyncLayer};

#[derive(Parser, Debug)]
#[command(name = "notebook")]
#[command(about = "Hierarchical notebook backed by a directory of JSON files")]
struct Args {
    /// Directory holding the remote copy (one subdirectory per user)
    #[arg(short, long)]
    remote: PathBuf,

    /// Sign in as this user. Without it, nothing is loaded or saved.
    #[arg(short, long)]
    user: Option<String>,

    /// Directory containing config.json
    #[arg(short, long, default_value = ".")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug"
    } else {
        "info,notebook_cli=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args.config)?;

    let identity = match args.user {
        Some(user) => Identity::user(user),
        None => Identity::guest(),
    };

    let remote = FileRemote::new(args.remote);
    info!("Remote directory: {:?}", remote.base_path());

    let sync = SyncLayer::new(
        remote,
        StaticIdentity::new(identity),
        &config.sync,
    );
    let mut session = Session::new(sync, &config.notebook);

    session.load().await?;
    let output = session.execute(args.command).await?;
    println!("{}", output);

    Ok(())
}
