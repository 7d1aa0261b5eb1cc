#![forbid(unsafe_code)]
//! Identity ledger node: loads the chain, audits it and serves the REST API

use clap::Parser;
use identity_ledger::cli::{init_tracing, load_config_at};
use identity_ledger::node::LedgerNode;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults to ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config_at(args.config.as_deref())?;
    init_tracing(&config.logging.level);

    let node = Arc::new(LedgerNode::init(config)?);
    node.start().await?;

    Ok(())
}
