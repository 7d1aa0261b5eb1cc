#![forbid(unsafe_code)]
//! Command-line access to the identity ledger

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use identity_ledger::blockchain::ChainValidity;
use identity_ledger::cli::{init_tracing, load_config_at, open_registry, short_hash};
use identity_ledger::crypto::{canonical_json, KeyPair};
use identity_ledger::registry::IdentityRegistry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registers an identity and appends it to the ledger
    Register {
        /// Display name
        name: String,
        /// External identifier used for verification lookups
        external_id: String,
        /// Public key material, stored as given
        #[arg(long, default_value = "")]
        public_key: String,
        /// Generate a fresh secp256k1 keypair and register its public key
        #[arg(long, conflicts_with = "public_key")]
        generate_key: bool,
    },
    /// Looks up the first identity registered under an external identifier
    Verify { external_id: String },
    /// Lists every registration of an external identifier
    History { external_id: String },
    /// Shows the blocks of the ledger, newest first
    Show {
        /// Maximum number of blocks to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Validates the chain and its stored copy
    Validate,
    /// Exports the full chain as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generates a secp256k1 keypair
    Keygen,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config_at(cli.config.as_deref())?;
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Keygen => {
            print_keypair(&KeyPair::generate());
            Ok(())
        }
        command => {
            let mut registry = open_registry(&config)?;
            run(command, &mut registry)
        }
    }
}

fn run(command: Commands, registry: &mut IdentityRegistry) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Register {
            name,
            external_id,
            public_key,
            generate_key,
        } => {
            let public_key = if generate_key {
                let keypair = KeyPair::generate();
                print_keypair(&keypair);
                keypair.public_key_hex()
            } else {
                public_key
            };
            let registered = registry.register_identity(&name, &external_id, &public_key)?;
            println!("{}", "Identity registered".bright_green().bold());
            println!("  Local ID:    {}", registered.record.local_id.bright_white());
            println!("  Block:       #{}", registered.block_index);
            println!("  Block hash:  {}", registered.block_hash.bright_black());
        }
        Commands::Verify { external_id } => match registry.find_identity(&external_id) {
            Some(found) => {
                println!("{}", "Identity verified".bright_green().bold());
                println!("  Name:        {}", found.record.name.bright_white());
                println!("  External ID: {}", found.record.external_id);
                println!("  Local ID:    {}", found.record.local_id);
                println!("  Public key:  {}", found.record.public_key);
                println!("  Block:       #{}", found.block_index);
            }
            None => {
                println!("{}", format!("No identity registered for {}", external_id).yellow());
            }
        },
        Commands::History { external_id } => show_history(registry, &external_id),
        Commands::Show { limit } => show_blocks(registry, limit),
        Commands::Validate => match registry.audit()? {
            ChainValidity::Valid => {
                println!(
                    "{}",
                    format!("Chain valid ({} blocks)", registry.ledger().len()).bright_green()
                );
            }
            ChainValidity::InvalidAt { index, fault } => {
                eprintln!(
                    "{}",
                    format!("Integrity violation at block {}: {}", index, fault)
                        .red()
                        .bold()
                );
                eprintln!("{}", "Blocks from this index on must not be trusted.".red());
                std::process::exit(1);
            }
        },
        Commands::Export { output } => {
            let json = registry.ledger().export_json()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!(
                        "Exported {} blocks to {}",
                        registry.ledger().len(),
                        path.display()
                    );
                }
                None => println!("{}", json),
            }
        }
        Commands::Keygen => print_keypair(&KeyPair::generate()),
    }

    Ok(())
}

fn print_keypair(keypair: &KeyPair) {
    println!("{}", "Generated keypair".bright_cyan().bold());
    println!("  Public key:  {}", keypair.public_key_hex().bright_white());
    println!("  Secret key:  {}", keypair.secret_key_hex().bright_red());
    println!("{}", "  Keep the secret key private; it is not stored anywhere.".yellow());
}

fn show_history(registry: &IdentityRegistry, external_id: &str) {
    let history = registry.identity_history(external_id);
    if history.is_empty() {
        println!("{}", format!("No identity registered for {}", external_id).yellow());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Block").add_attribute(Attribute::Bold),
            Cell::new("Name").add_attribute(Attribute::Bold),
            Cell::new("Local ID").add_attribute(Attribute::Bold),
            Cell::new("Public key").add_attribute(Attribute::Bold),
        ]);
    for entry in &history {
        table.add_row(vec![
            Cell::new(format!("#{}", entry.block_index)),
            Cell::new(&entry.record.name),
            Cell::new(&entry.record.local_id),
            Cell::new(&entry.record.public_key),
        ]);
    }
    println!("{}", table);
    println!("{} registration(s); verification uses the first.", history.len());
}

fn show_blocks(registry: &IdentityRegistry, limit: usize) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Index").add_attribute(Attribute::Bold),
            Cell::new("Timestamp").add_attribute(Attribute::Bold),
            Cell::new("Previous").add_attribute(Attribute::Bold),
            Cell::new("Hash").add_attribute(Attribute::Bold),
            Cell::new("Data").add_attribute(Attribute::Bold),
        ]);

    for block in registry.ledger().blocks().iter().rev().take(limit) {
        let timestamp = chrono::DateTime::from_timestamp_millis(block.timestamp as i64)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| block.timestamp.to_string());
        table.add_row(vec![
            Cell::new(block.index),
            Cell::new(timestamp),
            Cell::new(short_hash(&block.previous_hash)),
            Cell::new(short_hash(&block.hash)),
            Cell::new(canonical_json(&block.data)),
        ]);
    }

    println!("{}", table);
    println!(
        "Showing {} of {} blocks",
        limit.min(registry.ledger().len()),
        registry.ledger().len()
    );
}
