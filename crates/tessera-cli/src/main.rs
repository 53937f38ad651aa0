//! Tessera CLI - tamper-evident ledger operations.
//!
//! Appends records to per-tenant hash chains, verifies chain integrity,
//! submits pending records to the tax authority and shows their status.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tessera_ledger::{ChainKey, LedgerKind, TenantId};

mod commands;
mod config_bridge;
mod theme;

use commands::{append, config, status, submit, verify};

/// Tessera - Tamper-evident Ledger
#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to an explicit configuration file
    #[arg(short, long, global = true, env = "TESSERA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a record to a chain
    Append {
        #[command(flatten)]
        chain: ChainArgs,

        /// Record kind
        #[arg(long = "type", value_enum, default_value = "issue")]
        kind: append::RecordKind,

        /// Correlation id (invoice number or message id)
        #[arg(long)]
        id: String,

        /// Correlation id of the corrected record (rectify only)
        #[arg(long)]
        corrects: Option<String>,

        /// Event kind, e.g. `message.sent` (event only)
        #[arg(long)]
        event: Option<String>,

        /// Business field as key=value (repeatable)
        #[arg(short, long = "field")]
        fields: Vec<String>,
    },

    /// Verify hash chain integrity
    Verify {
        #[command(flatten)]
        chain: OptionalChainArgs,

        /// Resume from this sequence id (requires --tenant)
        #[arg(long)]
        from: Option<u64>,
    },

    /// Submit pending records to the authority and reconcile the results
    Submit {
        #[command(flatten)]
        chain: OptionalChainArgs,
    },

    /// Show authority status of records
    Status {
        #[command(flatten)]
        chain: OptionalChainArgs,

        /// First sequence id to list
        #[arg(long, default_value = "1")]
        from: u64,

        /// Maximum records to list
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Selects one chain.
#[derive(Args)]
struct ChainArgs {
    /// Tenant id
    #[arg(short, long)]
    tenant: String,

    /// Ledger within the tenant (invoices or messages)
    #[arg(short, long, default_value = "invoices")]
    ledger: String,
}

/// Selects one chain, or every chain when `--tenant` is omitted.
#[derive(Args)]
struct OptionalChainArgs {
    /// Tenant id (all chains when omitted)
    #[arg(short, long)]
    tenant: Option<String>,

    /// Ledger within the tenant (invoices or messages)
    #[arg(short, long, default_value = "invoices")]
    ledger: String,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show resolved configuration with source annotations
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
        /// Show only a specific section (ledger, remision, logging)
        #[arg(short, long)]
        section: Option<String>,
    },
    /// Validate the current configuration
    Validate,
    /// Show config file paths being checked
    Paths,
}

impl ChainArgs {
    fn key(&self) -> Result<ChainKey> {
        chain_key(&self.tenant, &self.ledger)
    }
}

impl OptionalChainArgs {
    fn key(&self) -> Result<Option<ChainKey>> {
        self.tenant
            .as_deref()
            .map(|tenant| chain_key(tenant, &self.ledger))
            .transpose()
    }
}

fn chain_key(tenant: &str, ledger: &str) -> Result<ChainKey> {
    Ok(ChainKey::new(
        TenantId::new(tenant)?,
        ledger.parse::<LedgerKind>()?,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = tessera_config::Config::load(cli.config.as_deref());

    // Set up logging from config, with --verbose override.
    let log_config = if let Ok(r) = &resolved {
        let mut lc = config_bridge::to_log_config(&r.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        // Fallback if config loading fails.
        let level = if cli.verbose { "debug" } else { "warn" };
        tessera_telemetry::LogConfig::new(level)
    };
    if let Err(e) = tessera_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match cli.command {
        Commands::Config { command } => handle_config(command, cli.config.as_deref()),
        Commands::Append {
            chain,
            kind,
            id,
            corrects,
            event,
            fields,
        } => {
            let cfg = resolved?.config;
            let record_type = append::record_type(kind, corrects, event)?;
            let fields = append::parse_fields(&fields)?;
            append::append_record(
                config_bridge::open_storage(&cfg)?,
                &chain.key()?,
                record_type,
                &id,
                &fields,
            )
        },
        Commands::Verify { chain, from } => {
            let cfg = resolved?.config;
            verify::verify_chains(
                config_bridge::open_storage(&cfg)?,
                cfg.ledger.verify_page_size,
                chain.key()?.as_ref(),
                from,
            )
        },
        Commands::Submit { chain } => {
            let cfg = resolved?.config;
            let chain = chain.key()?;
            let service = config_bridge::build_service(&cfg, config_bridge::open_storage(&cfg)?)?;
            submit::submit(service, chain.as_ref()).await
        },
        Commands::Status {
            chain,
            from,
            limit,
            json,
        } => {
            let cfg = resolved?.config;
            let storage = config_bridge::open_storage(&cfg)?;
            match chain.key()? {
                Some(chain) => status::show_records(storage.as_ref(), &chain, from, limit, json),
                None => status::show_summary(storage.as_ref()),
            }
        },
    }
}

fn handle_config(command: ConfigCommands, explicit: Option<&std::path::Path>) -> Result<()> {
    match command {
        ConfigCommands::Show { format, section } => {
            config::show_config(explicit, &format, section.as_deref())
        },
        ConfigCommands::Validate => config::validate_config(explicit),
        ConfigCommands::Paths => config::show_paths(explicit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_from_parses() {
        let cli = Cli::try_parse_from(["tessera", "verify", "--tenant", "acme", "--from", "3"])
            .unwrap();
        match cli.command {
            Commands::Verify { chain, from } => {
                assert_eq!(from, Some(3));
                assert_eq!(chain.key().unwrap().unwrap().to_string(), "acme/invoices");
            },
            _ => panic!("expected verify"),
        }
    }

    #[test]
    fn test_append_fields_repeat() {
        let cli = Cli::try_parse_from([
            "tessera", "append", "-t", "acme", "--id", "INV-1", "-f", "total=10", "-f", "tax=2.1",
        ])
        .unwrap();
        match cli.command {
            Commands::Append { fields, kind, .. } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(kind, append::RecordKind::Issue);
            },
            _ => panic!("expected append"),
        }
    }

    #[test]
    fn test_chain_key_rejects_bad_input() {
        assert!(chain_key("../etc", "invoices").is_err());
        assert!(chain_key("acme", "orders").is_err());
    }
}
