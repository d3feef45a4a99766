//! `helpdesk` command line.
//!
//! Prints JSON to stdout; logs go to stderr and follow `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use helpdesk::{AskRequest, HelpdeskConfig, HelpdeskOrchestrator};

#[derive(Parser, Debug)]
#[command(name = "helpdesk", version, about = "Multi-tenant retrieval-augmented helpdesk")]
struct Cli {
    /// TOML config file. Defaults to `<config dir>/helpdesk/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a question from a tenant's corpus.
    Ask {
        tenant: String,
        question: String,
        #[arg(long)]
        top_k: Option<usize>,
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Resolve an inbound address to a tenant.
    Resolve { address: String },

    /// Report health, optionally for one tenant after loading its corpus.
    Health {
        #[arg(long)]
        tenant: Option<String>,
    },

    /// Reload a tenant's corpus from the snapshot store.
    Refresh { tenant: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HelpdeskConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => HelpdeskConfig::load_default().context("failed to load default config")?,
    };
    let helpdesk = HelpdeskOrchestrator::from_config(&config);

    match cli.command {
        Command::Ask {
            tenant,
            question,
            top_k,
            min_score,
        } => {
            let mut request = AskRequest::new(tenant, question);
            request.top_k = top_k;
            request.min_score = min_score;
            print_json(&helpdesk.ask(request).await?)
        }
        Command::Resolve { address } => print_json(&helpdesk.resolve_tenant(&address).await?),
        Command::Health { tenant: None } => print_json(&helpdesk.health()),
        Command::Health {
            tenant: Some(tenant),
        } => {
            // A fresh process has nothing loaded; load so the report means something.
            print_json(&helpdesk.load_tenant_health(&tenant).await)
        }
        Command::Refresh { tenant } => print_json(&helpdesk.refresh(&tenant).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize response")?;
    println!("{json}");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
