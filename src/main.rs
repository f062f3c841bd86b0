use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{dispatcher, info};
use tracing_subscriber::EnvFilter;

use sword_client::{Collection, SwordClient, SwordConfig};

#[derive(Parser, Debug)]
#[command(name = "sword-client", version, about = "Deposit packages into SWORD repositories")]
struct Cli {
    /// JSON configuration file; SWORD_* environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log every request and response line
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the repository name and its collections
    Collections,
    /// List the items already deposited in a collection
    Items {
        /// Deposit URL of the collection
        collection_url: String,
    },
    /// Deposit a package and print the receipt
    Deposit {
        file: PathBuf,
        /// Deposit URL; the default collection is used when omitted
        #[arg(long)]
        collection_url: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        packaging: Option<String>,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        md5: Option<String>,
        /// Ask the server to validate without storing
        #[arg(long)]
        no_op: bool,
        #[arg(long)]
        verbose: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            SwordConfig::from_json(&json)?
        }
        None => SwordConfig::from_env().context("Failed to load SWORD_* configuration")?,
    };
    config.debug_mode |= cli.debug;

    let logger = dispatcher::get_default(|current| current.clone());
    let client = SwordClient::with_logger(config, logger)?;

    match cli.command {
        Command::Collections => {
            let name = client.repository_name()?;
            info!("Repository: {}", name.as_deref().unwrap_or("(unnamed)"));
            let collections = client.collections()?;
            println!("{}", serde_json::to_string_pretty(&collections)?);
        }
        Command::Items { collection_url } => {
            let collection = Collection::new(Some(collection_url));
            let items = client.collection_items(&collection)?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Deposit {
            file,
            collection_url,
            slug,
            packaging,
            mime_type,
            md5,
            no_op,
            verbose,
        } => {
            let mut headers = HashMap::new();
            for (key, value) in [
                ("packaging", packaging),
                ("mime_type", mime_type),
                ("md5", md5),
                ("no_op", no_op.then(|| "true".to_string())),
                ("verbose", verbose.then(|| "true".to_string())),
            ] {
                if let Some(value) = value {
                    headers.insert(key.to_string(), value);
                }
            }

            let mut metadata = HashMap::new();
            if let Some(slug) = slug {
                metadata.insert("slug".to_string(), slug);
            }

            let receipt = match collection_url {
                Some(url) => {
                    let request = sword_client::DepositRequest::new(Collection::new(Some(url)), &file)
                        .with_metadata(metadata)
                        .with_headers(headers);
                    client.deposit_into(&request)?
                }
                None => client.deposit(&file, metadata, headers)?,
            };
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}
