//! Clipvault operator CLI.
//!
//! Usage:
//!   clipvault store   <name> <id> <file> [style]               - Upload a file
//!   clipvault url     <name> <id> <filename> [style]           - Print the public URL
//!   clipvault sign    <name> <id> <filename> <seconds> [style] - Print a signed URL
//!   clipvault destroy <name> <id> <filename> [style...]        - Delete stored files
//!
//! Storage settings come from `config/default`, `config/{RUN_MODE}` and
//! `CLIPVAULT__*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipvault_core::attachment::ORIGINAL_STYLE;
use clipvault_core::{Attachment, AttachmentOptions, QueuedFile, RecordRef, UrlOptions, Vault};
use clipvault_shared::AppConfig;

/// Type name given to records addressed from the command line.
const RECORD_CLASS: &str = "Upload";

/// Clipvault CLI: store and address attachment files.
#[derive(Parser, Debug)]
#[command(name = "clipvault", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// The attachment a command acts on.
#[derive(Args, Debug)]
struct Target {
    /// Attachment name (e.g. `avatar`).
    name: String,
    /// Record id.
    id: String,
}

impl Target {
    fn attachment(&self) -> Attachment {
        Attachment::new(&self.name, RecordRef::new(RECORD_CLASS).with_id(&self.id))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file as the original or as one style.
    Store {
        #[command(flatten)]
        target: Target,
        /// File to upload.
        file: PathBuf,
        /// Style to store it as.
        style: Option<String>,
    },
    /// Print the public URL.
    Url {
        #[command(flatten)]
        target: Target,
        /// Stored file name.
        filename: String,
        /// Style to address.
        style: Option<String>,
    },
    /// Print a signed URL.
    Sign {
        #[command(flatten)]
        target: Target,
        /// Stored file name.
        filename: String,
        /// Validity in seconds.
        #[arg(value_parser = clap::value_parser!(u64).range(1..))]
        seconds: u64,
        /// Style to address.
        style: Option<String>,
    },
    /// Delete the original and the given styles.
    Destroy {
        #[command(flatten)]
        target: Target,
        /// Stored file name.
        filename: String,
        /// Styles to delete besides the original.
        styles: Vec<String>,
    },
}

async fn run(command: Command, options: AttachmentOptions) -> anyhow::Result<()> {
    match command {
        Command::Store {
            target,
            file,
            style,
        } => {
            let file = QueuedFile::from_path(file);
            let mut vault = Vault::new(target.attachment(), options)?;
            match style.as_deref() {
                None | Some(ORIGINAL_STYLE) => vault.assign(file).await?,
                Some(style) => {
                    vault.attachment_mut().original_filename = Some(file.filename().to_string());
                    vault.store(style, file);
                }
            }
            vault.save().await?;
            let key = vault.path(style.as_deref()).unwrap_or_default();
            info!(key = %key, "stored");
            println!("{}", vault.url(style.as_deref(), UrlOptions::default()));
        }
        Command::Url {
            target,
            filename,
            style,
        } => {
            let vault = Vault::new(target.attachment().with_file(filename), options)?;
            println!("{}", vault.url(style.as_deref(), UrlOptions::default()));
        }
        Command::Sign {
            target,
            filename,
            seconds,
            style,
        } => {
            let vault = Vault::new(target.attachment().with_file(filename), options)?;
            let url = vault
                .expiring_url(Duration::from_secs(seconds), style.as_deref())
                .await?;
            println!("{url}");
        }
        Command::Destroy {
            target,
            filename,
            styles,
        } => {
            let mut vault = Vault::new(target.attachment().with_file(filename), options)?;
            let styles: Vec<&str> = styles.iter().map(String::as_str).collect();
            vault.destroy(&styles).await?;
            info!("destroyed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipvault=debug,clipvault_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    info!(stage = %config.stage, backend = %config.storage.backend, "configuration loaded");
    let options = AttachmentOptions::from_settings(&config.storage, config.stage.clone());

    run(cli.command, options).await
}
