//! Command-line front end for the missive bulk-send pipeline
//!
//! - `validate`: check addresses against the block lists and DNS
//! - `render`: print a message exactly as one recipient would receive it
//! - `send`: run a bulk send into the outbox directory
//! - `feedback`: apply a bounce or complaint notification

#![allow(clippy::print_stdout)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use missive::{Config, Missive, SHUTDOWN_BROADCAST, find_config_file, shutdown};
use missive_common::{internal, logging};
use missive_delivery::{Audience, Message};

/// Mailing-list bulk delivery
#[derive(Parser, Debug)]
#[command(name = "missive")]
#[command(about = "Validate, render and send mailing-list messages", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides the default search)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate one or more addresses
    Validate {
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Render a message for one recipient to stdout
    Render {
        /// Message as JSON
        #[arg(short, long)]
        message: PathBuf,
        /// Recipient address
        #[arg(short, long)]
        to: String,
    },
    /// Send a message to every verified subscriber, or to `--to` only
    Send {
        /// Message as JSON
        #[arg(short, long)]
        message: PathBuf,
        /// Explicit recipients; may be repeated
        #[arg(short, long)]
        to: Vec<String>,
    },
    /// Apply a delivery feedback notification
    Feedback {
        /// Notification as JSON
        file: PathBuf,
        /// The file holds an SNS envelope rather than the bare event
        #[arg(long)]
        sns: bool,
    },
}

fn read_message(path: &Path) -> anyhow::Result<Message> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read message from {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let config = Config::load(&config_path)?;
    logging::init(&config.logging);

    let missive = Missive::from_config(config).await?;
    internal!(config = %config_path.display(), "Configuration loaded");

    match cli.command {
        Commands::Validate { addresses } => {
            let mut invalid = 0;
            for (address, result) in missive.validate(&addresses).await {
                match result {
                    Ok(mailbox) => println!("ok       {address} ({mailbox})"),
                    Err(err) => {
                        invalid += 1;
                        println!("invalid  {address}: {err}");
                    }
                }
            }
            if invalid > 0 {
                anyhow::bail!("{invalid} of {} address(es) invalid", addresses.len());
            }
        }
        Commands::Render { message, to } => {
            let raw = missive.render(&read_message(&message)?, &to).await?;
            std::io::stdout().write_all(&raw)?;
        }
        Commands::Send { message, to } => {
            let message = read_message(&message)?;
            let audience = if to.is_empty() {
                Audience::Subscribers
            } else {
                Audience::Addresses(to)
            };

            let signals = SHUTDOWN_BROADCAST.subscribe();
            tokio::spawn(async {
                if let Err(err) = shutdown().await {
                    internal!(level = ERROR, error = %err, "Signal handling failed");
                }
            });
            let report = missive.send(&message, audience, signals).await?;

            println!(
                "sent {}, failed {}{}",
                report.sent,
                report.failures.len(),
                if report.cancelled { " (cancelled)" } else { "" }
            );
            for failure in &report.failures {
                let retry = if failure.retryable { " (retryable)" } else { "" };
                println!("  {}: {}{retry}", failure.address, failure.error);
            }
        }
        Commands::Feedback { file, sns } => {
            let payload = std::fs::read_to_string(&file)?;
            let outcome = missive.feedback(&payload, sns).await?;
            missive.save().await?;
            println!(
                "removed {}, restored {}, failed {}",
                outcome.removed, outcome.restored, outcome.failed
            );
        }
    }

    Ok(())
}
