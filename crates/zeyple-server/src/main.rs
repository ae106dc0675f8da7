//! Zeyple - outbound mail filter entry point
//!
//! Reads one message from stdin and hands it, encrypted per recipient, to
//! the configured SMTP relay.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zeyple_common::types::{TITLE, VERSION};
use zeyple_common::Config;
use zeyple_core::{GpgDirectory, SmtpRelay, Zeyple};

/// Exit code for failures that are not a Zeyple error (EX_SOFTWARE)
const EXIT_SOFTWARE: u8 = 70;

#[derive(Parser, Debug)]
#[command(author, version, about = "Encrypt outgoing mail with the recipients' PGP keys", long_about = None)]
struct Cli {
    /// Configuration file (defaults to /etc/zeyple.conf and ./zeyple.conf)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Envelope recipients, in delivery order
    recipients: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail(e),
    };

    if let Some(log_file) = &config.zeyple.log_file {
        if let Err(e) = init_logging(log_file) {
            return fail(e);
        }
    }

    let span = info_span!("zeyple", pid = std::process::id());
    match run(config, cli.recipients).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            fail(e)
        }
    }
}

async fn run(config: Config, recipients: Vec<String>) -> Result<()> {
    info!("{} v{} ready to encrypt outgoing emails", TITLE, VERSION);

    let directory = GpgDirectory::new(&config.gpg)?;
    let transport = SmtpRelay::new(&config.relay);
    let zeyple = Zeyple::from_config(&config, directory, transport);

    let mut message = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut message)
        .await
        .context("Failed to read message from stdin")?;

    let delivered = zeyple.process_message(&message, &recipients).await?;
    info!(
        "Delivered {} of {} recipient(s)",
        delivered.len(),
        recipients.len()
    );

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// Log to `path` (append mode). Without a log file nothing is installed and
/// logging stays off.
fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Cannot open log file {}", path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_level(true),
        )
        .with(filter)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(())
}

fn fail(e: anyhow::Error) -> ExitCode {
    eprintln!("zeyple: {:#}", e);
    ExitCode::from(exit_code(&e))
}

/// sysexits code for `e`
fn exit_code(e: &anyhow::Error) -> u8 {
    e.downcast_ref::<zeyple_common::Error>()
        .and_then(|e| u8::try_from(e.exit_code()).ok())
        .unwrap_or(EXIT_SOFTWARE)
}
