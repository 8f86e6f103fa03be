//! `missive` - render, send and inspect email messages described as JSON.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use missive::{AssemblyOptions, EmailMessage, SessionConfig, SmtpTransport, Transport};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "missive")]
#[command(about = "Render, send and inspect email messages", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a JSON message and write its RFC 5322 form
    Render {
        /// Message description (JSON)
        #[arg(short, long, value_name = "FILE")]
        message: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Domain for a generated Message-ID
        #[arg(long)]
        domain: Option<String>,
    },

    /// Send a JSON message over SMTP
    Send {
        /// Message description (JSON)
        #[arg(short, long, value_name = "FILE")]
        message: PathBuf,

        /// Session configuration (defaults to <config dir>/missive/session.json)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Convert a raw RFC 5322 message to JSON
    Parse {
        /// Raw message file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("missive")
        .join("session.json")
}

fn load_message(path: &Path) -> Result<EmailMessage> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read message {}", path.display()))?;
    EmailMessage::from_json(&json).with_context(|| format!("Invalid message {}", path.display()))
}

fn render(message: &Path, out: Option<&Path>, domain: Option<String>) -> Result<()> {
    let email = load_message(message)?;
    let options = AssemblyOptions {
        domain,
        date: None,
    };
    let assembled = missive::assemble(&email, &options).context("Failed to assemble message")?;
    let bytes = assembled.to_transport_bytes()?;

    match out {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), message_id = %assembled.message_id, "Rendered message");
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

fn send(message: &Path, config: Option<PathBuf>) -> Result<()> {
    let email = load_message(message)?;
    let config_path = config.unwrap_or_else(default_config_path);
    let config = if config_path.exists() {
        SessionConfig::load(&config_path)
            .with_context(|| format!("Invalid session configuration {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "No session configuration found, using defaults");
        SessionConfig::default()
    };

    let transport = SmtpTransport::from_config(&config)?;
    let sent = transport.send(&email).context("Failed to send message")?;
    let Some(message_id) = sent.message_id else {
        bail!("Transport did not report a Message-ID");
    };
    println!("{message_id}");
    Ok(())
}

fn parse(input: &Path) -> Result<()> {
    let raw = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let email = missive::parse_message(&raw)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    println!("{}", email.to_json()?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "missive=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            message,
            out,
            domain,
        } => render(&message, out.as_deref(), domain),
        Commands::Send { message, config } => send(&message, config),
        Commands::Parse { input } => parse(&input),
    }
}
