pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use relay_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Relay operator CLI",
    long_about = "Inspect provider readiness, credential bindings, and protocol normalization for the Relay runtime.",
    after_help = "Examples:\n  relay doctor --json\n  relay bindings --provider claude\n  relay classify --provider openai --status 429 \"quota exceeded\"\n  relay voice --provider deepgram"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Check config, provider catalog, and credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Resolve credential bindings in priority order with secrets stripped")]
    Bindings {
        #[arg(long, help = "JSON file holding an array of credential profiles")]
        profiles: Option<PathBuf>,
        #[arg(long, help = "Restrict output to one provider (id, alias, or model name)")]
        provider: Option<String>,
    },
    #[command(about = "Normalize a raw provider response file into the canonical completion")]
    Normalize {
        #[arg(long, help = "Provider id, alias, or model name the response came from")]
        provider: String,
        file: PathBuf,
    },
    #[command(about = "Classify a provider error into the normalized error taxonomy")]
    Classify {
        #[arg(long, help = "Provider id, alias, or model name")]
        provider: String,
        #[arg(long, help = "HTTP status code returned by the provider")]
        status: Option<u16>,
        message: String,
    },
    #[command(about = "Resolve the voice backend, probing remote health, and report the active adapter")]
    Voice {
        #[arg(long, help = "JSON file holding an array of credential profiles")]
        profiles: Option<PathBuf>,
        #[arg(long, help = "Voice provider id or alias; defaults to voice.default_provider")]
        provider: Option<String>,
    },
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    // stdout carries command payloads; a second init in the same process is ignored.
    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Config => commands::config::run(),
        Command::Bindings { profiles, provider } => {
            commands::bindings::run(profiles.as_deref(), provider.as_deref())
        }
        Command::Normalize { provider, file } => commands::normalize::run(&provider, &file),
        Command::Classify { provider, status, message } => {
            commands::classify::run(&provider, status, &message)
        }
        Command::Voice { profiles, provider } => {
            commands::voice::run(profiles.as_deref(), provider.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
