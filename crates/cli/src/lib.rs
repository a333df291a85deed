pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tenderdesk_core::config::{AppConfig, LoadOptions};

use commands::chat::ChatCommand;
use commands::quote::QuoteCommand;
use commands::tender::TenderCommand;

#[derive(Debug, Parser)]
#[command(
    name = "tenderdesk",
    about = "TenderDesk operator CLI",
    long_about = "Manage tenders, quotes and tender chats stored in the local TenderDesk database.",
    after_help = "Examples:\n  tenderdesk migrate\n  tenderdesk tender create --deadline 2099-01-01T10:00 --provider org-aurora\n  tenderdesk quote actions quote_1700000000000_abcdefghi"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a tenderdesk.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo tenders, quotes and chat transcript")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Create, edit, launch and close tenders")]
    Tender {
        #[command(subcommand)]
        command: TenderCommand,
    },
    #[command(about = "Create quotes and move them through their lifecycle")]
    Quote {
        #[command(subcommand)]
        command: QuoteCommand,
    },
    #[command(about = "Read and append tender chat transcripts")]
    Chat {
        #[command(subcommand)]
        command: ChatCommand,
    },
}

/// Installs the global subscriber. Output goes to stderr so stdout stays JSON.
pub fn init_logging(config: &AppConfig) {
    use tenderdesk_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("logging already initialized: {error}");
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config, ..LoadOptions::default() };

    // Config errors are reported by the command itself.
    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Tender { command } => commands::tender::run(&options, command),
        Command::Quote { command } => commands::quote::run(&options, command),
        Command::Chat { command } => commands::chat::run(&options, command),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
