pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "deskbot",
    about = "Deskbot operator CLI",
    long_about = "Inspect configuration, apply ticket-store migrations and check readiness.",
    after_help = "Examples:\n  deskbot doctor --json\n  deskbot config\n  deskbot migrate --status"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending ticket-store migrations and print a JSON outcome")]
    Migrate {
        #[arg(long, help = "Report applied and pending versions without migrating")]
        status: bool,
    },
    #[command(about = "Show effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Check config, bot token, desk identifiers and database readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate { status: false } => commands::migrate::run(),
        Command::Migrate { status: true } => commands::migrate::status(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
