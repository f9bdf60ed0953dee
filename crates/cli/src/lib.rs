pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "agentmart",
    about = "Agentmart operator CLI",
    long_about = "Prepare the agentmart database, load demo content, manage admin accounts and inspect configuration.",
    after_help = "Examples:\n  agentmart migrate\n  agentmart seed --reset\n  agentmart admin --email ops@example.com --password 'long-passphrase'\n  agentmart config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo agents and key features (safe to repeat)")]
    Seed {
        #[arg(long, help = "Remove existing demo rows before loading")]
        reset: bool,
    },
    #[command(about = "Create an admin account, or reset the password of an existing one")]
    Admin {
        #[arg(long, help = "Sign-in email of the admin")]
        email: String,
        #[arg(long, help = "Password to set (at least 8 characters)")]
        password: String,
    },
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { reset } => commands::seed::run(reset),
        Command::Admin { email, password } => commands::admin::run(&email, &password),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
