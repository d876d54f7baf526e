pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "sitelens",
    about = "Sitelens operator CLI",
    long_about = "Ask analytics and SEO questions from the terminal, check credential readiness, and inspect configuration.",
    after_help = "Examples:\n  sitelens query \"Which URLs do not use HTTPS?\"\n  sitelens query \"Sessions by country last week\" --property-id 123456\n  sitelens doctor --json\n  sitelens config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Route a natural-language question to the agents and print the JSON response")]
    Query {
        #[arg(help = "The question to answer")]
        query: String,
        #[arg(long, help = "Analytics property id; required for analytics and fusion questions")]
        property_id: Option<String>,
    },
    #[command(about = "Validate config, LLM credentials, analytics credentials and the crawl export source")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Query { query, property_id } => commands::query::run(&query, property_id.as_deref()),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
