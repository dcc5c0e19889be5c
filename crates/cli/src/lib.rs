pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "tripflow",
    about = "Tripflow operator CLI",
    long_about = "Operate Tripflow migrations, demo seeding, automation scans, and config inspection.",
    after_help = "Examples:\n  tripflow migrate\n  tripflow scan\n  tripflow scan --rule payment_deadline --threshold 72\n  tripflow doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo dataset")]
    Seed,
    #[command(about = "Run automation rule scanners (all rules, or one with --rule)")]
    Scan {
        #[arg(long, help = "Run a single rule by id instead of the full set")]
        rule: Option<String>,
        #[arg(long, help = "Override the rule's configured window (days or hours)")]
        threshold: Option<i64>,
    },
    #[command(about = "Inspect effective configuration values")]
    Config,
    #[command(about = "Validate config and database connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn scan_accepts_rule_and_threshold_flags() {
        Cli::try_parse_from(["tripflow", "scan", "--rule", "payment_deadline", "--threshold", "72"])
            .expect("scan flags should parse");
    }

    #[test]
    fn unknown_subcommands_are_rejected() {
        assert!(Cli::try_parse_from(["tripflow", "defrag"]).is_err());
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Scan { rule, threshold } => commands::scan::run(rule, threshold),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
