pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "orgflow",
    about = "Orgflow operator CLI",
    long_about = "Operate the Orgflow database, inspect configuration and the reporting structure, and run the NPS trigger poller once.",
    after_help = "Examples:\n  orgflow doctor --json\n  orgflow seed\n  orgflow tree --leaders\n  orgflow process-triggers"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo organisation and surveys")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, approval levels and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Resolve every due NPS trigger once and report the outcome")]
    ProcessTriggers,
    #[command(about = "Print the reporting structure as an indented outline")]
    Tree {
        #[arg(long, help = "Only employees of this department")]
        department: Option<String>,
        #[arg(long, help = "Include inactive employees")]
        include_inactive: bool,
        #[arg(long, help = "Only roots and employees who manage somebody")]
        leaders: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::ProcessTriggers => commands::process_triggers::run(),
        Command::Tree { department, include_inactive, leaders } => {
            commands::tree::run(commands::tree::TreeOptions {
                department_id: department,
                include_inactive,
                leaders_only: leaders,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
