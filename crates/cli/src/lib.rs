pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::roles::RoleAction;

#[derive(Debug, Parser)]
#[command(
    name = "routetracker",
    about = "Route Tracker operator CLI",
    long_about = "Operate the mileage voucher workflow: migrations, readiness checks, config inspection, role administration, and approval queues.",
    after_help = "Examples:\n  routetracker doctor --json\n  routetracker roles grant --actor admin-1 --user u-42 --role vp\n  routetracker queue --actor vp-1"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, DB connectivity, schema state, and notifier readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Grant, revoke, or list approver role assignments (admin only)")]
    Roles {
        #[command(subcommand)]
        command: RolesCommand,
    },
    #[command(about = "List vouchers awaiting the actor's approval stage")]
    Queue {
        #[arg(long, help = "Principal id of the approver")]
        actor: String,
    },
}

#[derive(Debug, Subcommand)]
enum RolesCommand {
    Grant {
        #[arg(long, help = "Principal id of the acting admin")]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long, help = "supervisor, vp, coo, or accountant")]
        role: String,
    },
    Revoke {
        #[arg(long, help = "Principal id of the acting admin")]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: String,
    },
    List {
        #[arg(long, help = "Principal id of the acting admin")]
        actor: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Roles { command } => match command {
            RolesCommand::Grant { actor, user, role } => {
                commands::roles::change(RoleAction::Grant, &actor, &user, &role)
            }
            RolesCommand::Revoke { actor, user, role } => {
                commands::roles::change(RoleAction::Revoke, &actor, &user, &role)
            }
            RolesCommand::List { actor } => commands::roles::list(&actor),
        },
        Command::Queue { actor } => commands::queue::run(&actor),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
