//! Uniback CLI - a small bank ledger in your terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uniback_core::LogEvent;

mod commands;
mod output;

use commands::account::AccountCommands;
use commands::card::CardCommands;
use commands::logs::LogsCommands;
use commands::money::parse_amount;
use commands::user::UserCommands;
use commands::{failure_event, get_logger, log_event, Credentials};

/// Uniback - accounts, transfers and cards
#[derive(Parser)]
#[command(name = "ubk", version, about, long_about = None)]
struct Cli {
    /// User to act as
    #[arg(long, global = true, env = "UNIBACK_USER")]
    user: Option<String>,

    /// Password (prompted when omitted)
    #[arg(long, global = true, env = "UNIBACK_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Deposit money into one of your accounts
    Deposit {
        /// Account number
        number: String,
        /// Amount, at most two decimals
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Withdraw money from one of your accounts
    Withdraw {
        /// Account number
        number: String,
        /// Amount, at most two decimals
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transfer money from one of your accounts to any account
    Transfer {
        /// Source account number
        from: String,
        /// Destination account number
        to: String,
        /// Amount, at most two decimals
        #[arg(value_parser = parse_amount)]
        amount: Decimal,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the transaction history of an account
    History {
        /// Account number
        number: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage cards
    Card {
        #[command(subcommand)]
        command: CardCommands,
    },

    /// View the event log
    Logs {
        #[command(subcommand)]
        command: Option<LogsCommands>,
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Name used for event log entries
    fn name(&self) -> &'static str {
        match self {
            Commands::User { .. } => "user",
            Commands::Account { .. } => "account",
            Commands::Deposit { .. } => "deposit",
            Commands::Withdraw { .. } => "withdraw",
            Commands::Transfer { .. } => "transfer",
            Commands::History { .. } => "history",
            Commands::Card { .. } => "card",
            Commands::Logs { .. } => "logs",
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("UNIBACK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let name = cli.command.name();
    let logs_command = matches!(cli.command, Commands::Logs { .. });
    let result = run(cli);

    // viewing the log should not grow it
    if !logs_command {
        let logger = get_logger();
        let event = match &result {
            Ok(()) => LogEvent::new(format!("{}_completed", name)).with_command(name),
            Err(e) => failure_event(name, e),
        };
        log_event(&logger, event);
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is::<output::Reported>() {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    debug!(command = cli.command.name(), "running command");
    let credentials = Credentials {
        user: cli.user,
        password: cli.password,
    };

    match cli.command {
        Commands::User { command } => commands::user::run(command, &credentials),
        Commands::Account { command } => commands::account::run(command, &credentials),
        Commands::Deposit { number, amount, json } => commands::money::deposit(&number, amount, json, &credentials),
        Commands::Withdraw { number, amount, json } => commands::money::withdraw(&number, amount, json, &credentials),
        Commands::Transfer { from, to, amount, json } => {
            commands::money::transfer(&from, &to, amount, json, &credentials)
        }
        Commands::History { number, json } => commands::history::run(&number, json, &credentials),
        Commands::Card { command } => commands::card::run(command, &credentials),
        Commands::Logs { command, limit, errors, json } => commands::logs::run(command, limit, errors, json),
    }
}
