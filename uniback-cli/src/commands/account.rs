//! Account commands - open, list and change status

use anyhow::Result;
use clap::Subcommand;

use super::{Credentials, Session};
use crate::output;
use uniback_core::{AccountStatus, AccountType, AccountView};

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    New {
        /// Account type (debit, credit)
        #[arg(long = "type", default_value = "debit")]
        account_type: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Freeze, unfreeze or close an account
    Status {
        /// Account number
        number: String,
        /// New status (active, frozen, closed)
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: AccountCommands, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let call = session.call();
    let service = &session.ctx.account_service;

    match command {
        AccountCommands::New { account_type, json } => {
            let account_type: AccountType = account_type.parse()?;
            let result = service.open_account(&call, &session.username, account_type);
            output::emit(result, json, |view| {
                output::success(&format!("Opened {} account {}", view.account_type, view.account_number));
            })
        }
        AccountCommands::List { json } => {
            let result = service.list_accounts(&call, &session.username);
            output::emit(result, json, |listed| {
                if listed.accounts.is_empty() {
                    println!("No accounts yet. Open one with `ubk account new`.");
                    return;
                }
                print_accounts(&listed.accounts);
            })
        }
        AccountCommands::Status { number, status, json } => {
            let status: AccountStatus = status.parse()?;
            let result = service.change_status(&call, &session.username, &number, status);
            output::emit(result, json, |view| {
                output::success(&format!("Account {} is now {}", view.account_number, view.status));
            })
        }
    }
}

fn print_accounts(accounts: &[AccountView]) {
    let mut table = output::create_table();
    table.set_header(vec!["Number", "Type", "Balance", "Opened", "Status"]);
    for account in accounts {
        table.add_row(vec![
            account.account_number.clone(),
            account.account_type.to_string(),
            format!("{:.2}", account.balance),
            output::format_time(&account.opening_date),
            output::format_status(account.status).to_string(),
        ]);
    }
    println!("{}", table);
}
