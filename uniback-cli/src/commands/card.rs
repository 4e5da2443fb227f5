//! Card commands - issue and list cards

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use super::{Credentials, Session};
use crate::output;

#[derive(Subcommand)]
pub enum CardCommands {
    /// Issue a new card for an account
    New {
        /// Account number
        number: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the cards of an account
    List {
        /// Account number
        number: String,
        /// Show full number, expiry and CVV
        #[arg(long)]
        reveal: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: CardCommands, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let call = session.call();
    let service = &session.ctx.card_service;

    match command {
        CardCommands::New { number, json } => {
            let result = service.issue_card(&call, &session.username, &number);
            output::emit(result, json, |card| {
                output::success(&format!("Issued card {} for {}", card.masked_number, number));
            })
        }
        CardCommands::List { number, reveal, json } => {
            let result = service.list_cards(&call, &session.username, &number, reveal);
            output::emit(result, json, |cards| {
                if cards.is_empty() {
                    println!("No cards on {}.", number);
                    return;
                }

                let mut table = output::create_table();
                if reveal {
                    table.set_header(vec!["Number", "Expiry", "CVV", "Issued"]);
                } else {
                    table.set_header(vec!["Number", "Issued"]);
                }
                for card in cards {
                    let issued = output::format_time(&card.created_at);
                    if reveal {
                        table.add_row(vec![
                            card.number.clone().unwrap_or_default(),
                            card.expiry.clone().unwrap_or_default(),
                            card.cvv.clone().unwrap_or_default(),
                            issued,
                        ]);
                    } else {
                        table.add_row(vec![card.masked_number.clone(), issued]);
                    }
                }
                println!("{}", table);
                if reveal {
                    println!("{}", "Card details shown in full. Clear your terminal when done.".yellow());
                }
            })
        }
    }
}
