//! History command - transactions of one account

use anyhow::Result;

use super::{Credentials, Session};
use crate::output;
use uniback_core::TransactionKind;

pub fn run(number: &str, json: bool, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let result = session.ctx.account_service.history(&session.call(), &session.username, number);

    output::emit(result, json, |history| {
        if history.is_empty() {
            println!("No transactions on {}.", number);
            return;
        }

        let mut table = output::create_table();
        table.set_header(vec!["Time", "Kind", "Amount", "Fee", "Destination", "ID"]);
        for tx in history {
            let amount = match tx.kind {
                TransactionKind::Deposit => format!("+{:.2}", tx.amount),
                _ => format!("-{:.2}", tx.amount),
            };
            table.add_row(vec![
                output::format_time(&tx.time),
                tx.kind.to_string(),
                amount,
                format!("{:.2}", tx.fee),
                tx.destination.clone().unwrap_or_default(),
                tx.id.to_string(),
            ]);
        }
        println!("{}", table);
    })
}
