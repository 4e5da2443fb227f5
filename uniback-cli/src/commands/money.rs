//! Money commands - deposit, withdraw and transfer

use anyhow::Result;
use rust_decimal::Decimal;

use super::{Credentials, Session};
use crate::output;
use uniback_core::AccountView;

/// clap value parser for amounts
pub fn parse_amount(raw: &str) -> std::result::Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid amount '{}': {}", raw, e))
}

fn report(verb: &str, amount: Decimal, fee: Decimal, view: &AccountView) {
    output::success(&format!("{} {:.2} (fee {:.2})", verb, amount, fee));
    output::info(&format!("Balance of {}: {:.2}", view.account_number, view.balance));
}

pub fn deposit(number: &str, amount: Decimal, json: bool, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let call = session.call();
    let ctx = &session.ctx;
    let fee = ctx.transaction_service.fee();

    let result = ctx
        .account_service
        .get_owned_account(&call, &session.username, number)
        .and_then(|account| ctx.transaction_service.deposit(&call, &account, amount))
        .map(|account| account.view());
    output::emit(result, json, |view| report("Deposited", amount, fee, view))
}

pub fn withdraw(number: &str, amount: Decimal, json: bool, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let call = session.call();
    let ctx = &session.ctx;
    let fee = ctx.transaction_service.fee();

    let result = ctx
        .account_service
        .get_owned_account(&call, &session.username, number)
        .and_then(|account| ctx.transaction_service.withdraw(&call, &account, amount))
        .map(|account| account.view());
    output::emit(result, json, |view| report("Withdrew", amount, fee, view))
}

pub fn transfer(from: &str, to: &str, amount: Decimal, json: bool, credentials: &Credentials) -> Result<()> {
    let session = Session::open(credentials)?;
    let call = session.call();
    let ctx = &session.ctx;
    let fee = ctx.transaction_service.fee();

    let result = ctx
        .account_service
        .get_owned_account(&call, &session.username, from)
        .and_then(|source| {
            let destination = ctx.account_service.get_account_by_number(&call, to)?;
            ctx.transaction_service.transfer(&call, &source, &destination, amount)
        })
        .map(|account| account.view());
    output::emit(result, json, |view| {
        report(&format!("Transferred to {}", to), amount, fee, view)
    })
}
