//! User command - registration

use anyhow::Result;
use clap::Subcommand;

use super::{get_context, Credentials};
use crate::output;
use uniback_core::NewUser;

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Register {
        /// Login name
        username: String,
        /// Contact email
        #[arg(long)]
        email: String,
        /// Phone number in international format, e.g. +15551234567
        #[arg(long)]
        phone: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(command: UserCommands, credentials: &Credentials) -> Result<()> {
    match command {
        UserCommands::Register { username, email, phone, json } => {
            let ctx = get_context()?;
            let password = credentials.password(true)?;
            let result = ctx.user_service.register(
                &ctx.call_context(),
                NewUser {
                    username,
                    password,
                    email,
                    phone,
                },
            );
            output::emit(result, json, |user| {
                output::success(&format!("Registered user {}", user.username));
            })
        }
    }
}
