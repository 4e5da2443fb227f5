//! Event log database migrations - embedded SQL files
//!
//! Kept separate from the ledger migrations because the log lives in its own
//! database file (logs.duckdb).

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
