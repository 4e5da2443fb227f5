//! DuckDB ledger store implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Account, AccountStatus, Card, SingleEntry, Transaction, TransferEntry, TransferLink, User,
};
use crate::ports::{CallContext, LedgerStore};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const USER_COLUMNS: &str = "user_id, username, password_hash, email, phone, created_at::VARCHAR";
const ACCOUNT_COLUMNS: &str =
    "account_id, user_id, account_number, account_type, balance::VARCHAR, opened_at::VARCHAR, status";
const TRANSACTION_COLUMNS: &str =
    "transaction_id, account_id, kind, amount::VARCHAR, fee::VARCHAR, created_at::VARCHAR";
const CARD_COLUMNS: &str = "card_id, account_id, number_ciphertext, expiry_ciphertext, cvv_ciphertext, \
     number_fingerprint, created_at::VARCHAR";

/// Whether an open error is a file lock that is worth retrying
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed [`LedgerStore`]
///
/// One connection behind a mutex: every unit of work holds the lock for its
/// whole transaction, so writes to the same account serialize. Balance
/// updates are additionally guarded in SQL (`status = 'active'` and a
/// non-negative result), which makes the store the final word on funds.
pub struct DuckDbLedgerStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    #[cfg(test)]
    interrupt_after: Mutex<Option<usize>>,
}

impl DuckDbLedgerStore {
    /// Open (or create) the ledger database at `db_path`
    ///
    /// Retries with exponential backoff while another process holds the file.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        #[cfg(test)]
                        interrupt_after: Mutex::new(None),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Run pending ledger migrations
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.lock()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure the ledger schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::persistence(format!("Lock poisoned: {}", e)))
    }

    /// Context check between statements of a unit of work
    fn step(&self, ctx: &CallContext) -> Result<()> {
        #[cfg(test)]
        {
            let mut remaining = self.interrupt_after.lock().map_err(|_| Error::Cancelled)?;
            if let Some(n) = remaining.as_mut() {
                if *n == 0 {
                    return Err(Error::Cancelled);
                }
                *n -= 1;
            }
        }
        ctx.check()
    }

    /// Fail with `Cancelled` once `steps` more statement boundaries have passed
    #[cfg(test)]
    fn interrupt_after(&self, steps: usize) {
        *self.interrupt_after.lock().unwrap() = Some(steps);
    }

    fn query_one<T>(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: impl Fn(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        match rows.next()? {
            Some(row) => Ok(Some(map(row)?)),
            None => Ok(None),
        }
    }

    fn query_all<T>(
        conn: &Connection,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: impl Fn(&Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(map(row)?);
        }
        Ok(out)
    }

    fn exists(conn: &Connection, sql: &str, params: &[&dyn duckdb::ToSql]) -> Result<bool> {
        let count: i64 = conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count > 0)
    }

    fn load_account(conn: &Connection, account_id: Uuid) -> Result<Option<Account>> {
        Self::query_one(
            conn,
            &format!("SELECT {} FROM accounts WHERE account_id = ?", ACCOUNT_COLUMNS),
            &[&account_id.to_string()],
            row_to_account,
        )
    }

    /// Apply a signed balance change to an active account
    ///
    /// Reads the row first so a refusal carries the precise reason, then
    /// performs the guarded update.
    fn apply_delta(conn: &Connection, account_id: Uuid, delta: Decimal) -> Result<()> {
        let current = Self::load_account(conn, account_id)?
            .ok_or_else(|| Error::not_found(format!("account {}", account_id)))?;
        current.ensure_active()?;
        if current.balance + delta < Decimal::ZERO {
            return Err(Error::InsufficientFunds {
                balance: current.balance,
                required: -delta,
            });
        }

        let delta = delta.to_string();
        let updated = conn.execute(
            "UPDATE accounts
             SET balance = balance + CAST(? AS DECIMAL(18,2))
             WHERE account_id = ?
               AND status = 'active'
               AND balance + CAST(? AS DECIMAL(18,2)) >= 0",
            params![delta, account_id.to_string(), delta],
        )?;
        if updated != 1 {
            return Err(Error::persistence(format!(
                "balance update for account {} touched {} rows",
                current.number, updated
            )));
        }
        Ok(())
    }

    fn insert_transaction(conn: &Connection, tx: &Transaction) -> Result<()> {
        conn.execute(
            "INSERT INTO transactions (transaction_id, account_id, kind, amount, fee, created_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18,2)), CAST(? AS DECIMAL(18,2)), CAST(? AS TIMESTAMP))",
            params![
                tx.id.to_string(),
                tx.account_id.to_string(),
                tx.kind.as_str(),
                tx.amount.to_string(),
                tx.fee.to_string(),
                format_timestamp(&tx.created_at),
            ],
        )?;
        Ok(())
    }
}

impl LedgerStore for DuckDbLedgerStore {
    // === Users ===

    fn create_user(&self, ctx: &CallContext, user: &User) -> Result<()> {
        ctx.check()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (user_id, username, password_hash, email, phone, created_at)
             VALUES (?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                user.id.to_string(),
                user.username,
                user.password_hash,
                user.email,
                user.phone,
                format_timestamp(&user.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_user_by_username(&self, ctx: &CallContext, username: &str) -> Result<Option<User>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS),
            &[&username],
            row_to_user,
        )
    }

    fn find_taken_user_field(
        &self,
        ctx: &CallContext,
        username: &str,
        email: &str,
        phone: Option<&str>,
    ) -> Result<Option<&'static str>> {
        ctx.check()?;
        let conn = self.lock()?;
        if Self::exists(&conn, "SELECT COUNT(*) FROM users WHERE username = ?", &[&username])? {
            return Ok(Some("username"));
        }
        if Self::exists(&conn, "SELECT COUNT(*) FROM users WHERE email = ?", &[&email])? {
            return Ok(Some("email"));
        }
        if let Some(phone) = phone {
            if Self::exists(&conn, "SELECT COUNT(*) FROM users WHERE phone = ?", &[&phone])? {
                return Ok(Some("phone"));
            }
        }
        Ok(None)
    }

    // === Accounts ===

    fn account_number_exists(&self, ctx: &CallContext, number: &str) -> Result<bool> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::exists(&conn, "SELECT COUNT(*) FROM accounts WHERE account_number = ?", &[&number])
    }

    fn insert_account(&self, ctx: &CallContext, account: &Account) -> Result<()> {
        ctx.check()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO accounts (account_id, user_id, account_number, account_type, balance, opened_at, status)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), CAST(? AS TIMESTAMP), ?)",
            params![
                account.id.to_string(),
                account.user_id.to_string(),
                account.number,
                account.account_type.as_str(),
                account.balance.to_string(),
                format_timestamp(&account.opened_at),
                account.status.as_str(),
            ],
        )?;
        debug!(account = %account.number, "account inserted");
        Ok(())
    }

    fn get_account_by_number(&self, ctx: &CallContext, number: &str) -> Result<Option<Account>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!("SELECT {} FROM accounts WHERE account_number = ?", ACCOUNT_COLUMNS),
            &[&number],
            row_to_account,
        )
    }

    fn get_account_for_owner(&self, ctx: &CallContext, user_id: Uuid, number: &str) -> Result<Option<Account>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!(
                "SELECT {} FROM accounts WHERE account_number = ? AND user_id = ?",
                ACCOUNT_COLUMNS
            ),
            &[&number, &user_id.to_string()],
            row_to_account,
        )
    }

    fn get_accounts_by_owner(&self, ctx: &CallContext, user_id: Uuid) -> Result<Vec<Account>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_all(
            &conn,
            &format!(
                "SELECT {} FROM accounts WHERE user_id = ? ORDER BY opened_at, account_number",
                ACCOUNT_COLUMNS
            ),
            &[&user_id.to_string()],
            row_to_account,
        )
    }

    fn set_account_status(&self, ctx: &CallContext, account_id: Uuid, status: AccountStatus) -> Result<()> {
        ctx.check()?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let current = Self::load_account(&tx, account_id)?
            .ok_or_else(|| Error::not_found(format!("account {}", account_id)))?;
        if !current.status.can_transition_to(status) {
            return Err(Error::validation(format!(
                "account {} cannot go from {} to {}",
                current.number, current.status, status
            )));
        }
        if status == AccountStatus::Closed && !current.balance.is_zero() {
            return Err(Error::validation(format!(
                "account {} still holds {} and cannot be closed",
                current.number, current.balance
            )));
        }

        self.step(ctx)?;
        tx.execute(
            "UPDATE accounts SET status = ? WHERE account_id = ?",
            params![status.as_str(), account_id.to_string()],
        )?;
        self.step(ctx)?;
        tx.commit()?;
        Ok(())
    }

    // === Ledger writes ===

    fn apply_single_entry(&self, ctx: &CallContext, account_id: Uuid, entry: &SingleEntry) -> Result<Account> {
        self.step(ctx)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::apply_delta(&tx, account_id, entry.delta)?;
        self.step(ctx)?;
        Self::insert_transaction(&tx, &entry.transaction)?;
        self.step(ctx)?;

        let account = Self::load_account(&tx, account_id)?
            .ok_or_else(|| Error::not_found(format!("account {}", account_id)))?;
        tx.commit()?;
        Ok(account)
    }

    fn apply_transfer(
        &self,
        ctx: &CallContext,
        source_id: Uuid,
        destination_id: Uuid,
        entry: &TransferEntry,
    ) -> Result<Account> {
        self.step(ctx)?;
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::apply_delta(&tx, source_id, -entry.debit)?;
        self.step(ctx)?;
        Self::apply_delta(&tx, destination_id, entry.credit)?;
        self.step(ctx)?;
        Self::insert_transaction(&tx, &entry.transaction)?;
        self.step(ctx)?;
        tx.execute(
            "INSERT INTO transfer_links (link_id, transaction_id, destination_account_id) VALUES (?, ?, ?)",
            params![
                entry.link.id.to_string(),
                entry.link.transaction_id.to_string(),
                entry.link.destination_account_id.to_string(),
            ],
        )?;
        self.step(ctx)?;

        let source = Self::load_account(&tx, source_id)?
            .ok_or_else(|| Error::not_found(format!("account {}", source_id)))?;
        tx.commit()?;
        Ok(source)
    }

    // === History ===

    fn get_transactions_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Transaction>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_all(
            &conn,
            &format!(
                "SELECT {} FROM transactions WHERE account_id = ? ORDER BY created_at DESC, transaction_id",
                TRANSACTION_COLUMNS
            ),
            &[&account_id.to_string()],
            row_to_transaction,
        )
    }

    fn get_transfer_link(&self, ctx: &CallContext, transaction_id: Uuid) -> Result<Option<TransferLink>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            "SELECT link_id, transaction_id, destination_account_id FROM transfer_links WHERE transaction_id = ?",
            &[&transaction_id.to_string()],
            |row| {
                Ok(TransferLink {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    transaction_id: parse_uuid(&row.get::<_, String>(1)?)?,
                    destination_account_id: parse_uuid(&row.get::<_, String>(2)?)?,
                })
            },
        )
    }

    fn get_account_by_id(&self, ctx: &CallContext, account_id: Uuid) -> Result<Option<Account>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::load_account(&conn, account_id)
    }

    // === Cards ===

    fn card_ciphertext_exists(&self, ctx: &CallContext, number_ciphertext: &[u8]) -> Result<bool> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::exists(
            &conn,
            "SELECT COUNT(*) FROM cards WHERE number_ciphertext = ?",
            &[&number_ciphertext],
        )
    }

    fn card_fingerprint_exists(&self, ctx: &CallContext, fingerprint: &str) -> Result<bool> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::exists(
            &conn,
            "SELECT COUNT(*) FROM cards WHERE number_fingerprint = ?",
            &[&fingerprint],
        )
    }

    fn insert_card(&self, ctx: &CallContext, card: &Card) -> Result<()> {
        ctx.check()?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cards (card_id, account_id, number_ciphertext, expiry_ciphertext, cvv_ciphertext,
                                number_fingerprint, created_at)
             VALUES (?, ?, ?, ?, ?, ?, CAST(? AS TIMESTAMP))",
            params![
                card.id.to_string(),
                card.account_id.to_string(),
                card.number,
                card.expiry,
                card.cvv,
                card.number_fingerprint,
                format_timestamp(&card.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_cards_by_account(&self, ctx: &CallContext, account_id: Uuid) -> Result<Vec<Card>> {
        ctx.check()?;
        let conn = self.lock()?;
        Self::query_all(
            &conn,
            &format!(
                "SELECT {} FROM cards WHERE account_id = ? ORDER BY created_at, card_id",
                CARD_COLUMNS
            ),
            &[&account_id.to_string()],
            row_to_card,
        )
    }
}

fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
    })
}

fn row_to_account(row: &Row) -> Result<Account> {
    Ok(Account {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        user_id: parse_uuid(&row.get::<_, String>(1)?)?,
        number: row.get(2)?,
        account_type: row.get::<_, String>(3)?.parse()?,
        balance: parse_decimal(&row.get::<_, String>(4)?)?,
        opened_at: parse_timestamp(&row.get::<_, String>(5)?)?,
        status: row.get::<_, String>(6)?.parse()?,
    })
}

fn row_to_transaction(row: &Row) -> Result<Transaction> {
    Ok(Transaction {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        account_id: parse_uuid(&row.get::<_, String>(1)?)?,
        kind: row.get::<_, String>(2)?.parse()?,
        amount: parse_decimal(&row.get::<_, String>(3)?)?,
        fee: parse_decimal(&row.get::<_, String>(4)?)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
    })
}

fn row_to_card(row: &Row) -> Result<Card> {
    Ok(Card {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        account_id: parse_uuid(&row.get::<_, String>(1)?)?,
        number: row.get(2)?,
        expiry: row.get(3)?,
        cvv: row.get(4)?,
        number_fingerprint: row.get(5)?,
        created_at: parse_timestamp(&row.get::<_, String>(6)?)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::persistence(format!("bad uuid '{}': {}", s, e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| Error::persistence(format!("bad decimal '{}': {}", s, e)))
}

/// TIMESTAMP columns are naive UTC; microsecond precision
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::persistence(format!("bad timestamp '{}': {}", s, e)))
}
