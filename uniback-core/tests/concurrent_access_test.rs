//! Concurrent ledger access tests
//!
//! Several threads share one context and race on the same accounts. The
//! engine's pre-checks see stale snapshots, so these tests verify that the
//! store's guarded updates keep balances non-negative and the books balanced.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture
//! Run specific test: cargo test --test concurrent_access_test test_name -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rust_decimal::Decimal;
use tempfile::TempDir;

use uniback_core::config::Config;
use uniback_core::{AccountType, CallContext, Error, NewUser, UnibackContext};

/// Number of concurrent threads for stress tests
const THREAD_COUNT: usize = 6;

/// Number of iterations per thread
const ITERATIONS_PER_THREAD: usize = 5;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

/// Context on a fresh data directory with one user holding `accounts` accounts
fn create_test_ledger(temp_dir: &TempDir, accounts: usize) -> (Arc<UnibackContext>, Vec<String>) {
    let config = Config::defaults(temp_dir.path());
    let ctx = UnibackContext::with_config(temp_dir.path(), config).expect("Failed to create context");
    let call = CallContext::background();

    ctx.user_service
        .register(
            &call,
            NewUser {
                username: "alice".to_string(),
                password: "hunter22".to_string(),
                email: "alice@example.com".to_string(),
                phone: None,
            },
        )
        .expect("Failed to register user");

    let numbers = (0..accounts)
        .map(|_| {
            ctx.account_service
                .open_account(&call, "alice", AccountType::Debit)
                .expect("Failed to open account")
                .account_number
        })
        .collect();
    (Arc::new(ctx), numbers)
}

fn balance(ctx: &UnibackContext, number: &str) -> Decimal {
    ctx.account_service
        .get_account_by_number(&CallContext::background(), number)
        .expect("Failed to load account")
        .balance
}

/// Two withdrawals of 60 race on a balance of 100.
///
/// Both pass the engine's check against their snapshot; exactly one may
/// reach the ledger.
#[test]
fn test_racing_withdrawals_never_overdraw() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, numbers) = create_test_ledger(&temp_dir, 1);
    let number = numbers[0].clone();
    let call = CallContext::background();

    let account = ctx.account_service.get_account_by_number(&call, &number).unwrap();
    ctx.transaction_service.deposit(&call, &account, dec(100)).unwrap();
    let snapshot = ctx.account_service.get_account_by_number(&call, &number).unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let success_count = Arc::new(AtomicUsize::new(0));
    let rejected_count = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let snapshot = snapshot.clone();
            let barrier = Arc::clone(&barrier);
            let success_count = Arc::clone(&success_count);
            let rejected_count = Arc::clone(&rejected_count);

            thread::spawn(move || {
                barrier.wait();
                match ctx
                    .transaction_service
                    .withdraw(&CallContext::background(), &snapshot, dec(60))
                {
                    Ok(_) => {
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(Error::InsufficientFunds { .. }) => {
                        rejected_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    println!(
        "succeeded: {}, rejected: {}",
        success_count.load(Ordering::SeqCst),
        rejected_count.load(Ordering::SeqCst)
    );
    assert_eq!(success_count.load(Ordering::SeqCst), 1);
    assert_eq!(rejected_count.load(Ordering::SeqCst), 1);
    assert_eq!(balance(&ctx, &number), dec(40));

    let history = ctx.account_service.history(&call, "alice", &number).unwrap();
    assert_eq!(history.len(), 2);
}

/// Many deposits from many threads: none may be lost.
#[test]
fn test_concurrent_deposits_all_land() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, numbers) = create_test_ledger(&temp_dir, 1);
    let number = numbers[0].clone();

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let ctx = Arc::clone(&ctx);
            let number = number.clone();
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                let call = CallContext::background();
                barrier.wait();
                for _ in 0..ITERATIONS_PER_THREAD {
                    // a stale snapshot is fine for deposits; the store adds a delta
                    let account = ctx.account_service.get_account_by_number(&call, &number).unwrap();
                    ctx.transaction_service.deposit(&call, &account, dec(10)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let expected = dec((THREAD_COUNT * ITERATIONS_PER_THREAD * 10) as i64);
    assert_eq!(balance(&ctx, &number), expected);
    let history = ctx
        .account_service
        .history(&CallContext::background(), "alice", &number)
        .unwrap();
    assert_eq!(history.len(), THREAD_COUNT * ITERATIONS_PER_THREAD);
}

/// Transfers in both directions between two accounts conserve the total.
#[test]
fn test_opposing_transfers_conserve_money() {
    let temp_dir = TempDir::new().unwrap();
    let (ctx, numbers) = create_test_ledger(&temp_dir, 2);
    let call = CallContext::background();
    for number in &numbers {
        let account = ctx.account_service.get_account_by_number(&call, number).unwrap();
        ctx.transaction_service.deposit(&call, &account, dec(50)).unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let rejected_count = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|thread_id| {
            let ctx = Arc::clone(&ctx);
            let (from, to) = if thread_id % 2 == 0 {
                (numbers[0].clone(), numbers[1].clone())
            } else {
                (numbers[1].clone(), numbers[0].clone())
            };
            let barrier = Arc::clone(&barrier);
            let rejected_count = Arc::clone(&rejected_count);

            thread::spawn(move || {
                let call = CallContext::background();
                barrier.wait();
                for _ in 0..ITERATIONS_PER_THREAD {
                    let source = ctx.account_service.get_account_by_number(&call, &from).unwrap();
                    let destination = ctx.account_service.get_account_by_number(&call, &to).unwrap();
                    match ctx.transaction_service.transfer(&call, &source, &destination, dec(15)) {
                        Ok(_) => {}
                        Err(Error::InsufficientFunds { .. }) => {
                            rejected_count.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    println!("rejected transfers: {}", rejected_count.load(Ordering::SeqCst));
    let first = balance(&ctx, &numbers[0]);
    let second = balance(&ctx, &numbers[1]);
    assert!(first >= Decimal::ZERO && second >= Decimal::ZERO);
    assert_eq!(first + second, dec(100));
}
