//! Card service - issuing and listing payment cards

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::domain::identifier::{card_expiry, generate_card_number, generate_cvv, mask_card_number};
use crate::domain::result::{Error, Result};
use crate::domain::{Card, CardView};
use crate::ports::{CallContext, FieldProtector, LedgerStore};
use crate::services::account::owned_account;
use crate::services::UniquenessGuard;

/// Sealed number plus its fingerprint, produced per candidate
struct SealedNumber {
    plaintext: String,
    ciphertext: Vec<u8>,
    fingerprint: String,
}

/// Source of candidate card numbers
pub type NumberSource = Box<dyn Fn() -> Result<String> + Send + Sync>;

pub struct CardService {
    store: Arc<dyn LedgerStore>,
    protector: Arc<dyn FieldProtector>,
    guard: UniquenessGuard,
    generate: NumberSource,
}

impl CardService {
    pub fn new(store: Arc<dyn LedgerStore>, protector: Arc<dyn FieldProtector>, guard: UniquenessGuard) -> Self {
        Self::with_generator(store, protector, guard, Box::new(generate_card_number))
    }

    /// Same as [`CardService::new`] with a custom card number source
    pub fn with_generator(
        store: Arc<dyn LedgerStore>,
        protector: Arc<dyn FieldProtector>,
        guard: UniquenessGuard,
        generate: NumberSource,
    ) -> Self {
        Self {
            store,
            protector,
            guard,
            generate,
        }
    }

    /// Issue a card for an active account owned by `username`
    ///
    /// The number is regenerated while either its sealed form or its
    /// fingerprint is already stored. Returns the masked view.
    pub fn issue_card(
        &self,
        ctx: &CallContext,
        username: &str,
        account_number: &str,
    ) -> Result<CardView> {
        let account = owned_account(self.store.as_ref(), ctx, username, account_number)?;
        account.ensure_active()?;

        let number = self.guard.acquire(
            "card number",
            || {
                let plaintext = (self.generate)()?;
                Ok(SealedNumber {
                    ciphertext: self.protector.protect(&plaintext)?,
                    fingerprint: self.protector.fingerprint(&plaintext),
                    plaintext,
                })
            },
            |candidate| {
                Ok(self.store.card_ciphertext_exists(ctx, &candidate.ciphertext)?
                    || self.store.card_fingerprint_exists(ctx, &candidate.fingerprint)?)
            },
        )?;

        let now = Utc::now();
        let expiry = card_expiry(now)?;
        let cvv = generate_cvv()?;

        let card = Card {
            id: Uuid::new_v4(),
            account_id: account.id,
            number: number.ciphertext,
            expiry: self.protector.protect(&expiry)?,
            cvv: self.protector.protect(&cvv)?,
            number_fingerprint: number.fingerprint,
            created_at: now,
        };
        self.store.insert_card(ctx, &card)?;
        info!(account = %account.number, card = %card.id, "card issued");

        Ok(CardView::masked(&card, mask_card_number(&number.plaintext)))
    }

    /// Cards of an owned account; `reveal` also decrypts number, expiry and CVV
    pub fn list_cards(
        &self,
        ctx: &CallContext,
        username: &str,
        account_number: &str,
        reveal: bool,
    ) -> Result<Vec<CardView>> {
        let account = owned_account(self.store.as_ref(), ctx, username, account_number)?;
        let cards = self.store.get_cards_by_account(ctx, account.id)?;

        cards
            .iter()
            .map(|card| {
                let number = self.protector.reveal(&card.number)?;
                let view = CardView::masked(card, mask_card_number(&number));
                if reveal {
                    Ok(view.revealed(
                        number,
                        self.protector.reveal(&card.expiry)?,
                        self.protector.reveal(&card.cvv)?,
                    ))
                } else {
                    Ok(view)
                }
            })
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                Error::Crypto(msg) => Error::crypto(format!("card data could not be opened: {}", msg)),
                other => other,
            })
    }
}
