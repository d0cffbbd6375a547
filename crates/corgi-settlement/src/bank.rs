//! Bank wallet accounting.
//!
//! The bank row mirrors the distributing wallet. Distributions are applied
//! only by the settlement engine, in the same store transaction that completes
//! the reward, so the mirror cannot drift from the transaction ledger.

use corgi_db::queries::bank;
use corgi_types::api::BankStatus;
use corgi_types::{TokenAmount, ValidationError};
use tracing::info;

use crate::error::Result;
use crate::Db;

#[derive(Clone)]
pub struct BankAccounting {
    db: Db,
}

impl BankAccounting {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create the singleton row at startup. An existing balance is kept.
    pub async fn init(
        &self,
        wallet_address: &str,
        initial_balance: TokenAmount,
    ) -> Result<BankStatus> {
        let conn = self.db.lock().await;
        bank::init(&conn, wallet_address, initial_balance, corgi_db::now())?;
        Ok(bank::get(&conn)?.into())
    }

    pub async fn get_status(&self) -> Result<BankStatus> {
        let conn = self.db.lock().await;
        Ok(bank::get(&conn)?.into())
    }

    /// Credit the balance mirror after the bank wallet is topped up.
    pub async fn record_deposit(&self, amount: TokenAmount) -> Result<BankStatus> {
        if amount.is_zero() {
            return Err(ValidationError::Other("deposit amount must be positive".into()).into());
        }
        let conn = self.db.lock().await;
        bank::record_deposit(&conn, amount, corgi_db::now())?;
        let status: BankStatus = bank::get(&conn)?.into();
        info!(amount = %amount, balance = %status.current_balance, "bank deposit recorded");
        Ok(status)
    }
}
