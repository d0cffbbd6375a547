//! Bank wallet query functions.
//!
//! The bank wallet is a single row (`id = 1`) mirroring the distributing
//! wallet. Balance and total are updated with SQL arithmetic so concurrent
//! settlements cannot lose updates.

use corgi_types::ledger::BankWallet;
use corgi_types::TokenAmount;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{amount_col, ts_col};
use crate::{DbError, Result};

fn map_row(row: &Row<'_>) -> rusqlite::Result<BankWallet> {
    Ok(BankWallet {
        wallet_address: row.get(0)?,
        current_balance: amount_col(row, 1)?,
        total_distributed: amount_col(row, 2)?,
        last_transaction_hash: row.get(3)?,
        updated_at: ts_col(row, 4)?,
    })
}

/// Create the singleton row if missing. An existing row is left untouched
/// except for the wallet address, which follows configuration.
pub fn init(
    conn: &Connection,
    wallet_address: &str,
    initial_balance: TokenAmount,
    now: u64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO bank_wallet
             (id, wallet_address, current_balance, total_distributed, updated_at)
         VALUES (1, ?1, ?2, 0, ?3)
         ON CONFLICT(id) DO UPDATE SET wallet_address = excluded.wallet_address",
        rusqlite::params![wallet_address, initial_balance.to_sql(), now as i64],
    )?;
    Ok(())
}

pub fn find(conn: &Connection) -> Result<Option<BankWallet>> {
    let bank = conn
        .query_row(
            "SELECT wallet_address, current_balance, total_distributed,
                    last_transaction_hash, updated_at
             FROM bank_wallet WHERE id = 1",
            [],
            map_row,
        )
        .optional()?;
    Ok(bank)
}

pub fn get(conn: &Connection) -> Result<BankWallet> {
    find(conn)?.ok_or_else(|| DbError::NotFound("bank wallet not initialized".into()))
}

/// Apply one completed distribution.
///
/// Returns the balance shortfall when the mirror held less than `amount`; the
/// balance is floored at zero in that case.
pub fn record_distribution(
    conn: &Connection,
    amount: TokenAmount,
    tx_hash: &str,
    now: u64,
) -> Result<TokenAmount> {
    let before = get(conn)?;
    let shortfall = amount
        .checked_sub(before.current_balance)
        .unwrap_or(TokenAmount::ZERO);

    let updated = conn.execute(
        "UPDATE bank_wallet SET
             current_balance = MAX(current_balance - ?1, 0),
             total_distributed = total_distributed + ?1,
             last_transaction_hash = ?2,
             updated_at = ?3
         WHERE id = 1",
        rusqlite::params![amount.to_sql(), tx_hash, now as i64],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound("bank wallet not initialized".into()));
    }
    Ok(shortfall)
}

/// Credit the balance mirror (administrative top-up).
pub fn record_deposit(conn: &Connection, amount: TokenAmount, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE bank_wallet SET current_balance = current_balance + ?1, updated_at = ?2
         WHERE id = 1",
        rusqlite::params![amount.to_sql(), now as i64],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound("bank wallet not initialized".into()));
    }
    Ok(())
}
