//! Pending reward query functions.
//!
//! A pending reward is owed to a user who had no wallet when their sighting
//! was confirmed. It moves to `processed` exactly once, together with the
//! completion of the transaction that paid it.

use corgi_types::ledger::PendingReward;
use corgi_types::{Id, TokenAmount};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{amount_col, enum_col, opt_ts_col, ts_col};
use crate::{DbError, Result};

const COLUMNS: &str =
    "id, user_id, sighting_id, amount, status, created_at, processed_at, transaction_id";

fn map_row(row: &Row<'_>) -> rusqlite::Result<PendingReward> {
    Ok(PendingReward {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sighting_id: row.get(2)?,
        amount: amount_col(row, 3)?,
        status: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        processed_at: opt_ts_col(row, 6)?,
        transaction_id: row.get(7)?,
    })
}

/// Record a reward owed for a sighting. A second live row for the same
/// sighting fails with `DbError::Constraint`.
pub fn insert(
    conn: &Connection,
    user_id: Id,
    sighting_id: Id,
    amount: TokenAmount,
    now: u64,
) -> Result<Id> {
    conn.execute(
        "INSERT INTO pending_rewards (user_id, sighting_id, amount, status, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)",
        rusqlite::params![user_id, sighting_id, amount.to_sql(), now as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: Id) -> Result<Option<PendingReward>> {
    let reward = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM pending_rewards WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(reward)
}

pub fn get(conn: &Connection, id: Id) -> Result<PendingReward> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("pending reward {id}")))
}

/// The most recent reward row for a sighting, in any status.
pub fn find_for_sighting(conn: &Connection, sighting_id: Id) -> Result<Option<PendingReward>> {
    let reward = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM pending_rewards WHERE sighting_id = ?1
                 ORDER BY id DESC LIMIT 1"
            ),
            [sighting_id],
            map_row,
        )
        .optional()?;
    Ok(reward)
}

/// A user's unprocessed rewards, oldest first.
pub fn list_pending_for_user(conn: &Connection, user_id: Id) -> Result<Vec<PendingReward>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM pending_rewards
         WHERE user_id = ?1 AND status = 'pending'
         ORDER BY created_at ASC, id ASC"
    ))?;
    let rows = stmt
        .query_map([user_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Sum of a user's unprocessed rewards.
pub fn pending_total_for_user(conn: &Connection, user_id: Id) -> Result<TokenAmount> {
    let total: i64 = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM pending_rewards
         WHERE user_id = ?1 AND status = 'pending'",
        [user_id],
        |row| row.get(0),
    )?;
    TokenAmount::from_sql(total).map_err(|e| DbError::Serialization(e.to_string()))
}

/// pending -> processed, linking the paying transaction.
/// Returns false if the reward was no longer pending.
pub fn mark_processed(conn: &Connection, id: Id, transaction_id: Id, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE pending_rewards SET status = 'processed', processed_at = ?1, transaction_id = ?2
         WHERE id = ?3 AND status = 'pending'",
        rusqlite::params![now as i64, transaction_id, id],
    )?;
    Ok(updated == 1)
}

/// pending -> cancelled (administrative).
pub fn cancel(conn: &Connection, id: Id, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE pending_rewards SET status = 'cancelled', processed_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        rusqlite::params![now as i64, id],
    )?;
    Ok(updated == 1)
}

/// Users that now hold a wallet and still have pending rewards.
pub fn users_ready_for_processing(conn: &Connection, limit: u32) -> Result<Vec<Id>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT p.user_id FROM pending_rewards p
         JOIN users u ON u.id = p.user_id
         WHERE p.status = 'pending' AND u.wallet_address IS NOT NULL
         ORDER BY p.user_id ASC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
