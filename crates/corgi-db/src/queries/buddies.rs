//! Buddy pair query functions.
//!
//! Pairs are stored with `user1_id < user2_id`; callers pass members in any
//! order.

use corgi_types::buddy::BuddyPair;
use corgi_types::Id;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{enum_col, opt_ts_col, ts_col};
use crate::{DbError, Result};

const COLUMNS: &str = "id, user1_id, user2_id, initiator_id, status, created_at, confirmed_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<BuddyPair> {
    Ok(BuddyPair {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        initiator_id: row.get(3)?,
        status: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        confirmed_at: opt_ts_col(row, 6)?,
    })
}

fn ordered(a: Id, b: Id) -> (Id, Id) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Insert a pending pair initiated by `initiator_id`.
pub fn insert(conn: &Connection, initiator_id: Id, target_id: Id, now: u64) -> Result<Id> {
    let (low, high) = ordered(initiator_id, target_id);
    conn.execute(
        "INSERT INTO buddy_pairs (user1_id, user2_id, initiator_id, status, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)",
        rusqlite::params![low, high, initiator_id, now as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: Id) -> Result<Option<BuddyPair>> {
    let pair = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM buddy_pairs WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(pair)
}

pub fn get(conn: &Connection, id: Id) -> Result<BuddyPair> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("buddy pair {id}")))
}

/// The pair row for two users, whatever its status.
pub fn find_between(conn: &Connection, a: Id, b: Id) -> Result<Option<BuddyPair>> {
    let (low, high) = ordered(a, b);
    let pair = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM buddy_pairs WHERE user1_id = ?1 AND user2_id = ?2"),
            [low, high],
            map_row,
        )
        .optional()?;
    Ok(pair)
}

/// The user's pending or active pair, if any.
pub fn find_open_for_user(conn: &Connection, user_id: Id) -> Result<Option<BuddyPair>> {
    let pair = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM buddy_pairs
                 WHERE (user1_id = ?1 OR user2_id = ?1) AND status IN ('pending', 'active')
                 ORDER BY created_at DESC LIMIT 1"
            ),
            [user_id],
            map_row,
        )
        .optional()?;
    Ok(pair)
}

/// The user's active pair, if any.
pub fn find_active_for_user(conn: &Connection, user_id: Id) -> Result<Option<BuddyPair>> {
    let pair = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM buddy_pairs
                 WHERE (user1_id = ?1 OR user2_id = ?1) AND status = 'active'"
            ),
            [user_id],
            map_row,
        )
        .optional()?;
    Ok(pair)
}

/// Re-open a dissolved pair as pending with a new initiator.
pub fn reopen(conn: &Connection, id: Id, initiator_id: Id, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE buddy_pairs
         SET status = 'pending', initiator_id = ?1, created_at = ?2, confirmed_at = NULL
         WHERE id = ?3 AND status = 'dissolved'",
        rusqlite::params![initiator_id, now as i64, id],
    )?;
    Ok(updated == 1)
}

/// pending -> active. Returns false if the pair was not pending.
pub fn activate(conn: &Connection, id: Id, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE buddy_pairs SET status = 'active', confirmed_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        rusqlite::params![now as i64, id],
    )?;
    Ok(updated == 1)
}

/// active -> dissolved. Returns false if the pair was not active.
pub fn dissolve(conn: &Connection, id: Id) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE buddy_pairs SET status = 'dissolved' WHERE id = ?1 AND status = 'active'",
        [id],
    )?;
    Ok(updated == 1)
}

/// Delete a pair that is still pending.
pub fn delete_pending(conn: &Connection, id: Id) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM buddy_pairs WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    Ok(deleted == 1)
}
