//! User query functions.

use corgi_types::user::User;
use corgi_types::Id;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};

use crate::queries::ts_col;
use crate::{DbError, Result};

const COLUMNS: &str =
    "id, telegram_id, username, display_name, wallet_address, created_at, updated_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        wallet_address: row.get(4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

/// Insert a new user.
pub fn insert(
    conn: &Connection,
    telegram_id: i64,
    username: Option<&str>,
    display_name: &str,
    now: u64,
) -> Result<Id> {
    conn.execute(
        "INSERT INTO users (telegram_id, username, display_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![telegram_id, username, display_name, now as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Insert or refresh a user keyed by Telegram id.
pub fn upsert(
    conn: &Connection,
    telegram_id: i64,
    username: Option<&str>,
    display_name: &str,
    now: u64,
) -> Result<User> {
    conn.execute(
        "INSERT INTO users (telegram_id, username, display_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(telegram_id) DO UPDATE SET
             username = excluded.username,
             display_name = excluded.display_name,
             updated_at = excluded.updated_at",
        rusqlite::params![telegram_id, username, display_name, now as i64],
    )?;
    get_by_telegram_id(conn, telegram_id)?
        .ok_or_else(|| DbError::NotFound(format!("user with telegram id {telegram_id}")))
}

/// Look up a user by id.
pub fn find(conn: &Connection, id: Id) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(user)
}

/// Fetch a user by id, failing with `NotFound`.
pub fn get(conn: &Connection, id: Id) -> Result<User> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("user {id}")))
}

pub fn get_by_telegram_id(conn: &Connection, telegram_id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE telegram_id = ?1"),
            [telegram_id],
            map_row,
        )
        .optional()?;
    Ok(user)
}

/// Find the current holder of a wallet address.
pub fn get_by_wallet(conn: &Connection, address: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM users WHERE wallet_address = ?1"),
            [address],
            map_row,
        )
        .optional()?;
    Ok(user)
}

/// Assign a wallet address, revoking it from any previous holder.
///
/// Returns the id of the user the address was taken from, if any. The two
/// updates must commit together: call this inside a transaction, or use
/// [`connect_wallet`] which opens one.
pub fn set_wallet(conn: &Connection, user_id: Id, address: &str, now: u64) -> Result<Option<Id>> {
    let previous: Option<Id> = conn
        .query_row(
            "SELECT id FROM users WHERE wallet_address = ?1 AND id != ?2",
            rusqlite::params![address, user_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(previous_id) = previous {
        conn.execute(
            "UPDATE users SET wallet_address = NULL, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now as i64, previous_id],
        )?;
    }

    let updated = conn.execute(
        "UPDATE users SET wallet_address = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![address, now as i64, user_id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("user {user_id}")));
    }
    Ok(previous)
}

/// Last-writer-wins wallet assignment in its own IMMEDIATE transaction.
pub fn connect_wallet(
    conn: &mut Connection,
    user_id: Id,
    address: &str,
    now: u64,
) -> Result<Option<Id>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let previous = set_wallet(&tx, user_id, address, now)?;
    tx.commit()?;
    Ok(previous)
}

/// Remove a user's wallet address.
pub fn clear_wallet(conn: &Connection, user_id: Id, now: u64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE users SET wallet_address = NULL, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now as i64, user_id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(format!("user {user_id}")));
    }
    Ok(())
}
