//! Transaction ledger query functions.
//!
//! A row is inserted as `pending` when a transfer is claimed and moves once
//! to `completed` or `failed`. Every status update is guarded by
//! `status = 'pending'` so terminal rows never change. The one exception is
//! [`reopen_failed`], for a broadcast that landed after its row was failed.

use corgi_types::ledger::{RelatedEntity, Transaction, TransactionStatus, TransactionType};
use corgi_types::{Id, TokenAmount};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{amount_col, enum_col, opt_ts_col, ts_col};
use crate::{DbError, Result};

const COLUMNS: &str = "id, tx_hash, from_address, to_address, amount, tx_type, \
                       related_entity_id, related_entity_type, status, created_at, completed_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let related_id: Option<Id> = row.get(6)?;
    let related_entity = match related_id {
        Some(id) => Some(RelatedEntity {
            id,
            kind: enum_col(row, 7)?,
        }),
        None => None,
    };
    Ok(Transaction {
        id: row.get(0)?,
        tx_hash: row.get(1)?,
        from_address: row.get(2)?,
        to_address: row.get(3)?,
        amount: amount_col(row, 4)?,
        tx_type: enum_col(row, 5)?,
        related_entity,
        status: enum_col(row, 8)?,
        created_at: ts_col(row, 9)?,
        completed_at: opt_ts_col(row, 10)?,
    })
}

/// Fields of a transfer about to be claimed.
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub from_address: &'a str,
    pub to_address: &'a str,
    pub amount: TokenAmount,
    pub tx_type: TransactionType,
    pub related: Option<RelatedEntity>,
}

/// Insert a pending transaction.
///
/// If a non-failed row already exists for the same related entity this
/// fails with `DbError::Constraint`: the entity is already claimed.
pub fn insert_pending(conn: &Connection, new: &NewTransaction<'_>, now: u64) -> Result<Id> {
    conn.execute(
        "INSERT INTO transactions
             (from_address, to_address, amount, tx_type, related_entity_id,
              related_entity_type, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7)",
        rusqlite::params![
            new.from_address,
            new.to_address,
            new.amount.to_sql(),
            new.tx_type.as_str(),
            new.related.map(|r| r.id),
            new.related.map(|r| r.kind.as_str()),
            now as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: Id) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM transactions WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(tx)
}

pub fn get(conn: &Connection, id: Id) -> Result<Transaction> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("transaction {id}")))
}

/// The pending or completed transaction for an entity, if one exists.
pub fn find_live_for_entity(
    conn: &Connection,
    related: RelatedEntity,
) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM transactions
                 WHERE related_entity_type = ?1 AND related_entity_id = ?2 AND status != 'failed'"
            ),
            rusqlite::params![related.kind.as_str(), related.id],
            map_row,
        )
        .optional()?;
    Ok(tx)
}

/// Every attempt for an entity, oldest first (failed rows are the audit trail).
pub fn list_for_entity(conn: &Connection, related: RelatedEntity) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM transactions
         WHERE related_entity_type = ?1 AND related_entity_id = ?2
         ORDER BY id ASC"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![related.kind.as_str(), related.id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Attach the chain hash to a pending transaction.
pub fn set_hash(conn: &Connection, id: Id, tx_hash: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET tx_hash = ?1 WHERE id = ?2 AND status = 'pending'",
        rusqlite::params![tx_hash, id],
    )?;
    Ok(updated == 1)
}

/// pending -> completed. Returns false if the row was not pending.
pub fn mark_completed(conn: &Connection, id: Id, tx_hash: &str, now: u64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET status = 'completed', tx_hash = ?1, completed_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        rusqlite::params![tx_hash, now as i64, id],
    )?;
    Ok(updated == 1)
}

/// pending -> failed. The row stays as an audit record.
pub fn mark_failed(conn: &Connection, id: Id) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET status = 'failed' WHERE id = ?1 AND status = 'pending'",
        [id],
    )?;
    Ok(updated == 1)
}

/// failed -> pending, for a broadcast that landed after its row was failed.
///
/// Fails with a constraint error if the entity was claimed again meanwhile.
pub fn reopen_failed(conn: &Connection, id: Id) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET status = 'pending' WHERE id = ?1 AND status = 'failed'",
        [id],
    )?;
    Ok(updated == 1)
}

/// Keep the hash of a payment that landed on a failed row.
pub fn record_late_hash(conn: &Connection, id: Id, tx_hash: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET tx_hash = ?1
         WHERE id = ?2 AND status = 'failed' AND tx_hash IS NULL",
        rusqlite::params![tx_hash, id],
    )?;
    Ok(updated == 1)
}

/// Pending transactions created at or before `created_before`, oldest first.
pub fn list_stale_pending(
    conn: &Connection,
    created_before: u64,
    limit: u32,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM transactions
         WHERE status = 'pending' AND created_at <= ?1
         ORDER BY created_at ASC, id ASC
         LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(rusqlite::params![created_before as i64, limit], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_by_status(conn: &Connection, status: TransactionStatus) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, T0};

    fn reward(sighting: Id) -> NewTransaction<'static> {
        NewTransaction {
            from_address: "EQbank",
            to_address: "EQuser",
            amount: TokenAmount::from_base_units(5_000_000_000),
            tx_type: TransactionType::Reward,
            related: Some(RelatedEntity::sighting(sighting)),
        }
    }

    #[test]
    fn test_one_live_transaction_per_entity() {
        let conn = db();
        let first = insert_pending(&conn, &reward(1), T0).expect("claim");
        let dup = insert_pending(&conn, &reward(1), T0).expect_err("second claim");
        assert!(dup.is_constraint());

        // A failed attempt frees the entity for a retry.
        assert!(mark_failed(&conn, first).expect("fail"));
        let retry = insert_pending(&conn, &reward(1), T0 + 2).expect("retry claim");
        assert_ne!(first, retry);

        let attempts = list_for_entity(&conn, RelatedEntity::sighting(1)).expect("list");
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].status, TransactionStatus::Failed);
        assert_eq!(
            find_live_for_entity(&conn, RelatedEntity::sighting(1))
                .expect("live")
                .map(|t| t.id),
            Some(retry)
        );
    }

    #[test]
    fn test_completed_blocks_new_claims() {
        let conn = db();
        let id = insert_pending(&conn, &reward(9), T0).expect("claim");
        assert!(mark_completed(&conn, id, "hash-9", T0 + 1).expect("complete"));
        assert!(insert_pending(&conn, &reward(9), T0 + 2)
            .expect_err("completed entity")
            .is_constraint());
    }

    #[test]
    fn test_terminal_rows_do_not_change() {
        let conn = db();
        let id = insert_pending(&conn, &reward(2), T0).expect("claim");
        assert!(mark_completed(&conn, id, "hash-2", T0 + 1).expect("complete"));
        assert!(!mark_failed(&conn, id).expect("fail after complete"));
        assert!(!mark_completed(&conn, id, "other", T0 + 3).expect("complete twice"));

        let tx = get(&conn, id).expect("get");
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.tx_hash.as_deref(), Some("hash-2"));
        assert_eq!(tx.completed_at, Some(T0 + 1));
    }

    #[test]
    fn test_stale_pending_listing() {
        let conn = db();
        let old = insert_pending(&conn, &reward(3), T0).expect("old");
        let _fresh = insert_pending(&conn, &reward(4), T0 + 1000).expect("fresh");

        let stale = list_stale_pending(&conn, T0 + 10, 50).expect("stale");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old);
        assert_eq!(count_by_status(&conn, TransactionStatus::Pending).expect("count"), 2);
    }

    #[test]
    fn test_reopen_failed_respects_live_claim() {
        let conn = db();
        let first = insert_pending(&conn, &reward(7), T0).expect("first");
        assert!(mark_failed(&conn, first).expect("fail"));
        assert!(reopen_failed(&conn, first).expect("reopen"));
        assert!(!reopen_failed(&conn, first).expect("already pending"));

        assert!(mark_failed(&conn, first).expect("fail again"));
        let second = insert_pending(&conn, &reward(7), T0 + 1).expect("second");
        assert!(reopen_failed(&conn, first)
            .expect_err("entity claimed again")
            .is_constraint());
        let live = find_live_for_entity(&conn, RelatedEntity::sighting(7)).expect("live");
        assert_eq!(live.map(|t| t.id), Some(second));

        assert!(record_late_hash(&conn, first, "late").expect("hash"));
        assert!(!record_late_hash(&conn, first, "later").expect("hash once"));
        assert!(!record_late_hash(&conn, second, "pending row").expect("pending row"));
        let row = get(&conn, first).expect("row");
        assert_eq!(row.status, TransactionStatus::Failed);
        assert_eq!(row.tx_hash.as_deref(), Some("late"));
    }

    #[test]
    fn test_hash_is_unique() {
        let conn = db();
        let a = insert_pending(&conn, &reward(5), T0).expect("a");
        let b = insert_pending(&conn, &reward(6), T0).expect("b");
        set_hash(&conn, a, "same").expect("hash a");
        assert!(set_hash(&conn, b, "same").expect_err("duplicate hash").is_constraint());
    }
}
