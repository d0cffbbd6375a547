//! Corgi sighting query functions.

use corgi_types::sighting::{CorgiSighting, SightingStatus};
use corgi_types::Id;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{enum_col, opt_ts_col, ts_col};
use crate::{DbError, Result};

const COLUMNS: &str = "id, reporter_id, buddy_id, corgi_count, status, created_at, responded_at";

fn map_row(row: &Row<'_>) -> rusqlite::Result<CorgiSighting> {
    Ok(CorgiSighting {
        id: row.get(0)?,
        reporter_id: row.get(1)?,
        buddy_id: row.get(2)?,
        corgi_count: row.get(3)?,
        status: enum_col(row, 4)?,
        created_at: ts_col(row, 5)?,
        responded_at: opt_ts_col(row, 6)?,
    })
}

/// Insert a pending sighting. A second pending sighting for the same
/// reporter fails with `DbError::Constraint`.
pub fn insert(
    conn: &Connection,
    reporter_id: Id,
    buddy_id: Id,
    corgi_count: u32,
    now: u64,
) -> Result<Id> {
    conn.execute(
        "INSERT INTO corgi_sightings (reporter_id, buddy_id, corgi_count, status, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)",
        rusqlite::params![reporter_id, buddy_id, corgi_count, now as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: Id) -> Result<Option<CorgiSighting>> {
    let sighting = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM corgi_sightings WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(sighting)
}

pub fn get(conn: &Connection, id: Id) -> Result<CorgiSighting> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("sighting {id}")))
}

/// The reporter's outstanding sighting, if any.
pub fn find_pending_for_reporter(
    conn: &Connection,
    reporter_id: Id,
) -> Result<Option<CorgiSighting>> {
    let sighting = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM corgi_sightings
                 WHERE reporter_id = ?1 AND status = 'pending'"
            ),
            [reporter_id],
            map_row,
        )
        .optional()?;
    Ok(sighting)
}

/// Sightings awaiting a response from `buddy_id`.
pub fn list_pending_for_buddy(conn: &Connection, buddy_id: Id) -> Result<Vec<CorgiSighting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM corgi_sightings
         WHERE buddy_id = ?1 AND status = 'pending' ORDER BY created_at ASC"
    ))?;
    let rows = stmt
        .query_map([buddy_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Record the buddy's one-shot response. Returns false if the sighting was
/// no longer pending.
pub fn respond(conn: &Connection, id: Id, status: SightingStatus, now: u64) -> Result<bool> {
    if status == SightingStatus::Pending {
        return Err(DbError::Constraint(
            "a sighting response must confirm or deny".to_string(),
        ));
    }
    let updated = conn.execute(
        "UPDATE corgi_sightings SET status = ?1, responded_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        rusqlite::params![status.as_str(), now as i64, id],
    )?;
    Ok(updated == 1)
}

/// Confirmed sightings with neither a live reward transaction nor a pending
/// reward row (in any status). These are rewards that were never settled.
pub fn list_unsettled_confirmed(conn: &Connection, limit: u32) -> Result<Vec<CorgiSighting>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM corgi_sightings s
         WHERE s.status = 'confirmed'
           AND NOT EXISTS (
               SELECT 1 FROM transactions t
               WHERE t.related_entity_type = 'sighting'
                 AND t.related_entity_id = s.id
                 AND t.status != 'failed')
           AND NOT EXISTS (
               SELECT 1 FROM pending_rewards p WHERE p.sighting_id = s.id)
         ORDER BY s.responded_at ASC
         LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map([limit], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, user, T0};

    #[test]
    fn test_one_pending_per_reporter() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let first = insert(&conn, a, b, 3, T0).expect("first");
        let err = insert(&conn, a, b, 4, T0).expect_err("second pending");
        assert!(err.is_constraint());

        respond(&conn, first, SightingStatus::Denied, T0 + 1).expect("deny");
        insert(&conn, a, b, 4, T0 + 2).expect("new sighting after response");
    }

    #[test]
    fn test_respond_is_one_shot() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, 3, T0).expect("insert");

        assert!(respond(&conn, id, SightingStatus::Confirmed, T0 + 1).expect("confirm"));
        assert!(!respond(&conn, id, SightingStatus::Denied, T0 + 2).expect("second response"));

        let s = get(&conn, id).expect("get");
        assert_eq!(s.status, SightingStatus::Confirmed);
        assert_eq!(s.responded_at, Some(T0 + 1));
    }

    #[test]
    fn test_corgi_count_checked_by_store() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        assert!(insert(&conn, a, b, 0, T0).expect_err("zero").is_constraint());
        assert!(insert(&conn, a, b, 101, T0).expect_err("101").is_constraint());
    }

    #[test]
    fn test_unsettled_confirmed() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, 3, T0).expect("insert");
        assert!(list_unsettled_confirmed(&conn, 10).expect("list").is_empty());

        respond(&conn, id, SightingStatus::Confirmed, T0 + 1).expect("confirm");
        let unsettled = list_unsettled_confirmed(&conn, 10).expect("list");
        assert_eq!(unsettled.len(), 1);
        assert_eq!(unsettled[0].id, id);

        crate::queries::pending_rewards::insert(
            &conn,
            a,
            id,
            corgi_types::TokenAmount::from_base_units(3),
            T0 + 1,
        )
        .expect("pending reward");
        assert!(list_unsettled_confirmed(&conn, 10).expect("list").is_empty());
    }
}
