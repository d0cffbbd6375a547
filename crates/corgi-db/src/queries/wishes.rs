//! Wish query functions.

use corgi_types::wish::Wish;
use corgi_types::{Id, WishAmount};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::queries::{enum_col, opt_ts_col, ts_col};
use crate::{DbError, Result};

const COLUMNS: &str = "id, creator_id, buddy_id, description, proposed_amount_cents, status, \
                       created_at, accepted_at, purchased_at, purchased_by";

fn map_row(row: &Row<'_>) -> rusqlite::Result<Wish> {
    let cents: i64 = row.get(4)?;
    let proposed_amount = u64::try_from(cents)
        .map_err(|_| corgi_types::ValidationError::MalformedAmount(cents.to_string()))
        .and_then(WishAmount::from_cents)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e)))?;
    Ok(Wish {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        buddy_id: row.get(2)?,
        description: row.get(3)?,
        proposed_amount,
        status: enum_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        accepted_at: opt_ts_col(row, 7)?,
        purchased_at: opt_ts_col(row, 8)?,
        purchased_by: row.get(9)?,
    })
}

/// Insert a pending wish.
pub fn insert(
    conn: &Connection,
    creator_id: Id,
    buddy_id: Id,
    description: &str,
    amount: WishAmount,
    now: u64,
) -> Result<Id> {
    conn.execute(
        "INSERT INTO wishes
             (creator_id, buddy_id, description, proposed_amount_cents, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
        rusqlite::params![
            creator_id,
            buddy_id,
            description,
            amount.cents() as i64,
            now as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find(conn: &Connection, id: Id) -> Result<Option<Wish>> {
    let wish = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM wishes WHERE id = ?1"),
            [id],
            map_row,
        )
        .optional()?;
    Ok(wish)
}

pub fn get(conn: &Connection, id: Id) -> Result<Wish> {
    find(conn, id)?.ok_or_else(|| DbError::NotFound(format!("wish {id}")))
}

/// pending -> accepted | rejected. Returns false if the wish was not pending.
pub fn respond(conn: &Connection, id: Id, accept: bool, now: u64) -> Result<bool> {
    let updated = if accept {
        conn.execute(
            "UPDATE wishes SET status = 'accepted', accepted_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            rusqlite::params![now as i64, id],
        )?
    } else {
        conn.execute(
            "UPDATE wishes SET status = 'rejected' WHERE id = ?1 AND status = 'pending'",
            [id],
        )?
    };
    Ok(updated == 1)
}

/// Accepted wishes, newest first, excluding the viewer's own.
pub fn list_marketplace(conn: &Connection, viewer_id: Id) -> Result<Vec<Wish>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM wishes
         WHERE status = 'accepted' AND creator_id != ?1
         ORDER BY accepted_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([viewer_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Wishes the user created or must respond to.
pub fn list_for_user(conn: &Connection, user_id: Id) -> Result<Vec<Wish>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM wishes
         WHERE creator_id = ?1 OR buddy_id = ?1
         ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([user_id], map_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// accepted -> purchased. Returns false if the wish was not accepted.
pub fn mark_purchased(
    conn: &Connection,
    id: Id,
    purchaser_id: Option<Id>,
    now: u64,
) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE wishes SET status = 'purchased', purchased_at = ?1, purchased_by = ?2
         WHERE id = ?3 AND status = 'accepted'",
        rusqlite::params![now as i64, purchaser_id, id],
    )?;
    Ok(updated == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::{db, user, T0};
    use corgi_types::wish::WishStatus;

    fn amount(s: &str) -> WishAmount {
        WishAmount::parse(s).expect("amount")
    }

    #[test]
    fn test_insert_and_accept() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, "A squeaky toy", amount("12.50"), T0).expect("insert");

        assert!(list_marketplace(&conn, b).expect("market").is_empty());
        assert!(respond(&conn, id, true, T0 + 1).expect("accept"));
        assert!(!respond(&conn, id, false, T0 + 2).expect("second response"));

        let wish = get(&conn, id).expect("get");
        assert_eq!(wish.status, WishStatus::Accepted);
        assert_eq!(wish.proposed_amount.cents(), 1250);
        assert_eq!(wish.accepted_at, Some(T0 + 1));
    }

    #[test]
    fn test_marketplace_hides_own_wishes() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, "Treats", amount("3"), T0).expect("insert");
        respond(&conn, id, true, T0).expect("accept");

        assert!(list_marketplace(&conn, a).expect("own view").is_empty());
        assert_eq!(list_marketplace(&conn, b).expect("buddy view").len(), 1);
    }

    #[test]
    fn test_mark_purchased_requires_accepted() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, "Leash", amount("20"), T0).expect("insert");
        assert!(!mark_purchased(&conn, id, Some(b), T0).expect("pending wish"));

        respond(&conn, id, true, T0).expect("accept");
        assert!(mark_purchased(&conn, id, Some(b), T0 + 1).expect("purchase"));
        assert!(!mark_purchased(&conn, id, Some(b), T0 + 2).expect("already purchased"));

        let wish = get(&conn, id).expect("get");
        assert_eq!(wish.purchased_by, Some(b));
        assert_eq!(wish.status, WishStatus::Purchased);
    }

    #[test]
    fn test_creator_cannot_be_purchaser() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let id = insert(&conn, a, b, "Ball", amount("1"), T0).expect("insert");
        respond(&conn, id, true, T0).expect("accept");
        assert!(mark_purchased(&conn, id, Some(a), T0).expect_err("self purchase").is_constraint());
    }

    #[test]
    fn test_description_length_checked_by_store() {
        let conn = db();
        let a = user(&conn, 1);
        let b = user(&conn, 2);
        let exact = "d".repeat(500);
        insert(&conn, a, b, &exact, amount("1"), T0).expect("500 chars");
        let over = "d".repeat(501);
        assert!(insert(&conn, a, b, &over, amount("1"), T0)
            .expect_err("501 chars")
            .is_constraint());
    }
}
