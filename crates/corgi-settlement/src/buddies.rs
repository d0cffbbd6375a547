//! Buddy pair lifecycle.
//!
//! A user belongs to at most one pending-or-active pair. The initiator may
//! cancel a pending request; only the other member may confirm it. Either
//! member may dissolve an active pair, after which the same two users may
//! pair again.

use corgi_db::queries::{buddies, users};
use corgi_types::buddy::{BuddyPair, BuddyStatus};
use corgi_types::{Id, ValidationError};
use rusqlite::TransactionBehavior;
use tracing::info;

use crate::error::{Result, SettlementError};
use crate::events::{Event, EventBus};
use crate::Db;

#[derive(Clone)]
pub struct BuddyService {
    db: Db,
    events: EventBus,
}

impl BuddyService {
    pub fn new(db: Db, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Ask `target_id` to become `initiator_id`'s buddy.
    pub async fn request(&self, initiator_id: Id, target_id: Id) -> Result<BuddyPair> {
        if initiator_id == target_id {
            return Err(ValidationError::Other("cannot buddy with yourself".into()).into());
        }

        let pair = {
            let mut conn = self.db.lock().await;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            users::get(&tx, initiator_id)?;
            users::get(&tx, target_id)?;

            for user_id in [initiator_id, target_id] {
                if let Some(open) = buddies::find_open_for_user(&tx, user_id)? {
                    return Err(SettlementError::Conflict(format!(
                        "user {user_id} already has a {} buddy pair",
                        open.status
                    )));
                }
            }

            let now = corgi_db::now();
            let pair_id = match buddies::find_between(&tx, initiator_id, target_id)? {
                Some(existing) => {
                    if !buddies::reopen(&tx, existing.id, initiator_id, now)? {
                        return Err(SettlementError::Conflict(format!(
                            "buddy pair {} is {}",
                            existing.id, existing.status
                        )));
                    }
                    existing.id
                }
                None => buddies::insert(&tx, initiator_id, target_id, now)?,
            };
            let pair = buddies::get(&tx, pair_id)?;
            tx.commit()?;
            pair
        };

        info!(pair_id = pair.id, initiator_id, target_id, "buddy requested");
        self.events.emit(Event::new(
            "BuddyRequested",
            Some(target_id),
            serde_json::json!({ "pairId": pair.id, "initiatorId": initiator_id }),
        ));
        Ok(pair)
    }

    /// Accept a pending request. Only the non-initiating member may confirm.
    pub async fn confirm(&self, pair_id: Id, user_id: Id) -> Result<BuddyPair> {
        let pair = {
            let conn = self.db.lock().await;
            let pair = buddies::get(&conn, pair_id)?;
            if !pair.contains(user_id) || pair.initiator_id == user_id {
                return Err(SettlementError::NotPermitted(format!(
                    "user {user_id} cannot confirm buddy pair {pair_id}"
                )));
            }
            if !buddies::activate(&conn, pair_id, corgi_db::now())? {
                return Err(SettlementError::Conflict(format!(
                    "buddy pair {pair_id} is {}",
                    pair.status
                )));
            }
            buddies::get(&conn, pair_id)?
        };

        info!(pair_id, user_id, "buddy pair active");
        self.events.emit(Event::new(
            "BuddyConfirmed",
            Some(pair.initiator_id),
            serde_json::json!({ "pairId": pair_id }),
        ));
        Ok(pair)
    }

    /// Withdraw a pending request. Only the initiator may cancel.
    pub async fn cancel(&self, pair_id: Id, user_id: Id) -> Result<()> {
        let conn = self.db.lock().await;
        let pair = buddies::get(&conn, pair_id)?;
        if pair.initiator_id != user_id {
            return Err(SettlementError::NotPermitted(format!(
                "only the initiator can cancel buddy pair {pair_id}"
            )));
        }
        if !buddies::delete_pending(&conn, pair_id)? {
            return Err(SettlementError::Conflict(format!(
                "buddy pair {pair_id} is {}",
                pair.status
            )));
        }
        info!(pair_id, user_id, "buddy request cancelled");
        Ok(())
    }

    /// End an active pair. Either member may dissolve it.
    pub async fn dissolve(&self, pair_id: Id, user_id: Id) -> Result<BuddyPair> {
        let pair = {
            let conn = self.db.lock().await;
            let pair = buddies::get(&conn, pair_id)?;
            if !pair.contains(user_id) {
                return Err(SettlementError::NotPermitted(format!(
                    "user {user_id} is not in buddy pair {pair_id}"
                )));
            }
            if pair.status != BuddyStatus::Active || !buddies::dissolve(&conn, pair_id)? {
                return Err(SettlementError::Conflict(format!(
                    "buddy pair {pair_id} is {}",
                    pair.status
                )));
            }
            buddies::get(&conn, pair_id)?
        };

        info!(pair_id, user_id, "buddy pair dissolved");
        self.events.emit(Event::new(
            "BuddyDissolved",
            pair.other(user_id),
            serde_json::json!({ "pairId": pair_id }),
        ));
        Ok(pair)
    }

    /// The user's pending or active pair.
    pub async fn current_for_user(&self, user_id: Id) -> Result<Option<BuddyPair>> {
        let conn = self.db.lock().await;
        Ok(buddies::find_open_for_user(&conn, user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::T0;

    async fn service_with_users(n: i64) -> (BuddyService, Vec<Id>) {
        let conn = corgi_db::open_memory().expect("db");
        let ids = (1..=n)
            .map(|tg| users::insert(&conn, tg, None, &format!("user {tg}"), T0).expect("user"))
            .collect();
        (BuddyService::new(crate::shared(conn), EventBus::new(16)), ids)
    }

    #[tokio::test]
    async fn test_request_confirm_dissolve() {
        let (service, ids) = service_with_users(2).await;
        let (a, b) = (ids[0], ids[1]);
        let mut rx = service.events.subscribe();

        let pair = service.request(a, b).await.expect("request");
        assert_eq!(pair.status, BuddyStatus::Pending);
        assert_eq!(rx.try_recv().expect("event").user_id, Some(b));

        let err = service.confirm(pair.id, a).await.expect_err("initiator");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let active = service.confirm(pair.id, b).await.expect("confirm");
        assert!(active.is_active());
        assert!(active.confirmed_at.is_some());

        let err = service.confirm(pair.id, b).await.expect_err("twice");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let dissolved = service.dissolve(pair.id, a).await.expect("dissolve");
        assert_eq!(dissolved.status, BuddyStatus::Dissolved);

        // The same two users can pair again.
        let again = service.request(b, a).await.expect("re-request");
        assert_eq!(again.id, pair.id);
        assert_eq!(again.initiator_id, b);
        assert_eq!(again.status, BuddyStatus::Pending);
    }

    #[tokio::test]
    async fn test_one_open_pair_per_user() {
        let (service, ids) = service_with_users(3).await;
        service.request(ids[0], ids[1]).await.expect("first");
        let err = service.request(ids[2], ids[1]).await.expect_err("taken");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = service.request(ids[2], ids[2]).await.expect_err("self");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = service.request(ids[2], 999).await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cancel_only_by_initiator_while_pending() {
        let (service, ids) = service_with_users(2).await;
        let pair = service.request(ids[0], ids[1]).await.expect("request");

        let err = service.cancel(pair.id, ids[1]).await.expect_err("not initiator");
        assert_eq!(err.kind(), ErrorKind::Validation);

        service.cancel(pair.id, ids[0]).await.expect("cancel");
        assert!(service
            .current_for_user(ids[0])
            .await
            .expect("lookup")
            .is_none());
    }
}
