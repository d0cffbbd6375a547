//! Wish creation, buddy approval and the marketplace listing.
//!
//! Purchases go through [`crate::engine::SettlementEngine::purchase_wish`].

use corgi_db::queries::{buddies, wishes};
use corgi_types::wish::Wish;
use corgi_types::{validate_wish_description, Id, WishAmount};
use tracing::info;

use crate::error::{Result, SettlementError};
use crate::events::{Event, EventBus};
use crate::Db;

#[derive(Clone)]
pub struct WishService {
    db: Db,
    events: EventBus,
}

impl WishService {
    pub fn new(db: Db, events: EventBus) -> Self {
        Self { db, events }
    }

    /// Create a wish for the creator's active buddy to approve.
    pub async fn create(
        &self,
        creator_id: Id,
        description: &str,
        amount: WishAmount,
    ) -> Result<Wish> {
        let description = validate_wish_description(description)?;

        let wish = {
            let conn = self.db.lock().await;
            let pair = buddies::find_active_for_user(&conn, creator_id)?.ok_or_else(|| {
                SettlementError::NotPermitted(format!(
                    "user {creator_id} needs an active buddy to make wishes"
                ))
            })?;
            let buddy_id = pair.other(creator_id).ok_or_else(|| {
                SettlementError::Internal(format!("buddy pair {} lost its member", pair.id))
            })?;
            let id = wishes::insert(
                &conn,
                creator_id,
                buddy_id,
                &description,
                amount,
                corgi_db::now(),
            )?;
            wishes::get(&conn, id)?
        };

        info!(wish_id = wish.id, creator_id, amount = %amount, "wish created");
        self.events.emit(Event::new(
            "WishCreated",
            Some(wish.buddy_id),
            serde_json::json!({ "wishId": wish.id }),
        ));
        Ok(wish)
    }

    /// The buddy accepts (publishing to the marketplace) or rejects a wish.
    pub async fn respond(&self, wish_id: Id, responder_id: Id, accept: bool) -> Result<Wish> {
        let wish = {
            let conn = self.db.lock().await;
            let current = wishes::get(&conn, wish_id)?;
            if current.buddy_id != responder_id {
                return Err(SettlementError::NotPermitted(format!(
                    "only the creator's buddy can respond to wish {wish_id}"
                )));
            }
            if !wishes::respond(&conn, wish_id, accept, corgi_db::now())? {
                return Err(SettlementError::Conflict(format!(
                    "wish {wish_id} was already {}",
                    current.status
                )));
            }
            wishes::get(&conn, wish_id)?
        };

        info!(wish_id, responder_id, status = %wish.status, "wish answered");
        self.events.emit(Event::new(
            if accept { "WishAccepted" } else { "WishRejected" },
            Some(wish.creator_id),
            serde_json::json!({ "wishId": wish_id }),
        ));
        Ok(wish)
    }

    /// Accepted wishes other users may buy.
    pub async fn marketplace(&self, viewer_id: Id) -> Result<Vec<Wish>> {
        let conn = self.db.lock().await;
        Ok(wishes::list_marketplace(&conn, viewer_id)?)
    }

    pub async fn list_for_user(&self, user_id: Id) -> Result<Vec<Wish>> {
        let conn = self.db.lock().await;
        Ok(wishes::list_for_user(&conn, user_id)?)
    }
}
