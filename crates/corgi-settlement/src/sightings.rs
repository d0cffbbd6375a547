//! Sighting reports and buddy responses.

use corgi_db::queries::{buddies, sightings, users};
use corgi_types::api::SightingResponse;
use corgi_types::sighting::{CorgiSighting, SightingStatus};
use corgi_types::{validate_corgi_count, Id};
use rusqlite::TransactionBehavior;
use tracing::{info, warn};

use crate::engine::{record_pending_reward, SettlementEngine, SettlementOutcome};
use crate::error::{Result, SettlementError};
use crate::events::Event;

#[derive(Clone)]
pub struct SightingService {
    engine: SettlementEngine,
}

impl SightingService {
    pub fn new(engine: SettlementEngine) -> Self {
        Self { engine }
    }

    /// Report a sighting for the reporter's active buddy to confirm.
    pub async fn report(&self, reporter_id: Id, corgi_count: u32) -> Result<CorgiSighting> {
        let corgi_count = validate_corgi_count(corgi_count)?;

        let sighting = {
            let conn = self.engine.db().lock().await;
            let pair = buddies::find_active_for_user(&conn, reporter_id)?.ok_or_else(|| {
                SettlementError::NotPermitted(format!(
                    "user {reporter_id} needs an active buddy to report sightings"
                ))
            })?;
            let buddy_id = pair.other(reporter_id).ok_or_else(|| {
                SettlementError::Internal(format!("buddy pair {} lost its member", pair.id))
            })?;

            if let Some(open) = sightings::find_pending_for_reporter(&conn, reporter_id)? {
                return Err(SettlementError::Conflict(format!(
                    "sighting {} is still awaiting confirmation",
                    open.id
                )));
            }
            let id = sightings::insert(&conn, reporter_id, buddy_id, corgi_count, corgi_db::now())?;
            sightings::get(&conn, id)?
        };

        info!(
            sighting_id = sighting.id,
            reporter_id,
            corgi_count,
            "sighting reported"
        );
        self.engine.events().emit(Event::new(
            "SightingReported",
            Some(sighting.buddy_id),
            serde_json::json!({ "sightingId": sighting.id, "corgiCount": corgi_count }),
        ));
        Ok(sighting)
    }

    /// Record the buddy's confirm or deny and settle the reward on confirm.
    ///
    /// A reporter without a wallet is owed a pending reward, written in the
    /// same store transaction as the confirmation. A reporter with a wallet is
    /// paid right away; if that fails the confirmation still stands and the
    /// response reports the reward as pending for the sweep.
    pub async fn respond(
        &self,
        sighting_id: Id,
        responder_id: Id,
        confirm: bool,
    ) -> Result<SightingResponse> {
        let status = if confirm {
            SightingStatus::Confirmed
        } else {
            SightingStatus::Denied
        };

        let (sighting, reporter_has_wallet) = {
            let mut conn = self.engine.db().lock().await;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = sightings::get(&tx, sighting_id)?;
            if current.buddy_id != responder_id {
                return Err(SettlementError::NotPermitted(format!(
                    "only the reporter's buddy can respond to sighting {sighting_id}"
                )));
            }
            let now = corgi_db::now();
            if !sightings::respond(&tx, sighting_id, status, now)? {
                return Err(SettlementError::Conflict(format!(
                    "sighting {sighting_id} was already {}",
                    current.status
                )));
            }

            let sighting = sightings::get(&tx, sighting_id)?;
            let has_wallet = users::get(&tx, sighting.reporter_id)?.has_wallet();
            if confirm && !has_wallet {
                let amount = self.engine.calculator().reward_for(sighting.corgi_count)?;
                record_pending_reward(&tx, &sighting, amount, now)?;
            }
            tx.commit()?;
            (sighting, has_wallet)
        };

        info!(sighting_id, responder_id, status = %status, "sighting answered");
        self.engine.events().emit(Event::new(
            if confirm {
                "SightingConfirmed"
            } else {
                "SightingDenied"
            },
            Some(sighting.reporter_id),
            serde_json::json!({ "sightingId": sighting_id }),
        ));

        if !confirm {
            return Ok(SightingResponse {
                sighting,
                reward_earned: None,
                reward_pending: false,
            });
        }
        if !reporter_has_wallet {
            return Ok(SightingResponse {
                sighting,
                reward_earned: None,
                reward_pending: true,
            });
        }

        let reward_earned = match self
            .engine
            .settle_reward(sighting_id, sighting.reporter_id)
            .await
        {
            Ok(SettlementOutcome::Settled { amount, .. }) => Some(amount),
            Ok(outcome) => {
                warn!(sighting_id, ?outcome, "reward not settled during confirmation");
                None
            }
            Err(err) => {
                warn!(sighting_id, error = %err, "reward settlement deferred");
                None
            }
        };

        Ok(SightingResponse {
            sighting,
            reward_pending: reward_earned.is_none(),
            reward_earned,
        })
    }

    /// Sightings waiting on `buddy_id`'s response.
    pub async fn pending_for_buddy(&self, buddy_id: Id) -> Result<Vec<CorgiSighting>> {
        let conn = self.engine.db().lock().await;
        Ok(sightings::list_pending_for_buddy(&conn, buddy_id)?)
    }
}
