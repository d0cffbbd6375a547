//! Pending reward ledger.
//!
//! Rewards owed to users without a wallet. Rows are created by sighting
//! confirmation and moved to `processed` by the settlement engine; this module
//! covers reads and the administrative cancel.

use corgi_db::queries::pending_rewards;
use corgi_types::ledger::{PendingReward, PendingRewardStatus};
use corgi_types::{Id, TokenAmount};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, SettlementError};
use crate::Db;

/// Outcome of settling a user's owed rewards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProcessingReport {
    /// Rewards broadcast and completed.
    pub processed: u32,
    /// Rewards whose settlement failed; they stay pending for the sweep.
    pub failed: u32,
    /// Rewards another caller already handled or that still wait for a wallet.
    pub skipped: u32,
    pub amount_settled: TokenAmount,
}

#[derive(Clone)]
pub struct PendingRewardLedger {
    db: Db,
}

impl PendingRewardLedger {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn list_for_user(&self, user_id: Id) -> Result<Vec<PendingReward>> {
        let conn = self.db.lock().await;
        Ok(pending_rewards::list_pending_for_user(&conn, user_id)?)
    }

    pub async fn total_for_user(&self, user_id: Id) -> Result<TokenAmount> {
        let conn = self.db.lock().await;
        Ok(pending_rewards::pending_total_for_user(&conn, user_id)?)
    }

    /// Cancel a reward that has not been paid. Cancelled rewards are never
    /// settled, by the engine or by the sweep.
    pub async fn cancel(&self, pending_reward_id: Id) -> Result<PendingReward> {
        let conn = self.db.lock().await;
        let reward = pending_rewards::find(&conn, pending_reward_id)?
            .ok_or_else(|| {
                SettlementError::NotFound(format!("pending reward {pending_reward_id}"))
            })?;
        if reward.status != PendingRewardStatus::Pending
            || !pending_rewards::cancel(&conn, pending_reward_id, corgi_db::now())?
        {
            return Err(SettlementError::Conflict(format!(
                "pending reward {pending_reward_id} is {}",
                reward.status
            )));
        }
        info!(pending_reward_id, user_id = reward.user_id, "pending reward cancelled");
        Ok(pending_rewards::get(&conn, pending_reward_id)?)
    }
}
