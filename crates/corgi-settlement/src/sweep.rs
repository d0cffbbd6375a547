//! Reconciliation sweep.
//!
//! Walks unresolved state and drives it to a terminal answer:
//!
//! - stale `pending` transactions that carry a hash are resolved from the
//!   chain's view of that hash
//! - `pending` transactions that never got a hash (a crash between claim and
//!   broadcast, or a purchase intent nobody signed) are failed once they pass
//!   the orphan threshold, which frees the entity for a new attempt
//! - pending rewards of users who now hold a wallet are settled
//! - confirmed sightings that were never settled are settled
//!
//! Every step reuses the engine's guarded transitions, so a sweep may overlap
//! with live traffic or with another sweep. Cancellation is checked between
//! rows, never mid-row.

use corgi_db::queries::{pending_rewards, sightings, transactions};
use corgi_retry::{retry, Retryable};
use corgi_types::ledger::{Transaction, TransactionType};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::chain::ChainTxStatus;
use crate::engine::{complete_transaction, SettlementEngine, SettlementOutcome};
use crate::error::Result;
use crate::events::Event;

/// Thresholds and batch size for one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// A pending transaction with a hash is re-checked once it is this old.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// A pending transaction without a hash is failed once it is this old.
    #[serde(default = "default_orphan_after_secs")]
    pub orphan_after_secs: u64,
    /// Rows examined per phase.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
}

fn default_stale_after_secs() -> u64 {
    120
}

fn default_orphan_after_secs() -> u64 {
    900
}

fn default_batch_limit() -> u32 {
    100
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            orphan_after_secs: default_orphan_after_secs(),
            batch_limit: default_batch_limit(),
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub transactions_completed: u32,
    pub transactions_failed: u32,
    pub transactions_still_pending: u32,
    pub orphans_failed: u32,
    pub rewards_processed: u32,
    pub rewards_failed: u32,
    pub sightings_settled: u32,
    pub sightings_deferred: u32,
    /// Rows that raised an error and were skipped.
    pub errors: u32,
    /// The sweep stopped early because cancellation was requested.
    pub interrupted: bool,
}

#[derive(Clone)]
pub struct Sweeper {
    engine: SettlementEngine,
    config: SweepConfig,
}

enum Resolution {
    Completed,
    Failed,
    StillPending,
    Orphaned,
    Skipped,
}

impl Sweeper {
    pub fn new(engine: SettlementEngine, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run one pass. Stops between rows once `cancel` holds `true`.
    pub async fn run(&self, cancel: &watch::Receiver<bool>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let now = corgi_db::now();

        // (a) stale pending transactions
        let stale = {
            let conn = self.engine.db().lock().await;
            let cutoff = now.saturating_sub(self.config.stale_after_secs);
            transactions::list_stale_pending(&conn, cutoff, self.config.batch_limit)?
        };
        for row in stale {
            if *cancel.borrow() {
                report.interrupted = true;
                return Ok(finish(report));
            }
            match self.resolve_transaction(&row, now).await {
                Ok(Resolution::Completed) => report.transactions_completed += 1,
                Ok(Resolution::Failed) => report.transactions_failed += 1,
                Ok(Resolution::StillPending) => report.transactions_still_pending += 1,
                Ok(Resolution::Orphaned) => report.orphans_failed += 1,
                Ok(Resolution::Skipped) => {}
                Err(err) => {
                    warn!(
                        transaction_id = row.id,
                        error = %err,
                        "sweep could not resolve transaction"
                    );
                    report.errors += 1;
                }
            }
        }

        // (b) owed rewards of users that now hold a wallet
        let ready = {
            let conn = self.engine.db().lock().await;
            pending_rewards::users_ready_for_processing(&conn, self.config.batch_limit)?
        };
        for user_id in ready {
            if *cancel.borrow() {
                report.interrupted = true;
                return Ok(finish(report));
            }
            match self.engine.process_pending_rewards_for_user(user_id).await {
                Ok(processed) => {
                    report.rewards_processed += processed.processed;
                    report.rewards_failed += processed.failed;
                }
                Err(err) => {
                    warn!(user_id, error = %err, "sweep could not process pending rewards");
                    report.errors += 1;
                }
            }
        }

        // (c) confirmed sightings that never reached settlement
        let unsettled = {
            let conn = self.engine.db().lock().await;
            sightings::list_unsettled_confirmed(&conn, self.config.batch_limit)?
        };
        for sighting in unsettled {
            if *cancel.borrow() {
                report.interrupted = true;
                return Ok(finish(report));
            }
            match self.engine.settle_reward(sighting.id, sighting.reporter_id).await {
                Ok(SettlementOutcome::Settled { .. }) => report.sightings_settled += 1,
                Ok(SettlementOutcome::PendingWallet { .. }) => report.sightings_deferred += 1,
                Ok(outcome) => {
                    debug!(sighting_id = sighting.id, ?outcome, "sighting already handled")
                }
                Err(err) => {
                    warn!(
                        sighting_id = sighting.id,
                        error = %err,
                        "sweep could not settle sighting"
                    );
                    report.errors += 1;
                }
            }
        }

        Ok(finish(report))
    }

    async fn resolve_transaction(&self, row: &Transaction, now: u64) -> Result<Resolution> {
        let orphan_cutoff = now.saturating_sub(self.config.orphan_after_secs);
        let Some(tx_hash) = row.tx_hash.as_deref() else {
            if row.created_at > orphan_cutoff {
                return Ok(Resolution::Skipped);
            }
            let conn = self.engine.db().lock().await;
            if self.engine.is_in_flight(row.id) {
                debug!(transaction_id = row.id, "broadcast still running; not an orphan");
                return Ok(Resolution::StillPending);
            }
            if !transactions::mark_failed(&conn, row.id)? {
                return Ok(Resolution::Skipped);
            }
            error!(
                transaction_id = row.id,
                tx_type = %row.tx_type,
                to = %row.to_address,
                amount = %row.amount,
                "transaction never received a hash; marked failed for re-settlement"
            );
            return Ok(Resolution::Orphaned);
        };

        let chain = self.engine.chain();
        let outcome = retry(self.engine.retry_config(), move |_| {
            chain.get_transaction_status(tx_hash)
        })
        .await;
        let attempts = outcome.attempts;
        let status = match outcome.result {
            Ok(status) => status,
            // A signed purchase hash the chain refuses to know stops blocking
            // the wish once it is old enough to be an orphan.
            Err(source)
                if row.tx_type == TransactionType::Purchase
                    && !source.is_retryable()
                    && row.created_at <= orphan_cutoff =>
            {
                let conn = self.engine.db().lock().await;
                if !transactions::mark_failed(&conn, row.id)? {
                    return Ok(Resolution::Skipped);
                }
                error!(
                    transaction_id = row.id,
                    tx_hash,
                    error = %source,
                    "purchase hash unknown to the chain; marked failed"
                );
                return Ok(Resolution::Orphaned);
            }
            Err(source) => return Err(crate::SettlementError::Chain { source, attempts }),
        };

        match status {
            ChainTxStatus::Pending => Ok(Resolution::StillPending),
            ChainTxStatus::Failed => {
                let conn = self.engine.db().lock().await;
                if transactions::mark_failed(&conn, row.id)? {
                    warn!(transaction_id = row.id, tx_hash, "chain reports transaction failed");
                    Ok(Resolution::Failed)
                } else {
                    Ok(Resolution::Skipped)
                }
            }
            ChainTxStatus::Confirmed => {
                let completed = {
                    let mut conn = self.engine.db().lock().await;
                    let tx = conn
                        .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
                    let completed = complete_transaction(&tx, row, tx_hash, None, corgi_db::now())?;
                    tx.commit()?;
                    completed
                };
                if !completed {
                    return Ok(Resolution::Skipped);
                }
                info!(transaction_id = row.id, tx_hash, "sweep completed transaction");
                let event_type = match row.tx_type {
                    TransactionType::Reward => "RewardSettled",
                    TransactionType::Purchase => "WishPurchased",
                };
                self.engine.events().emit(Event::new(
                    event_type,
                    None,
                    serde_json::json!({
                        "transactionId": row.id,
                        "amount": row.amount,
                        "txHash": tx_hash,
                    }),
                ));
                Ok(Resolution::Completed)
            }
        }
    }
}

fn finish(report: SweepReport) -> SweepReport {
    if report != SweepReport::default() {
        info!(?report, "sweep finished");
    }
    report
}
