//! Transaction settlement engine.
//!
//! Every transfer goes through three steps:
//!
//! 1. **Claim**: one IMMEDIATE store transaction checks idempotency and
//!    inserts a `pending` transaction row. The partial unique index on
//!    `(related_entity_type, related_entity_id)` serializes concurrent claims;
//!    the loser sees a constraint violation and reports the entity as
//!    already in flight.
//! 2. **Broadcast**: the chain call runs under [`corgi_retry::retry`] with no
//!    database lock held.
//! 3. **Finalize**: a second store transaction completes the row together with
//!    the bank mirror and the pending reward, or marks the row failed.
//!
//! A failed row stays as an audit record and does not block a later attempt.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use corgi_db::queries::transactions::NewTransaction;
use corgi_db::queries::{bank, pending_rewards, sightings, transactions, users, wishes};
use corgi_retry::{retry, RetryConfig};
use corgi_reward::RewardCalculator;
use corgi_types::api::{PurchaseConfirmation, PurchaseIntent, TonTransaction};
use corgi_types::ledger::{
    PendingRewardStatus, RelatedEntity, RelatedEntityType, Transaction, TransactionStatus,
    TransactionType,
};
use corgi_types::sighting::{CorgiSighting, SightingStatus};
use corgi_types::wish::WishStatus;
use corgi_types::{Id, TokenAmount, ValidationError};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, error, info, warn};

use crate::chain::{ChainClient, ChainTxStatus};
use crate::error::{Result, SettlementError};
use crate::events::{Event, EventBus};
use crate::pending::PendingProcessingReport;
use crate::Db;

/// What `settle_reward` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Broadcast and completed during this call.
    Settled {
        transaction_id: Id,
        amount: TokenAmount,
        tx_hash: String,
    },
    /// The reporter has no wallet; the reward is owed as a pending reward.
    PendingWallet {
        pending_reward_id: Id,
        amount: TokenAmount,
    },
    /// A completed transaction already paid this sighting.
    AlreadySettled,
    /// Another caller holds the claim and its broadcast is in flight.
    AlreadyPending,
    /// The owed reward was cancelled administratively.
    Cancelled,
}

/// A claimed reward waiting for its broadcast.
#[derive(Debug)]
struct RewardClaim {
    transaction_id: Id,
    sighting_id: Id,
    user_id: Id,
    to: String,
    amount: TokenAmount,
}

enum Claim {
    Resolved(SettlementOutcome),
    Broadcast(RewardClaim),
}

/// How a successful broadcast was recorded.
enum Finalized {
    Completed,
    /// The row had been failed during the broadcast and was brought back.
    Revived,
    /// The row had been failed and the entity claimed again; both transfers
    /// went out.
    Duplicate,
    AlreadyResolved,
}

/// Transaction ids whose broadcast is running in this process.
type InFlightSet = Arc<Mutex<HashSet<Id>>>;

/// Removes its id from the in-flight set when dropped.
struct InFlight {
    set: InFlightSet,
    id: Id,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Settles rewards and wish purchases against the ledger and the chain.
///
/// Cheap to clone; every clone shares the store, chain client and event bus.
#[derive(Clone)]
pub struct SettlementEngine {
    db: Db,
    chain: Arc<dyn ChainClient>,
    calculator: RewardCalculator,
    retry: RetryConfig,
    events: EventBus,
    in_flight: InFlightSet,
}

impl SettlementEngine {
    pub fn new(
        db: Db,
        chain: Arc<dyn ChainClient>,
        calculator: RewardCalculator,
        retry: RetryConfig,
        events: EventBus,
    ) -> Self {
        Self {
            db,
            chain,
            calculator,
            retry,
            events,
            in_flight: Arc::default(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn calculator(&self) -> &RewardCalculator {
        &self.calculator
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Whether a broadcast for `transaction_id` is running in this process.
    pub(crate) fn is_in_flight(&self, transaction_id: Id) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&transaction_id)
    }

    fn track(&self, transaction_id: Id) -> InFlight {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction_id);
        InFlight {
            set: self.in_flight.clone(),
            id: transaction_id,
        }
    }

    /// Pay the reward for a confirmed sighting, at most once.
    ///
    /// # Errors
    ///
    /// - [`SettlementError::NotFound`] if the sighting does not exist
    /// - [`SettlementError::NotPermitted`] if `reporter_id` did not report it
    /// - [`SettlementError::Conflict`] if the sighting is not confirmed
    /// - [`SettlementError::InsufficientBalance`] if the bank mirror cannot cover it
    /// - [`SettlementError::Chain`] if the broadcast failed; the transaction row
    ///   is then `failed` and a later call may try again
    pub async fn settle_reward(
        &self,
        sighting_id: Id,
        reporter_id: Id,
    ) -> Result<SettlementOutcome> {
        // Tracked while the store lock is held, so the sweep never sees the
        // claim without its in-flight mark.
        let (claim, _in_flight) = {
            let mut conn = self.db.lock().await;
            let claim = claim_reward(
                &mut conn,
                &self.calculator,
                sighting_id,
                reporter_id,
                corgi_db::now(),
            )?;
            match claim {
                Claim::Resolved(outcome) => {
                    debug!(sighting_id, ?outcome, "settlement short-circuited");
                    return Ok(outcome);
                }
                Claim::Broadcast(claim) => {
                    let guard = self.track(claim.transaction_id);
                    (claim, guard)
                }
            }
        };

        info!(
            sighting_id,
            transaction_id = claim.transaction_id,
            amount = %claim.amount,
            "broadcasting reward"
        );

        let memo = reward_memo(sighting_id);
        let chain = self.chain.as_ref();
        let to = claim.to.as_str();
        let amount = claim.amount;
        let memo_text = memo.as_str();
        let outcome = retry(&self.retry, move |_| {
            chain.send_transaction(to, amount, Some(memo_text))
        })
        .await;
        let attempts = outcome.attempts;

        match outcome.result {
            Ok(receipt) => self.finalize_reward(&claim, &receipt.hash).await,
            Err(source) => {
                {
                    let conn = self.db.lock().await;
                    transactions::mark_failed(&conn, claim.transaction_id)?;
                }
                warn!(
                    sighting_id,
                    transaction_id = claim.transaction_id,
                    attempts,
                    error = %source,
                    "reward broadcast failed"
                );
                self.events.emit(Event::new(
                    "RewardFailed",
                    Some(claim.user_id),
                    serde_json::json!({
                        "sightingId": sighting_id,
                        "transactionId": claim.transaction_id,
                    }),
                ));
                Err(SettlementError::Chain { source, attempts })
            }
        }
    }

    async fn finalize_reward(
        &self,
        claim: &RewardClaim,
        tx_hash: &str,
    ) -> Result<SettlementOutcome> {
        let finalized = {
            let mut conn = self.db.lock().await;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row = transactions::get(&tx, claim.transaction_id)?;
            let finalized = record_broadcast(&tx, &row, tx_hash, corgi_db::now())?;
            tx.commit()?;
            finalized
        };

        match finalized {
            Finalized::Completed => {}
            Finalized::Revived => {
                warn!(
                    transaction_id = claim.transaction_id,
                    tx_hash,
                    "transaction was failed during its broadcast; completed from the receipt"
                );
            }
            Finalized::Duplicate => {
                error!(
                    sighting_id = claim.sighting_id,
                    transaction_id = claim.transaction_id,
                    tx_hash,
                    to = %claim.to,
                    amount = %claim.amount,
                    "reward paid twice; hash kept on the failed transaction for review"
                );
                return Err(SettlementError::Conflict(format!(
                    "transaction {} was failed and re-claimed while broadcasting {tx_hash}",
                    claim.transaction_id
                )));
            }
            Finalized::AlreadyResolved => {
                error!(
                    transaction_id = claim.transaction_id,
                    tx_hash,
                    "broadcast succeeded for a transaction that was already resolved"
                );
                return Err(SettlementError::Conflict(format!(
                    "transaction {} was resolved while broadcasting {tx_hash}",
                    claim.transaction_id
                )));
            }
        }

        info!(
            sighting_id = claim.sighting_id,
            transaction_id = claim.transaction_id,
            tx_hash,
            "reward settled"
        );
        self.events.emit(Event::new(
            "RewardSettled",
            Some(claim.user_id),
            serde_json::json!({
                "sightingId": claim.sighting_id,
                "transactionId": claim.transaction_id,
                "amount": claim.amount,
                "txHash": tx_hash,
            }),
        ));

        Ok(SettlementOutcome::Settled {
            transaction_id: claim.transaction_id,
            amount: claim.amount,
            tx_hash: tx_hash.to_string(),
        })
    }

    /// Settle every pending reward a user is owed.
    ///
    /// Rewards are settled independently. A failure leaves that reward pending
    /// for the sweep and does not stop the others.
    pub async fn process_pending_rewards_for_user(
        &self,
        user_id: Id,
    ) -> Result<PendingProcessingReport> {
        let owed = {
            let conn = self.db.lock().await;
            users::get(&conn, user_id)?;
            pending_rewards::list_pending_for_user(&conn, user_id)?
        };

        let mut report = PendingProcessingReport::default();
        for reward in owed {
            match self.settle_reward(reward.sighting_id, user_id).await {
                Ok(SettlementOutcome::Settled { amount, .. }) => {
                    report.processed += 1;
                    report.amount_settled = report
                        .amount_settled
                        .checked_add(amount)
                        .unwrap_or(report.amount_settled);
                }
                Ok(outcome) => {
                    debug!(
                        user_id,
                        pending_reward_id = reward.id,
                        ?outcome,
                        "pending reward skipped"
                    );
                    report.skipped += 1;
                }
                Err(err) => {
                    warn!(
                        user_id,
                        pending_reward_id = reward.id,
                        error = %err,
                        "pending reward left for the sweep"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.processed > 0 {
            info!(
                user_id,
                processed = report.processed,
                amount = %report.amount_settled,
                "pending rewards settled"
            );
        }
        Ok(report)
    }

    /// Claim a purchase transaction and return the transfer for the
    /// purchaser's wallet to sign.
    ///
    /// The wish stays `accepted` until [`Self::confirm_wish_purchase`] sees the
    /// chain confirm the signed transfer. Calling this again before a hash is
    /// submitted returns the same intent.
    pub async fn purchase_wish(&self, wish_id: Id, purchaser_id: Id) -> Result<PurchaseIntent> {
        let now = corgi_db::now();
        let mut conn = self.db.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let wish = wishes::find(&tx, wish_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("wish {wish_id}")))?;
        if wish.creator_id == purchaser_id {
            return Err(SettlementError::NotPermitted(
                "cannot purchase your own wish".to_string(),
            ));
        }
        if wish.status != WishStatus::Accepted {
            return Err(SettlementError::Conflict(format!(
                "wish {wish_id} is {}",
                wish.status
            )));
        }

        let from = users::get(&tx, purchaser_id)?
            .wallet_address
            .ok_or(SettlementError::WalletRequired(purchaser_id))?;
        let to = users::get(&tx, wish.creator_id)?
            .wallet_address
            .ok_or(SettlementError::WalletRequired(wish.creator_id))?;

        if let Some(live) = transactions::find_live_for_entity(&tx, RelatedEntity::wish(wish_id))? {
            if live.status == TransactionStatus::Pending
                && live.from_address == from
                && live.tx_hash.is_none()
            {
                return Ok(purchase_intent(&live));
            }
            return Err(SettlementError::Conflict(format!(
                "wish {wish_id} already has a purchase in progress"
            )));
        }

        let new = NewTransaction {
            from_address: &from,
            to_address: &to,
            amount: wish.proposed_amount.to_token_amount(),
            tx_type: TransactionType::Purchase,
            related: Some(RelatedEntity::wish(wish_id)),
        };
        let transaction_id = transactions::insert_pending(&tx, &new, now).map_err(|e| {
            if e.is_constraint() {
                SettlementError::Conflict(format!(
                    "wish {wish_id} already has a purchase in progress"
                ))
            } else {
                e.into()
            }
        })?;
        let row = transactions::get(&tx, transaction_id)?;
        tx.commit()?;

        info!(wish_id, purchaser_id, transaction_id, "wish purchase initiated");
        Ok(purchase_intent(&row))
    }

    /// Record the signed transfer's hash and mark the wish purchased once the
    /// chain confirms it.
    ///
    /// A hash the chain still reports as pending is left for the sweep. A
    /// failed transfer marks the transaction failed and keeps the wish on the
    /// marketplace.
    pub async fn confirm_wish_purchase(
        &self,
        wish_id: Id,
        purchaser_id: Id,
        tx_hash: &str,
    ) -> Result<PurchaseConfirmation> {
        let tx_hash = tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(ValidationError::Other("transaction hash must not be empty".into()).into());
        }

        let row = {
            let conn = self.db.lock().await;
            let wish = wishes::find(&conn, wish_id)?
                .ok_or_else(|| SettlementError::NotFound(format!("wish {wish_id}")))?;
            let purchaser = users::get(&conn, purchaser_id)?;
            let live = transactions::find_live_for_entity(&conn, RelatedEntity::wish(wish_id))?
                .ok_or_else(|| {
                    SettlementError::Conflict(format!("wish {wish_id} has no purchase in progress"))
                })?;

            if live.status == TransactionStatus::Completed {
                return Ok(PurchaseConfirmation {
                    transaction_id: live.id,
                    transaction_status: live.status,
                    wish,
                });
            }
            if purchaser.wallet_address.as_deref() != Some(live.from_address.as_str()) {
                return Err(SettlementError::NotPermitted(format!(
                    "purchase {} was not initiated by user {purchaser_id}",
                    live.id
                )));
            }
            if let Some(existing) = live.tx_hash.as_deref() {
                if existing != tx_hash {
                    return Err(SettlementError::Conflict(format!(
                        "purchase {} already has a different hash",
                        live.id
                    )));
                }
            }
            live
        };

        // Ask the chain first. A hash it cannot report on is never stored,
        // so the purchaser can resubmit and the sweep can still free the row.
        let chain = self.chain.as_ref();
        let outcome = retry(&self.retry, move |_| chain.get_transaction_status(tx_hash)).await;
        let attempts = outcome.attempts;
        let status = outcome
            .result
            .map_err(|source| SettlementError::Chain { source, attempts })?;

        let now = corgi_db::now();
        let mut conn = self.db.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let row = transactions::get(&tx, row.id)?;
        if row.status == TransactionStatus::Pending {
            match row.tx_hash.as_deref() {
                Some(existing) if existing != tx_hash => {
                    return Err(SettlementError::Conflict(format!(
                        "purchase {} already has a different hash",
                        row.id
                    )));
                }
                Some(_) => {}
                None => {
                    transactions::set_hash(&tx, row.id, tx_hash).map_err(|e| {
                        if e.is_constraint() {
                            SettlementError::Conflict(format!(
                                "hash {tx_hash} is already recorded for another transaction"
                            ))
                        } else {
                            e.into()
                        }
                    })?;
                }
            }
            match status {
                ChainTxStatus::Confirmed => {
                    if complete_transaction(&tx, &row, tx_hash, Some(purchaser_id), now)? {
                        info!(wish_id, transaction_id = row.id, tx_hash, "wish purchased");
                    }
                }
                ChainTxStatus::Failed => {
                    if transactions::mark_failed(&tx, row.id)? {
                        warn!(
                            wish_id,
                            transaction_id = row.id,
                            tx_hash,
                            "wish purchase failed on chain"
                        );
                    }
                }
                ChainTxStatus::Pending => {
                    debug!(wish_id, transaction_id = row.id, "purchase awaiting confirmation");
                }
            }
        }
        tx.commit()?;

        let current = transactions::get(&conn, row.id)?;
        let wish = wishes::get(&conn, wish_id)?;
        drop(conn);

        if status == ChainTxStatus::Confirmed && wish.status == WishStatus::Purchased {
            self.events.emit(Event::new(
                "WishPurchased",
                Some(wish.creator_id),
                serde_json::json!({
                    "wishId": wish_id,
                    "purchaserId": purchaser_id,
                    "transactionId": row.id,
                }),
            ));
        }

        Ok(PurchaseConfirmation {
            transaction_id: current.id,
            transaction_status: current.status,
            wish,
        })
    }
}

/// Idempotency check and claim for one sighting, in one IMMEDIATE transaction.
fn claim_reward(
    conn: &mut Connection,
    calculator: &RewardCalculator,
    sighting_id: Id,
    reporter_id: Id,
    now: u64,
) -> Result<Claim> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let sighting = sightings::find(&tx, sighting_id)?
        .ok_or_else(|| SettlementError::NotFound(format!("sighting {sighting_id}")))?;
    if sighting.reporter_id != reporter_id {
        return Err(SettlementError::NotPermitted(format!(
            "sighting {sighting_id} was not reported by user {reporter_id}"
        )));
    }
    if sighting.status != SightingStatus::Confirmed {
        return Err(SettlementError::Conflict(format!(
            "sighting {sighting_id} is {}",
            sighting.status
        )));
    }

    let live = transactions::find_live_for_entity(&tx, RelatedEntity::sighting(sighting_id))?;
    if let Some(live) = live {
        return Ok(Claim::Resolved(match live.status {
            TransactionStatus::Completed => SettlementOutcome::AlreadySettled,
            _ => SettlementOutcome::AlreadyPending,
        }));
    }

    let owed = pending_rewards::find_for_sighting(&tx, sighting_id)?;
    let amount = match &owed {
        Some(reward) => match reward.status {
            PendingRewardStatus::Processed => {
                return Ok(Claim::Resolved(SettlementOutcome::AlreadySettled));
            }
            PendingRewardStatus::Cancelled => {
                return Ok(Claim::Resolved(SettlementOutcome::Cancelled));
            }
            PendingRewardStatus::Pending => reward.amount,
        },
        None => calculator.reward_for(sighting.corgi_count)?,
    };

    let reporter = users::get(&tx, reporter_id)?;
    let Some(wallet) = reporter.wallet_address else {
        let pending_reward_id = match owed {
            Some(reward) => reward.id,
            None => record_pending_reward(&tx, &sighting, amount, now)?,
        };
        tx.commit()?;
        return Ok(Claim::Resolved(SettlementOutcome::PendingWallet {
            pending_reward_id,
            amount,
        }));
    };

    let bank_row = bank::get(&tx)?;
    if bank_row.current_balance < amount {
        return Err(SettlementError::InsufficientBalance {
            required: amount,
            available: bank_row.current_balance,
        });
    }

    let new = NewTransaction {
        from_address: &bank_row.wallet_address,
        to_address: &wallet,
        amount,
        tx_type: TransactionType::Reward,
        related: Some(RelatedEntity::sighting(sighting_id)),
    };
    let transaction_id = match transactions::insert_pending(&tx, &new, now) {
        Ok(id) => id,
        Err(e) if e.is_constraint() => {
            return Ok(Claim::Resolved(SettlementOutcome::AlreadyPending));
        }
        Err(e) => return Err(e.into()),
    };
    tx.commit()?;

    Ok(Claim::Broadcast(RewardClaim {
        transaction_id,
        sighting_id,
        user_id: reporter_id,
        to: wallet,
        amount,
    }))
}

/// Owe `amount` for a confirmed sighting whose reporter has no wallet.
pub(crate) fn record_pending_reward(
    conn: &Connection,
    sighting: &CorgiSighting,
    amount: TokenAmount,
    now: u64,
) -> Result<Id> {
    let id = pending_rewards::insert(conn, sighting.reporter_id, sighting.id, amount, now)?;
    info!(
        sighting_id = sighting.id,
        user_id = sighting.reporter_id,
        pending_reward_id = id,
        amount = %amount,
        "reward pending wallet connection"
    );
    Ok(id)
}

/// Record a successful reward broadcast against its claimed row.
///
/// A row failed while the transfer was in flight is revived and completed,
/// unless the entity has been claimed again, in which case the hash is kept
/// on the failed row.
fn record_broadcast(
    conn: &Connection,
    row: &Transaction,
    tx_hash: &str,
    now: u64,
) -> Result<Finalized> {
    match row.status {
        TransactionStatus::Pending => {
            if complete_transaction(conn, row, tx_hash, None, now)? {
                Ok(Finalized::Completed)
            } else {
                Ok(Finalized::AlreadyResolved)
            }
        }
        TransactionStatus::Completed => Ok(Finalized::AlreadyResolved),
        TransactionStatus::Failed => match transactions::reopen_failed(conn, row.id) {
            Ok(true) => {
                if complete_transaction(conn, row, tx_hash, None, now)? {
                    Ok(Finalized::Revived)
                } else {
                    Ok(Finalized::AlreadyResolved)
                }
            }
            Ok(false) => Ok(Finalized::AlreadyResolved),
            Err(e) if e.is_constraint() => {
                transactions::record_late_hash(conn, row.id, tx_hash)?;
                Ok(Finalized::Duplicate)
            }
            Err(e) => Err(e.into()),
        },
    }
}

/// Move a pending transaction to completed and apply its side effects.
///
/// Rewards debit the bank mirror and process the matching pending reward;
/// purchases mark the wish purchased. Run inside a store transaction.
/// Returns false, with nothing changed, if the row was no longer pending.
pub(crate) fn complete_transaction(
    conn: &Connection,
    row: &Transaction,
    tx_hash: &str,
    purchaser_id: Option<Id>,
    now: u64,
) -> Result<bool> {
    if !transactions::mark_completed(conn, row.id, tx_hash, now)? {
        return Ok(false);
    }

    match (row.tx_type, row.related_entity) {
        (TransactionType::Reward, related) => {
            let shortfall = bank::record_distribution(conn, row.amount, tx_hash, now)?;
            if !shortfall.is_zero() {
                warn!(
                    transaction_id = row.id,
                    shortfall = %shortfall,
                    "bank balance mirror would go negative, floored at zero"
                );
            }
            if let Some(RelatedEntity {
                id: sighting_id,
                kind: RelatedEntityType::Sighting,
            }) = related
            {
                if let Some(reward) = pending_rewards::find_for_sighting(conn, sighting_id)? {
                    if reward.status == PendingRewardStatus::Pending {
                        pending_rewards::mark_processed(conn, reward.id, row.id, now)?;
                    }
                }
            }
        }
        (
            TransactionType::Purchase,
            Some(RelatedEntity {
                id: wish_id,
                kind: RelatedEntityType::Wish,
            }),
        ) => {
            let wish = wishes::get(conn, wish_id)?;
            let purchaser = match purchaser_id {
                Some(id) => Some(id),
                None => users::get_by_wallet(conn, &row.from_address)?.map(|u| u.id),
            }
            .filter(|id| *id != wish.creator_id);
            if !wishes::mark_purchased(conn, wish_id, purchaser, now)? {
                warn!(
                    wish_id,
                    transaction_id = row.id,
                    "purchase completed for a wish that is no longer accepted"
                );
            }
        }
        (TransactionType::Purchase, _) => {
            warn!(transaction_id = row.id, "purchase transaction without a wish reference");
        }
    }
    Ok(true)
}

fn reward_memo(sighting_id: Id) -> String {
    format!("Corgi Buddy reward: sighting #{sighting_id}")
}

fn purchase_memo(transaction_id: Id) -> String {
    format!("Corgi Buddy wish purchase #{transaction_id}")
}

fn purchase_intent(row: &Transaction) -> PurchaseIntent {
    PurchaseIntent {
        transaction_id: row.id,
        ton_transaction: TonTransaction {
            to: row.to_address.clone(),
            amount: row.amount,
            payload: STANDARD.encode(purchase_memo(row.id)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainError;
    use crate::error::ErrorKind;
    use crate::test_support::{coins, wallet, Fixture, BANK, T0};
    use corgi_types::WishAmount;

    #[tokio::test]
    async fn test_settle_with_wallet() {
        let fx = Fixture::new();
        let address = wallet(1);
        let (a, b) = fx.buddies(Some(&address)).await;
        let sighting = fx.confirmed_sighting(a, b, 5).await;

        let outcome = fx.engine.settle_reward(sighting, a).await.expect("settle");
        let SettlementOutcome::Settled {
            transaction_id,
            amount,
            ..
        } = outcome
        else {
            panic!("expected Settled, got {outcome:?}");
        };
        assert_eq!(amount, coins(5));

        let conn = fx.db.lock().await;
        let row = transactions::get(&conn, transaction_id).expect("tx");
        assert_eq!(row.status, TransactionStatus::Completed);
        assert_eq!(row.from_address, BANK);
        assert_eq!(row.to_address, address);
        assert!(row.completed_at.is_some());

        let bank_row = bank::get(&conn).expect("bank");
        assert_eq!(bank_row.total_distributed, coins(5));
        assert_eq!(bank_row.current_balance, coins(995));
        assert_eq!(bank_row.last_transaction_hash, row.tx_hash);

        let sent = fx.chain.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, address);
        assert_eq!(sent[0].amount, coins(5));
    }

    #[tokio::test]
    async fn test_second_settle_is_noop() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 2).await;

        fx.engine.settle_reward(sighting, a).await.expect("first");
        let again = fx.engine.settle_reward(sighting, a).await.expect("second");
        assert_eq!(again, SettlementOutcome::AlreadySettled);
        assert_eq!(fx.chain.send_count(), 1);
    }

    #[tokio::test]
    async fn test_no_wallet_records_pending_reward() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(None).await;
        let sighting = fx.confirmed_sighting(a, b, 3).await;

        let first = fx.engine.settle_reward(sighting, a).await.expect("settle");
        let second = fx.engine.settle_reward(sighting, a).await.expect("again");
        assert_eq!(first, second);
        let SettlementOutcome::PendingWallet { amount, .. } = first else {
            panic!("expected PendingWallet, got {first:?}");
        };
        assert_eq!(amount, coins(3));

        let conn = fx.db.lock().await;
        assert_eq!(
            pending_rewards::list_pending_for_user(&conn, a).expect("list").len(),
            1
        );
        assert!(transactions::list_for_entity(&conn, RelatedEntity::sighting(sighting))
            .expect("txs")
            .is_empty());
        assert_eq!(fx.chain.send_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_broadcast_leaves_audit_row_and_allows_retry() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 4).await;

        fx.chain
            .push_send_result(Err(ChainError::Rejected("seqno mismatch".into())));
        let err = fx.engine.settle_reward(sighting, a).await.expect_err("fails");
        assert!(matches!(err, SettlementError::Chain { attempts: 1, .. }));

        {
            let conn = fx.db.lock().await;
            let rows = transactions::list_for_entity(&conn, RelatedEntity::sighting(sighting))
                .expect("rows");
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].status, TransactionStatus::Failed);
            assert_eq!(bank::get(&conn).expect("bank").total_distributed, TokenAmount::ZERO);
        }

        let outcome = fx.engine.settle_reward(sighting, a).await.expect("retry");
        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
        let conn = fx.db.lock().await;
        let rows =
            transactions::list_for_entity(&conn, RelatedEntity::sighting(sighting)).expect("rows");
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let fx = Fixture::with_retry(RetryConfig::default());
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 1).await;

        fx.chain.fail_sends(2, ChainError::Timeout);
        let outcome = fx.engine.settle_reward(sighting, a).await.expect("settle");
        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
        assert_eq!(fx.chain.send_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_surface_transient_error() {
        let fx = Fixture::with_retry(RetryConfig::default());
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 1).await;

        fx.chain.fail_sends(3, ChainError::Http {
            status: 502,
            message: "bad gateway".into(),
        });
        let err = fx.engine.settle_reward(sighting, a).await.expect_err("exhausted");
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(matches!(err, SettlementError::Chain { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_preconditions() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;

        let pending = {
            let conn = fx.db.lock().await;
            sightings::insert(&conn, a, b, 2, T0).expect("sighting")
        };
        let err = fx.engine.settle_reward(pending, a).await.expect_err("unconfirmed");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let sighting = fx.confirmed_sighting(b, a, 2).await;
        let err = fx.engine.settle_reward(sighting, a).await.expect_err("wrong reporter");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = fx.engine.settle_reward(999, a).await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(fx.chain.send_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_bank_balance() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        {
            let conn = fx.db.lock().await;
            conn.execute("UPDATE bank_wallet SET current_balance = 0", [])
                .expect("drain");
        }
        let sighting = fx.confirmed_sighting(a, b, 2).await;
        let err = fx.engine.settle_reward(sighting, a).await.expect_err("broke");
        assert!(matches!(err, SettlementError::InsufficientBalance { .. }));
        assert_eq!(fx.chain.send_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_settles_claim_once() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 5).await;
        fx.chain.set_send_delay(std::time::Duration::from_millis(20));

        let (first, second) = tokio::join!(
            fx.engine.settle_reward(sighting, a),
            fx.engine.settle_reward(sighting, a)
        );
        let outcomes = [first.expect("first"), second.expect("second")];
        let settled = outcomes
            .iter()
            .filter(|o| matches!(o, SettlementOutcome::Settled { .. }))
            .count();
        assert_eq!(settled, 1, "{outcomes:?}");
        assert!(outcomes.contains(&SettlementOutcome::AlreadyPending));
        assert_eq!(fx.chain.send_count(), 1);

        let conn = fx.db.lock().await;
        let live: Vec<_> = transactions::list_for_entity(&conn, RelatedEntity::sighting(sighting))
            .expect("rows")
            .into_iter()
            .filter(|t| t.status != TransactionStatus::Failed)
            .collect();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn test_process_pending_rewards_after_wallet_connect() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(None).await;
        let s1 = fx.confirmed_sighting(a, b, 2).await;
        fx.engine.settle_reward(s1, a).await.expect("owe first");
        let s2 = fx.confirmed_sighting(a, b, 3).await;
        fx.engine.settle_reward(s2, a).await.expect("owe second");

        {
            let mut conn = fx.db.lock().await;
            users::connect_wallet(&mut conn, a, &wallet(9), T0).expect("wallet");
        }

        let report = fx
            .engine
            .process_pending_rewards_for_user(a)
            .await
            .expect("process");
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.amount_settled, coins(5));

        let conn = fx.db.lock().await;
        for sighting in [s1, s2] {
            let reward = pending_rewards::find_for_sighting(&conn, sighting)
                .expect("find")
                .expect("reward");
            assert_eq!(reward.status, PendingRewardStatus::Processed);
            let tx_id = reward.transaction_id.expect("linked transaction");
            let row = transactions::get(&conn, tx_id).expect("tx");
            assert_eq!(row.status, TransactionStatus::Completed);
            assert_eq!(row.amount, reward.amount);
        }
    }

    #[tokio::test]
    async fn test_process_pending_failure_keeps_reward_pending() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(None).await;
        let s1 = fx.confirmed_sighting(a, b, 2).await;
        fx.engine.settle_reward(s1, a).await.expect("owe");
        {
            let mut conn = fx.db.lock().await;
            users::connect_wallet(&mut conn, a, &wallet(9), T0).expect("wallet");
        }

        fx.chain
            .push_send_result(Err(ChainError::Rejected("down".into())));
        let report = fx
            .engine
            .process_pending_rewards_for_user(a)
            .await
            .expect("process");
        assert_eq!(report.failed, 1);
        assert_eq!(report.processed, 0);

        let conn = fx.db.lock().await;
        let reward = pending_rewards::find_for_sighting(&conn, s1)
            .expect("find")
            .expect("reward");
        assert_eq!(reward.status, PendingRewardStatus::Pending);
        assert!(reward.transaction_id.is_none());
    }

    async fn accepted_wish(fx: &Fixture, creator: Id, buddy: Id, amount: &str) -> Id {
        let conn = fx.db.lock().await;
        let id = wishes::insert(
            &conn,
            creator,
            buddy,
            "Chew toy",
            WishAmount::parse(amount).expect("amount"),
            T0,
        )
        .expect("wish");
        wishes::respond(&conn, id, true, T0).expect("accept");
        id
    }

    async fn shopper(fx: &Fixture, address: &str) -> Id {
        let conn = fx.db.lock().await;
        let id = users::insert(&conn, 3, Some("carol"), "Carol", T0).expect("user");
        users::set_wallet(&conn, id, address, T0).expect("wallet");
        id
    }

    #[tokio::test]
    async fn test_purchase_is_confirm_then_mark() {
        let fx = Fixture::new();
        let creator_wallet = wallet(1);
        let (a, b) = fx.buddies(Some(&creator_wallet)).await;
        let wish_id = accepted_wish(&fx, a, b, "12.50").await;
        let carol = shopper(&fx, &wallet(3)).await;

        let intent = fx.engine.purchase_wish(wish_id, carol).await.expect("intent");
        assert_eq!(intent.ton_transaction.to, creator_wallet);
        assert_eq!(intent.ton_transaction.amount.base_units(), 12_500_000_000);
        let memo = STANDARD
            .decode(&intent.ton_transaction.payload)
            .expect("base64 payload");
        assert!(String::from_utf8(memo).expect("utf8").contains("wish purchase"));

        // Still on the marketplace until the hash confirms.
        {
            let conn = fx.db.lock().await;
            assert_eq!(wishes::get(&conn, wish_id).expect("wish").status, WishStatus::Accepted);
        }
        let again = fx.engine.purchase_wish(wish_id, carol).await.expect("same intent");
        assert_eq!(again, intent);

        fx.chain.set_status("hash-1", ChainTxStatus::Pending);
        let waiting = fx
            .engine
            .confirm_wish_purchase(wish_id, carol, "hash-1")
            .await
            .expect("pending");
        assert_eq!(waiting.transaction_status, TransactionStatus::Pending);
        assert_eq!(waiting.wish.status, WishStatus::Accepted);

        fx.chain.set_status("hash-1", ChainTxStatus::Confirmed);
        let done = fx
            .engine
            .confirm_wish_purchase(wish_id, carol, "hash-1")
            .await
            .expect("confirmed");
        assert_eq!(done.transaction_status, TransactionStatus::Completed);
        assert_eq!(done.wish.status, WishStatus::Purchased);
        assert_eq!(done.wish.purchased_by, Some(carol));

        // Purchases never touch the bank.
        let conn = fx.db.lock().await;
        assert_eq!(bank::get(&conn).expect("bank").total_distributed, TokenAmount::ZERO);
    }

    #[tokio::test]
    async fn test_failed_purchase_keeps_wish_accepted() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let wish_id = accepted_wish(&fx, a, b, "3").await;
        let carol = shopper(&fx, &wallet(3)).await;

        fx.engine.purchase_wish(wish_id, carol).await.expect("intent");
        fx.chain.set_status("bad", ChainTxStatus::Failed);
        let result = fx
            .engine
            .confirm_wish_purchase(wish_id, carol, "bad")
            .await
            .expect("confirm");
        assert_eq!(result.transaction_status, TransactionStatus::Failed);
        assert_eq!(result.wish.status, WishStatus::Accepted);

        // A new attempt is allowed after a failure.
        fx.engine.purchase_wish(wish_id, carol).await.expect("second intent");
    }

    #[tokio::test]
    async fn test_purchase_preconditions() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let wish_id = accepted_wish(&fx, a, b, "3").await;

        let err = fx.engine.purchase_wish(wish_id, a).await.expect_err("own wish");
        assert!(matches!(err, SettlementError::NotPermitted(_)));

        let err = fx.engine.purchase_wish(wish_id, b).await.expect_err("no wallet");
        assert!(matches!(err, SettlementError::WalletRequired(id) if id == b));

        let err = fx.engine.purchase_wish(404, b).await.expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let carol = shopper(&fx, &wallet(3)).await;
        fx.engine.purchase_wish(wish_id, carol).await.expect("carol");
        {
            let mut conn = fx.db.lock().await;
            users::connect_wallet(&mut conn, b, &wallet(2), T0).expect("wallet");
        }
        let err = fx.engine.purchase_wish(wish_id, b).await.expect_err("taken");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_complete_transaction_is_guarded() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 2).await;
        fx.engine.settle_reward(sighting, a).await.expect("settle");

        let conn = fx.db.lock().await;
        let row = transactions::find_live_for_entity(&conn, RelatedEntity::sighting(sighting))
            .expect("find")
            .expect("row");
        assert!(!complete_transaction(&conn, &row, "again", None, T0).expect("complete"));
        assert_eq!(bank::get(&conn).expect("bank").total_distributed, coins(2));
    }

    #[tokio::test]
    async fn test_unknown_purchase_hash_is_not_stored() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let wish_id = accepted_wish(&fx, a, b, "3").await;
        let carol = shopper(&fx, &wallet(3)).await;
        let intent = fx.engine.purchase_wish(wish_id, carol).await.expect("intent");

        fx.chain.push_status_result(Err(ChainError::Http {
            status: 404,
            message: "unknown transaction".into(),
        }));
        fx.engine
            .confirm_wish_purchase(wish_id, carol, "typo")
            .await
            .expect_err("unknown hash");
        {
            let conn = fx.db.lock().await;
            let row = transactions::get(&conn, intent.transaction_id).expect("row");
            assert_eq!(row.status, TransactionStatus::Pending);
            assert_eq!(row.tx_hash, None);
        }

        fx.chain.set_status("good", ChainTxStatus::Confirmed);
        let done = fx
            .engine
            .confirm_wish_purchase(wish_id, carol, "good")
            .await
            .expect("confirmed");
        assert_eq!(done.transaction_status, TransactionStatus::Completed);
        assert_eq!(done.wish.status, WishStatus::Purchased);
        assert_eq!(done.wish.purchased_by, Some(carol));
    }

    async fn fail_live_claim(fx: &Fixture, sighting: Id) -> Transaction {
        let conn = fx.db.lock().await;
        let row = transactions::find_live_for_entity(&conn, RelatedEntity::sighting(sighting))
            .expect("find")
            .expect("live claim");
        assert!(transactions::mark_failed(&conn, row.id).expect("fail"));
        row
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_revives_row_failed_underneath() {
        let fx = Fixture::new();
        let (a, b) = fx.buddies(Some(&wallet(1))).await;
        let sighting = fx.confirmed_sighting(a, b, 3).await;
        fx.chain.set_send_delay(std::time::Duration::from_secs(5));

        let engine = fx.engine.clone();
        let settle = tokio::spawn(async move { engine.settle_reward(sighting, a).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let row = fail_live_claim(&fx, sighting).await;

        let outcome = settle.await.expect("join").expect("settle");
        assert!(matches!(outcome, SettlementOutcome::Settled { transaction_id, .. }
            if transaction_id == row.id));
        assert!(!fx.engine.is_in_flight(row.id));

        let conn = fx.db.lock().await;
        let row = transactions::get(&conn, row.id).expect("row");
        assert_eq!(row.status, TransactionStatus::Completed);
        assert_eq!(row.tx_hash.as_deref(), Some("mock-tx-1"));
        assert_eq!(bank::get(&conn).expect("bank").total_distributed, coins(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_after_reclaim_keeps_hash_for_review() {
        let fx = Fixture::new();
        let address = wallet(1);
        let (a, b) = fx.buddies(Some(&address)).await;
        let sighting = fx.confirmed_sighting(a, b, 3).await;
        fx.chain.set_send_delay(std::time::Duration::from_secs(5));

        let engine = fx.engine.clone();
        let settle = tokio::spawn(async move { engine.settle_reward(sighting, a).await });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let row = fail_live_claim(&fx, sighting).await;
        let reclaim = {
            let conn = fx.db.lock().await;
            transactions::insert_pending(
                &conn,
                &NewTransaction {
                    from_address: BANK,
                    to_address: &address,
                    amount: coins(3),
                    tx_type: TransactionType::Reward,
                    related: Some(RelatedEntity::sighting(sighting)),
                },
                T0,
            )
            .expect("reclaim")
        };

        let err = settle.await.expect("join").expect_err("double pay");
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let conn = fx.db.lock().await;
        let failed = transactions::get(&conn, row.id).expect("failed row");
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert_eq!(failed.tx_hash.as_deref(), Some("mock-tx-1"));
        let live = transactions::get(&conn, reclaim).expect("reclaim row");
        assert_eq!(live.status, TransactionStatus::Pending);
        assert_eq!(bank::get(&conn).expect("bank").total_distributed, TokenAmount::ZERO);
    }
}
