//! Payloads returned to the route layer.
//!
//! Field names are part of the contract with the Mini App and must stay
//! camelCase.

use serde::{Deserialize, Serialize};

use crate::buddy::BuddyStatus;
use crate::ledger::{BankWallet, TransactionStatus};
use crate::sighting::CorgiSighting;
use crate::wish::Wish;
use crate::{Id, Timestamp, TokenAmount};

/// Result of a buddy confirming or denying a sighting.
#[derive(Clone, Debug, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SightingResponse {
    pub sighting: CorgiSighting,
    /// Present only when a reward was settled on-chain during the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub reward_earned: Option<TokenAmount>,
    /// True when the reward is owed but waits for a wallet or a later sweep.
    pub reward_pending: bool,
}

/// Bank wallet status as exposed to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BankStatus {
    pub wallet_address: String,
    #[ts(type = "string")]
    pub current_balance: TokenAmount,
    #[ts(type = "string")]
    pub total_distributed: TokenAmount,
    pub last_transaction_hash: Option<String>,
    pub updated_at: Timestamp,
}

impl From<BankWallet> for BankStatus {
    fn from(bank: BankWallet) -> Self {
        Self {
            wallet_address: bank.wallet_address,
            current_balance: bank.current_balance,
            total_distributed: bank.total_distributed,
            last_transaction_hash: bank.last_transaction_hash,
            updated_at: bank.updated_at,
        }
    }
}

/// Message the client wallet signs (TON Connect `sendTransaction` item).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TonTransaction {
    pub to: String,
    #[ts(type = "string")]
    pub amount: TokenAmount,
    /// Base64 text-comment payload identifying the ledger transaction.
    pub payload: String,
}

/// Returned when a purchase is initiated; the wish stays accepted until the
/// hash is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseIntent {
    pub transaction_id: Id,
    pub ton_transaction: TonTransaction,
}

/// Result of submitting a signed purchase hash.
///
/// `transactionStatus` stays `pending` while the chain has not confirmed the
/// transfer; the wish only becomes `purchased` once it is `completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseConfirmation {
    pub transaction_id: Id,
    pub transaction_status: TransactionStatus,
    pub wish: Wish,
}

/// Which onboarding step the user should see next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    FindBuddy,
    AwaitBuddyConfirmation,
    ConnectWallet,
    Done,
}

/// Derived onboarding state. Computed from user and buddy rows on every read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub has_wallet: bool,
    pub buddy_status: Option<BuddyStatus>,
    pub buddy_id: Option<Id>,
    pub is_complete: bool,
    pub next_step: OnboardingStep,
}
