//! Monetary records: transactions, pending rewards and the bank wallet.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp, TokenAmount};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

crate::string_enum!(TransactionStatus, "transaction status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
});

impl TransactionStatus {
    /// Completed and failed rows never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Reward,
    Purchase,
}

crate::string_enum!(TransactionType, "transaction type", {
    Reward => "reward",
    Purchase => "purchase",
});

/// The entity a transaction settles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum RelatedEntityType {
    Sighting,
    Wish,
}

crate::string_enum!(RelatedEntityType, "related entity type", {
    Sighting => "sighting",
    Wish => "wish",
});

/// Reference from a transaction to its originating entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: RelatedEntityType,
}

impl RelatedEntity {
    pub fn sighting(id: Id) -> Self {
        Self {
            id,
            kind: RelatedEntityType::Sighting,
        }
    }

    pub fn wish(id: Id) -> Self {
        Self {
            id,
            kind: RelatedEntityType::Wish,
        }
    }
}

/// One logical on-chain transfer.
///
/// At most one non-failed row exists per related entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Id,
    pub tx_hash: Option<String>,
    pub from_address: String,
    pub to_address: String,
    #[ts(type = "string")]
    pub amount: TokenAmount,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub related_entity: Option<RelatedEntity>,
    pub status: TransactionStatus,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PendingRewardStatus {
    Pending,
    Processed,
    Cancelled,
}

crate::string_enum!(PendingRewardStatus, "pending reward status", {
    Pending => "pending",
    Processed => "processed",
    Cancelled => "cancelled",
});

/// A reward owed to a user who had no wallet when the sighting was confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PendingReward {
    pub id: Id,
    pub user_id: Id,
    pub sighting_id: Id,
    #[ts(type = "string")]
    pub amount: TokenAmount,
    pub status: PendingRewardStatus,
    pub created_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub transaction_id: Option<Id>,
}

/// Mirror of the distributing wallet. A single row exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BankWallet {
    pub wallet_address: String,
    #[ts(type = "string")]
    pub current_balance: TokenAmount,
    /// Never decreases.
    #[ts(type = "string")]
    pub total_distributed: TokenAmount,
    pub last_transaction_hash: Option<String>,
    pub updated_at: Timestamp,
}
