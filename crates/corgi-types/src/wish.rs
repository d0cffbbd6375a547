//! Wishes and the marketplace.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp, WishAmount};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum WishStatus {
    Pending,
    Accepted,
    Rejected,
    Purchased,
}

crate::string_enum!(WishStatus, "wish status", {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
    Purchased => "purchased",
});

/// A spending request. Only accepted wishes are visible in the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Wish {
    pub id: Id,
    pub creator_id: Id,
    pub buddy_id: Id,
    pub description: String,
    #[ts(type = "string")]
    pub proposed_amount: WishAmount,
    pub status: WishStatus,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    pub purchased_at: Option<Timestamp>,
    pub purchased_by: Option<Id>,
}
