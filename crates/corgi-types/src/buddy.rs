//! Buddy pairs.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp};

/// Lifecycle of a buddy pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum BuddyStatus {
    Pending,
    Active,
    Dissolved,
}

crate::string_enum!(BuddyStatus, "buddy status", {
    Pending => "pending",
    Active => "active",
    Dissolved => "dissolved",
});

/// An unordered pair of users. `initiator_id` is one of the two members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BuddyPair {
    pub id: Id,
    pub user1_id: Id,
    pub user2_id: Id,
    pub initiator_id: Id,
    pub status: BuddyStatus,
    pub created_at: Timestamp,
    /// Set only on the transition to active.
    pub confirmed_at: Option<Timestamp>,
}

impl BuddyPair {
    pub fn contains(&self, user_id: Id) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The member that is not `user_id`, if `user_id` is a member.
    pub fn other(&self, user_id: Id) -> Option<Id> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BuddyStatus::Active
    }
}
