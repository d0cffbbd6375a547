//! Corgi sightings.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SightingStatus {
    Pending,
    Confirmed,
    Denied,
}

crate::string_enum!(SightingStatus, "sighting status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Denied => "denied",
});

/// A reported sighting awaiting (or past) the buddy's response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CorgiSighting {
    pub id: Id,
    pub reporter_id: Id,
    /// The buddy who must confirm or deny.
    pub buddy_id: Id,
    pub corgi_count: u32,
    pub status: SightingStatus,
    pub created_at: Timestamp,
    pub responded_at: Option<Timestamp>,
}

impl CorgiSighting {
    pub fn is_pending(&self) -> bool {
        self.status == SightingStatus::Pending
    }
}
