//! Users of the Mini App.

use serde::{Deserialize, Serialize};

use crate::{Id, Timestamp};

/// A Telegram user known to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    /// Telegram user id; the identity the auth middleware hands us.
    pub telegram_id: i64,
    pub username: Option<String>,
    pub display_name: String,
    /// At most one user holds a given address.
    pub wallet_address: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    pub fn has_wallet(&self) -> bool {
        self.wallet_address.is_some()
    }
}
