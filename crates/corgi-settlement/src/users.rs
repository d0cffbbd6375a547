//! User registration and wallet connection.

use corgi_db::queries::users;
use corgi_types::user::User;
use corgi_types::{validate_wallet_address, Id, ValidationError};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::SettlementEngine;
use crate::error::Result;
use crate::events::Event;
use crate::pending::PendingProcessingReport;

/// Result of connecting a wallet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletConnection {
    pub user: User,
    /// The user the address was taken from, if it was connected elsewhere.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_holder: Option<Id>,
    pub pending_rewards: PendingProcessingReport,
}

#[derive(Clone)]
pub struct UserService {
    engine: SettlementEngine,
}

impl UserService {
    pub fn new(engine: SettlementEngine) -> Self {
        Self { engine }
    }

    /// Register or refresh the user the auth layer vouched for.
    pub async fn upsert_user(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        display_name: &str,
    ) -> Result<User> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ValidationError::Other("display name must not be empty".into()).into());
        }
        let username = username.map(str::trim).filter(|u| !u.is_empty());
        let conn = self.engine.db().lock().await;
        Ok(users::upsert(&conn, telegram_id, username, display_name, corgi_db::now())?)
    }

    pub async fn get_user(&self, user_id: Id) -> Result<User> {
        let conn = self.engine.db().lock().await;
        Ok(users::get(&conn, user_id)?)
    }

    /// Connect a wallet and settle whatever the user is owed.
    ///
    /// The address moves to this user even if another user held it (last
    /// writer wins). Settlement failures are logged and left for the sweep;
    /// they never fail the connection itself.
    pub async fn connect_wallet(&self, user_id: Id, address: &str) -> Result<WalletConnection> {
        let address = validate_wallet_address(address)?;

        let (user, previous_holder) = {
            let mut conn = self.engine.db().lock().await;
            let previous = users::connect_wallet(&mut conn, user_id, &address, corgi_db::now())?;
            (users::get(&conn, user_id)?, previous)
        };

        if let Some(previous) = previous_holder {
            info!(user_id, previous_holder = previous, "wallet address reassigned");
        }
        info!(user_id, "wallet connected");
        self.engine.events().emit(Event::new(
            "WalletConnected",
            Some(user_id),
            serde_json::json!({ "walletAddress": address }),
        ));

        let pending_rewards = match self.engine.process_pending_rewards_for_user(user_id).await {
            Ok(report) => report,
            Err(err) => {
                warn!(user_id, error = %err, "pending rewards left for the sweep");
                PendingProcessingReport::default()
            }
        };

        Ok(WalletConnection {
            user,
            previous_holder,
            pending_rewards,
        })
    }

    pub async fn disconnect_wallet(&self, user_id: Id) -> Result<User> {
        let conn = self.engine.db().lock().await;
        users::clear_wallet(&conn, user_id, corgi_db::now())?;
        info!(user_id, "wallet disconnected");
        Ok(users::get(&conn, user_id)?)
    }
}
