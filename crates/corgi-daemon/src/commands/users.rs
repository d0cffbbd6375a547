//! User and wallet command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{id_param, opt_str_param, str_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Register or refresh the authenticated Telegram user.
pub async fn upsert_user(state: &Arc<DaemonState>, params: &Value) -> Result {
    let telegram_id = params
        .get("telegram_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid_params("telegram_id required"))?;
    let display_name = str_param(params, "display_name")?;
    let username = opt_str_param(params, "username");

    let user = state
        .users
        .upsert_user(telegram_id, username, display_name)
        .await?;
    to_json(&user)
}

/// Connect a TON wallet and settle any rewards owed to the user.
pub async fn connect_wallet(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let address = str_param(params, "wallet_address")?;
    let connection = state.users.connect_wallet(user_id, address).await?;
    to_json(&connection)
}

pub async fn disconnect_wallet(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let user = state.users.disconnect_wallet(user_id).await?;
    to_json(&user)
}

pub async fn get_onboarding(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let onboarding = corgi_settlement::onboarding::onboarding_state(&state.db, user_id).await?;
    to_json(&onboarding)
}
