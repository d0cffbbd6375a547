//! Bank mirror and pending reward administration.

use std::sync::Arc;

use corgi_types::TokenAmount;
use serde_json::Value;

use super::{id_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

pub async fn get_bank_status(state: &Arc<DaemonState>) -> Result {
    let status = state.bank.get_status().await?;
    to_json(&status)
}

/// Credit the mirror after an operator tops up the bank wallet.
/// `amount` is in base units.
pub async fn record_bank_deposit(state: &Arc<DaemonState>, params: &Value) -> Result {
    let amount: TokenAmount = params
        .get("amount")
        .cloned()
        .ok_or_else(|| RpcError::invalid_params("amount required"))
        .and_then(|v| {
            serde_json::from_value(v).map_err(|e| RpcError::invalid_params(&e.to_string()))
        })?;
    let status = state.bank.record_deposit(amount).await?;
    to_json(&status)
}

pub async fn get_pending_rewards(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let rewards = state.pending.list_for_user(user_id).await?;
    let total = state.pending.total_for_user(user_id).await?;
    Ok(serde_json::json!({
        "rewards": to_json(&rewards)?,
        "total": total,
    }))
}

pub async fn cancel_pending_reward(state: &Arc<DaemonState>, params: &Value) -> Result {
    let pending_reward_id = id_param(params, "pending_reward_id")?;
    let reward = state.pending.cancel(pending_reward_id).await?;
    to_json(&reward)
}
