//! Wish and marketplace command handlers.

use std::sync::Arc;

use corgi_types::WishAmount;
use serde_json::Value;

use super::{bool_param, id_param, str_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Accepts "12.50" or 12.5.
fn amount_param(params: &Value) -> std::result::Result<WishAmount, RpcError> {
    let text = match params.get("amount") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(RpcError::invalid_params("amount required")),
    };
    WishAmount::parse(&text).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

pub async fn create_wish(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let description = str_param(params, "description")?;
    let amount = amount_param(params)?;
    let wish = state.wishes.create(user_id, description, amount).await?;
    to_json(&wish)
}

pub async fn respond_wish(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let wish_id = id_param(params, "wish_id")?;
    let accept = bool_param(params, "accept")?;
    let wish = state.wishes.respond(wish_id, user_id, accept).await?;
    to_json(&wish)
}

pub async fn get_marketplace(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let wishes = state.wishes.marketplace(user_id).await?;
    to_json(&wishes)
}

pub async fn get_my_wishes(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let wishes = state.wishes.list_for_user(user_id).await?;
    to_json(&wishes)
}

/// Returns the transfer the purchaser's wallet must sign.
pub async fn purchase_wish(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let wish_id = id_param(params, "wish_id")?;
    let intent = state.engine.purchase_wish(wish_id, user_id).await?;
    to_json(&intent)
}

/// Submit the signed transfer's hash. The wish is marked purchased only once
/// the chain confirms it.
pub async fn confirm_wish_purchase(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let wish_id = id_param(params, "wish_id")?;
    let tx_hash = str_param(params, "tx_hash")?.trim();
    if tx_hash.is_empty() {
        return Err(RpcError::invalid_params("tx_hash must not be empty"));
    }
    let confirmation = state
        .engine
        .confirm_wish_purchase(wish_id, user_id, tx_hash)
        .await?;
    to_json(&confirmation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_param() {
        assert_eq!(
            amount_param(&json!({"amount": "12.50"})).expect("string").cents(),
            1250
        );
        assert_eq!(amount_param(&json!({"amount": 3})).expect("number").cents(), 300);
        for bad in [json!({"amount": "0"}), json!({"amount": "1000.01"}), json!({})] {
            assert_eq!(amount_param(&bad).expect_err("rejected").code, -32602);
        }
    }
}
