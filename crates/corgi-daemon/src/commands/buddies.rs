//! Buddy pair command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{id_param, to_json, Result};
use crate::DaemonState;

pub async fn request_buddy(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let target = id_param(params, "target_user_id")?;
    let pair = state.buddies.request(user_id, target).await?;
    to_json(&pair)
}

pub async fn confirm_buddy(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let pair_id = id_param(params, "pair_id")?;
    let pair = state.buddies.confirm(pair_id, user_id).await?;
    to_json(&pair)
}

pub async fn cancel_buddy(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let pair_id = id_param(params, "pair_id")?;
    state.buddies.cancel(pair_id, user_id).await?;
    Ok(serde_json::json!({ "cancelled": true }))
}

pub async fn dissolve_buddy(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let pair_id = id_param(params, "pair_id")?;
    let pair = state.buddies.dissolve(pair_id, user_id).await?;
    to_json(&pair)
}
