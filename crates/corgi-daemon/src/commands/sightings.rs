//! Sighting command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{bool_param, id_param, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

pub async fn report_sighting(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let count = params
        .get("corgi_count")
        .and_then(Value::as_u64)
        .ok_or_else(|| RpcError::invalid_params("corgi_count required"))?;
    // Out-of-range counts are rejected by the service with a specific message.
    let count = u32::try_from(count).unwrap_or(u32::MAX);
    let sighting = state.sightings.report(user_id, count).await?;
    to_json(&sighting)
}

/// Confirm or deny a buddy's sighting. Confirmation pays the reward.
pub async fn respond_sighting(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let sighting_id = id_param(params, "sighting_id")?;
    let confirm = bool_param(params, "confirm")?;
    let response = state
        .sightings
        .respond(sighting_id, user_id, confirm)
        .await?;
    to_json(&response)
}

pub async fn get_pending_sightings(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = id_param(params, "user_id")?;
    let sightings = state.sightings.pending_for_buddy(user_id).await?;
    to_json(&sightings)
}
