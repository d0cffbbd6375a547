//! IPC command handlers, one submodule per area.
//!
//! Handlers pull typed params out of the request, call a service, and
//! serialise the result. Params use snake_case; results are camelCase.

pub mod bank;
pub mod buddies;
pub mod sightings;
pub mod sweep;
pub mod users;
pub mod wishes;

use corgi_types::Id;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::rpc::RpcError;

pub(crate) type Result = std::result::Result<Value, RpcError>;

pub(crate) fn id_param(params: &Value, key: &str) -> std::result::Result<Id, RpcError> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub(crate) fn str_param<'a>(
    params: &'a Value,
    key: &str,
) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub(crate) fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn bool_param(params: &Value, key: &str) -> std::result::Result<bool, RpcError> {
    params
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| {
        error!(error = %e, "failed to serialise RPC result");
        RpcError::internal_error()
    })
}
