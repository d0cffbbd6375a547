//! On-demand reconciliation.

use std::sync::Arc;

use super::{to_json, Result};
use crate::DaemonState;

/// Run one sweep now. Stops early if the daemon is shutting down.
pub async fn run_sweep(state: &Arc<DaemonState>) -> Result {
    let cancel = state.sweep_cancel.subscribe();
    let report = state.sweeper.run(&cancel).await?;
    to_json(&report)
}
