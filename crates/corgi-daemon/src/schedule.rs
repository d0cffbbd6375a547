//! Periodic reconciliation.
//!
//! The first sweep runs at startup so anything a crash left half-settled is
//! picked up before new traffic arrives.

use std::time::Duration;

use corgi_settlement::sweep::Sweeper;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Run `sweeper` every `interval` until `cancel` flips to true.
pub fn spawn_sweeper(
    sweeper: Sweeper,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = interval.as_secs(), "sweep scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match sweeper.run(&cancel).await {
                Ok(report) if report.interrupted => break,
                Ok(report) => debug!(?report, "scheduled sweep finished"),
                Err(e) => error!(error = %e, "scheduled sweep failed"),
            }
        }
        info!("sweep scheduler stopped");
    })
}
