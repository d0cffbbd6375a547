//! Integration test: backoff around chain broadcasts.
//!
//! Runs on paused tokio time so the 2 s / 4 s schedule is measured exactly:
//! 1. Two transient failures then success wait ~2000 ms and ~4000 ms (±10 %)
//! 2. Three transient failures exhaust the budget and surface as transient
//! 3. A rejected transfer is not retried

use std::time::Duration;

use corgi_db::queries::transactions;
use corgi_integration_tests::{coins, wallet, Harness};
use corgi_retry::RetryConfig;
use corgi_settlement::{ChainError, ErrorKind, SettlementOutcome};
use corgi_types::ledger::{RelatedEntity, TransactionStatus};
use tokio::time::Instant;

fn within(actual: Duration, expected_ms: u64, tolerance: f64) -> bool {
    let expected = expected_ms as f64 / 1000.0;
    (actual.as_secs_f64() - expected).abs() <= expected * tolerance
}

async fn confirmed_sighting(h: &Harness) -> (i64, i64) {
    let (alice, _bob) = h.alice_and_bob(Some(&wallet(1))).await;
    let sighting = h.sightings.report(alice, 5).await.expect("report");
    let conn = h.db.lock().await;
    corgi_db::queries::sightings::respond(
        &conn,
        sighting.id,
        corgi_types::sighting::SightingStatus::Confirmed,
        corgi_db::now(),
    )
    .expect("confirm");
    (alice, sighting.id)
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_settle() {
    let h = Harness::with_retry(RetryConfig::default()).await;
    let (alice, sighting) = confirmed_sighting(&h).await;
    h.chain.fail_sends(2, ChainError::Timeout);

    let start = Instant::now();
    let outcome = h.engine.settle_reward(sighting, alice).await.expect("settle");
    let elapsed = start.elapsed();

    assert!(matches!(outcome, SettlementOutcome::Settled { amount, .. } if amount == coins(5)));
    assert_eq!(h.chain.send_count(), 3);
    // 2000 ms + 4000 ms, each within ±10 %.
    assert!(within(elapsed, 6000, 0.10), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_is_transient() {
    let h = Harness::with_retry(RetryConfig::default()).await;
    let (alice, sighting) = confirmed_sighting(&h).await;
    h.chain.fail_sends(3, ChainError::Http {
        status: 503,
        message: "relayer overloaded".into(),
    });

    let start = Instant::now();
    let err = h
        .engine
        .settle_reward(sighting, alice)
        .await
        .expect_err("exhausted");
    let elapsed = start.elapsed();

    assert_eq!(err.kind(), ErrorKind::Transient);
    assert_eq!(h.chain.send_count(), 3);
    // No sleep after the last attempt.
    assert!(within(elapsed, 6000, 0.10), "elapsed {elapsed:?}");

    let conn = h.db.lock().await;
    let rows = transactions::list_for_entity(&conn, RelatedEntity::sighting(sighting))
        .expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, TransactionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_is_not_retried() {
    let h = Harness::with_retry(RetryConfig::default()).await;
    let (alice, sighting) = confirmed_sighting(&h).await;
    h.chain.fail_sends(1, ChainError::InvalidAddress(wallet(1)));

    let start = Instant::now();
    let err = h
        .engine
        .settle_reward(sighting, alice)
        .await
        .expect_err("fatal");

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(h.chain.send_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}
