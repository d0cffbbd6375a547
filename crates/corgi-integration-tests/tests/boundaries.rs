//! Integration test: input boundaries are enforced before anything is stored.
//!
//! - corgi count: 0 and 101 rejected, 1 and 100 accepted
//! - wish amount: 0 and 1000.01 rejected, 0.01 and 1000 accepted
//! - wish description: 501 characters rejected, 500 accepted

use corgi_integration_tests::{coins, wallet, Harness};
use corgi_settlement::ErrorKind;
use corgi_types::{WishAmount, MAX_WISH_DESCRIPTION_CHARS};

#[tokio::test]
async fn test_corgi_count_bounds() {
    let h = Harness::new().await;
    let (alice, bob) = h.alice_and_bob(Some(&wallet(1))).await;

    for count in [0, 101] {
        let err = h.sightings.report(alice, count).await.expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
    assert!(h.sightings.pending_for_buddy(bob).await.expect("list").is_empty());

    let low = h.sightings.report(alice, 1).await.expect("count 1");
    let resp = h.sightings.respond(low.id, bob, true).await.expect("confirm");
    assert_eq!(resp.reward_earned, Some(coins(1)));

    let high = h.sightings.report(alice, 100).await.expect("count 100");
    let resp = h.sightings.respond(high.id, bob, true).await.expect("confirm");
    assert_eq!(resp.reward_earned, Some(coins(100)));
}

#[tokio::test]
async fn test_wish_amount_bounds() {
    for bad in ["0", "-1", "1000.01", "1.001", "ten"] {
        assert!(WishAmount::parse(bad).is_err(), "{bad} accepted");
    }
    assert_eq!(WishAmount::parse("0.01").expect("min").cents(), 1);
    assert_eq!(WishAmount::parse("1000").expect("max").cents(), 100_000);
}

#[tokio::test]
async fn test_wish_description_bounds() {
    let h = Harness::new().await;
    let (alice, _bob) = h.alice_and_bob(None).await;
    let amount = WishAmount::parse("1000").expect("amount");

    let too_long = "x".repeat(MAX_WISH_DESCRIPTION_CHARS + 1);
    let err = h.wishes.create(alice, &too_long, amount).await.expect_err("501");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(h.wishes.list_for_user(alice).await.expect("list").is_empty());

    // Multi-byte characters count once each.
    let exact = "é".repeat(MAX_WISH_DESCRIPTION_CHARS);
    let wish = h.wishes.create(alice, &exact, amount).await.expect("500");
    assert_eq!(wish.description.chars().count(), MAX_WISH_DESCRIPTION_CHARS);
}
