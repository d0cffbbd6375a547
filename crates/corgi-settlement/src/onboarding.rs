//! Onboarding progress, derived from the user and buddy rows on every read.

use corgi_db::queries::{buddies, users};
use corgi_types::api::{OnboardingState, OnboardingStep};
use corgi_types::buddy::{BuddyPair, BuddyStatus};
use corgi_types::user::User;
use corgi_types::Id;

use crate::error::Result;
use crate::Db;

/// Project onboarding state from a user and their open pair, if any.
pub fn project(user: &User, pair: Option<&BuddyPair>) -> OnboardingState {
    let has_wallet = user.has_wallet();
    let buddy_status = pair.map(|p| p.status);
    let next_step = match buddy_status {
        None | Some(BuddyStatus::Dissolved) => OnboardingStep::FindBuddy,
        Some(BuddyStatus::Pending) => OnboardingStep::AwaitBuddyConfirmation,
        Some(BuddyStatus::Active) if !has_wallet => OnboardingStep::ConnectWallet,
        Some(BuddyStatus::Active) => OnboardingStep::Done,
    };

    OnboardingState {
        has_wallet,
        buddy_status,
        buddy_id: pair.and_then(|p| p.other(user.id)),
        is_complete: next_step == OnboardingStep::Done,
        next_step,
    }
}

pub async fn onboarding_state(db: &Db, user_id: Id) -> Result<OnboardingState> {
    let conn = db.lock().await;
    let user = users::get(&conn, user_id)?;
    let pair = buddies::find_open_for_user(&conn, user_id)?;
    Ok(project(&user, pair.as_ref()))
}
