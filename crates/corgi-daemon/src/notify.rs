//! Best-effort user notifications.
//!
//! Domain events are forwarded to a [`NotificationSender`]. A failed send is
//! logged and dropped; it never reaches the code that emitted the event.

use std::sync::Arc;

use async_trait::async_trait;
use corgi_settlement::{Event, EventBus};
use corgi_types::Id;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delivers a short text to a user (e.g. through the Telegram bot).
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, user_id: Id, text: &str) -> anyhow::Result<()>;
}

/// Writes notifications to the log. Used when no bot is wired in.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, user_id: Id, text: &str) -> anyhow::Result<()> {
        info!(user_id, text, "notification");
        Ok(())
    }
}

/// The message a user sees for an event, if any.
pub fn render(event: &Event) -> Option<String> {
    let p = &event.payload;
    let text = match event.event_type.as_str() {
        "BuddyRequested" => "Someone wants to be your corgi buddy!".to_string(),
        "BuddyConfirmed" => "Your buddy request was accepted.".to_string(),
        "BuddyDissolved" => "Your buddy pair was dissolved.".to_string(),
        "SightingReported" => format!(
            "Your buddy spotted {} corgi(s). Confirm the sighting?",
            p["corgiCount"]
        ),
        "SightingConfirmed" => "Your buddy confirmed your sighting.".to_string(),
        "SightingDenied" => "Your buddy denied your sighting.".to_string(),
        "RewardSettled" => format!(
            "You earned {} base units of Corgi coin.",
            p["amount"].as_str().unwrap_or("some")
        ),
        "RewardFailed" => "Your reward is delayed; we will retry shortly.".to_string(),
        "WishCreated" => "Your buddy made a wish. Accept it?".to_string(),
        "WishAccepted" => "Your wish is in the marketplace.".to_string(),
        "WishRejected" => "Your buddy rejected your wish.".to_string(),
        "WishPurchased" => "Your wish was purchased!".to_string(),
        _ => return None,
    };
    Some(text)
}

/// Forward events to `sender` until shutdown.
pub fn spawn_forwarder(
    event_bus: &EventBus,
    sender: Arc<dyn NotificationSender>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                received = events.recv() => received,
                _ = shutdown_rx.recv() => break,
            };
            match event {
                Ok(event) => deliver(sender.as_ref(), &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification forwarder lagged; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("notification forwarder stopped");
    })
}

async fn deliver(sender: &dyn NotificationSender, event: &Event) {
    let (Some(user_id), Some(text)) = (event.user_id, render(event)) else {
        return;
    };
    if let Err(e) = sender.send(user_id, &text).await {
        warn!(user_id, event_type = %event.event_type, error = %e, "notification failed");
    }
}
