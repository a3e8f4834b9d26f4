//! Notification collaborator boundary.
//!
//! Delivery (email, push) lives outside this core. The coordinator fires
//! these calls on a detached task and never lets a delivery failure roll back
//! registration state.

use crate::types::{EventId, UserId};
use async_trait::async_trait;

/// Outbound notifications about registration state changes.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The user obtained a seat.
    async fn notify_registered(&self, user_id: UserId, event_id: EventId);

    /// The user was placed on the waitlist.
    async fn notify_waiting(&self, user_id: UserId, event_id: EventId);

    /// The user was promoted off the waitlist into a seat.
    async fn notify_promoted(&self, user_id: UserId, event_id: EventId);
}

/// Notifier that only logs. The default wiring; real delivery is a deployment
/// concern.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify_registered(&self, user_id: UserId, event_id: EventId) {
        tracing::info!(%user_id, %event_id, "notify: registered");
    }

    async fn notify_waiting(&self, user_id: UserId, event_id: EventId) {
        tracing::info!(%user_id, %event_id, "notify: waitlisted");
    }

    async fn notify_promoted(&self, user_id: UserId, event_id: EventId) {
        tracing::info!(%user_id, %event_id, "notify: promoted from waitlist");
    }
}
