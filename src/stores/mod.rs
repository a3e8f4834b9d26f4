//! Storage contracts for the registration core.
//!
//! The four traits here are the only safe points of mutation for shared
//! state. Each contended mutation is a single atomic operation at the storage
//! layer: the ledger's conditional increment, the registration and waitlist
//! uniqueness constraints, and the waitlist's single-row dequeue. Nothing in
//! this crate reads a counter, compares it in application code, and writes it
//! back.

pub mod memory;
pub mod postgres;

use crate::error::RegistrationError;
use crate::types::{
    EventId, EventSnapshot, OrderId, PaymentIntent, Registration, UserId, WaitlistEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Owns the authoritative seat counter for each event.
#[async_trait]
pub trait CapacityLedger: Send + Sync {
    /// Fetches the current event snapshot, or `None` for an unknown event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn event(&self, event_id: EventId) -> Result<Option<EventSnapshot>, RegistrationError>;

    /// Atomically increments `registered_count` iff it is below
    /// `max_capacity`, returning whether the increment happened. Two callers
    /// racing for the last seat cannot both see `true`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn try_increment(&self, event_id: EventId) -> Result<bool, RegistrationError>;

    /// Releases one seat. Only called for a seat previously granted by a
    /// successful [`try_increment`](Self::try_increment); never drives the
    /// counter below zero.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn decrement(&self, event_id: EventId) -> Result<(), RegistrationError>;
}

/// Records confirmed (event, user) pairs.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Inserts a registration. The uniqueness constraint, not a prior
    /// existence check, rejects duplicates.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateRegistration`] if the pair already
    /// exists; [`RegistrationError::Store`] on storage failure.
    async fn create(
        &self,
        event_id: EventId,
        user_id: UserId,
        created_at: DateTime<Utc>,
    ) -> Result<Registration, RegistrationError>;

    /// Removes a registration.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotFound`] if the pair is absent;
    /// [`RegistrationError::Store`] on storage failure.
    async fn delete(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError>;

    /// Whether the pair holds a registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn exists(&self, event_id: EventId, user_id: UserId) -> Result<bool, RegistrationError>;

    /// All registrations held by a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn list_for_user(&self, user_id: UserId)
        -> Result<Vec<Registration>, RegistrationError>;

    /// Number of registrations recorded for an event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn count_for_event(&self, event_id: EventId) -> Result<u64, RegistrationError>;
}

/// FIFO queue of users waiting for a freed seat.
#[async_trait]
pub trait WaitlistQueue: Send + Sync {
    /// Appends a waitlist entry.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::DuplicateEntry`] on a repeat;
    /// [`RegistrationError::Store`] on storage failure.
    async fn enqueue(
        &self,
        event_id: EventId,
        user_id: UserId,
        joined_at: DateTime<Utc>,
    ) -> Result<WaitlistEntry, RegistrationError>;

    /// Removes and returns the earliest entry by `joined_at`, atomically: two
    /// concurrent promoters cannot both receive the same entry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn dequeue_oldest(
        &self,
        event_id: EventId,
    ) -> Result<Option<WaitlistEntry>, RegistrationError>;

    /// Removes a specific entry (explicit cancellation while waiting).
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotFound`] if the entry is absent;
    /// [`RegistrationError::Store`] on storage failure.
    async fn remove(&self, event_id: EventId, user_id: UserId) -> Result<(), RegistrationError>;

    /// 1-based position of a user in the queue, or `None` if not waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn position(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Option<u32>, RegistrationError>;
}

/// How strictly a paid transition treats the intent's current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaidTransition {
    /// Only `Created` is acceptable. Used by the client verify call so a
    /// replay against an already-finalized order is rejected.
    RequireCreated,
    /// `Created` or already `Paid` are acceptable; re-application is a no-op
    /// that keeps the first writer's payment id and signature. Used by the
    /// webhook path.
    AllowAlreadyPaid,
}

/// Tracks the lifecycle of payment attempts.
#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    /// Persists a freshly opened intent. Only called after the gateway
    /// confirmed the order exists, so an abandoned gateway call leaves
    /// nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn open(&self, intent: PaymentIntent) -> Result<(), RegistrationError>;

    /// Conditionally transitions the intent matching `provider_order_id` to
    /// `Paid`, recording the payment id and signature. When
    /// `internal_order_id` is given it must also match, which pins the
    /// confirmation to the attempt it claims to settle. Returns the updated
    /// intent, or `None` when no intent in an acceptable prior state matched.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn mark_paid(
        &self,
        provider_order_id: &str,
        internal_order_id: Option<OrderId>,
        provider_payment_id: &str,
        signature: &str,
        mode: PaidTransition,
    ) -> Result<Option<PaymentIntent>, RegistrationError>;

    /// Transitions a `Paid` intent whose seat could not be secured into the
    /// terminal `RefundRequired` state.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::NotFound`] if no `Paid` intent matches;
    /// [`RegistrationError::Store`] on storage failure.
    async fn mark_refund_required(
        &self,
        internal_order_id: OrderId,
    ) -> Result<(), RegistrationError>;

    /// Marks any open (`Created` or `Paid`) intents for the attempt
    /// cancelled. A no-op when none exist.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn mark_cancelled(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), RegistrationError>;

    /// Looks up an intent by its internal correlation id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] if the storage layer fails.
    async fn find_by_internal_order(
        &self,
        internal_order_id: OrderId,
    ) -> Result<Option<PaymentIntent>, RegistrationError>;
}
