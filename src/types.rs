//! Domain types for the registration core.
//!
//! Value objects (ids, money, capacity), the entities owned by the stores
//! (registrations, waitlist entries, payment intents), and the outcomes the
//! coordinator reports back to the API boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal order identifier correlating one registration attempt with one
/// payment. Generated when the paid register path opens an intent; unique per
/// attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money Value Object (minor currency units, no floating point)
// ============================================================================

/// An amount in minor currency units (paise, cents). Zero means free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from minor units.
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0
    }

    /// Checks whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Maximum number of seats for an event. Positive and immutable once set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new `Capacity`.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the capacity value.
    #[must_use]
    pub const fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Read view of an event as the ledger sees it. The event record itself is
/// owned externally; only `registered_count` is written from this crate, and
/// only through the Capacity Ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Event identifier.
    pub id: EventId,
    /// Maximum admitted capacity.
    pub max_capacity: Capacity,
    /// Seats currently counted. Always within `[0, max_capacity]`.
    pub registered_count: u32,
    /// Whether registration is closed.
    pub is_closed: bool,
    /// Price per seat in minor units; zero means the event is free.
    pub price: Money,
    /// ISO currency code used when creating gateway orders.
    pub currency: String,
}

impl EventSnapshot {
    /// Whether the event requires no payment.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    /// Remaining seats.
    #[must_use]
    pub const fn seats_left(&self) -> u32 {
        self.max_capacity.value().saturating_sub(self.registered_count)
    }
}

/// A confirmed seat. Its existence implies a unit of `registered_count` was
/// taken at creation time and has not since been released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Event the seat belongs to.
    pub event_id: EventId,
    /// Holder of the seat.
    pub user_id: UserId,
    /// When the seat was granted.
    pub created_at: DateTime<Utc>,
}

/// A user waiting for a freed seat. Mutually exclusive with a `Registration`
/// for the same (event, user) pair; promotion order is `joined_at` ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Event the user is waiting on.
    pub event_id: EventId,
    /// Waiting user.
    pub user_id: UserId,
    /// Join time; the promotion sort key.
    pub joined_at: DateTime<Utc>,
}

/// Lifecycle state of a payment attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    /// Opened at registration time, before any seat is touched.
    Created,
    /// Signature-verified confirmation recorded.
    Paid,
    /// Gateway reported a terminal failure.
    Failed,
    /// The attempt was cancelled.
    Cancelled,
    /// Payment captured but no seat could be secured. Terminal; surfaced for
    /// refund handling outside this core.
    RefundRequired,
}

impl PaymentIntentStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::RefundRequired => "refund_required",
        }
    }

    /// Parses the storage string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "refund_required" => Some(Self::RefundRequired),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked payment attempt tied to one registration attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Internal correlation id, generated at register time.
    pub internal_order_id: OrderId,
    /// Gateway-assigned order id (opaque).
    pub provider_order_id: String,
    /// Event the attempt targets.
    pub event_id: EventId,
    /// User making the attempt.
    pub user_id: UserId,
    /// Amount owed, in minor units.
    pub amount: Money,
    /// ISO currency code.
    pub currency: String,
    /// Current lifecycle state.
    pub status: PaymentIntentStatus,
    /// Gateway-assigned payment id (opaque), recorded when paid.
    pub provider_payment_id: Option<String>,
    /// Signature that verified the confirmation, recorded when paid.
    pub signature: Option<String>,
    /// When the intent was opened.
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// Opens a new intent in `Created` state.
    #[must_use]
    pub const fn open(
        internal_order_id: OrderId,
        provider_order_id: String,
        event_id: EventId,
        user_id: UserId,
        amount: Money,
        currency: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            internal_order_id,
            provider_order_id,
            event_id,
            user_id,
            amount,
            currency,
            status: PaymentIntentStatus::Created,
            provider_payment_id: None,
            signature: None,
            created_at,
        }
    }
}

// ============================================================================
// Operation Outcomes
// ============================================================================

/// What a register attempt resulted in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// A seat was granted and a registration recorded.
    Registered,
    /// The event was full; the user now waits in FIFO order.
    Waiting,
    /// A gateway order was created; no seat is reserved until payment is
    /// verified.
    PaymentPending {
        /// Correlation id to echo back in the verify call.
        internal_order_id: OrderId,
        /// Gateway order id for client checkout.
        provider_order_id: String,
        /// Amount owed, in minor units.
        amount: Money,
    },
}

/// What a cancel resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// A registration was removed and its seat released.
    SeatReleased,
    /// A waitlist entry was removed.
    LeftWaitlist,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn money_zero_means_free() {
        assert!(Money::from_minor(0).is_zero());
        assert!(!Money::from_minor(500).is_zero());
    }

    #[test]
    fn seats_left_never_underflows() {
        let event = EventSnapshot {
            id: EventId::new(),
            max_capacity: Capacity::new(2),
            registered_count: 2,
            is_closed: false,
            price: Money::from_minor(0),
            currency: "INR".to_string(),
        };
        assert_eq!(event.seats_left(), 0);
    }

    #[test]
    fn intent_status_round_trips_through_storage_form() {
        for status in [
            PaymentIntentStatus::Created,
            PaymentIntentStatus::Paid,
            PaymentIntentStatus::Failed,
            PaymentIntentStatus::Cancelled,
            PaymentIntentStatus::RefundRequired,
        ] {
            assert_eq!(PaymentIntentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentIntentStatus::parse("granted"), None);
    }
}
