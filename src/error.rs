//! Error taxonomy for the registration core.
//!
//! Storage-level conflicts (duplicate keys from uniqueness constraints) are
//! translated into the matching domain variant inside the store
//! implementations; raw storage errors never cross the store boundary except
//! wrapped in [`RegistrationError::Store`].

use crate::types::EventId;
use thiserror::Error;

/// Everything that can go wrong while allocating seats or reconciling
/// payments.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The event no longer accepts registrations.
    #[error("event is closed for registration")]
    EventClosed,

    /// The user already holds a registration for this event.
    #[error("user already holds a registration for this event")]
    AlreadyRegistered,

    /// The uniqueness constraint rejected a concurrent duplicate insert.
    #[error("a registration already exists for this event and user")]
    DuplicateRegistration,

    /// The user is already on the waitlist for this event.
    #[error("user is already on the waitlist for this event")]
    DuplicateEntry,

    /// No seat could be granted. Only reachable before a waitlist enqueue.
    #[error("event has no remaining seats")]
    EventFull,

    /// The payment signature did not match the payload. Rejected before any
    /// state mutation.
    #[error("payment signature does not match the payload")]
    TamperedPayment,

    /// No payment intent in an acceptable prior state matches this
    /// confirmation. Guards against replays and foreign orders.
    #[error("no payment intent matches this confirmation")]
    NoMatchingIntent,

    /// Payment was captured but the event filled before a seat could be
    /// secured. The intent is marked refund-required; remediation happens
    /// outside this core.
    #[error("payment captured but no seat could be secured; refund required")]
    SeatUnavailableRefundRequired,

    /// The user holds neither a registration nor a waitlist entry.
    #[error("user holds neither a registration nor a waitlist entry")]
    NotRegistered,

    /// A record the operation needed does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The referenced event record does not exist.
    #[error("event {0} does not exist")]
    EventMissing(EventId),

    /// The webhook body could not be decoded into the expected envelope.
    #[error("webhook payload is malformed: {0}")]
    MalformedWebhook(String),

    /// The payment gateway call failed or timed out.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// The storage layer failed in a way that has no domain meaning.
    #[error("storage error: {0}")]
    Store(String),
}

impl RegistrationError {
    /// Stable machine-readable code for the HTTP boundary.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EventClosed => "EVENT_CLOSED",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::DuplicateRegistration => "DUPLICATE_REGISTRATION",
            Self::DuplicateEntry => "DUPLICATE_ENTRY",
            Self::EventFull => "EVENT_FULL",
            Self::TamperedPayment => "TAMPERED_PAYMENT",
            Self::NoMatchingIntent => "NO_MATCHING_INTENT",
            Self::SeatUnavailableRefundRequired => "SEAT_UNAVAILABLE_REFUND_REQUIRED",
            Self::NotRegistered => "NOT_REGISTERED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::EventMissing(_) => "EVENT_MISSING",
            Self::MalformedWebhook(_) => "MALFORMED_WEBHOOK",
            Self::Gateway(_) => "GATEWAY_ERROR",
            Self::Store(_) => "STORAGE_ERROR",
        }
    }
}
