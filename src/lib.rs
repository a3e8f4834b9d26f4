//! Seat allocation and payment reconciliation for capacity-limited events.
//!
//! Events may be free or paid. Free registrations seat immediately while
//! capacity lasts and overflow onto a FIFO waitlist; paid registrations open
//! a payment intent with an external gateway and only seat the user once a
//! signed confirmation reconciles against it. Cancellation releases the seat
//! and promotes the oldest waiting user.
//!
//! # Architecture
//!
//! ```text
//!            ┌────────────────────────────┐      ┌─────────────────┐
//!  client ──►│ RegistrationCoordinator    │◄─────│ payment gateway │
//!  (axum)    │  register / verify /       │ HMAC │ (orders +       │
//!            │  webhook / cancel /        │      │  webhooks)      │
//!            │  promote                   │      └─────────────────┘
//!            └──┬──────┬──────┬──────┬────┘
//!               ▼      ▼      ▼      ▼
//!         Capacity  Registration Waitlist Payment
//!         Ledger    Store        Queue    Intents
//!         (atomic conditional updates / unique indexes)
//! ```
//!
//! The coordinator is the only writer of the seat counter, and every
//! contended mutation is a single atomic operation at the storage layer:
//! exactly one of two callers racing for the last seat wins, the loser lands
//! on the waitlist (free path) or in a refund-required intent (paid path).

pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod notify;
pub mod payments;
pub mod server;
pub mod stores;
pub mod types;

pub use coordinator::{PaymentConfirmation, RegistrationCoordinator, WebhookOutcome};
pub use error::RegistrationError;
