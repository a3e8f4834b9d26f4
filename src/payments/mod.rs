//! Payment gateway integration.
//!
//! The gateway itself is a collaborator; this module owns the client used to
//! create checkout orders, the HMAC verification of its confirmations, and
//! the typed shape of its webhook payloads.

pub mod gateway;
pub mod signature;
pub mod webhook;

pub use gateway::{CheckoutOrder, GatewayError, HttpPaymentGateway, MockPaymentGateway, PaymentGateway};
pub use signature::SignatureVerifier;
pub use webhook::WebhookEnvelope;
