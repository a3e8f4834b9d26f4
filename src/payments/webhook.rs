//! Typed webhook payloads.
//!
//! Deliveries are decoded into an explicit envelope with required fields
//! validated before anything touches the intent tracker; the raw body is
//! signature-checked first, so decoding only ever sees authenticated bytes.

use crate::error::RegistrationError;
use serde::Deserialize;

/// Event name the gateway sends when a payment is captured.
pub const PAYMENT_CAPTURED: &str = "payment.captured";

/// Top-level webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// Event name, e.g. `payment.captured`.
    pub event: String,
    /// Event payload.
    pub payload: WebhookPayload,
}

/// Payload wrapper.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Payment branch of the payload.
    pub payment: WebhookPayment,
}

/// Payment wrapper.
#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    /// The payment entity itself.
    pub entity: WebhookPaymentEntity,
}

/// The fields this core consumes from a payment entity.
#[derive(Debug, Deserialize)]
pub struct WebhookPaymentEntity {
    /// Gateway payment id.
    pub id: String,
    /// Gateway order id the payment settles.
    pub order_id: String,
}

impl WebhookEnvelope {
    /// Decodes a raw (already signature-verified) body.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::MalformedWebhook`] when required fields are
    /// missing or the body is not the expected shape.
    pub fn decode(body: &[u8]) -> Result<Self, RegistrationError> {
        let envelope: Self = serde_json::from_slice(body)
            .map_err(|e| RegistrationError::MalformedWebhook(e.to_string()))?;
        if envelope.payload.payment.entity.id.is_empty()
            || envelope.payload.payment.entity.order_id.is_empty()
        {
            return Err(RegistrationError::MalformedWebhook(
                "payment entity ids must be non-empty".to_string(),
            ));
        }
        Ok(envelope)
    }

    /// Whether this delivery reports a captured payment.
    #[must_use]
    pub fn is_payment_captured(&self) -> bool {
        self.event == PAYMENT_CAPTURED
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_captured_payment() {
        let body = br#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1"}}}
        }"#;
        let envelope = WebhookEnvelope::decode(body).unwrap();
        assert!(envelope.is_payment_captured());
        assert_eq!(envelope.payload.payment.entity.order_id, "order_1");
    }

    #[test]
    fn rejects_missing_fields() {
        let body = br#"{"event": "payment.captured", "payload": {"payment": {"entity": {"id": "pay_1"}}}}"#;
        let result = WebhookEnvelope::decode(body);
        assert!(matches!(result, Err(RegistrationError::MalformedWebhook(_))));
    }

    #[test]
    fn rejects_empty_ids() {
        let body = br#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "", "order_id": "order_1"}}}
        }"#;
        let result = WebhookEnvelope::decode(body);
        assert!(matches!(result, Err(RegistrationError::MalformedWebhook(_))));
    }
}
