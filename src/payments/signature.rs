//! HMAC-SHA256 verification of payment confirmations.
//!
//! The gateway signs the client-driven confirmation over
//! `provider_order_id|provider_payment_id` and signs webhook deliveries over
//! the raw request body, both with a shared secret. Verification is
//! fail-closed: a malformed signature is treated exactly like a forged one,
//! and nothing is mutated before it passes.

use crate::error::RegistrationError;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Verifier bound to one shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    /// Creates a verifier. The secret is held in a `SecretString` so it never
    /// shows up in logs.
    #[must_use]
    pub const fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature of a client-driven payment confirmation.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::TamperedPayment`] when the hex-decoded signature
    /// does not match the HMAC of `provider_order_id|provider_payment_id`.
    pub fn verify_checkout(
        &self,
        provider_order_id: &str,
        provider_payment_id: &str,
        signature_hex: &str,
    ) -> Result<(), RegistrationError> {
        let message = format!("{provider_order_id}|{provider_payment_id}");
        self.verify(message.as_bytes(), signature_hex)
    }

    /// Verifies the signature of a raw webhook body.
    ///
    /// # Errors
    ///
    /// [`RegistrationError::TamperedPayment`] on mismatch.
    pub fn verify_body(&self, body: &[u8], signature_hex: &str) -> Result<(), RegistrationError> {
        self.verify(body, signature_hex)
    }

    fn verify(&self, message: &[u8], signature_hex: &str) -> Result<(), RegistrationError> {
        let Ok(claimed) = hex::decode(signature_hex.trim()) else {
            tracing::error!("payment signature is not valid hex; rejecting");
            return Err(RegistrationError::TamperedPayment);
        };
        let computed = self.compute(message)?;
        if computed.ct_eq(&claimed).into() {
            Ok(())
        } else {
            tracing::error!("payment signature verification failed");
            Err(RegistrationError::TamperedPayment)
        }
    }

    fn compute(&self, message: &[u8]) -> Result<Vec<u8>, RegistrationError> {
        // HMAC accepts keys of any length; the fallback keeps verification
        // fail-closed all the same.
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
        else {
            return Err(RegistrationError::TamperedPayment);
        };
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Computes the hex signature the verifier expects. Shared with tests and
/// the mock gateway.
#[must_use]
pub fn sign(secret: &str, message: &[u8]) -> String {
    HmacSha256::new_from_slice(secret.as_bytes()).map_or_else(
        |_| String::new(),
        |mut mac| {
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(SecretString::from("test-secret-key"))
    }

    #[test]
    fn valid_checkout_signature_passes() {
        let signature = sign("test-secret-key", b"order_1|pay_1");
        assert!(verifier().verify_checkout("order_1", "pay_1", &signature).is_ok());
    }

    #[test]
    fn signature_from_a_different_secret_is_rejected() {
        let signature = sign("wrong-secret", b"order_1|pay_1");
        let result = verifier().verify_checkout("order_1", "pay_1", &signature);
        assert!(matches!(result, Err(RegistrationError::TamperedPayment)));
    }

    #[test]
    fn signature_over_different_ids_is_rejected() {
        let signature = sign("test-secret-key", b"order_1|pay_1");
        let result = verifier().verify_checkout("order_2", "pay_1", &signature);
        assert!(matches!(result, Err(RegistrationError::TamperedPayment)));
    }

    #[test]
    fn invalid_hex_is_treated_as_forged() {
        let result = verifier().verify_checkout("order_1", "pay_1", "not-hex!!!");
        assert!(matches!(result, Err(RegistrationError::TamperedPayment)));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let mut signature = sign("test-secret-key", b"order_1|pay_1");
        signature.truncate(8);
        let result = verifier().verify_checkout("order_1", "pay_1", &signature);
        assert!(matches!(result, Err(RegistrationError::TamperedPayment)));
    }

    #[test]
    fn body_signature_covers_every_byte() {
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign("test-secret-key", body);
        assert!(verifier().verify_body(body, &signature).is_ok());

        let tampered = br#"{"event":"payment.captured" }"#;
        let result = verifier().verify_body(tampered, &signature);
        assert!(matches!(result, Err(RegistrationError::TamperedPayment)));
    }
}
