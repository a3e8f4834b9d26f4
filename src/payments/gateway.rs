//! Client for the external payment gateway.
//!
//! The coordinator only needs one call: create a checkout order for an
//! amount. The trait keeps the processor swappable; the HTTP implementation
//! talks to a gateway with basic-auth key pairs, and the mock stands in for
//! development and tests.

use crate::types::Money;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Result of creating a checkout order with the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutOrder {
    /// Gateway-assigned order id (opaque).
    pub provider_order_id: String,
    /// Amount the gateway will collect, in minor units.
    pub amount: Money,
}

/// Gateway call failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call exceeded the configured timeout.
    #[error("gateway call timed out")]
    Timeout,
    /// The gateway rejected the order.
    #[error("gateway rejected the order: {reason}")]
    Rejected {
        /// Gateway-reported reason.
        reason: String,
    },
    /// Transport-level failure.
    #[error("gateway transport error: {0}")]
    Transport(String),
}

/// Abstraction over the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a checkout order. The order must exist at the gateway before
    /// this returns; a timeout or failure leaves nothing to reconcile.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when the order could not be created.
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<CheckoutOrder, GatewayError>;
}

#[derive(Deserialize)]
struct OrderResponse {
    id: String,
    amount: u64,
}

/// HTTP gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: SecretString,
    timeout: Duration,
}

impl HttpPaymentGateway {
    /// Builds a client for the gateway at `base_url`.
    #[must_use]
    pub fn new(
        base_url: String,
        key_id: String,
        key_secret: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            key_id,
            key_secret,
            timeout,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<CheckoutOrder, GatewayError> {
        let url = format!("{}/orders", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "amount": amount.minor(),
            "currency": currency,
            "receipt": receipt,
        });

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose_secret()))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                reason: format!("{status}: {reason}"),
            });
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        tracing::info!(
            provider_order_id = %order.id,
            amount = order.amount,
            %currency,
            "gateway order created"
        );

        Ok(CheckoutOrder {
            provider_order_id: order.id,
            amount: Money::from_minor(order.amount),
        })
    }
}

/// Mock gateway that always creates an order.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    /// Creates a new mock gateway.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_order(
        &self,
        amount: Money,
        currency: &str,
        receipt: &str,
    ) -> Result<CheckoutOrder, GatewayError> {
        let provider_order_id = format!("order_mock_{}", uuid::Uuid::new_v4().simple());

        tracing::info!(
            %provider_order_id,
            amount = amount.minor(),
            %currency,
            %receipt,
            "mock gateway order created"
        );

        Ok(CheckoutOrder {
            provider_order_id,
            amount,
        })
    }
}
