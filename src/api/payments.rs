//! Payment API endpoints.
//!
//! - `POST /api/payments/verify` - client-driven confirmation after checkout
//! - `POST /webhooks/payment` - asynchronous gateway confirmation
//! - `GET  /api/orders/:internal_order_id` - payment attempt status

use crate::coordinator::{PaymentConfirmation, WebhookOutcome};
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::types::{OrderId, PaymentIntentStatus, RegistrationOutcome};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Signature header the gateway sets on webhook deliveries.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Client-driven payment confirmation.
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    /// Correlation id handed out by the register call.
    pub internal_order_id: Uuid,
    /// Gateway order id.
    pub provider_order_id: String,
    /// Gateway payment id.
    pub provider_payment_id: String,
    /// Hex HMAC over `provider_order_id|provider_payment_id`.
    pub signature: String,
}

/// Response for a webhook delivery.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether a capture was recorded or the event was ignored.
    pub recorded: bool,
}

/// Payment attempt status.
#[derive(Debug, Serialize)]
pub struct OrderStatusResponse {
    /// Correlation id.
    pub internal_order_id: Uuid,
    /// Gateway order id.
    pub provider_order_id: String,
    /// Current lifecycle state.
    pub status: PaymentIntentStatus,
    /// Amount owed, in minor units.
    pub amount: u64,
    /// Currency code.
    pub currency: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Verify a payment after checkout and claim the seat.
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), ApiError> {
    let outcome = state
        .coordinator
        .verify_payment(PaymentConfirmation {
            internal_order_id: OrderId::from_uuid(request.internal_order_id),
            provider_order_id: request.provider_order_id,
            provider_payment_id: request.provider_payment_id,
            signature: request.signature,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Receive an asynchronous gateway webhook.
///
/// The signature is computed over the raw body, so the handler takes `Bytes`
/// rather than a typed extractor.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing webhook signature header"))?;

    let outcome = state.coordinator.webhook(&body, signature).await?;
    Ok(Json(WebhookResponse {
        recorded: outcome == WebhookOutcome::Recorded,
    }))
}

/// Current status of a payment attempt.
pub async fn order_status(
    Path(internal_order_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<OrderStatusResponse>, ApiError> {
    let intent = state
        .coordinator
        .order_status(OrderId::from_uuid(internal_order_id))
        .await?;
    Ok(Json(OrderStatusResponse {
        internal_order_id: *intent.internal_order_id.as_uuid(),
        provider_order_id: intent.provider_order_id,
        status: intent.status,
        amount: intent.amount.minor(),
        currency: intent.currency,
    }))
}
