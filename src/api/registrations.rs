//! Registration API endpoints.
//!
//! - `POST /api/events/:id/register` - register for an event
//! - `POST /api/events/:id/cancel` - cancel a registration or waitlist entry
//! - `GET  /api/registrations/:user_id` - list a user's registrations
//! - `GET  /api/events/:id/availability` - remaining seats
//! - `GET  /api/events/:id/waitlist/:user_id` - waitlist position

use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::types::{CancelOutcome, EventId, RegistrationOutcome, UserId};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to register for (or cancel from) an event.
#[derive(Debug, Deserialize)]
pub struct AttendRequest {
    /// User making the request. Identity is owned by an external auth layer;
    /// this surface trusts the caller-supplied id.
    pub user_id: Uuid,
}

/// Response after a cancel.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// What the cancel resolved to.
    pub outcome: CancelOutcome,
}

/// One registration in a listing.
#[derive(Debug, Serialize)]
pub struct RegistrationView {
    /// Event id.
    pub event_id: Uuid,
    /// When the seat was granted.
    pub created_at: DateTime<Utc>,
}

/// Response listing a user's registrations.
#[derive(Debug, Serialize)]
pub struct RegistrationListResponse {
    /// Registrations, newest first.
    pub registrations: Vec<RegistrationView>,
    /// Total count.
    pub total: usize,
}

/// Availability snapshot for an event.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Event id.
    pub event_id: Uuid,
    /// Maximum capacity.
    pub max_capacity: u32,
    /// Seats currently taken.
    pub registered_count: u32,
    /// Seats left.
    pub seats_left: u32,
    /// Whether registration is closed.
    pub is_closed: bool,
}

/// Waitlist position for a user.
#[derive(Debug, Serialize)]
pub struct WaitlistPositionResponse {
    /// 1-based position, or `null` when the user is not waiting.
    pub position: Option<u32>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Register for an event.
///
/// Returns `registered`, `waiting`, or `payment_pending` with the order ids
/// needed for gateway checkout.
pub async fn register(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<AttendRequest>,
) -> Result<(StatusCode, Json<RegistrationOutcome>), ApiError> {
    let outcome = state
        .coordinator
        .register(EventId::from_uuid(event_id), UserId::from_uuid(request.user_id))
        .await?;
    let status = match outcome {
        RegistrationOutcome::Registered => StatusCode::CREATED,
        RegistrationOutcome::Waiting | RegistrationOutcome::PaymentPending { .. } => {
            StatusCode::ACCEPTED
        }
    };
    Ok((status, Json(outcome)))
}

/// Cancel a registration or leave the waitlist.
pub async fn cancel(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<AttendRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let outcome = state
        .coordinator
        .cancel(EventId::from_uuid(event_id), UserId::from_uuid(request.user_id))
        .await?;
    Ok(Json(CancelResponse { outcome }))
}

/// List the registrations a user holds.
pub async fn list_registrations(
    Path(user_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<RegistrationListResponse>, ApiError> {
    let registrations = state
        .coordinator
        .registrations_for_user(UserId::from_uuid(user_id))
        .await?;
    let views: Vec<RegistrationView> = registrations
        .into_iter()
        .map(|r| RegistrationView {
            event_id: *r.event_id.as_uuid(),
            created_at: r.created_at,
        })
        .collect();
    let total = views.len();
    Ok(Json(RegistrationListResponse {
        registrations: views,
        total,
    }))
}

/// Current availability for an event.
pub async fn availability(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let snapshot = state
        .coordinator
        .availability(EventId::from_uuid(event_id))
        .await?;
    Ok(Json(AvailabilityResponse {
        event_id: *snapshot.id.as_uuid(),
        max_capacity: snapshot.max_capacity.value(),
        registered_count: snapshot.registered_count,
        seats_left: snapshot.seats_left(),
        is_closed: snapshot.is_closed,
    }))
}

/// Waitlist position for a user.
pub async fn waitlist_position(
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<WaitlistPositionResponse>, ApiError> {
    let position = state
        .coordinator
        .waitlist_position(EventId::from_uuid(event_id), UserId::from_uuid(user_id))
        .await?;
    Ok(Json(WaitlistPositionResponse { position }))
}
