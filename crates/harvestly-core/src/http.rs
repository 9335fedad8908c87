// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API for schedules, zones, availability and subscriptions.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::availability::{AvailabilityQuery, AvailabilityService};
use crate::error::CoreError;
use crate::lifecycle::{NewSubscription, SubscriptionLifecycle};
use crate::model::{
    DeliveryZone, Frequency, FulfillmentChannel, FulfillmentLocation, Schedule,
    ScheduleAssignment, ScheduleKind, ShippingZone, Subscription,
};
use crate::persistence::Persistence;
use crate::zones;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Storage backend.
    pub persistence: Arc<dyn Persistence>,
    /// Availability computation.
    pub availability: Arc<AvailabilityService>,
    /// Subscription state machine.
    pub lifecycle: Arc<SubscriptionLifecycle>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/availability", get(get_availability))
        .route("/schedules", post(create_schedule).get(list_schedules))
        .route(
            "/schedules/{id}",
            put(update_schedule)
                .get(get_schedule)
                .delete(delete_schedule),
        )
        .route(
            "/schedules/{id}/blocked-dates/{date}",
            post(block_date).delete(unblock_date),
        )
        .route("/schedule-assignments", post(create_assignment))
        .route("/schedule-assignments/{id}", delete(delete_assignment))
        .route(
            "/delivery-zones",
            post(create_delivery_zone).get(list_delivery_zones),
        )
        .route("/delivery-zones/resolve", get(resolve_delivery))
        .route(
            "/shipping-zones",
            post(create_shipping_zone).get(list_shipping_zones),
        )
        .route("/shipping-zones/resolve", get(resolve_shipping))
        .route("/locations", post(create_location).get(list_locations))
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/{id}", get(get_subscription))
        .route("/subscriptions/{id}/skip", post(skip_subscription))
        .route("/subscriptions/{id}/pause", post(pause_subscription))
        .route("/subscriptions/{id}/resume", post(resume_subscription))
        .route("/subscriptions/{id}/cancel", post(cancel_subscription))
        .with_state(state)
}

/// CoreError wrapper implementing `IntoResponse`.
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::ScheduleNotFound { .. }
            | CoreError::AssignmentNotFound { .. }
            | CoreError::SubscriptionNotFound { .. }
            | CoreError::ZoneNotFound { .. }
            | CoreError::LocationNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidRecurrenceRule { .. } | CoreError::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            CoreError::IllegalTransition { .. } | CoreError::ConcurrencyConflict { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::OrderCreationFailed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            code: self.0.error_code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ----------------------------------------------------------------------------
// Health
// ----------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let db_ok = state.persistence.health_check_db().await?;
    Ok(Json(serde_json::json!({
        "status": if db_ok { "ok" } else { "degraded" },
    })))
}

// ----------------------------------------------------------------------------
// Availability
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AvailabilityParams {
    fulfillment_type: String,
    location_or_zone_id: String,
    from: Option<NaiveDate>,
    horizon_days: Option<u32>,
    max_per_schedule: Option<usize>,
}

#[instrument(skip(state))]
async fn get_availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> ApiResult<Json<Vec<NaiveDate>>> {
    let channel =
        FulfillmentChannel::from_parts(&params.fulfillment_type, &params.location_or_zone_id)?;
    let query = AvailabilityQuery {
        from: params.from,
        horizon_days: params.horizon_days,
        max_per_schedule: params.max_per_schedule,
    };
    let dates = state.availability.available_dates(&channel, &query).await?;
    Ok(Json(dates))
}

// ----------------------------------------------------------------------------
// Schedules
// ----------------------------------------------------------------------------

/// Schedule fields without the server-assigned id.
#[derive(Debug, Deserialize)]
struct ScheduleInput {
    name: String,
    #[serde(flatten)]
    kind: ScheduleKind,
    cutoff_hours_before: i64,
    cutoff_time: chrono::NaiveTime,
    #[serde(default)]
    blocked_dates: Vec<NaiveDate>,
    #[serde(default = "default_true")]
    is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduleInput {
    fn into_schedule(self, schedule_id: String) -> Schedule {
        Schedule {
            schedule_id,
            name: self.name,
            kind: self.kind,
            cutoff_hours_before: self.cutoff_hours_before,
            cutoff_time: self.cutoff_time,
            blocked_dates: self.blocked_dates,
            is_active: self.is_active,
        }
    }
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<(StatusCode, Json<Schedule>)> {
    let schedule = input.into_schedule(Uuid::new_v4().to_string());
    schedule.validate()?;
    state.persistence.insert_schedule(&schedule).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
    Json(input): Json<ScheduleInput>,
) -> ApiResult<Json<Schedule>> {
    let schedule = input.into_schedule(schedule_id);
    schedule.validate()?;
    if !state.persistence.update_schedule(&schedule).await? {
        return Err(CoreError::ScheduleNotFound {
            schedule_id: schedule.schedule_id,
        }
        .into());
    }
    Ok(Json(schedule))
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<Json<Schedule>> {
    let schedule = state
        .persistence
        .get_schedule(&schedule_id)
        .await?
        .ok_or(CoreError::ScheduleNotFound { schedule_id })?;
    Ok(Json(schedule))
}

async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Vec<Schedule>>> {
    Ok(Json(state.persistence.list_schedules().await?))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(schedule_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.persistence.delete_schedule(&schedule_id).await? {
        return Err(CoreError::ScheduleNotFound { schedule_id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn block_date(
    State(state): State<AppState>,
    Path((schedule_id, date)): Path<(String, NaiveDate)>,
) -> ApiResult<StatusCode> {
    if !state
        .persistence
        .set_blocked_date(&schedule_id, date, true)
        .await?
    {
        return Err(CoreError::ScheduleNotFound { schedule_id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn unblock_date(
    State(state): State<AppState>,
    Path((schedule_id, date)): Path<(String, NaiveDate)>,
) -> ApiResult<StatusCode> {
    if !state
        .persistence
        .set_blocked_date(&schedule_id, date, false)
        .await?
    {
        return Err(CoreError::ScheduleNotFound { schedule_id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Schedule assignments
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AssignmentInput {
    schedule_id: String,
    fulfillment_type: String,
    location_or_zone_id: String,
}

async fn create_assignment(
    State(state): State<AppState>,
    Json(input): Json<AssignmentInput>,
) -> ApiResult<(StatusCode, Json<ScheduleAssignment>)> {
    let channel =
        FulfillmentChannel::from_parts(&input.fulfillment_type, &input.location_or_zone_id)?;
    if state
        .persistence
        .get_schedule(&input.schedule_id)
        .await?
        .is_none()
    {
        return Err(CoreError::ScheduleNotFound {
            schedule_id: input.schedule_id,
        }
        .into());
    }
    let assignment = ScheduleAssignment {
        assignment_id: Uuid::new_v4().to_string(),
        schedule_id: input.schedule_id,
        channel,
    };
    state.persistence.insert_assignment(&assignment).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn delete_assignment(
    State(state): State<AppState>,
    Path(assignment_id): Path<String>,
) -> ApiResult<StatusCode> {
    if !state.persistence.delete_assignment(&assignment_id).await? {
        return Err(CoreError::AssignmentNotFound { assignment_id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ----------------------------------------------------------------------------
// Zones and locations
// ----------------------------------------------------------------------------

async fn create_delivery_zone(
    State(state): State<AppState>,
    Json(zone): Json<DeliveryZone>,
) -> ApiResult<(StatusCode, Json<DeliveryZone>)> {
    state.persistence.insert_delivery_zone(&zone).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

async fn list_delivery_zones(State(state): State<AppState>) -> ApiResult<Json<Vec<DeliveryZone>>> {
    Ok(Json(state.persistence.list_delivery_zones().await?))
}

#[derive(Debug, Deserialize)]
struct ZipQuery {
    zip: String,
}

async fn resolve_delivery(
    State(state): State<AppState>,
    Query(query): Query<ZipQuery>,
) -> ApiResult<Json<Option<DeliveryZone>>> {
    let zones = state.persistence.list_delivery_zones().await?;
    Ok(Json(zones::resolve_delivery_zone(&zones, &query.zip).cloned()))
}

async fn create_shipping_zone(
    State(state): State<AppState>,
    Json(zone): Json<ShippingZone>,
) -> ApiResult<(StatusCode, Json<ShippingZone>)> {
    state.persistence.insert_shipping_zone(&zone).await?;
    Ok((StatusCode::CREATED, Json(zone)))
}

async fn list_shipping_zones(State(state): State<AppState>) -> ApiResult<Json<Vec<ShippingZone>>> {
    Ok(Json(state.persistence.list_shipping_zones().await?))
}

#[derive(Debug, Deserialize)]
struct StateQuery {
    state: String,
}

async fn resolve_shipping(
    State(state): State<AppState>,
    Query(query): Query<StateQuery>,
) -> ApiResult<Json<Option<ShippingZone>>> {
    let zones = state.persistence.list_shipping_zones().await?;
    Ok(Json(
        zones::resolve_shipping_zone(&zones, &query.state).cloned(),
    ))
}

async fn create_location(
    State(state): State<AppState>,
    Json(location): Json<FulfillmentLocation>,
) -> ApiResult<(StatusCode, Json<FulfillmentLocation>)> {
    state.persistence.insert_location(&location).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

async fn list_locations(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<FulfillmentLocation>>> {
    Ok(Json(state.persistence.list_locations().await?))
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SubscriptionInput {
    frequency: Frequency,
    fulfillment_type: String,
    location_or_zone_id: String,
}

async fn create_subscription(
    State(state): State<AppState>,
    Json(input): Json<SubscriptionInput>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    let channel =
        FulfillmentChannel::from_parts(&input.fulfillment_type, &input.location_or_zone_id)?;
    let subscription = state
        .lifecycle
        .create(NewSubscription {
            frequency: input.frequency,
            channel,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(state.lifecycle.get(&subscription_id).await?))
}

async fn skip_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(
        state.lifecycle.skip_next_order(&subscription_id).await?,
    ))
}

async fn pause_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(state.lifecycle.pause(&subscription_id).await?))
}

async fn resume_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<Subscription>> {
    Ok(Json(state.lifecycle.resume(&subscription_id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct CancelInput {
    reason: Option<String>,
}

async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    body: Option<Json<CancelInput>>,
) -> ApiResult<Json<Subscription>> {
    let reason = body.and_then(|Json(input)| input.reason);
    Ok(Json(state.lifecycle.cancel(&subscription_id, reason).await?))
}
