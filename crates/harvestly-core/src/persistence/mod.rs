// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends.
//!
//! Defines the [`Persistence`] trait the engine runs against, plus SQLite
//! and PostgreSQL implementations. Date lists and recurrence rules are
//! stored as JSON text columns; rows are converted to domain types in one
//! place so both backends share the decoding rules.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::error::CoreError;
use crate::model::{
    DeliveryZone, FulfillmentChannel, FulfillmentLocation, RecurrenceRule, Schedule,
    ScheduleAssignment, ScheduleKind, ShippingZone, Subscription, SubscriptionStatus,
};

/// Persistence interface used by the availability and lifecycle layers.
///
/// Zone and location lists are returned in configuration order, which the
/// zone resolver relies on for deterministic first-match ties.
#[allow(missing_docs)]
#[async_trait]
pub trait Persistence: Send + Sync {
    // Schedules
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), CoreError>;

    /// Replace a schedule. Returns false if it does not exist.
    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool, CoreError>;

    /// Delete a schedule (assignments cascade). Returns false if missing.
    async fn delete_schedule(&self, schedule_id: &str) -> Result<bool, CoreError>;

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, CoreError>;

    async fn list_schedules(&self) -> Result<Vec<Schedule>, CoreError>;

    /// Add or remove a single blocked date. Returns false if the schedule
    /// does not exist.
    async fn set_blocked_date(
        &self,
        schedule_id: &str,
        date: NaiveDate,
        blocked: bool,
    ) -> Result<bool, CoreError>;

    // Schedule assignments
    async fn insert_assignment(&self, assignment: &ScheduleAssignment) -> Result<(), CoreError>;

    /// Returns false if the assignment does not exist.
    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, CoreError>;

    async fn list_assignments_for_channel(
        &self,
        channel: &FulfillmentChannel,
    ) -> Result<Vec<ScheduleAssignment>, CoreError>;

    // Zones and locations
    async fn insert_delivery_zone(&self, zone: &DeliveryZone) -> Result<(), CoreError>;

    async fn list_delivery_zones(&self) -> Result<Vec<DeliveryZone>, CoreError>;

    async fn insert_shipping_zone(&self, zone: &ShippingZone) -> Result<(), CoreError>;

    async fn list_shipping_zones(&self) -> Result<Vec<ShippingZone>, CoreError>;

    async fn insert_location(&self, location: &FulfillmentLocation) -> Result<(), CoreError>;

    async fn list_locations(&self) -> Result<Vec<FulfillmentLocation>, CoreError>;

    // Subscriptions
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), CoreError>;

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, CoreError>;

    /// Compare-and-swap write: applies the record only when the stored
    /// version equals `expected_version`, bumping the version. Returns
    /// false when a concurrent writer got there first.
    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<bool, CoreError>;

    /// Active subscriptions with `next_order_date <= on_or_before`,
    /// oldest first, for the renewal scan.
    async fn list_subscriptions_due(
        &self,
        on_or_before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Subscription>, CoreError>;

    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Connect to the backend named by the URL scheme and run its migrations.
pub async fn connect(database_url: &str) -> Result<Arc<dyn Persistence>, CoreError> {
    if database_url.starts_with("sqlite") {
        Ok(Arc::new(SqlitePersistence::from_url(database_url).await?))
    } else {
        Ok(Arc::new(PostgresPersistence::from_url(database_url).await?))
    }
}

// ============================================================================
// Row types and conversions shared by both backends
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ScheduleRow {
    pub schedule_id: String,
    pub name: String,
    pub kind: String,
    pub recurrence_rule: Option<String>,
    pub available_dates: String,
    pub blocked_dates: String,
    pub cutoff_hours_before: i64,
    pub cutoff_time: String,
    pub is_active: bool,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = CoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, CoreError> {
        let kind = match row.kind.as_str() {
            "recurring" => {
                let raw = row.recurrence_rule.ok_or_else(|| decode_error(
                    format!("schedule '{}' is recurring but has no rule", row.schedule_id),
                ))?;
                let recurrence_rule: RecurrenceRule = serde_json::from_str(&raw)?;
                ScheduleKind::Recurring { recurrence_rule }
            }
            "one_time" => ScheduleKind::OneTime {
                available_dates: decode_dates(&row.available_dates)?,
            },
            other => {
                return Err(decode_error(format!(
                    "schedule '{}' has unknown kind '{}'",
                    row.schedule_id, other
                )));
            }
        };
        let cutoff_time = NaiveTime::parse_from_str(&row.cutoff_time, "%H:%M:%S")
            .map_err(|e| decode_error(format!("bad cutoff_time '{}': {}", row.cutoff_time, e)))?;

        Ok(Schedule {
            schedule_id: row.schedule_id,
            name: row.name,
            kind,
            cutoff_hours_before: row.cutoff_hours_before,
            cutoff_time,
            blocked_dates: decode_dates(&row.blocked_dates)?,
            is_active: row.is_active,
        })
    }
}

pub(crate) struct ScheduleColumns {
    pub kind: &'static str,
    pub recurrence_rule: Option<String>,
    pub available_dates: String,
    pub blocked_dates: String,
    pub cutoff_time: String,
}

impl ScheduleColumns {
    /// Flatten a schedule into its stored column values.
    pub fn encode(schedule: &Schedule) -> Result<Self, CoreError> {
        let (kind, recurrence_rule, available_dates) = match &schedule.kind {
            ScheduleKind::Recurring { recurrence_rule } => (
                "recurring",
                Some(serde_json::to_string(recurrence_rule)?),
                "[]".to_string(),
            ),
            ScheduleKind::OneTime { available_dates } => {
                ("one_time", None, encode_dates(available_dates)?)
            }
        };
        Ok(Self {
            kind,
            recurrence_rule,
            available_dates,
            blocked_dates: encode_dates(&schedule.blocked_dates)?,
            cutoff_time: schedule.cutoff_time.format("%H:%M:%S").to_string(),
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AssignmentRow {
    pub assignment_id: String,
    pub schedule_id: String,
    pub fulfillment_type: String,
    pub target_id: String,
}

impl TryFrom<AssignmentRow> for ScheduleAssignment {
    type Error = CoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, CoreError> {
        Ok(ScheduleAssignment {
            assignment_id: row.assignment_id,
            schedule_id: row.schedule_id,
            channel: FulfillmentChannel::from_parts(&row.fulfillment_type, &row.target_id)?,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct DeliveryZoneRow {
    pub zone_id: String,
    pub name: String,
    pub zip_codes: String,
    pub delivery_fee_cents: i64,
    pub free_delivery_minimum_cents: Option<i64>,
    pub min_order_amount_cents: i64,
}

impl TryFrom<DeliveryZoneRow> for DeliveryZone {
    type Error = CoreError;

    fn try_from(row: DeliveryZoneRow) -> Result<Self, CoreError> {
        Ok(DeliveryZone {
            zone_id: row.zone_id,
            name: row.name,
            zip_codes: serde_json::from_str(&row.zip_codes)?,
            delivery_fee_cents: row.delivery_fee_cents,
            free_delivery_minimum_cents: row.free_delivery_minimum_cents,
            min_order_amount_cents: row.min_order_amount_cents,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ShippingZoneRow {
    pub zone_id: String,
    pub name: String,
    pub states: String,
    pub base_rate_cents: i64,
    pub per_lb_rate_cents: i64,
    pub free_shipping_minimum_cents: Option<i64>,
    pub min_order_amount_cents: i64,
}

impl TryFrom<ShippingZoneRow> for ShippingZone {
    type Error = CoreError;

    fn try_from(row: ShippingZoneRow) -> Result<Self, CoreError> {
        Ok(ShippingZone {
            zone_id: row.zone_id,
            name: row.name,
            states: serde_json::from_str(&row.states)?,
            base_rate_cents: row.base_rate_cents,
            per_lb_rate_cents: row.per_lb_rate_cents,
            free_shipping_minimum_cents: row.free_shipping_minimum_cents,
            min_order_amount_cents: row.min_order_amount_cents,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct LocationRow {
    pub location_id: String,
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl From<LocationRow> for FulfillmentLocation {
    fn from(row: LocationRow) -> Self {
        FulfillmentLocation {
            location_id: row.location_id,
            name: row.name,
            street: row.street,
            city: row.city,
            state: row.state,
            zip: row.zip,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub subscription_id: String,
    pub status: String,
    pub frequency: String,
    pub fulfillment_type: String,
    pub target_id: String,
    pub next_order_date: Option<NaiveDate>,
    pub last_order_date: Option<NaiveDate>,
    pub skip_dates: String,
    pub needs_review: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = CoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, CoreError> {
        Ok(Subscription {
            subscription_id: row.subscription_id,
            status: SubscriptionStatus::parse(&row.status)?,
            frequency: crate::model::Frequency::parse(&row.frequency)?,
            channel: FulfillmentChannel::from_parts(&row.fulfillment_type, &row.target_id)?,
            next_order_date: row.next_order_date,
            last_order_date: row.last_order_date,
            skip_dates: decode_dates(&row.skip_dates)?,
            needs_review: row.needs_review,
            cancelled_at: row.cancelled_at,
            cancellation_reason: row.cancellation_reason,
            version: row.version,
            created_at: row.created_at,
        })
    }
}

pub(crate) fn encode_dates(dates: &[NaiveDate]) -> Result<String, CoreError> {
    Ok(serde_json::to_string(dates)?)
}

pub(crate) fn decode_dates(json: &str) -> Result<Vec<NaiveDate>, CoreError> {
    Ok(serde_json::from_str(json)?)
}

fn decode_error(details: String) -> CoreError {
    CoreError::DatabaseError {
        operation: "decode".to_string(),
        details,
    }
}
