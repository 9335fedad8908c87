// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed persistence implementation.

use chrono::NaiveDate;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::CoreError;
use crate::model::{
    DeliveryZone, FulfillmentChannel, FulfillmentLocation, Schedule, ScheduleAssignment,
    ShippingZone, Subscription,
};

use super::{
    AssignmentRow, DeliveryZoneRow, LocationRow, Persistence, ScheduleColumns, ScheduleRow,
    ShippingZoneRow, SubscriptionRow, encode_dates,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SCHEDULE_COLUMNS: &str = "schedule_id, name, kind, recurrence_rule, available_dates, \
     blocked_dates, cutoff_hours_before, cutoff_time, is_active";

const SUBSCRIPTION_COLUMNS: &str = "subscription_id, status, frequency, fulfillment_type, \
     target_id, next_order_date, last_order_date, skip_dates, needs_review, cancelled_at, \
     cancellation_reason, version, created_at";

/// PostgreSQL-backed persistence provider.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new PostgreSQL persistence provider from an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a PostgreSQL URL and run migrations.
    pub async fn from_url(url: &str) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), CoreError> {
        let cols = ScheduleColumns::encode(schedule)?;
        sqlx::query(
            r#"
            INSERT INTO schedules (schedule_id, name, kind, recurrence_rule, available_dates,
                                   blocked_dates, cutoff_hours_before, cutoff_time, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&schedule.schedule_id)
        .bind(&schedule.name)
        .bind(cols.kind)
        .bind(&cols.recurrence_rule)
        .bind(&cols.available_dates)
        .bind(&cols.blocked_dates)
        .bind(schedule.cutoff_hours_before)
        .bind(&cols.cutoff_time)
        .bind(schedule.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool, CoreError> {
        let cols = ScheduleColumns::encode(schedule)?;
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET name = $1, kind = $2, recurrence_rule = $3, available_dates = $4,
                blocked_dates = $5, cutoff_hours_before = $6, cutoff_time = $7, is_active = $8
            WHERE schedule_id = $9
            "#,
        )
        .bind(&schedule.name)
        .bind(cols.kind)
        .bind(&cols.recurrence_rule)
        .bind(&cols.available_dates)
        .bind(&cols.blocked_dates)
        .bind(schedule.cutoff_hours_before)
        .bind(&cols.cutoff_time)
        .bind(schedule.is_active)
        .bind(&schedule.schedule_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM schedules WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, CoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM schedules WHERE schedule_id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Schedule::try_from).transpose()
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, CoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>(&format!(
            "SELECT {} FROM schedules ORDER BY created_at, schedule_id",
            SCHEDULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn set_blocked_date(
        &self,
        schedule_id: &str,
        date: NaiveDate,
        blocked: bool,
    ) -> Result<bool, CoreError> {
        let Some(mut schedule) = self.get_schedule(schedule_id).await? else {
            return Ok(false);
        };
        if blocked {
            if !schedule.blocked_dates.contains(&date) {
                schedule.blocked_dates.push(date);
                schedule.blocked_dates.sort_unstable();
            }
        } else {
            schedule.blocked_dates.retain(|d| *d != date);
        }

        sqlx::query("UPDATE schedules SET blocked_dates = $1 WHERE schedule_id = $2")
            .bind(encode_dates(&schedule.blocked_dates)?)
            .bind(schedule_id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }

    async fn insert_assignment(&self, assignment: &ScheduleAssignment) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO schedule_assignments (assignment_id, schedule_id, fulfillment_type, target_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&assignment.assignment_id)
        .bind(&assignment.schedule_id)
        .bind(assignment.channel.fulfillment_type())
        .bind(assignment.channel.target_id())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM schedule_assignments WHERE assignment_id = $1")
            .bind(assignment_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_assignments_for_channel(
        &self,
        channel: &FulfillmentChannel,
    ) -> Result<Vec<ScheduleAssignment>, CoreError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT assignment_id, schedule_id, fulfillment_type, target_id
            FROM schedule_assignments
            WHERE fulfillment_type = $1 AND target_id = $2
            ORDER BY created_at, assignment_id
            "#,
        )
        .bind(channel.fulfillment_type())
        .bind(channel.target_id())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ScheduleAssignment::try_from).collect()
    }

    async fn insert_delivery_zone(&self, zone: &DeliveryZone) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_zones (zone_id, name, zip_codes, delivery_fee_cents,
                                        free_delivery_minimum_cents, min_order_amount_cents)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&zone.zone_id)
        .bind(&zone.name)
        .bind(serde_json::to_string(&zone.zip_codes)?)
        .bind(zone.delivery_fee_cents)
        .bind(zone.free_delivery_minimum_cents)
        .bind(zone.min_order_amount_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_delivery_zones(&self) -> Result<Vec<DeliveryZone>, CoreError> {
        let rows = sqlx::query_as::<_, DeliveryZoneRow>(
            r#"
            SELECT zone_id, name, zip_codes, delivery_fee_cents,
                   free_delivery_minimum_cents, min_order_amount_cents
            FROM delivery_zones
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryZone::try_from).collect()
    }

    async fn insert_shipping_zone(&self, zone: &ShippingZone) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO shipping_zones (zone_id, name, states, base_rate_cents, per_lb_rate_cents,
                                        free_shipping_minimum_cents, min_order_amount_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&zone.zone_id)
        .bind(&zone.name)
        .bind(serde_json::to_string(&zone.states)?)
        .bind(zone.base_rate_cents)
        .bind(zone.per_lb_rate_cents)
        .bind(zone.free_shipping_minimum_cents)
        .bind(zone.min_order_amount_cents)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_shipping_zones(&self) -> Result<Vec<ShippingZone>, CoreError> {
        let rows = sqlx::query_as::<_, ShippingZoneRow>(
            r#"
            SELECT zone_id, name, states, base_rate_cents, per_lb_rate_cents,
                   free_shipping_minimum_cents, min_order_amount_cents
            FROM shipping_zones
            ORDER BY position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ShippingZone::try_from).collect()
    }

    async fn insert_location(&self, location: &FulfillmentLocation) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO fulfillment_locations (location_id, name, street, city, state, zip)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&location.location_id)
        .bind(&location.name)
        .bind(&location.street)
        .bind(&location.city)
        .bind(&location.state)
        .bind(&location.zip)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_locations(&self) -> Result<Vec<FulfillmentLocation>, CoreError> {
        let rows = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT location_id, name, street, city, state, zip
            FROM fulfillment_locations
            ORDER BY name, location_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FulfillmentLocation::from).collect())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (subscription_id, status, frequency, fulfillment_type,
                                       target_id, next_order_date, last_order_date, skip_dates,
                                       needs_review, cancelled_at, cancellation_reason, version,
                                       created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&subscription.subscription_id)
        .bind(subscription.status.as_str())
        .bind(subscription.frequency.as_str())
        .bind(subscription.channel.fulfillment_type())
        .bind(subscription.channel.target_id())
        .bind(subscription.next_order_date)
        .bind(subscription.last_order_date)
        .bind(encode_dates(&subscription.skip_dates)?)
        .bind(subscription.needs_review)
        .bind(subscription.cancelled_at)
        .bind(&subscription.cancellation_reason)
        .bind(subscription.version)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, CoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {} FROM subscriptions WHERE subscription_id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Subscription::try_from).transpose()
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $1, next_order_date = $2, last_order_date = $3, skip_dates = $4,
                needs_review = $5, cancelled_at = $6, cancellation_reason = $7,
                version = version + 1, updated_at = NOW()
            WHERE subscription_id = $8 AND version = $9
            "#,
        )
        .bind(subscription.status.as_str())
        .bind(subscription.next_order_date)
        .bind(subscription.last_order_date)
        .bind(encode_dates(&subscription.skip_dates)?)
        .bind(subscription.needs_review)
        .bind(subscription.cancelled_at)
        .bind(&subscription.cancellation_reason)
        .bind(&subscription.subscription_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_subscriptions_due(
        &self,
        on_or_before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Subscription>, CoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r#"
            SELECT {}
            FROM subscriptions
            WHERE status = 'active'
              AND next_order_date IS NOT NULL
              AND next_order_date <= $1
            ORDER BY next_order_date, subscription_id
            LIMIT $2
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(on_or_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
