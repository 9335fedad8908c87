// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Availability: the dates a fulfillment channel can actually be booked.
//!
//! Combines schedule assignments, recurrence expansion, blocked dates and
//! cutoff enforcement into one answer. All dates are interpreted in the
//! configured store timezone.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use chrono_tz::Tz;
use tracing::warn;

use crate::cutoff::{self, Clock};
use crate::error::CoreError;
use crate::model::FulfillmentChannel;
use crate::persistence::Persistence;
use crate::recurrence;

/// Default horizon when the caller does not specify one.
pub const DEFAULT_HORIZON_DAYS: u32 = 90;

/// Default per-schedule result cap.
pub const DEFAULT_MAX_PER_SCHEDULE: usize = 30;

/// Optional bounds for an availability lookup. Unset fields fall back to
/// the service defaults.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityQuery {
    /// First date considered; defaults to tomorrow in the store timezone.
    pub from: Option<NaiveDate>,
    /// Window length in days from `from`, inclusive on both ends.
    pub horizon_days: Option<u32>,
    /// Cap on dates contributed by a single schedule.
    pub max_per_schedule: Option<usize>,
}

/// Computes bookable dates for a fulfillment channel.
pub struct AvailabilityService {
    persistence: Arc<dyn Persistence>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    default_horizon_days: u32,
    default_max_per_schedule: usize,
}

impl AvailabilityService {
    /// Create a service with the standard horizon and per-schedule cap.
    pub fn new(persistence: Arc<dyn Persistence>, clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self {
            persistence,
            clock,
            timezone,
            default_horizon_days: DEFAULT_HORIZON_DAYS,
            default_max_per_schedule: DEFAULT_MAX_PER_SCHEDULE,
        }
    }

    /// Override the default horizon.
    pub fn with_horizon_days(mut self, days: u32) -> Self {
        self.default_horizon_days = days;
        self
    }

    /// Override the default per-schedule cap.
    pub fn with_max_per_schedule(mut self, max: usize) -> Self {
        self.default_max_per_schedule = max;
        self
    }

    /// The current date in the store timezone.
    pub fn today(&self) -> NaiveDate {
        self.clock
            .now_utc()
            .with_timezone(&self.timezone)
            .date_naive()
    }

    /// All bookable dates for `channel` within the query window, sorted
    /// ascending with duplicates across schedules collapsed.
    ///
    /// A channel with no schedule assignments has no availability; that is
    /// an empty list, not an error.
    pub async fn available_dates(
        &self,
        channel: &FulfillmentChannel,
        query: &AvailabilityQuery,
    ) -> Result<Vec<NaiveDate>, CoreError> {
        let now = self.clock.now_utc();
        let from = match query.from {
            Some(from) => from,
            None => self
                .today()
                .checked_add_days(Days::new(1))
                .ok_or_else(|| CoreError::Validation {
                    field: "from".to_string(),
                    message: "date out of range".to_string(),
                })?,
        };
        let horizon = query.horizon_days.unwrap_or(self.default_horizon_days);
        let max_per_schedule = query
            .max_per_schedule
            .unwrap_or(self.default_max_per_schedule);
        let to = from
            .checked_add_days(Days::new(u64::from(horizon)))
            .ok_or_else(|| CoreError::Validation {
                field: "horizon_days".to_string(),
                message: "horizon extends past the supported date range".to_string(),
            })?;

        let assignments = self.persistence.list_assignments_for_channel(channel).await?;
        let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();

        for assignment in &assignments {
            let Some(schedule) = self.persistence.get_schedule(&assignment.schedule_id).await?
            else {
                warn!(
                    assignment_id = %assignment.assignment_id,
                    schedule_id = %assignment.schedule_id,
                    "assignment references a missing schedule, skipping"
                );
                continue;
            };
            if !schedule.is_active {
                continue;
            }
            for date in recurrence::expand(&schedule, from, to, max_per_schedule) {
                if cutoff::is_open(
                    date,
                    schedule.cutoff_time,
                    schedule.cutoff_hours_before,
                    self.timezone,
                    now,
                ) {
                    dates.insert(date);
                }
            }
        }

        Ok(dates.into_iter().collect())
    }

    /// First bookable date on or after `start`, excluding `skip` dates.
    ///
    /// Used by the subscription lifecycle to place the next order date.
    /// Returns `None` when the channel has no open date within the default
    /// horizon.
    pub async fn first_available_on_or_after(
        &self,
        channel: &FulfillmentChannel,
        start: NaiveDate,
        skip: &[NaiveDate],
    ) -> Result<Option<NaiveDate>, CoreError> {
        let query = AvailabilityQuery {
            from: Some(start),
            ..Default::default()
        };
        let dates = self.available_dates(channel, &query).await?;
        Ok(dates.into_iter().find(|d| !skip.contains(d)))
    }
}
