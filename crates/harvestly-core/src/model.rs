// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain types for schedules, zones, locations, and subscriptions.
//!
//! Recurrence rules and the recurring/one-time split are tagged enums so
//! that invalid combinations (a weekly rule without a weekday, a recurring
//! schedule without a rule) cannot be constructed at all.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Day of the week for weekly/biweekly recurrence anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    /// Monday.
    Monday,
    /// Tuesday.
    Tuesday,
    /// Wednesday.
    Wednesday,
    /// Thursday.
    Thursday,
    /// Friday.
    Friday,
    /// Saturday.
    Saturday,
    /// Sunday.
    Sunday,
}

impl DayOfWeek {
    /// Convert to the chrono weekday used for date arithmetic.
    pub fn as_weekday(self) -> Weekday {
        match self {
            Self::Monday => Weekday::Mon,
            Self::Tuesday => Weekday::Tue,
            Self::Wednesday => Weekday::Wed,
            Self::Thursday => Weekday::Thu,
            Self::Friday => Weekday::Fri,
            Self::Saturday => Weekday::Sat,
            Self::Sunday => Weekday::Sun,
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// Upper bound on `cutoff_hours_before`: one leap year of lead time.
/// Anything larger is a configuration mistake and would push cutoff
/// arithmetic toward the edge of the representable datetime range.
pub const MAX_CUTOFF_HOURS: i64 = 24 * 366;

/// A recurrence rule, tagged by frequency.
///
/// `interval` multiplies the base period (weekly + interval 2 behaves like
/// biweekly). The biweekly variant carries no interval: when a caller sends
/// both, the frequency tag takes precedence, so the field is simply absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frequency", rename_all = "lowercase")]
pub enum RecurrenceRule {
    /// Every `interval` days.
    Daily {
        /// Period multiplier, at least 1.
        #[serde(default = "default_interval")]
        interval: u32,
    },
    /// Every `interval` weeks on `day_of_week`.
    Weekly {
        /// Weekday the schedule runs on.
        day_of_week: DayOfWeek,
        /// Period multiplier, at least 1.
        #[serde(default = "default_interval")]
        interval: u32,
    },
    /// Every other week on `day_of_week`, anchored to the query start date.
    Biweekly {
        /// Weekday the schedule runs on.
        day_of_week: DayOfWeek,
    },
    /// Every `interval` months on `day_of_month`. Months without that day
    /// produce no match (no clamping to month end).
    Monthly {
        /// Day of the month, 1 through 31.
        day_of_month: u32,
        /// Period multiplier, at least 1.
        #[serde(default = "default_interval")]
        interval: u32,
    },
}

impl RecurrenceRule {
    /// Validate interval and day-of-month bounds.
    pub fn validate(&self) -> Result<(), CoreError> {
        let interval = match *self {
            Self::Daily { interval } => interval,
            Self::Weekly { interval, .. } => interval,
            Self::Biweekly { .. } => 1,
            Self::Monthly {
                day_of_month,
                interval,
            } => {
                if !(1..=31).contains(&day_of_month) {
                    return Err(CoreError::InvalidRecurrenceRule {
                        message: format!("day_of_month must be 1-31, got {}", day_of_month),
                    });
                }
                interval
            }
        };
        if interval < 1 {
            return Err(CoreError::InvalidRecurrenceRule {
                message: "interval must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Whether a schedule recurs or enumerates explicit dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Dates are produced by a recurrence rule.
    Recurring {
        /// The rule to expand.
        recurrence_rule: RecurrenceRule,
    },
    /// Dates are listed explicitly.
    OneTime {
        /// The explicit dates this schedule offers.
        #[serde(default)]
        available_dates: Vec<NaiveDate>,
    },
}

/// A rule producing the calendar dates on which a fulfillment channel may
/// offer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique identifier.
    pub schedule_id: String,
    /// Human-readable name shown to administrators.
    pub name: String,
    /// Recurring rule or explicit date list.
    #[serde(flatten)]
    pub kind: ScheduleKind,
    /// Lead-time window in hours before `cutoff_time` on the target date.
    pub cutoff_hours_before: i64,
    /// Time of day on the target date the cutoff window counts back from.
    pub cutoff_time: NaiveTime,
    /// Dates removed from the schedule regardless of the rule.
    #[serde(default)]
    pub blocked_dates: Vec<NaiveDate>,
    /// Inactive schedules are ignored by availability.
    pub is_active: bool,
}

impl Schedule {
    /// Validate the schedule's rule and cutoff configuration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation {
                field: "name".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if !(0..=MAX_CUTOFF_HOURS).contains(&self.cutoff_hours_before) {
            return Err(CoreError::Validation {
                field: "cutoff_hours_before".to_string(),
                message: format!("must be between 0 and {}", MAX_CUTOFF_HOURS),
            });
        }
        if let ScheduleKind::Recurring { recurrence_rule } = &self.kind {
            recurrence_rule.validate()?;
        }
        Ok(())
    }
}

/// The fulfillment channel a schedule or subscription is bound to.
///
/// Exactly one target id per channel, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fulfillment_type", rename_all = "snake_case")]
pub enum FulfillmentChannel {
    /// Customer pickup at a fulfillment location.
    Pickup {
        /// The fulfillment location.
        location_id: String,
    },
    /// Local delivery within a ZIP-code zone.
    Delivery {
        /// The delivery zone.
        zone_id: String,
    },
    /// Carrier shipping within a state zone.
    Shipping {
        /// The shipping zone.
        zone_id: String,
    },
}

impl FulfillmentChannel {
    /// The wire name of the channel kind (`pickup`, `delivery`, `shipping`).
    pub fn fulfillment_type(&self) -> &'static str {
        match self {
            Self::Pickup { .. } => "pickup",
            Self::Delivery { .. } => "delivery",
            Self::Shipping { .. } => "shipping",
        }
    }

    /// The bound location or zone id.
    pub fn target_id(&self) -> &str {
        match self {
            Self::Pickup { location_id } => location_id,
            Self::Delivery { zone_id } | Self::Shipping { zone_id } => zone_id,
        }
    }

    /// Reassemble a channel from its stored `(fulfillment_type, target_id)`
    /// pair.
    pub fn from_parts(fulfillment_type: &str, target_id: &str) -> Result<Self, CoreError> {
        if target_id.is_empty() {
            return Err(CoreError::Validation {
                field: "location_or_zone_id".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        match fulfillment_type {
            "pickup" => Ok(Self::Pickup {
                location_id: target_id.to_string(),
            }),
            "delivery" => Ok(Self::Delivery {
                zone_id: target_id.to_string(),
            }),
            "shipping" => Ok(Self::Shipping {
                zone_id: target_id.to_string(),
            }),
            other => Err(CoreError::Validation {
                field: "fulfillment_type".to_string(),
                message: format!(
                    "must be one of pickup, delivery, shipping; got '{}'",
                    other
                ),
            }),
        }
    }
}

/// Links one schedule to one fulfillment channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    /// Unique identifier.
    pub assignment_id: String,
    /// The assigned schedule.
    pub schedule_id: String,
    /// The channel the schedule serves.
    #[serde(flatten)]
    pub channel: FulfillmentChannel,
}

/// A group of ZIP codes sharing local-delivery terms.
///
/// Monetary fields are integer cents; this engine stores zone terms for
/// callers but never computes prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryZone {
    /// Unique identifier.
    pub zone_id: String,
    /// Human-readable name.
    pub name: String,
    /// Exact codes or prefixes, matched in configuration order.
    pub zip_codes: Vec<String>,
    /// Flat delivery fee in cents.
    pub delivery_fee_cents: i64,
    /// Order total above which delivery is free, if offered.
    pub free_delivery_minimum_cents: Option<i64>,
    /// Minimum order total for this zone.
    pub min_order_amount_cents: i64,
}

/// A group of states sharing carrier-shipping terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingZone {
    /// Unique identifier.
    pub zone_id: String,
    /// Human-readable name.
    pub name: String,
    /// State names or codes, matched case-insensitively.
    pub states: Vec<String>,
    /// Base shipping rate in cents.
    pub base_rate_cents: i64,
    /// Additional rate per pound in cents.
    pub per_lb_rate_cents: i64,
    /// Order total above which shipping is free, if offered.
    pub free_shipping_minimum_cents: Option<i64>,
    /// Minimum order total for this zone.
    pub min_order_amount_cents: i64,
}

/// A physical pickup location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentLocation {
    /// Unique identifier.
    pub location_id: String,
    /// Human-readable name.
    pub name: String,
    /// Street address.
    #[serde(default)]
    pub street: String,
    /// City.
    #[serde(default)]
    pub city: String,
    /// State.
    #[serde(default)]
    pub state: String,
    /// ZIP code.
    #[serde(default)]
    pub zip: String,
}

/// Subscription lifecycle states. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Renewals are processed.
    Active,
    /// Retained but ignored by the renewal scan.
    Paused,
    /// Terminal; no further transitions permitted.
    Cancelled,
}

impl SubscriptionStatus {
    /// Stable string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Validation {
                field: "status".to_string(),
                message: format!("unknown subscription status '{}'", other),
            }),
        }
    }
}

/// Subscription order cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every week.
    Weekly,
    /// Every other week.
    Biweekly,
    /// Every month.
    Monthly,
}

impl Frequency {
    /// Stable string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Biweekly => "biweekly",
            Self::Monthly => "monthly",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "weekly" => Ok(Self::Weekly),
            "biweekly" => Ok(Self::Biweekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(CoreError::Validation {
                field: "frequency".to_string(),
                message: format!("unknown frequency '{}'", other),
            }),
        }
    }
}

/// A recurring order intent bound to a channel, advancing through computed
/// dates over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier.
    pub subscription_id: String,
    /// Lifecycle state.
    pub status: SubscriptionStatus,
    /// Order cadence.
    pub frequency: Frequency,
    /// The bound fulfillment channel.
    #[serde(flatten)]
    pub channel: FulfillmentChannel,
    /// The next date an order will be created for; `None` when the horizon
    /// yielded nothing and the record is flagged for review.
    pub next_order_date: Option<NaiveDate>,
    /// The date of the most recent renewal order.
    pub last_order_date: Option<NaiveDate>,
    /// Dates the customer skipped; never selected again.
    #[serde(default)]
    pub skip_dates: Vec<NaiveDate>,
    /// Set when availability ran dry within the horizon; cleared once a
    /// date is computed again.
    #[serde(default)]
    pub needs_review: bool,
    /// When the subscription was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Why the subscription was cancelled.
    pub cancellation_reason: Option<String>,
    /// Optimistic-concurrency version, bumped on every committed write.
    pub version: i64,
    /// When the subscription was created.
    pub created_at: DateTime<Utc>,
}
