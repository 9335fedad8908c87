// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscription lifecycle: create, skip, pause, resume, cancel, renew.
//!
//! Every mutation is a read-validate-write cycle guarded by the stored
//! version. A lost race is retried once with fresh state; a second loss
//! surfaces as a conflict for the caller to retry.

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityService;
use crate::cutoff::Clock;
use crate::error::CoreError;
use crate::model::{Frequency, FulfillmentChannel, Subscription, SubscriptionStatus};
use crate::persistence::Persistence;

/// Attempts per operation: the initial one plus one retry after a lost
/// version race.
const WRITE_ATTEMPTS: u32 = 2;

/// How a mutation wants `next_order_date` recomputed before the write.
enum Recompute {
    /// Leave the date as the mutation set it.
    Keep,
    /// First open date on or after the given date.
    OnOrAfter(NaiveDate),
    /// First open date strictly after the given date.
    After(NaiveDate),
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    /// How often the subscription renews.
    pub frequency: Frequency,
    /// The fulfillment channel orders are placed against.
    pub channel: FulfillmentChannel,
}

/// Drives subscription state transitions.
pub struct SubscriptionLifecycle {
    persistence: Arc<dyn Persistence>,
    availability: Arc<AvailabilityService>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionLifecycle {
    /// Create a lifecycle service.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        availability: Arc<AvailabilityService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            persistence,
            availability,
            clock,
        }
    }

    /// Create a new active subscription.
    ///
    /// The next order date is the first open date for the channel starting
    /// tomorrow. A channel with no availability still gets a subscription,
    /// with no next order date and `needs_review` set.
    pub async fn create(&self, input: NewSubscription) -> Result<Subscription, CoreError> {
        let tomorrow = self
            .availability
            .today()
            .checked_add_days(Days::new(1))
            .ok_or_else(|| CoreError::Validation {
                field: "next_order_date".to_string(),
                message: "date out of range".to_string(),
            })?;
        let next_order_date = self
            .availability
            .first_available_on_or_after(&input.channel, tomorrow, &[])
            .await?;

        let subscription = Subscription {
            subscription_id: Uuid::new_v4().to_string(),
            status: SubscriptionStatus::Active,
            frequency: input.frequency,
            channel: input.channel,
            next_order_date,
            last_order_date: None,
            skip_dates: Vec::new(),
            needs_review: next_order_date.is_none(),
            cancelled_at: None,
            cancellation_reason: None,
            version: 1,
            created_at: self.clock.now_utc(),
        };

        if subscription.needs_review {
            warn!(
                subscription_id = %subscription.subscription_id,
                "created with no available order date, flagged for review"
            );
        }

        self.persistence.insert_subscription(&subscription).await?;
        info!(
            subscription_id = %subscription.subscription_id,
            next_order_date = ?subscription.next_order_date,
            "subscription created"
        );
        Ok(subscription)
    }

    /// Fetch a subscription by id.
    pub async fn get(&self, subscription_id: &str) -> Result<Subscription, CoreError> {
        self.persistence
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| CoreError::SubscriptionNotFound {
                subscription_id: subscription_id.to_string(),
            })
    }

    /// Skip the upcoming order.
    ///
    /// The current next order date moves into `skip_dates` and the next
    /// order date advances to the first open date strictly after it.
    pub async fn skip_next_order(&self, subscription_id: &str) -> Result<Subscription, CoreError> {
        self.mutate(subscription_id, "skip", |sub| {
            if sub.status != SubscriptionStatus::Active {
                return Err(illegal(sub, "skip"));
            }
            let skipped = sub
                .next_order_date
                .ok_or_else(|| CoreError::Validation {
                    field: "next_order_date".to_string(),
                    message: "subscription has no upcoming order to skip".to_string(),
                })?;
            if !sub.skip_dates.contains(&skipped) {
                sub.skip_dates.push(skipped);
                sub.skip_dates.sort_unstable();
            }
            Ok(Recompute::After(skipped))
        })
        .await
    }

    /// Pause an active subscription. The next order date is kept so the
    /// record shows what was scheduled, but renewal ignores paused rows.
    pub async fn pause(&self, subscription_id: &str) -> Result<Subscription, CoreError> {
        self.mutate(subscription_id, "pause", |sub| {
            if sub.status != SubscriptionStatus::Active {
                return Err(illegal(sub, "pause"));
            }
            sub.status = SubscriptionStatus::Paused;
            Ok(Recompute::Keep)
        })
        .await
    }

    /// Resume a paused subscription. The next order date snaps forward to
    /// the first open date from today, since the old one may have passed
    /// while paused.
    pub async fn resume(&self, subscription_id: &str) -> Result<Subscription, CoreError> {
        let today = self.availability.today();
        self.mutate(subscription_id, "resume", move |sub| {
            if sub.status != SubscriptionStatus::Paused {
                return Err(illegal(sub, "resume"));
            }
            sub.status = SubscriptionStatus::Active;
            Ok(Recompute::OnOrAfter(today))
        })
        .await
    }

    /// Cancel a subscription. Terminal: no operation revives a cancelled
    /// subscription.
    pub async fn cancel(
        &self,
        subscription_id: &str,
        reason: Option<String>,
    ) -> Result<Subscription, CoreError> {
        let now = self.clock.now_utc();
        self.mutate(subscription_id, "cancel", move |sub| {
            if sub.status == SubscriptionStatus::Cancelled {
                return Err(illegal(sub, "cancel"));
            }
            sub.status = SubscriptionStatus::Cancelled;
            sub.cancelled_at = Some(now);
            sub.cancellation_reason = reason.clone();
            sub.next_order_date = None;
            Ok(Recompute::Keep)
        })
        .await
    }

    /// Advance a subscription after its order was placed.
    ///
    /// The fulfilled date becomes `last_order_date` and the next order
    /// date moves to the first open date after it, excluding skip dates.
    /// No open date within the horizon leaves the next date unset and
    /// flags the subscription for review rather than erroring.
    pub async fn renew(&self, subscription_id: &str) -> Result<Subscription, CoreError> {
        for attempt in 0..WRITE_ATTEMPTS {
            let mut sub = self.get(subscription_id).await?;
            if sub.status != SubscriptionStatus::Active {
                return Err(illegal(&sub, "renew"));
            }
            let fulfilled = sub
                .next_order_date
                .ok_or_else(|| CoreError::Validation {
                    field: "next_order_date".to_string(),
                    message: "subscription has no order date to renew from".to_string(),
                })?;
            let expected_version = sub.version;

            let search_from =
                fulfilled
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| CoreError::Validation {
                        field: "next_order_date".to_string(),
                        message: "date out of range".to_string(),
                    })?;
            let next = self
                .availability
                .first_available_on_or_after(&sub.channel, search_from, &sub.skip_dates)
                .await?;

            sub.last_order_date = Some(fulfilled);
            sub.next_order_date = next;
            sub.needs_review = next.is_none();
            if next.is_none() {
                warn!(
                    subscription_id = %sub.subscription_id,
                    last_order_date = %fulfilled,
                    "no available date for renewal, flagged for review"
                );
            }

            if self
                .persistence
                .update_subscription(&sub, expected_version)
                .await?
            {
                sub.version = expected_version + 1;
                info!(
                    subscription_id = %sub.subscription_id,
                    next_order_date = ?sub.next_order_date,
                    "subscription renewed"
                );
                return Ok(sub);
            }
            if attempt + 1 < WRITE_ATTEMPTS {
                continue;
            }
        }
        Err(CoreError::ConcurrencyConflict {
            subscription_id: subscription_id.to_string(),
        })
    }

    /// Read-validate-write loop shared by skip, pause, resume and cancel.
    ///
    /// The closure mutates the record and says how to recompute the next
    /// order date before the versioned write.
    async fn mutate<F>(
        &self,
        subscription_id: &str,
        operation: &str,
        mutate: F,
    ) -> Result<Subscription, CoreError>
    where
        F: Fn(&mut Subscription) -> Result<Recompute, CoreError>,
    {
        for attempt in 0..WRITE_ATTEMPTS {
            let mut sub = self.get(subscription_id).await?;
            let expected_version = sub.version;
            let recompute = mutate(&mut sub)?;

            let start = match recompute {
                Recompute::Keep => None,
                Recompute::OnOrAfter(from) => Some(from),
                Recompute::After(from) => Some(from.checked_add_days(Days::new(1)).ok_or_else(
                    || CoreError::Validation {
                        field: "next_order_date".to_string(),
                        message: "date out of range".to_string(),
                    },
                )?),
            };
            if let Some(start) = start {
                let next = self
                    .availability
                    .first_available_on_or_after(&sub.channel, start, &sub.skip_dates)
                    .await?;
                sub.next_order_date = next;
                sub.needs_review = next.is_none();
                if next.is_none() {
                    warn!(
                        subscription_id = %sub.subscription_id,
                        operation,
                        "no available date after operation, flagged for review"
                    );
                }
            }

            if self
                .persistence
                .update_subscription(&sub, expected_version)
                .await?
            {
                sub.version = expected_version + 1;
                info!(subscription_id = %sub.subscription_id, operation, "subscription updated");
                return Ok(sub);
            }
            if attempt + 1 < WRITE_ATTEMPTS {
                continue;
            }
        }
        Err(CoreError::ConcurrencyConflict {
            subscription_id: subscription_id.to_string(),
        })
    }
}

fn illegal(sub: &Subscription, operation: &str) -> CoreError {
    CoreError::IllegalTransition {
        subscription_id: sub.subscription_id.clone(),
        operation: operation.to_string(),
        status: sub.status.as_str().to_string(),
    }
}
