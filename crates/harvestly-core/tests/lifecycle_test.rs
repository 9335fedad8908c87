// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the subscription lifecycle and renewal scan.
//!
//! These tests verify:
//! 1. State transitions: create, skip, pause, resume, cancel
//! 2. Cancelled is terminal
//! 3. Renewal advances through available dates, flags exhaustion for
//!    review, and isolates per-subscription failures
//! 4. A lost version race retries once against fresh state, then
//!    surfaces a concurrency conflict
//!
//! Run with:
//! ```bash
//! cargo test -p harvestly-core --test lifecycle_test
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use harvestly_core::availability::AvailabilityService;
use harvestly_core::cutoff::FixedClock;
use harvestly_core::error::CoreError;
use harvestly_core::lifecycle::{NewSubscription, SubscriptionLifecycle};
use harvestly_core::model::{
    DayOfWeek, Frequency, FulfillmentChannel, RecurrenceRule, Schedule, ScheduleAssignment,
    ScheduleKind, Subscription, SubscriptionStatus,
};
use harvestly_core::persistence::{Persistence, SqlitePersistence};
use harvestly_core::renewal::{OrderCreator, OrderOutcome, RenewalConfig, RenewalScheduler};

mod common;

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn instant(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

fn pickup(location_id: &str) -> FulfillmentChannel {
    FulfillmentChannel::Pickup {
        location_id: location_id.to_string(),
    }
}

/// Lifecycle and availability services sharing one frozen clock.
fn services(
    persistence: Arc<dyn Persistence>,
    now: &str,
) -> (Arc<AvailabilityService>, Arc<SubscriptionLifecycle>) {
    let clock = Arc::new(FixedClock(instant(now)));
    let availability = Arc::new(AvailabilityService::new(
        persistence.clone(),
        clock.clone(),
        chrono_tz::UTC,
    ));
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        persistence,
        availability.clone(),
        clock,
    ));
    (availability, lifecycle)
}

async fn seed_schedule(
    persistence: &Arc<dyn Persistence>,
    channel: &FulfillmentChannel,
    kind: ScheduleKind,
) {
    let schedule = Schedule {
        schedule_id: "s-1".to_string(),
        name: "test schedule".to_string(),
        kind,
        cutoff_hours_before: 0,
        cutoff_time: "23:00:00".parse().unwrap(),
        blocked_dates: Vec::new(),
        is_active: true,
    };
    persistence.insert_schedule(&schedule).await.unwrap();
    persistence
        .insert_assignment(&ScheduleAssignment {
            assignment_id: "a-1".to_string(),
            schedule_id: "s-1".to_string(),
            channel: channel.clone(),
        })
        .await
        .unwrap();
}

fn weekly_friday() -> ScheduleKind {
    ScheduleKind::Recurring {
        recurrence_rule: RecurrenceRule::Weekly {
            day_of_week: DayOfWeek::Friday,
            interval: 1,
        },
    }
}

fn monthly_15th() -> ScheduleKind {
    ScheduleKind::Recurring {
        recurrence_rule: RecurrenceRule::Monthly {
            day_of_month: 15,
            interval: 1,
        },
    }
}

/// Order creator that succeeds with sequential ids, optionally failing or
/// reporting an existing order for chosen subscriptions.
struct FakeOrderCreator {
    counter: AtomicUsize,
    fail_for: Option<String>,
    already_exists: bool,
}

impl FakeOrderCreator {
    fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail_for: None,
            already_exists: false,
        }
    }

    fn failing_for(subscription_id: &str) -> Self {
        Self {
            fail_for: Some(subscription_id.to_string()),
            ..Self::new()
        }
    }

    fn always_existing() -> Self {
        Self {
            already_exists: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl OrderCreator for FakeOrderCreator {
    async fn create_order(
        &self,
        subscription: &Subscription,
        _order_date: NaiveDate,
    ) -> anyhow::Result<OrderOutcome> {
        if self.fail_for.as_deref() == Some(&subscription.subscription_id) {
            anyhow::bail!("order system unavailable");
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("order-{}", n);
        if self.already_exists {
            Ok(OrderOutcome::AlreadyExists { order_id })
        } else {
            Ok(OrderOutcome::Created { order_id })
        }
    }
}

fn scheduler(
    persistence: Arc<dyn Persistence>,
    availability: Arc<AvailabilityService>,
    lifecycle: Arc<SubscriptionLifecycle>,
    creator: FakeOrderCreator,
) -> RenewalScheduler {
    RenewalScheduler::new(
        persistence,
        availability,
        lifecycle,
        Arc::new(creator),
        RenewalConfig::default(),
    )
}

/// New subscriptions land on the first open date starting tomorrow.
#[tokio::test]
async fn test_create_picks_first_available_date() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;
    let (_, lifecycle) = services(persistence, "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.next_order_date, Some(date("2024-06-07")));
    assert!(!sub.needs_review);
    assert_eq!(sub.version, 1);
}

/// A channel with no availability still yields a subscription, flagged
/// for review with no next date.
#[tokio::test]
async fn test_create_with_no_availability_flags_review() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let (_, lifecycle) = services(persistence, "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel: pickup("unassigned"),
        })
        .await
        .unwrap();

    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.next_order_date.is_none());
    assert!(sub.needs_review);
}

/// Skipping records the skipped date and advances past it, never
/// selecting it again.
#[tokio::test]
async fn test_skip_advances_past_skipped_date() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, monthly_15th()).await;
    let (_, lifecycle) = services(persistence, "2024-03-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Monthly,
            channel,
        })
        .await
        .unwrap();
    assert_eq!(sub.next_order_date, Some(date("2024-03-15")));

    let sub = lifecycle.skip_next_order(&sub.subscription_id).await.unwrap();

    assert_eq!(sub.skip_dates, vec![date("2024-03-15")]);
    assert_eq!(sub.next_order_date, Some(date("2024-04-15")));
    assert_eq!(sub.version, 2);
}

/// Pause keeps the record; resume reactivates and recomputes the next
/// date from today.
#[tokio::test]
async fn test_pause_and_resume() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;
    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    let paused = lifecycle.pause(&sub.subscription_id).await.unwrap();
    assert_eq!(paused.status, SubscriptionStatus::Paused);

    // pausing twice is illegal
    let err = lifecycle.pause(&sub.subscription_id).await.unwrap_err();
    assert!(matches!(err, CoreError::IllegalTransition { .. }));

    // weeks later the old next date (06-07) has passed
    let (_, lifecycle) = services(persistence, "2024-06-10T10:00:00Z");
    let resumed = lifecycle.resume(&sub.subscription_id).await.unwrap();

    assert_eq!(resumed.status, SubscriptionStatus::Active);
    assert_eq!(resumed.next_order_date, Some(date("2024-06-14")));
}

/// Cancelled subscriptions reject every further transition.
#[tokio::test]
async fn test_cancel_is_terminal() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;
    let (_, lifecycle) = services(persistence, "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    let cancelled = lifecycle
        .cancel(&sub.subscription_id, Some("moving away".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, SubscriptionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("moving away"));
    assert!(cancelled.next_order_date.is_none());

    for result in [
        lifecycle.skip_next_order(&sub.subscription_id).await,
        lifecycle.pause(&sub.subscription_id).await,
        lifecycle.resume(&sub.subscription_id).await,
        lifecycle.cancel(&sub.subscription_id, None).await,
        lifecycle.renew(&sub.subscription_id).await,
    ] {
        assert!(matches!(
            result.unwrap_err(),
            CoreError::IllegalTransition { .. }
        ));
    }
}

/// A stale-version write is rejected by the store.
#[tokio::test]
async fn test_stale_version_write_is_rejected() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;
    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    // a committed write bumps the version
    let paused = lifecycle.pause(&sub.subscription_id).await.unwrap();
    assert_eq!(paused.version, 2);

    // writing against the old version fails without touching the row
    let applied = persistence
        .update_subscription(&sub, sub.version - 1)
        .await
        .unwrap();
    assert!(!applied);

    let stored = persistence
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Paused);
    assert_eq!(stored.version, 2);
}

/// A single lost version race is retried transparently against fresh
/// state and the operation still commits.
#[tokio::test]
async fn test_lost_race_is_retried_once() {
    let inner: Arc<dyn Persistence> = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&inner, &channel, weekly_friday()).await;
    let store = Arc::new(common::FaultStore::new(inner));
    let (_, lifecycle) = services(store.clone(), "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    store.lose_subscription_writes(1);
    let paused = lifecycle.pause(&sub.subscription_id).await.unwrap();

    assert_eq!(paused.status, SubscriptionStatus::Paused);
    assert_eq!(paused.version, 2);
}

/// Losing the race on the retry as well surfaces a conflict; the record
/// is untouched and a later attempt goes through.
#[tokio::test]
async fn test_repeated_lost_races_surface_conflict() {
    let inner: Arc<dyn Persistence> = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&inner, &channel, weekly_friday()).await;
    let store = Arc::new(common::FaultStore::new(inner));
    let (_, lifecycle) = services(store.clone(), "2024-06-01T10:00:00Z");

    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    store.lose_subscription_writes(2);
    let err = lifecycle.pause(&sub.subscription_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));

    let stored = store
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.version, 1);

    let paused = lifecycle.pause(&sub.subscription_id).await.unwrap();
    assert_eq!(paused.status, SubscriptionStatus::Paused);
}

/// Renewal's own write loop surfaces a conflict the same way.
#[tokio::test]
async fn test_renew_surfaces_conflict_after_retry() {
    let inner: Arc<dyn Persistence> = Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&inner, &channel, weekly_friday()).await;
    let store = Arc::new(common::FaultStore::new(inner));

    let (_, lifecycle) = services(store.clone(), "2024-06-01T10:00:00Z");
    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    let (_, lifecycle) = services(store.clone(), "2024-06-07T08:00:00Z");
    store.lose_subscription_writes(2);
    let err = lifecycle.renew(&sub.subscription_id).await.unwrap_err();
    assert!(matches!(err, CoreError::ConcurrencyConflict { .. }));

    // nothing advanced
    let stored = store
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.next_order_date, Some(date("2024-06-07")));
    assert!(stored.last_order_date.is_none());
}

/// The renewal scan creates an order and advances the subscription.
#[tokio::test]
async fn test_renewal_advances_due_subscription() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;

    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");
    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();
    assert_eq!(sub.next_order_date, Some(date("2024-06-07")));

    // the order date arrives
    let (availability, lifecycle) = services(persistence.clone(), "2024-06-07T08:00:00Z");
    let scheduler = scheduler(
        persistence.clone(),
        availability,
        lifecycle,
        FakeOrderCreator::new(),
    );

    let renewed = scheduler.process_due_renewals().await.unwrap();
    assert_eq!(renewed, 1);

    let stored = persistence
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.last_order_date, Some(date("2024-06-07")));
    assert_eq!(stored.next_order_date, Some(date("2024-06-14")));
    assert!(!stored.needs_review);
}

/// An existing order for the date still advances the subscription, so
/// re-running a scan after a crash is idempotent.
#[tokio::test]
async fn test_renewal_existing_order_still_advances() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;

    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");
    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    let (availability, lifecycle) = services(persistence.clone(), "2024-06-07T08:00:00Z");
    let scheduler = scheduler(
        persistence.clone(),
        availability,
        lifecycle,
        FakeOrderCreator::always_existing(),
    );

    assert_eq!(scheduler.process_due_renewals().await.unwrap(), 1);

    let stored = persistence
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.next_order_date, Some(date("2024-06-14")));
}

/// Renewal with no further availability nulls the next date and flags the
/// subscription for review instead of erroring.
#[tokio::test]
async fn test_renewal_exhaustion_flags_review() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(
        &persistence,
        &channel,
        ScheduleKind::OneTime {
            available_dates: vec![date("2024-06-07")],
        },
    )
    .await;

    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");
    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();
    assert_eq!(sub.next_order_date, Some(date("2024-06-07")));

    let (availability, lifecycle) = services(persistence.clone(), "2024-06-07T08:00:00Z");
    let scheduler = scheduler(
        persistence.clone(),
        availability,
        lifecycle,
        FakeOrderCreator::new(),
    );

    assert_eq!(scheduler.process_due_renewals().await.unwrap(), 1);

    let stored = persistence
        .get_subscription(&sub.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Active);
    assert_eq!(stored.last_order_date, Some(date("2024-06-07")));
    assert!(stored.next_order_date.is_none());
    assert!(stored.needs_review);
}

/// One failing subscription never stalls the rest of the batch.
#[tokio::test]
async fn test_renewal_failure_does_not_stall_batch() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;

    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");
    let first = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel: channel.clone(),
        })
        .await
        .unwrap();
    let second = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();

    let (availability, lifecycle) = services(persistence.clone(), "2024-06-07T08:00:00Z");
    let scheduler = scheduler(
        persistence.clone(),
        availability,
        lifecycle,
        FakeOrderCreator::failing_for(&first.subscription_id),
    );

    // only the healthy subscription renews
    assert_eq!(scheduler.process_due_renewals().await.unwrap(), 1);

    let failed = persistence
        .get_subscription(&first.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.next_order_date, Some(date("2024-06-07")));
    assert!(failed.last_order_date.is_none());

    let ok = persistence
        .get_subscription(&second.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ok.next_order_date, Some(date("2024-06-14")));
    assert_eq!(ok.last_order_date, Some(date("2024-06-07")));
}

/// Paused subscriptions are ignored by the due scan even when their next
/// date has passed.
#[tokio::test]
async fn test_paused_subscription_not_scanned() {
    let persistence: Arc<dyn Persistence> =
        Arc::new(SqlitePersistence::in_memory().await.unwrap());
    let channel = pickup("loc-1");
    seed_schedule(&persistence, &channel, weekly_friday()).await;

    let (_, lifecycle) = services(persistence.clone(), "2024-06-01T10:00:00Z");
    let sub = lifecycle
        .create(NewSubscription {
            frequency: Frequency::Weekly,
            channel,
        })
        .await
        .unwrap();
    lifecycle.pause(&sub.subscription_id).await.unwrap();

    let (availability, lifecycle) = services(persistence.clone(), "2024-06-07T08:00:00Z");
    let scheduler = scheduler(
        persistence,
        availability,
        lifecycle,
        FakeOrderCreator::new(),
    );

    assert_eq!(scheduler.process_due_renewals().await.unwrap(), 0);
}
