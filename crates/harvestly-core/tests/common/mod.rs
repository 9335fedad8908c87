// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for harvestly-core integration tests.
//!
//! Provides FaultStore, a persistence wrapper that injects storage-level
//! faults the real backends refuse to produce: subscription writes lost to
//! a concurrent writer, and assignments whose schedule no longer exists.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use harvestly_core::error::CoreError;
use harvestly_core::model::{
    DeliveryZone, FulfillmentChannel, FulfillmentLocation, Schedule, ScheduleAssignment,
    ShippingZone, Subscription,
};
use harvestly_core::persistence::Persistence;

/// Persistence wrapper that delegates to a real store but can be told to
/// drop subscription writes (as if another writer won the version race) or
/// report extra assignments pointing at schedules the store never held.
pub struct FaultStore {
    inner: Arc<dyn Persistence>,
    lost_subscription_writes: AtomicUsize,
    orphan_assignments: Mutex<Vec<ScheduleAssignment>>,
}

impl FaultStore {
    pub fn new(inner: Arc<dyn Persistence>) -> Self {
        Self {
            inner,
            lost_subscription_writes: AtomicUsize::new(0),
            orphan_assignments: Mutex::new(Vec::new()),
        }
    }

    /// The next `n` subscription writes report a lost version race.
    pub fn lose_subscription_writes(&self, n: usize) {
        self.lost_subscription_writes.store(n, Ordering::SeqCst);
    }

    /// Report `assignment` alongside the stored ones for its channel.
    pub fn orphan_assignment(&self, assignment: ScheduleAssignment) {
        self.orphan_assignments.lock().unwrap().push(assignment);
    }
}

#[async_trait]
impl Persistence for FaultStore {
    async fn insert_schedule(&self, schedule: &Schedule) -> Result<(), CoreError> {
        self.inner.insert_schedule(schedule).await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<bool, CoreError> {
        self.inner.update_schedule(schedule).await
    }

    async fn delete_schedule(&self, schedule_id: &str) -> Result<bool, CoreError> {
        self.inner.delete_schedule(schedule_id).await
    }

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<Schedule>, CoreError> {
        self.inner.get_schedule(schedule_id).await
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, CoreError> {
        self.inner.list_schedules().await
    }

    async fn set_blocked_date(
        &self,
        schedule_id: &str,
        date: NaiveDate,
        blocked: bool,
    ) -> Result<bool, CoreError> {
        self.inner.set_blocked_date(schedule_id, date, blocked).await
    }

    async fn insert_assignment(&self, assignment: &ScheduleAssignment) -> Result<(), CoreError> {
        self.inner.insert_assignment(assignment).await
    }

    async fn delete_assignment(&self, assignment_id: &str) -> Result<bool, CoreError> {
        self.inner.delete_assignment(assignment_id).await
    }

    async fn list_assignments_for_channel(
        &self,
        channel: &FulfillmentChannel,
    ) -> Result<Vec<ScheduleAssignment>, CoreError> {
        let mut assignments = self.inner.list_assignments_for_channel(channel).await?;
        let orphans = self.orphan_assignments.lock().unwrap();
        assignments.extend(orphans.iter().filter(|a| &a.channel == channel).cloned());
        Ok(assignments)
    }

    async fn insert_delivery_zone(&self, zone: &DeliveryZone) -> Result<(), CoreError> {
        self.inner.insert_delivery_zone(zone).await
    }

    async fn list_delivery_zones(&self) -> Result<Vec<DeliveryZone>, CoreError> {
        self.inner.list_delivery_zones().await
    }

    async fn insert_shipping_zone(&self, zone: &ShippingZone) -> Result<(), CoreError> {
        self.inner.insert_shipping_zone(zone).await
    }

    async fn list_shipping_zones(&self) -> Result<Vec<ShippingZone>, CoreError> {
        self.inner.list_shipping_zones().await
    }

    async fn insert_location(&self, location: &FulfillmentLocation) -> Result<(), CoreError> {
        self.inner.insert_location(location).await
    }

    async fn list_locations(&self) -> Result<Vec<FulfillmentLocation>, CoreError> {
        self.inner.list_locations().await
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<(), CoreError> {
        self.inner.insert_subscription(subscription).await
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, CoreError> {
        self.inner.get_subscription(subscription_id).await
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
        expected_version: i64,
    ) -> Result<bool, CoreError> {
        if self
            .lost_subscription_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }
        self.inner
            .update_subscription(subscription, expected_version)
            .await
    }

    async fn list_subscriptions_due(
        &self,
        on_or_before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Subscription>, CoreError> {
        self.inner.list_subscriptions_due(on_or_before, limit).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        self.inner.health_check_db().await
    }
}
