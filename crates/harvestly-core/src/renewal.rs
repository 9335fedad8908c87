// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Renewal scheduler for due subscriptions.
//!
//! Periodically scans for active subscriptions whose next order date has
//! arrived, creates an order for each through an [`OrderCreator`], and
//! advances the subscription. One failing subscription never stalls the
//! rest of the batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::availability::AvailabilityService;
use crate::error::CoreError;
use crate::lifecycle::SubscriptionLifecycle;
use crate::model::Subscription;
use crate::persistence::Persistence;

/// Result of asking the order system to create an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    /// A new order was created.
    Created {
        /// Identifier of the new order.
        order_id: String,
    },
    /// An order for this subscription and date already exists. The
    /// subscription still advances; re-running a scan is idempotent.
    AlreadyExists {
        /// Identifier of the existing order.
        order_id: String,
    },
}

/// Creates orders in the downstream order system.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    /// Create an order for the subscription on the given date.
    async fn create_order(
        &self,
        subscription: &Subscription,
        order_date: NaiveDate,
    ) -> anyhow::Result<OrderOutcome>;
}

/// Renewal scheduler configuration.
#[derive(Debug, Clone)]
pub struct RenewalConfig {
    /// How often to scan for due subscriptions
    pub poll_interval: Duration,
    /// Maximum subscriptions to process per scan
    pub batch_size: i64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 50,
        }
    }
}

/// Renewal scheduler that runs as a background task.
pub struct RenewalScheduler {
    persistence: Arc<dyn Persistence>,
    availability: Arc<AvailabilityService>,
    lifecycle: Arc<SubscriptionLifecycle>,
    order_creator: Arc<dyn OrderCreator>,
    config: RenewalConfig,
    shutdown: Arc<Notify>,
}

impl RenewalScheduler {
    /// Create a new renewal scheduler.
    pub fn new(
        persistence: Arc<dyn Persistence>,
        availability: Arc<AvailabilityService>,
        lifecycle: Arc<SubscriptionLifecycle>,
        order_creator: Arc<dyn OrderCreator>,
        config: RenewalConfig,
    ) -> Self {
        Self {
            persistence,
            availability,
            lifecycle,
            order_creator,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Get a handle to signal shutdown.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the renewal scheduler loop.
    pub async fn run(self) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Renewal scheduler started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Renewal scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    if let Err(e) = self.process_due_renewals().await {
                        error!(error = %e, "Failed to process due renewals");
                    }
                }
            }
        }
    }

    /// Scan one batch of due subscriptions and renew each.
    ///
    /// Returns the number of subscriptions successfully renewed. A failure
    /// on one subscription is logged and the scan continues.
    pub async fn process_due_renewals(&self) -> Result<usize, CoreError> {
        let today = self.availability.today();
        let due = self
            .persistence
            .list_subscriptions_due(today, self.config.batch_size)
            .await?;

        if due.is_empty() {
            debug!("No subscriptions due for renewal");
            return Ok(0);
        }

        info!(count = due.len(), "Processing due subscriptions");

        let mut renewed = 0;
        for subscription in due {
            match self.renew_one(&subscription).await {
                Ok(()) => renewed += 1,
                Err(e) => {
                    error!(
                        subscription_id = %subscription.subscription_id,
                        error = %e,
                        "Failed to renew subscription"
                    );
                    // Continue processing other subscriptions
                }
            }
        }

        Ok(renewed)
    }

    /// Create the order for one due subscription and advance it.
    async fn renew_one(&self, subscription: &Subscription) -> Result<(), CoreError> {
        let order_date =
            subscription
                .next_order_date
                .ok_or_else(|| CoreError::OrderCreationFailed {
                    subscription_id: subscription.subscription_id.clone(),
                    details: "due subscription has no order date".to_string(),
                })?;

        let outcome = self
            .order_creator
            .create_order(subscription, order_date)
            .await
            .map_err(|e| CoreError::OrderCreationFailed {
                subscription_id: subscription.subscription_id.clone(),
                details: e.to_string(),
            })?;

        match outcome {
            OrderOutcome::Created { order_id } => {
                info!(
                    subscription_id = %subscription.subscription_id,
                    order_id = %order_id,
                    order_date = %order_date,
                    "Order created"
                );
            }
            OrderOutcome::AlreadyExists { order_id } => {
                info!(
                    subscription_id = %subscription.subscription_id,
                    order_id = %order_id,
                    order_date = %order_date,
                    "Order already existed, advancing anyway"
                );
            }
        }

        self.lifecycle
            .renew(&subscription.subscription_id)
            .await?;
        Ok(())
    }
}

/// Order creator that posts to an external webhook.
///
/// Sends `{subscription_id, order_date}` as JSON. A 409 response means
/// the order already exists for that date.
#[cfg(feature = "server")]
pub struct WebhookOrderCreator {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "server")]
impl WebhookOrderCreator {
    /// Create a webhook order creator posting to `url`.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl OrderCreator for WebhookOrderCreator {
    async fn create_order(
        &self,
        subscription: &Subscription,
        order_date: NaiveDate,
    ) -> anyhow::Result<OrderOutcome> {
        #[derive(serde::Serialize)]
        struct OrderRequest<'a> {
            subscription_id: &'a str,
            order_date: NaiveDate,
        }

        #[derive(serde::Deserialize)]
        struct OrderResponse {
            order_id: String,
        }

        let response = self
            .client
            .post(&self.url)
            .json(&OrderRequest {
                subscription_id: &subscription.subscription_id,
                order_date,
            })
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            let body: OrderResponse = response.json().await?;
            return Ok(OrderOutcome::AlreadyExists {
                order_id: body.order_id,
            });
        }

        let body: OrderResponse = response.error_for_status()?.json().await?;
        Ok(OrderOutcome::Created {
            order_id: body.order_id,
        })
    }
}
