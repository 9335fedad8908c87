// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Harvestly Core - Recurring Fulfillment Scheduling Engine
//!
//! The server is responsible for:
//! - Schedule, zone, and location administration
//! - Availability lookups per fulfillment channel
//! - Subscription lifecycle and background renewal

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use harvestly_core::availability::AvailabilityService;
use harvestly_core::config::Config;
use harvestly_core::cutoff::SystemClock;
use harvestly_core::http::{self, AppState};
use harvestly_core::lifecycle::SubscriptionLifecycle;
use harvestly_core::persistence;
use harvestly_core::renewal::{RenewalConfig, RenewalScheduler, WebhookOrderCreator};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("harvestly_core=info".parse().unwrap()),
        )
        .init();

    info!("Starting Harvestly Core");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        timezone = %config.timezone,
        horizon_days = config.horizon_days,
        "Configuration loaded"
    );

    // Connect to database and run migrations
    info!("Connecting to database...");
    let persistence = persistence::connect(&config.database_url).await?;
    persistence.health_check_db().await?;
    info!("Database connection established");

    // Wire up services
    let clock = Arc::new(SystemClock);
    let availability = Arc::new(
        AvailabilityService::new(persistence.clone(), clock.clone(), config.timezone)
            .with_horizon_days(config.horizon_days)
            .with_max_per_schedule(config.max_per_schedule),
    );
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        persistence.clone(),
        availability.clone(),
        clock,
    ));

    // Start the renewal scheduler when an order webhook is configured
    let mut renewal_shutdown = None;
    if let Some(url) = config.order_webhook_url.clone() {
        let scheduler = RenewalScheduler::new(
            persistence.clone(),
            availability.clone(),
            lifecycle.clone(),
            Arc::new(WebhookOrderCreator::new(url)),
            RenewalConfig {
                poll_interval: config.renewal_poll_interval,
                batch_size: config.renewal_batch_size,
            },
        );
        renewal_shutdown = Some(scheduler.shutdown_handle());
        tokio::spawn(scheduler.run());
    } else {
        info!("HARVESTLY_ORDER_WEBHOOK_URL not set, renewal scheduler disabled");
    }

    // Start the HTTP server
    let app = http::router(AppState {
        persistence,
        availability,
        lifecycle,
    });
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Shutting down...");
    if let Some(shutdown) = renewal_shutdown {
        shutdown.notify_one();
    }
    info!("Shutdown complete");

    Ok(())
}
