// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use chrono_tz::Tz;

/// Harvestly Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL or SQLite connection URL
    pub database_url: String,
    /// HTTP server address
    pub http_addr: SocketAddr,
    /// Store timezone for cutoff evaluation and "today"
    pub timezone: Tz,
    /// Default availability horizon in days
    pub horizon_days: u32,
    /// Default per-schedule availability cap
    pub max_per_schedule: usize,
    /// How often the renewal scheduler scans for due subscriptions
    pub renewal_poll_interval: Duration,
    /// Maximum subscriptions processed per renewal scan
    pub renewal_batch_size: i64,
    /// Webhook URL for order creation; renewal is disabled when unset
    pub order_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `HARVESTLY_DATABASE_URL`: PostgreSQL or SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `HARVESTLY_HTTP_PORT`: HTTP server port (default: 8080)
    /// - `HARVESTLY_TIMEZONE`: IANA timezone name (default: UTC)
    /// - `HARVESTLY_HORIZON_DAYS`: availability horizon in days (default: 90)
    /// - `HARVESTLY_MAX_DATES_PER_SCHEDULE`: per-schedule cap (default: 30)
    /// - `HARVESTLY_RENEWAL_POLL_SECS`: renewal scan interval (default: 60)
    /// - `HARVESTLY_RENEWAL_BATCH_SIZE`: renewals per scan (default: 50)
    /// - `HARVESTLY_ORDER_WEBHOOK_URL`: order creation endpoint (default: unset)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("HARVESTLY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("HARVESTLY_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("HARVESTLY_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HARVESTLY_HTTP_PORT", "must be a valid port number")
            })?;

        let timezone: Tz = std::env::var("HARVESTLY_TIMEZONE")
            .unwrap_or_else(|_| "UTC".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HARVESTLY_TIMEZONE", "must be an IANA timezone name")
            })?;

        let horizon_days: u32 = std::env::var("HARVESTLY_HORIZON_DAYS")
            .unwrap_or_else(|_| "90".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HARVESTLY_HORIZON_DAYS", "must be a positive integer")
            })?;

        let max_per_schedule: usize = std::env::var("HARVESTLY_MAX_DATES_PER_SCHEDULE")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "HARVESTLY_MAX_DATES_PER_SCHEDULE",
                    "must be a positive integer",
                )
            })?;

        let renewal_poll_secs: u64 = std::env::var("HARVESTLY_RENEWAL_POLL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HARVESTLY_RENEWAL_POLL_SECS", "must be a positive integer")
            })?;

        let renewal_batch_size: i64 = std::env::var("HARVESTLY_RENEWAL_BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("HARVESTLY_RENEWAL_BATCH_SIZE", "must be a positive integer")
            })?;

        let order_webhook_url = std::env::var("HARVESTLY_ORDER_WEBHOOK_URL").ok();

        Ok(Self {
            database_url,
            http_addr: SocketAddr::from(([0, 0, 0, 0], http_port)),
            timezone,
            horizon_days,
            max_per_schedule,
            renewal_poll_interval: Duration::from_secs(renewal_poll_secs),
            renewal_batch_size,
            order_webhook_url,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
