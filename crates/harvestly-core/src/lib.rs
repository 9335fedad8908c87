// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Harvestly Core - Recurring Fulfillment Scheduling Engine
//!
//! This crate answers "on which dates can this channel be fulfilled?" and
//! keeps subscriptions moving through those dates. Schedules produce
//! candidate dates, cutoff windows close them as their lead time passes,
//! and a background scheduler renews subscriptions whose order date has
//! arrived.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       HTTP API (axum)                        │
//! │   schedules / zones / availability / subscriptions           │
//! └──────────────────────────────────────────────────────────────┘
//!            │                     │
//!            ▼                     ▼
//! ┌─────────────────────┐   ┌─────────────────────────────────┐
//! │ AvailabilityService │◄──│    SubscriptionLifecycle        │
//! │ recurrence + cutoff │   │ create/skip/pause/resume/cancel │
//! └─────────────────────┘   └─────────────────────────────────┘
//!            │                     ▲
//!            │                     │ renew
//!            │              ┌──────────────────┐
//!            │              │ RenewalScheduler │──► OrderCreator
//!            │              └──────────────────┘    (webhook)
//!            ▼                     │
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Persistence (PostgreSQL or SQLite)              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Subscription state machine
//!
//! ```text
//!              ┌────────┐  pause   ┌────────┐
//!  create ───► │ active │ ───────► │ paused │
//!              │        │ ◄─────── │        │
//!              └────────┘  resume  └────────┘
//!                  │ cancel            │ cancel
//!                  ▼                   ▼
//!              ┌──────────────────────────┐
//!              │        cancelled         │   (terminal)
//!              └──────────────────────────┘
//! ```
//!
//! Skip and renew are self-transitions on `active`: both move
//! `next_order_date` forward through the channel's available dates.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`model`] | Domain types: schedules, rules, zones, subscriptions |
//! | [`recurrence`] | Lazy candidate-date generation and range expansion |
//! | [`cutoff`] | Lead-time windows and the injectable [`cutoff::Clock`] |
//! | [`zones`] | ZIP and state resolution to configured zones |
//! | [`availability`] | Bookable dates per fulfillment channel |
//! | [`lifecycle`] | Subscription state machine with versioned writes |
//! | [`renewal`] | Background scan that creates orders and advances |
//! | [`persistence`] | Storage trait plus SQLite and PostgreSQL backends |
//! | [`config`] | Environment-variable configuration |

#![deny(missing_docs)]

pub mod availability;
pub mod config;
pub mod cutoff;
pub mod error;
#[cfg(feature = "server")]
pub mod http;
pub mod lifecycle;
pub mod model;
pub mod persistence;
pub mod recurrence;
pub mod renewal;
pub mod zones;

pub use error::{CoreError, Result};
