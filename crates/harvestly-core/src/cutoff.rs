// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cutoff-window enforcement with an injectable time source.
//!
//! A candidate date stays selectable until `cutoff_hours_before` hours
//! before its `cutoff_time` in the configured store timezone. The clock is
//! a trait so tests can freeze "now" deterministically.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// A source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant in UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The instant after which `date` can no longer be selected.
///
/// Computed as `date` at `cutoff_time` in `tz`, minus `cutoff_hours_before`
/// hours. Ambiguous local times (DST fall-back) resolve to the earlier
/// instant; nonexistent local times (DST spring-forward gap) are treated
/// as UTC wall time. Returns `None` when the lead time pushes the instant
/// outside chrono's representable range; such dates are never open.
pub fn cutoff_instant(
    date: NaiveDate,
    cutoff_time: NaiveTime,
    cutoff_hours_before: i64,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let wall = date.and_time(cutoff_time);
    let local = match tz.from_local_datetime(&wall) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz.from_utc_datetime(&wall),
    };
    let lead = Duration::try_hours(cutoff_hours_before)?;
    local
        .checked_sub_signed(lead)
        .map(|cutoff| cutoff.with_timezone(&Utc))
}

/// Whether `date` is still open at instant `now`.
///
/// A date passes iff its cutoff instant is strictly after `now`. At the
/// exact boundary instant the date is already closed, as is any date
/// whose cutoff instant cannot be represented.
pub fn is_open(
    date: NaiveDate,
    cutoff_time: NaiveTime,
    cutoff_hours_before: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> bool {
    match cutoff_instant(date, cutoff_time, cutoff_hours_before, tz) {
        Some(cutoff) => cutoff > now,
        None => false,
    }
}
