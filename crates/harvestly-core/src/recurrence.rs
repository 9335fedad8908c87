// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recurrence evaluation: expanding a schedule into candidate dates.
//!
//! [`candidates`] is a lazy, restartable generator over a rule; callers
//! bound it by date, by count, or both, without duplicating iteration
//! logic. [`expand`] drives it for a schedule over an inclusive range,
//! removing blocked dates and handling the one-time case.

use chrono::{Datelike, Days, NaiveDate};

use crate::model::{RecurrenceRule, Schedule, ScheduleKind};

/// Upper bound on months scanned per `next()` call for monthly rules.
///
/// A rule like day 31 every 12 months anchored in a 30-day month never
/// matches; bail out instead of spinning.
const MAX_MONTH_SCAN: u32 = 600;

/// Lazy iterator over the candidate dates of a recurrence rule.
///
/// Candidates are strictly increasing, starting at the first match on or
/// after the anchor date the iterator was created with.
#[derive(Debug, Clone)]
pub struct Candidates {
    cursor: Cursor,
}

#[derive(Debug, Clone)]
enum Cursor {
    /// Daily, weekly, and biweekly rules all step by a fixed day count
    /// once the first match is found.
    Fixed { next: Option<NaiveDate>, step_days: u64 },
    /// Monthly rules walk a (year, month) cursor; months without the
    /// target day yield nothing.
    Monthly {
        year: i32,
        month: u32,
        day_of_month: u32,
        interval_months: u32,
        not_before: NaiveDate,
    },
    Exhausted,
}

impl Iterator for Candidates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        match &mut self.cursor {
            Cursor::Fixed { next, step_days } => {
                let current = (*next)?;
                *next = current.checked_add_days(Days::new(*step_days));
                if next.is_none() {
                    self.cursor = Cursor::Exhausted;
                }
                Some(current)
            }
            Cursor::Monthly {
                year,
                month,
                day_of_month,
                interval_months,
                not_before,
            } => {
                for _ in 0..MAX_MONTH_SCAN {
                    let candidate = NaiveDate::from_ymd_opt(*year, *month, *day_of_month);
                    let months = *month as i64 - 1 + *interval_months as i64;
                    *year += (months / 12) as i32;
                    *month = (months % 12) as u32 + 1;
                    if let Some(date) = candidate
                        && date >= *not_before
                    {
                        return Some(date);
                    }
                }
                self.cursor = Cursor::Exhausted;
                None
            }
            Cursor::Exhausted => None,
        }
    }
}

/// Create a lazy candidate-date generator for `rule`, anchored at `from`.
///
/// The anchor matters for biweekly rules: "every other week" counts whole
/// weeks from `from`, so the first matching weekday on or after `from` is
/// always included.
pub fn candidates(rule: &RecurrenceRule, from: NaiveDate) -> Candidates {
    let cursor = match *rule {
        RecurrenceRule::Daily { interval } => Cursor::Fixed {
            next: Some(from),
            step_days: u64::from(interval.max(1)),
        },
        RecurrenceRule::Weekly {
            day_of_week,
            interval,
        } => Cursor::Fixed {
            next: first_weekday_on_or_after(from, day_of_week.as_weekday()),
            step_days: 7 * u64::from(interval.max(1)),
        },
        RecurrenceRule::Biweekly { day_of_week } => Cursor::Fixed {
            next: first_weekday_on_or_after(from, day_of_week.as_weekday()),
            step_days: 14,
        },
        RecurrenceRule::Monthly {
            day_of_month,
            interval,
        } => Cursor::Monthly {
            year: from.year(),
            month: from.month(),
            day_of_month,
            interval_months: interval.max(1),
            not_before: from,
        },
    };
    Candidates { cursor }
}

fn first_weekday_on_or_after(from: NaiveDate, weekday: chrono::Weekday) -> Option<NaiveDate> {
    let offset = (7 + weekday.num_days_from_monday() - from.weekday().num_days_from_monday()) % 7;
    from.checked_add_days(Days::new(u64::from(offset)))
}

/// Expand a schedule over the inclusive range `[from, to]`.
///
/// Returns an ordered, deduplicated list of dates matching the schedule,
/// with `blocked_dates` removed, truncated at `max` results. The count cap
/// bounds cost for dense rules over long ranges and may truncate before
/// `to` is reached.
pub fn expand(schedule: &Schedule, from: NaiveDate, to: NaiveDate, max: usize) -> Vec<NaiveDate> {
    if from > to || max == 0 {
        return Vec::new();
    }
    match &schedule.kind {
        ScheduleKind::OneTime { available_dates } => {
            let mut dates: Vec<NaiveDate> = available_dates
                .iter()
                .copied()
                .filter(|d| *d >= from && *d <= to)
                .filter(|d| !schedule.blocked_dates.contains(d))
                .collect();
            dates.sort_unstable();
            dates.dedup();
            dates.truncate(max);
            dates
        }
        ScheduleKind::Recurring { recurrence_rule } => candidates(recurrence_rule, from)
            .take_while(|d| *d <= to)
            .filter(|d| !schedule.blocked_dates.contains(d))
            .take(max)
            .collect(),
    }
}
