// ABOUTME: Pure interval arithmetic: overlap tests and free-slot search within a day window
// ABOUTME: Canonicalizes busy intervals and walks preferred windows earliest-first
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Conflict engine. Pure functions over half-open `[start, end)` intervals.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::errors::{AppError, AppResult};

/// A half-open busy interval
pub type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Whether two half-open intervals overlap: `s1 < e2 && s2 < e1`
#[must_use]
pub fn overlaps(a: Interval, b: Interval) -> bool {
    a.0 < b.1 && b.0 < a.1
}

/// Canonicalize busy intervals: clip to `bounds`, drop empties, sort by
/// start, merge overlapping or touching neighbors
#[must_use]
pub fn merge_busy(busy: &[Interval], bounds: Interval) -> Vec<Interval> {
    let mut clipped: Vec<Interval> = busy
        .iter()
        .filter_map(|&(s, e)| {
            let s = s.max(bounds.0);
            let e = e.min(bounds.1);
            (s < e).then_some((s, e))
        })
        .collect();
    clipped.sort_by_key(|&(s, _)| s);

    let mut merged: Vec<Interval> = Vec::with_capacity(clipped.len());
    for (s, e) in clipped {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }
    merged
}

/// Earliest gap of at least `duration` inside `window`, avoiding `busy`
///
/// Returns the gap start, or `None` when the window is full. Earliest start
/// wins by construction.
#[must_use]
pub fn find_free_slot(
    window: Interval,
    duration: Duration,
    busy: &[Interval],
) -> Option<DateTime<Utc>> {
    if duration <= Duration::zero() || window.0 >= window.1 {
        return None;
    }

    let merged = merge_busy(busy, window);
    let mut cursor = window.0;

    for (busy_start, busy_end) in merged {
        if busy_start - cursor >= duration {
            return Some(cursor);
        }
        cursor = cursor.max(busy_end);
    }

    (window.1 - cursor >= duration).then_some(cursor)
}

/// Convert a local `[start_hour, end_hour)` window on `date` to UTC bounds
///
/// An end hour of 24 maps to midnight of the following day.
///
/// # Errors
///
/// Returns `InvalidInput` when the local time does not exist in the given
/// timezone (spring-forward gap) or the hours are malformed.
pub fn window_bounds(date: NaiveDate, hours: [u8; 2], tz: Tz) -> AppResult<Interval> {
    let start = local_instant(date, hours[0], tz)?;
    let end = local_instant(date, hours[1], tz)?;
    if start >= end {
        return Err(AppError::invalid_input(format!(
            "window [{}, {}) is empty on {date}",
            hours[0], hours[1]
        )));
    }
    Ok((start, end))
}

/// A local hour on `date` as a UTC instant; hour 24 is midnight the next day
fn local_instant(date: NaiveDate, hour: u8, tz: Tz) -> AppResult<DateTime<Utc>> {
    let (day, hour) = if hour >= 24 {
        let next = date
            .succ_opt()
            .ok_or_else(|| AppError::invalid_input("date overflow"))?;
        (next, 0)
    } else {
        (date, u32::from(hour))
    };
    let naive = day
        .and_hms_opt(hour, 0, 0)
        .ok_or_else(|| AppError::invalid_input(format!("invalid hour {hour}")))?;
    naive
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            AppError::invalid_input(format!("{naive} does not exist in timezone {tz}"))
        })
}
