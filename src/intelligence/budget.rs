// ABOUTME: Weekly budgeter: remaining per-discipline quota against scheduled and completed
// ABOUTME: Monday-start weeks in the user timezone
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Weekly budgeting.
//!
//! For a target week the remaining quota per discipline is
//! `max(0, goal - scheduled - completed)`, where `scheduled` counts
//! planner-owned future events and `completed` counts recorded activities
//! earlier in the week.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::config::WeeklyStructure;
use crate::errors::{AppError, AppResult};
use crate::models::{Activity, CalendarEvent, Discipline};

/// UTC bounds of the Monday-start week containing `date` in the user timezone
///
/// # Errors
///
/// Returns `InvalidInput` when midnight does not exist in the zone (never the
/// case for real IANA zones at week boundaries, but the conversion is
/// fallible).
pub fn week_bounds(date: NaiveDate, tz: Tz) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let days_from_monday = i64::from(date.weekday().num_days_from_monday());
    let monday = date - Duration::days(days_from_monday);
    let next_monday = monday + Duration::days(7);

    let to_utc = |d: NaiveDate| -> AppResult<DateTime<Utc>> {
        d.and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::invalid_input("invalid midnight"))?
            .and_local_timezone(tz)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| AppError::invalid_input(format!("{d} has no midnight in {tz}")))
    };

    Ok((to_utc(monday)?, to_utc(next_monday)?))
}

/// Remaining per-discipline quota for the week containing the planning date
///
/// * `events` — calendar events within the week bounds
/// * `activities` — recorded activities within the week bounds
/// * `now` — scheduled events count only when still in the future; activities
///   count only when they occurred before `now`
#[must_use]
pub fn remaining_quota(
    goals: &WeeklyStructure,
    events: &[CalendarEvent],
    activities: &[Activity],
    now: DateTime<Utc>,
) -> HashMap<Discipline, u32> {
    let mut scheduled: HashMap<Discipline, u32> = HashMap::new();
    for event in events {
        if event.start <= now || !event.is_planner_owned() {
            continue;
        }
        if let Some(discipline) = event.discipline() {
            *scheduled.entry(discipline).or_default() += 1;
        }
    }

    let mut completed: HashMap<Discipline, u32> = HashMap::new();
    for activity in activities {
        if activity.timestamp < now {
            *completed.entry(activity.discipline).or_default() += 1;
        }
    }

    Discipline::PLANNABLE
        .iter()
        .map(|&d| {
            let goal = goals.target_for(d);
            let used = scheduled.get(&d).copied().unwrap_or(0)
                + completed.get(&d).copied().unwrap_or(0);
            (d, goal.saturating_sub(used))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventOrigin;
    use chrono::TimeZone;

    fn goals() -> WeeklyStructure {
        WeeklyStructure {
            swim_sessions: 0,
            bike_sessions: 1,
            run_sessions: 2,
            strength_sessions: 3,
        }
    }

    fn planned_event(discipline: Discipline, start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            external_id: Some(format!("{discipline}-{start}")),
            summary: format!("[AI Workout] {discipline}: Session"),
            description: String::new(),
            start,
            end: start + Duration::hours(1),
            tags: vec![discipline.tag()],
            origin: EventOrigin::Planned,
        }
    }

    fn run_activity(ts: DateTime<Utc>) -> Activity {
        Activity {
            timestamp: ts,
            discipline: Discipline::Run,
            duration_minutes: 45.0,
            distance_km: Some(7.0),
            avg_hr: Some(150.0),
            training_load: Some(80.0),
            perceived_exertion: Some(6),
            calories: Some(450.0),
            raw_payload: serde_json::json!({}),
        }
    }

    fn wednesday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 4, 12, 0, 0).unwrap()
    }

    #[test]
    fn week_bounds_start_monday_local() {
        let tz: Tz = "America/Chicago".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(); // Wednesday
        let (start, end) = week_bounds(date, tz).unwrap();
        // Monday 2025-06-02 00:00 CDT = 05:00 UTC
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 6, 2, 5, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 6, 9, 5, 0, 0).unwrap());
    }

    #[test]
    fn completed_and_scheduled_both_consume_quota() {
        let now = wednesday_noon();
        let events = vec![planned_event(Discipline::Run, now + Duration::days(1))];
        let activities = vec![run_activity(now - Duration::days(1))];

        let remaining = remaining_quota(&goals(), &events, &activities, now);
        assert_eq!(remaining[&Discipline::Run], 0); // 2 - 1 scheduled - 1 done
        assert_eq!(remaining[&Discipline::Strength], 3);
        assert_eq!(remaining[&Discipline::Bike], 1);
        assert_eq!(remaining[&Discipline::Swim], 0);
    }

    #[test]
    fn overshoot_saturates_at_zero() {
        let now = wednesday_noon();
        let activities = vec![
            run_activity(now - Duration::days(2)),
            run_activity(now - Duration::days(1)),
            run_activity(now - Duration::hours(3)),
        ];
        let remaining = remaining_quota(&goals(), &[], &activities, now);
        assert_eq!(remaining[&Discipline::Run], 0);
    }

    #[test]
    fn past_planned_events_do_not_count_as_scheduled() {
        let now = wednesday_noon();
        let events = vec![planned_event(Discipline::Run, now - Duration::days(1))];
        let remaining = remaining_quota(&goals(), &events, &[], now);
        assert_eq!(remaining[&Discipline::Run], 2);
    }

    #[test]
    fn external_events_never_consume_quota() {
        let now = wednesday_noon();
        let mut event = planned_event(Discipline::Run, now + Duration::days(1));
        event.summary = "Morning run club".into();
        event.tags.clear();
        event.origin = EventOrigin::External;
        let remaining = remaining_quota(&goals(), &[event], &[], now);
        assert_eq!(remaining[&Discipline::Run], 2);
    }

}
