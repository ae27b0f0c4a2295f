// ABOUTME: Per-day planning decisions: discipline choice, intensity, slot placement
// ABOUTME: Pure pipeline emitting PlanRequests or typed skip reasons
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Planner.
//!
//! One decision per candidate date. The orchestrator feeds each date a
//! [`DayContext`] built from already-fetched calendar and health data,
//! updates the simulated remaining quota after each planned day, and applies
//! the resulting mutations in ascending date order.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use tracing::debug;

use crate::config::{GoalsConfig, TemplateCatalog, TimePolicy};
use crate::errors::AppResult;
use crate::intelligence::conflict::{find_free_slot, window_bounds, Interval};
use crate::intelligence::intensity::select_tier;
use crate::models::{Activity, Discipline, HealthSnapshot, PlanRequest};

/// Why a candidate day was not planned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Date is in the past relative to the user timezone
    PastDate,
    /// A planner-owned event already exists on this date
    AlreadyScheduled,
    /// Every discipline's weekly target is already met
    TargetMet,
    /// No free slot in the preferred (or, under `flexible`, alternate) window
    NoSlot(Discipline),
}

impl SkipReason {
    /// Audit-facing reason string
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PastDate => "past_date",
            Self::AlreadyScheduled => "already_scheduled",
            Self::TargetMet => "target_met",
            Self::NoSlot(_) => "no_slot",
        }
    }
}

/// Outcome of one day's planning decision
#[derive(Debug, Clone)]
pub enum DayOutcome {
    /// A workout should be generated and persisted
    Planned(PlanRequest),
    /// The day is skipped with an audited reason
    Skipped(SkipReason),
}

/// One day's decision with its date
#[derive(Debug, Clone)]
pub struct DayDecision {
    /// The candidate date
    pub date: NaiveDate,
    /// What the planner decided
    pub outcome: DayOutcome,
}

/// Inputs for one day's decision
#[derive(Debug, Clone)]
pub struct DayContext {
    /// Candidate date in the user timezone
    pub date: NaiveDate,
    /// "Today" in the user timezone
    pub today: NaiveDate,
    /// Health snapshot for the candidate date
    pub snapshot: HealthSnapshot,
    /// Busy intervals on the candidate date (every calendar event counts)
    pub busy: Vec<Interval>,
    /// Whether a planner-owned event already exists on this date
    pub has_planned_event: bool,
    /// Remaining weekly quota, including simulated decrements from earlier
    /// dates in this cycle
    pub remaining: HashMap<Discipline, u32>,
    /// Discipline planned or performed on the previous day, if any
    pub previous_discipline: Option<Discipline>,
    /// One-line-per-activity summary of the recent 7 days
    pub recent_activities_summary: String,
}

/// Per-day planner over goals and templates
pub struct Planner<'a> {
    goals: &'a GoalsConfig,
    templates: &'a TemplateCatalog,
}

impl<'a> Planner<'a> {
    /// Create a planner over the given configuration
    #[must_use]
    pub const fn new(goals: &'a GoalsConfig, templates: &'a TemplateCatalog) -> Self {
        Self { goals, templates }
    }

    /// Decide what, if anything, to schedule on one candidate date
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the template for the chosen
    /// discipline is missing or a window cannot be resolved in the timezone.
    pub fn decide_day(&self, ctx: &DayContext, tz: Tz) -> AppResult<DayDecision> {
        if ctx.date < ctx.today {
            return Ok(Self::skipped(ctx.date, SkipReason::PastDate));
        }
        if ctx.has_planned_event {
            return Ok(Self::skipped(ctx.date, SkipReason::AlreadyScheduled));
        }

        let Some(discipline) = self.choose_discipline(&ctx.remaining, ctx.previous_discipline)
        else {
            return Ok(Self::skipped(ctx.date, SkipReason::TargetMet));
        };

        let tier = select_tier(
            ctx.snapshot.effective_tier(),
            discipline,
            ctx.snapshot.training_load_48h,
            self.goals.training_load_ceiling_48h,
        );
        let duration_minutes = self.templates.duration_minutes(discipline, tier)?;
        let duration = Duration::minutes(i64::from(duration_minutes));

        let Some(slot_start) = self.place(ctx, duration, tz)? else {
            debug!(date = %ctx.date, %discipline, "no free slot in any permitted window");
            return Ok(Self::skipped(ctx.date, SkipReason::NoSlot(discipline)));
        };

        Ok(DayDecision {
            date: ctx.date,
            outcome: DayOutcome::Planned(PlanRequest {
                date: ctx.date,
                discipline,
                intensity_tier: tier,
                slot_start,
                duration_minutes,
                recent_activities_summary: ctx.recent_activities_summary.clone(),
                health: ctx.snapshot.clone(),
            }),
        })
    }

    /// Search the preferred window, then the alternate one under `flexible`
    fn place(
        &self,
        ctx: &DayContext,
        duration: Duration,
        tz: Tz,
    ) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
        let preferred = window_bounds(ctx.date, self.goals.preferred_window(), tz)?;
        if let Some(start) = find_free_slot(preferred, duration, &ctx.busy) {
            return Ok(Some(start));
        }

        if self.goals.preferences.preferred_workout_time == TimePolicy::Flexible {
            let alternate = window_bounds(ctx.date, self.goals.alternate_window(), tz)?;
            return Ok(find_free_slot(alternate, duration, &ctx.busy));
        }

        Ok(None)
    }

    /// First discipline in priority order with quota remaining, never
    /// repeating the previous day's discipline unless it is the only one left
    fn choose_discipline(
        &self,
        remaining: &HashMap<Discipline, u32>,
        previous: Option<Discipline>,
    ) -> Option<Discipline> {
        let mut candidates: Vec<Discipline> = self
            .goals
            .priority_order()
            .into_iter()
            .filter(|d| remaining.get(d).copied().unwrap_or(0) > 0)
            .collect();

        if candidates.len() > 1 {
            if let Some(previous) = previous {
                candidates.retain(|d| *d != previous);
            }
        }

        candidates.into_iter().next()
    }

    const fn skipped(date: NaiveDate, reason: SkipReason) -> DayDecision {
        DayDecision {
            date,
            outcome: DayOutcome::Skipped(reason),
        }
    }
}

/// One-line-per-activity summary of recent training for the LM prompt
#[must_use]
pub fn summarize_recent(activities: &[Activity]) -> String {
    if activities.is_empty() {
        return "No recent workouts".to_owned();
    }
    activities
        .iter()
        .rev()
        .take(10)
        .map(|a| {
            let distance = a
                .distance_km
                .map(|km| format!(", {km:.1} km"))
                .unwrap_or_default();
            format!(
                "{} {}: {:.0} min{distance}",
                a.timestamp.format("%Y-%m-%d"),
                a.discipline,
                a.duration_minutes
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntensityTier, RecoveryTier};
    use chrono::{TimeZone, Utc};

    fn goals() -> GoalsConfig {
        GoalsConfig::from_yaml_str(
            r"
weekly_structure:
  run_sessions: 2
  strength_sessions: 3
preferences:
  preferred_workout_time: morning
  morning_hours: [6, 9]
  evening_hours: [17, 21]
  user_timezone: UTC
",
        )
        .unwrap()
    }

    fn snapshot(tier: RecoveryTier) -> HealthSnapshot {
        HealthSnapshot {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            sleep_hours: Some(7.5),
            sleep_quality: Some(80.0),
            stress_level: Some(30.0),
            recovery_score: Some(72.0),
            resting_hr_baseline: Some(52.0),
            stress_baseline: Some(30.0),
            training_load_48h: 0.0,
            recovery_tier: tier,
        }
    }

    fn context(remaining: &[(Discipline, u32)]) -> DayContext {
        DayContext {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            today: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            snapshot: snapshot(RecoveryTier::Good),
            busy: vec![],
            has_planned_event: false,
            remaining: remaining.iter().copied().collect(),
            previous_discipline: None,
            recent_activities_summary: "No recent workouts".into(),
        }
    }

    #[test]
    fn highest_priority_discipline_wins() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let ctx = context(&[(Discipline::Run, 2), (Discipline::Strength, 3)]);

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        match decision.outcome {
            DayOutcome::Planned(req) => {
                assert_eq!(req.discipline, Discipline::Strength);
                assert_eq!(req.intensity_tier, IntensityTier::Normal);
                // Earliest slot in the empty morning window
                assert_eq!(
                    req.slot_start,
                    Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap()
                );
            }
            DayOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn previous_discipline_is_avoided_when_alternatives_exist() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Run, 2), (Discipline::Strength, 2)]);
        ctx.previous_discipline = Some(Discipline::Strength);

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        match decision.outcome {
            DayOutcome::Planned(req) => assert_eq!(req.discipline, Discipline::Run),
            DayOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn previous_discipline_repeats_when_it_is_the_only_option() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Strength, 3)]);
        ctx.previous_discipline = Some(Discipline::Strength);

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        assert!(matches!(
            decision.outcome,
            DayOutcome::Planned(ref req) if req.discipline == Discipline::Strength
        ));
    }

    #[test]
    fn all_targets_met_skips_the_day() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let ctx = context(&[]);

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        assert!(matches!(
            decision.outcome,
            DayOutcome::Skipped(SkipReason::TargetMet)
        ));
    }

    #[test]
    fn past_date_is_skipped() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Run, 1)]);
        ctx.today = NaiveDate::from_ymd_opt(2025, 6, 3).unwrap();

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        assert!(matches!(
            decision.outcome,
            DayOutcome::Skipped(SkipReason::PastDate)
        ));
    }

    #[test]
    fn blocked_morning_without_flexible_policy_yields_no_slot() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Strength, 1)]);
        ctx.busy = vec![(
            Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        )];

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        assert!(matches!(
            decision.outcome,
            DayOutcome::Skipped(SkipReason::NoSlot(Discipline::Strength))
        ));
    }

    #[test]
    fn flexible_policy_falls_back_to_evening() {
        let mut goals = goals();
        goals.preferences.preferred_workout_time = TimePolicy::Flexible;
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Strength, 1)]);
        ctx.busy = vec![(
            Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
        )];

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        match decision.outcome {
            DayOutcome::Planned(req) => {
                assert_eq!(
                    req.slot_start,
                    Utc.with_ymd_and_hms(2025, 6, 2, 17, 0, 0).unwrap()
                );
            }
            DayOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn poor_recovery_selects_reduced_duration() {
        let goals = goals();
        let templates = TemplateCatalog::default();
        let planner = Planner::new(&goals, &templates);
        let mut ctx = context(&[(Discipline::Run, 1)]);
        ctx.snapshot = snapshot(RecoveryTier::Poor);

        let decision = planner.decide_day(&ctx, chrono_tz::UTC).unwrap();
        match decision.outcome {
            DayOutcome::Planned(req) => {
                assert_eq!(req.intensity_tier, IntensityTier::Reduced);
                assert_eq!(req.duration_minutes, 35);
            }
            DayOutcome::Skipped(reason) => panic!("unexpected skip: {reason:?}"),
        }
    }

    #[test]
    fn recent_summary_formats_one_line_per_activity() {
        let activities = vec![Activity {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 7, 0, 0).unwrap(),
            discipline: Discipline::Run,
            duration_minutes: 48.0,
            distance_km: Some(8.2),
            avg_hr: Some(151.0),
            training_load: Some(95.0),
            perceived_exertion: Some(6),
            calories: Some(520.0),
            raw_payload: serde_json::json!({}),
        }];
        let summary = summarize_recent(&activities);
        assert!(summary.contains("2025-06-01 run: 48 min, 8.2 km"));
        assert_eq!(summarize_recent(&[]), "No recent workouts");
    }
}
