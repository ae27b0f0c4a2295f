// ABOUTME: Plan-versus-actual reconciliation and future-event conflict resolution
// ABOUTME: Marks completed/missed workouts, reschedules or cancels conflicted ones
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Reconciler.
//!
//! Closes the loop between planned and observed activity. Past planner-owned
//! events are matched against recorded activities and marked in the summary
//! prefix only (the description gains appended observed stats, but round-trip
//! parsing keys on the summary). Future planner-owned events that a
//! non-workout event now overlaps are rescheduled when a free slot exists and
//! cancelled otherwise; events whose discipline target was removed are
//! purged. Protected-keyword events are never touched.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, info};

use crate::config::{GoalsConfig, TimePolicy};
use crate::constants::planning::{DONE_SUMMARY_PREFIX, MISSED_SUMMARY_PREFIX};
use crate::constants::reconcile::{MATCH_AFTER_MINUTES, MATCH_BEFORE_MINUTES};
use crate::errors::AppResult;
use crate::intelligence::conflict::{find_free_slot, overlaps, window_bounds};
use crate::models::{ActionType, Activity, AuditAction, CalendarEvent};
use crate::orchestrator::{CycleToken, MutationBudget};
use crate::providers::{AuditStore, CalendarView, HealthStore};

/// Agent name recorded on reconciler audit entries
const AGENT: &str = "reconciler";

/// Counters for the cycle summary
#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileStats {
    /// Past events matched to an activity
    pub completed: u32,
    /// Past events with no matching activity
    pub missed: u32,
    /// Future events moved to a new slot
    pub rescheduled: u32,
    /// Future events deleted
    pub cancelled: u32,
}

/// Reconciler over one cycle's collaborators
pub struct Reconciler<'a> {
    /// Calendar write-back path
    pub view: &'a CalendarView,
    /// Activity source
    pub health: &'a dyn HealthStore,
    /// Audit sink
    pub audit: &'a dyn AuditStore,
    /// Goals (targets, windows, protected keywords)
    pub goals: &'a GoalsConfig,
    /// Cycle reference instant
    pub now: DateTime<Utc>,
    /// User timezone
    pub tz: Tz,
    /// Whether calendar writes are suppressed (dry run)
    pub dry_run: bool,
}

impl Reconciler<'_> {
    /// Run reconciliation over a trailing window of `window_days`
    ///
    /// # Errors
    ///
    /// Surfaces calendar/store failures and deadline expiry; per-event
    /// transient failures have already been retried by the calendar view.
    pub async fn run(
        &self,
        window_days: u32,
        budget: &mut MutationBudget,
        token: &CycleToken,
    ) -> AppResult<ReconcileStats> {
        let mut stats = ReconcileStats::default();

        let window_start = self.now - Duration::days(i64::from(window_days));
        let window_end = self.now + Duration::days(i64::from(self.goals.horizon_days) + 1);
        let events = self.view.list_range(window_start, window_end).await?;

        let activities = self
            .health
            .activities_in(window_start - Duration::hours(2), self.now)
            .await?;

        // Past events first, ascending; then future conflict handling
        for event in events.iter().filter(|e| e.end <= self.now) {
            token.check()?;
            self.reconcile_past_event(event, &activities, budget, &mut stats)
                .await?;
        }

        for event in events.iter().filter(|e| e.start > self.now) {
            token.check()?;
            self.reconcile_future_event(event, &events, budget, &mut stats)
                .await?;
        }

        info!(
            completed = stats.completed,
            missed = stats.missed,
            rescheduled = stats.rescheduled,
            cancelled = stats.cancelled,
            "reconciliation finished"
        );
        Ok(stats)
    }

    async fn reconcile_past_event(
        &self,
        event: &CalendarEvent,
        activities: &[Activity],
        budget: &mut MutationBudget,
        stats: &mut ReconcileStats,
    ) -> AppResult<()> {
        if !event.is_planner_owned() || self.is_protected(event) {
            return Ok(());
        }
        if event.summary.starts_with(DONE_SUMMARY_PREFIX)
            || event.summary.starts_with(MISSED_SUMMARY_PREFIX)
        {
            debug!(summary = %event.summary, "already reconciled");
            return Ok(());
        }
        let Some(discipline) = event.discipline() else {
            return Ok(());
        };

        let match_start = event.start - Duration::minutes(MATCH_BEFORE_MINUTES);
        let match_end = event.end + Duration::minutes(MATCH_AFTER_MINUTES);
        let candidates: Vec<&Activity> = activities
            .iter()
            .filter(|a| a.discipline == discipline)
            .filter(|a| a.timestamp >= match_start && a.timestamp <= match_end)
            .collect();

        match candidates.as_slice() {
            [] => {
                let updated = Self::with_summary_prefix(event, MISSED_SUMMARY_PREFIX);
                let action = AuditAction::new(
                    AGENT,
                    ActionType::Missed,
                    self.now,
                    format!("no {discipline} activity recorded near the planned slot"),
                )
                .with_before(json!({"summary": event.summary}))
                .with_after(json!({"summary": updated.summary}))
                .with_sources(&["calendar", "activities"]);
                self.apply_update(event, &updated, action, budget).await?;
                stats.missed += 1;
            }
            [only] => {
                self.mark_completed(event, only, false, budget).await?;
                stats.completed += 1;
            }
            multiple => {
                let best = multiple
                    .iter()
                    .max_by_key(|a| Self::overlap_seconds(event, a))
                    .copied()
                    .unwrap_or(multiple[0]);
                self.mark_completed(event, best, true, budget).await?;
                stats.completed += 1;
            }
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        event: &CalendarEvent,
        activity: &Activity,
        multi_candidate: bool,
        budget: &mut MutationBudget,
    ) -> AppResult<()> {
        let mut updated = Self::with_summary_prefix(event, DONE_SUMMARY_PREFIX);
        updated.description = format!(
            "{}\n\n---\nObserved: {:.0} min{}{}",
            event.description,
            activity.duration_minutes,
            activity
                .distance_km
                .map(|km| format!(", {km:.1} km"))
                .unwrap_or_default(),
            activity
                .avg_hr
                .map(|hr| format!(", avg HR {hr:.0}"))
                .unwrap_or_default(),
        );

        let action = AuditAction::new(
            AGENT,
            ActionType::MarkCompleted,
            self.now,
            format!(
                "matched {} activity at {}",
                activity.discipline, activity.timestamp
            ),
        )
        .with_before(json!({"summary": event.summary}))
        .with_after(json!({
            "summary": updated.summary,
            "multi_candidate": multi_candidate,
        }))
        .with_sources(&["calendar", "activities"]);

        self.apply_update(event, &updated, action, budget).await
    }

    async fn reconcile_future_event(
        &self,
        event: &CalendarEvent,
        all_events: &[CalendarEvent],
        budget: &mut MutationBudget,
        stats: &mut ReconcileStats,
    ) -> AppResult<()> {
        if !event.is_planner_owned() || self.is_protected(event) {
            return Ok(());
        }
        let Some(discipline) = event.discipline() else {
            return Ok(());
        };
        let Some(id) = event.external_id.as_deref() else {
            return Ok(());
        };

        // Config-change reconciliation: the discipline is no longer targeted
        if self.goals.weekly_structure.target_for(discipline) == 0 {
            let action = AuditAction::new(
                AGENT,
                ActionType::Cancel,
                self.now,
                "target_removed",
            )
            .with_before(json!({"summary": event.summary, "external_id": id}))
            .with_sources(&["calendar", "goals"]);
            self.apply_delete(id, action, budget).await?;
            stats.cancelled += 1;
            return Ok(());
        }

        // Conflict with a non-workout event
        let conflicting = all_events.iter().find(|other| {
            !other.is_planner_owned()
                && other.external_id != event.external_id
                && overlaps((event.start, event.end), (other.start, other.end))
        });
        let Some(conflict) = conflicting else {
            return Ok(());
        };

        debug!(
            workout = %event.summary,
            conflict = %conflict.summary,
            "future workout conflicts with a calendar event"
        );

        match self.find_new_slot(event, all_events)? {
            Some(new_start) => {
                let duration = event.end - event.start;
                let mut moved = event.clone();
                moved.start = new_start;
                moved.end = new_start + duration;

                let action = AuditAction::new(
                    AGENT,
                    ActionType::Reschedule,
                    self.now,
                    format!("moved off conflict with '{}'", conflict.summary),
                )
                .with_before(json!({"start": event.start, "end": event.end}))
                .with_after(json!({"start": moved.start, "end": moved.end}))
                .with_sources(&["calendar"]);
                self.apply_update(event, &moved, action, budget).await?;
                stats.rescheduled += 1;
            }
            None => {
                let action = AuditAction::new(
                    AGENT,
                    ActionType::Cancel,
                    self.now,
                    format!(
                        "no free slot after conflict with '{}'",
                        conflict.summary
                    ),
                )
                .with_before(json!({"summary": event.summary, "external_id": id}))
                .with_sources(&["calendar"]);
                self.apply_delete(id, action, budget).await?;
                stats.cancelled += 1;
            }
        }
        Ok(())
    }

    /// Free slot on the event's own date, preferred window first
    fn find_new_slot(
        &self,
        event: &CalendarEvent,
        all_events: &[CalendarEvent],
    ) -> AppResult<Option<DateTime<Utc>>> {
        let date = event.start.with_timezone(&self.tz).date_naive();
        let duration = event.end - event.start;
        let busy: Vec<(DateTime<Utc>, DateTime<Utc>)> = all_events
            .iter()
            .filter(|other| other.external_id != event.external_id)
            .map(|other| (other.start, other.end))
            .collect();

        let preferred = window_bounds(date, self.goals.preferred_window(), self.tz)?;
        if let Some(start) = find_free_slot(preferred, duration, &busy) {
            // The earliest slot can be in the past when reconciling today's
            // window; only accept future starts with the minimum notice
            if start >= self.now + Duration::hours(self.goals.safety.min_notice_hours) {
                return Ok(Some(start));
            }
        }

        if self.goals.preferences.preferred_workout_time == TimePolicy::Flexible {
            let alternate = window_bounds(date, self.goals.alternate_window(), self.tz)?;
            if let Some(start) = find_free_slot(alternate, duration, &busy) {
                if start >= self.now + Duration::hours(self.goals.safety.min_notice_hours) {
                    return Ok(Some(start));
                }
            }
        }

        Ok(None)
    }

    async fn apply_update(
        &self,
        event: &CalendarEvent,
        updated: &CalendarEvent,
        mut action: AuditAction,
        budget: &mut MutationBudget,
    ) -> AppResult<()> {
        let Some(id) = event.external_id.as_deref() else {
            return Ok(());
        };
        if budget.try_take() {
            self.view.update(id, updated).await?;
            action.executed = !self.dry_run;
        }
        self.audit.append(&action).await
    }

    async fn apply_delete(
        &self,
        id: &str,
        mut action: AuditAction,
        budget: &mut MutationBudget,
    ) -> AppResult<()> {
        if budget.try_take() {
            self.view.delete(id).await?;
            action.executed = !self.dry_run;
        }
        self.audit.append(&action).await
    }

    fn is_protected(&self, event: &CalendarEvent) -> bool {
        event.matches_keywords(&self.goals.protected_keywords)
    }

    fn with_summary_prefix(event: &CalendarEvent, prefix: &str) -> CalendarEvent {
        let mut updated = event.clone();
        updated.summary = format!("{prefix} {}", event.summary);
        updated
    }

    fn overlap_seconds(event: &CalendarEvent, activity: &Activity) -> i64 {
        let start = event.start.max(activity.timestamp);
        let end = event.end.min(activity.end());
        (end - start).num_seconds().max(0)
    }
}
