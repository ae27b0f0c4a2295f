// ABOUTME: Cycle orchestration: reconcile, plan, generate, write, audit
// ABOUTME: Enforces mutation budget, cycle deadline, and bounded LM fan-out
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Orchestrator.
//!
//! One cycle: reconcile the trailing window, plan the forward horizon,
//! generate content with bounded LM fan-out, apply mutations in ascending
//! date order, and leave a coherent audit trail. All reads happen before any
//! planner-owned mutation; every audit entry for a successful mutation is
//! persisted after the mutation itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{GoalsConfig, TemplateCatalog};
use crate::constants::recovery::{ACUTE_LOAD_WINDOW_HOURS, BASELINE_WINDOW_DAYS};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::intelligence::budget::{remaining_quota, week_bounds};
use crate::intelligence::conflict::{window_bounds, Interval};
use crate::intelligence::planner::{
    summarize_recent, DayContext, DayDecision, DayOutcome, Planner, SkipReason,
};
use crate::intelligence::recovery::derive_snapshot;
use crate::llm::{LmClient, WorkoutGenerator};
use crate::models::{
    ActionType, AuditAction, CalendarEvent, Discipline, EventOrigin, PlanRequest, RecoveryTier,
    WorkoutPlan,
};
use crate::providers::synthetic::DryRunCalendar;
use crate::providers::{AuditStore, CalendarClient, CalendarView, Clock, HealthStore};
use crate::reconciler::Reconciler;

/// Agent name recorded on orchestrator audit entries
const AGENT: &str = "orchestrator";

/// Per-cycle cap on calendar mutations
///
/// Once exhausted, further mutations are buffered into `plan` audit entries
/// with `executed = false` and applied by a later cycle.
#[derive(Debug)]
pub struct MutationBudget {
    limit: u32,
    used: u32,
}

impl MutationBudget {
    /// Budget with the given cap
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Whether no capacity remains
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.used >= self.limit
    }

    /// Consume one unit when capacity remains
    pub fn try_take(&mut self) -> bool {
        if self.exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    /// Mutations consumed so far
    #[must_use]
    pub const fn used(&self) -> u32 {
        self.used
    }
}

/// Cooperative deadline and cancellation token threaded through a cycle
#[derive(Debug)]
pub struct CycleToken {
    deadline: Instant,
    cancelled: AtomicBool,
    pending: Mutex<Vec<String>>,
}

impl CycleToken {
    /// Token expiring after the given wall-clock budget
    #[must_use]
    pub fn new(budget: StdDuration) -> Self {
        Self {
            deadline: Instant::now() + budget,
            cancelled: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Fail when the cycle is cancelled or past its deadline
    ///
    /// # Errors
    ///
    /// Returns `DeadlineExceeded` in either case.
    pub fn check(&self) -> AppResult<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(AppError::deadline("cycle cancelled"));
        }
        if Instant::now() >= self.deadline {
            return Err(AppError::deadline("cycle deadline exceeded"));
        }
        Ok(())
    }

    /// Replace the list of operations not yet attempted
    pub fn set_pending(&self, ops: Vec<String>) {
        *self.pending.lock().expect("pending lock poisoned") = ops;
    }

    /// Remove one operation from the pending list once attempted
    pub fn mark_attempted(&self, op: &str) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .retain(|p| p != op);
    }

    /// Operations never attempted (recorded on `cycle_aborted`)
    #[must_use]
    pub fn pending(&self) -> Vec<String> {
        self.pending.lock().expect("pending lock poisoned").clone()
    }
}

/// Explicit dependency bundle handed to the orchestrator at construction
pub struct Collaborators {
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Remote calendar
    pub calendar: Arc<dyn CalendarClient>,
    /// Ingested health rows
    pub health: Arc<dyn HealthStore>,
    /// Append-only decision log
    pub audit: Arc<dyn AuditStore>,
    /// Language-model endpoint
    pub lm: Arc<dyn LmClient>,
}

/// Knobs for one cycle invocation
#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Forward horizon override in days
    pub horizon_days: Option<u32>,
    /// Trailing reconciliation window override in days
    pub reconcile_days: Option<u32>,
    /// Suppress calendar writes; audits still flow with `executed = false`
    pub dry_run: bool,
    /// Run the planning phase
    pub plan: bool,
    /// Run the reconciliation phase
    pub reconcile: bool,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            horizon_days: None,
            reconcile_days: None,
            dry_run: false,
            plan: true,
            reconcile: true,
        }
    }
}

/// Counters emitted as the single cycle summary line
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleSummary {
    /// Calendar events created
    pub created: u32,
    /// Calendar events updated
    pub updated: u32,
    /// Calendar events deleted
    pub deleted: u32,
    /// Candidate days skipped
    pub skipped: u32,
    /// Plans produced by the template-only fallback
    pub degraded: u32,
}

/// Top-level cycle driver
pub struct Orchestrator {
    collab: Collaborators,
    goals: Arc<GoalsConfig>,
    templates: Arc<TemplateCatalog>,
}

impl Orchestrator {
    /// Construct the orchestrator with its dependency bundle
    #[must_use]
    pub fn new(
        collab: Collaborators,
        goals: Arc<GoalsConfig>,
        templates: Arc<TemplateCatalog>,
    ) -> Self {
        Self {
            collab,
            goals,
            templates,
        }
    }

    /// Run one cycle with panic containment
    ///
    /// A panic inside any component converts to a `cycle_aborted` audit entry
    /// carrying a truncated fingerprint.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run_cycle`], plus `InternalError` on a
    /// contained panic.
    pub async fn run_contained(
        self: &Arc<Self>,
        options: CycleOptions,
    ) -> AppResult<CycleSummary> {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_cycle(&options).await });
        match handle.await {
            Ok(result) => result,
            Err(join_err) => {
                let fingerprint = panic_fingerprint(&join_err);
                warn!(%fingerprint, "cycle panicked; containing");
                let action = AuditAction::new(
                    AGENT,
                    ActionType::CycleAborted,
                    self.collab.clock.now(),
                    format!("panic: {fingerprint}"),
                );
                if let Err(audit_err) = self.collab.audit.append(&action).await {
                    warn!(%audit_err, "failed to record panic abort");
                }
                Err(AppError::internal(format!("cycle panicked: {fingerprint}")))
            }
        }
    }

    /// Run one cycle: reconcile, then plan, then summarize
    ///
    /// # Errors
    ///
    /// Propagates configuration errors, permission failures (after an audit
    /// entry), and deadline expiry (after a `cycle_aborted` audit entry).
    /// Transient failures inside a unit of work skip that unit instead.
    pub async fn run_cycle(&self, options: &CycleOptions) -> AppResult<CycleSummary> {
        let tz = self.goals.timezone()?;
        let token = CycleToken::new(StdDuration::from_secs(
            self.goals.safety.cycle_deadline_secs,
        ));
        let mut budget = MutationBudget::new(self.goals.safety.max_mutations_per_cycle);

        let calendar_client: Arc<dyn CalendarClient> = if options.dry_run {
            Arc::new(DryRunCalendar::new(Arc::clone(&self.collab.calendar)))
        } else {
            Arc::clone(&self.collab.calendar)
        };
        let view = CalendarView::new(calendar_client);

        let result = self
            .run_phases(options, &view, tz, &token, &mut budget)
            .await;

        match result {
            Ok(summary) => {
                info!(
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    skipped = summary.skipped,
                    degraded = summary.degraded,
                    mutations = budget.used(),
                    dry_run = options.dry_run,
                    "cycle complete"
                );
                Ok(summary)
            }
            Err(err) => {
                self.record_failure(&err, &token).await;
                Err(err)
            }
        }
    }

    async fn record_failure(&self, err: &AppError, token: &CycleToken) {
        let now = self.collab.clock.now();
        let action = match err.code {
            ErrorCode::DeadlineExceeded => Some(
                AuditAction::new(AGENT, ActionType::CycleAborted, now, err.message.clone())
                    .with_after(json!({ "not_attempted": token.pending() })),
            ),
            ErrorCode::PermissionDenied => Some(AuditAction::new(
                AGENT,
                ActionType::PermissionDenied,
                now,
                err.message.clone(),
            )),
            _ => None,
        };
        if let Some(action) = action {
            if let Err(audit_err) = self.collab.audit.append(&action).await {
                warn!(%audit_err, "failed to record cycle failure");
            }
        }
    }

    async fn run_phases(
        &self,
        options: &CycleOptions,
        view: &CalendarView,
        tz: Tz,
        token: &CycleToken,
        budget: &mut MutationBudget,
    ) -> AppResult<CycleSummary> {
        let mut summary = CycleSummary::default();

        if options.reconcile {
            token.check()?;
            let reconciler = Reconciler {
                view,
                health: self.collab.health.as_ref(),
                audit: self.collab.audit.as_ref(),
                goals: self.goals.as_ref(),
                now: self.collab.clock.now(),
                tz,
                dry_run: options.dry_run,
            };
            let window = options
                .reconcile_days
                .unwrap_or(crate::constants::planning::DEFAULT_RECONCILE_DAYS);
            let stats = reconciler.run(window, budget, token).await?;
            summary.updated += stats.completed + stats.missed + stats.rescheduled;
            summary.deleted += stats.cancelled;
        }

        if options.plan {
            token.check()?;
            self.plan_phase(options, view, tz, token, budget, &mut summary)
                .await?;
        }

        Ok(summary)
    }

    #[allow(clippy::too_many_lines)]
    async fn plan_phase(
        &self,
        options: &CycleOptions,
        view: &CalendarView,
        tz: Tz,
        token: &CycleToken,
        budget: &mut MutationBudget,
        summary: &mut CycleSummary,
    ) -> AppResult<()> {
        let now = self.collab.clock.now();
        let today = now.with_timezone(&tz).date_naive();
        let horizon = options.horizon_days.unwrap_or(self.goals.horizon_days);
        let last_date = today + Duration::days(i64::from(horizon));

        // Reads happen up front, before any planner-owned mutation
        let (today_week_start, _) = week_bounds(today, tz)?;
        let (_, fetch_end) = window_bounds(last_date, [0, 24], tz)?;
        let fetch_start = today_week_start.min(now - Duration::days(1));
        let mut events = view.list_range(fetch_start, fetch_end).await?;

        let activities = self
            .collab
            .health
            .activities_in(today_week_start - Duration::days(7), now)
            .await?;
        let samples = self
            .collab
            .health
            .samples_in(now - Duration::days(BASELINE_WINDOW_DAYS + 2), now)
            .await?;
        let latest_sample = self.collab.health.latest_sample_before(fetch_end).await?;

        let week_ago = now - Duration::days(7);
        let recent_summary = summarize_recent(
            &activities
                .iter()
                .filter(|a| a.timestamp >= week_ago)
                .cloned()
                .collect::<Vec<_>>(),
        );

        // Sequential decisions with simulated quota decrements
        let planner = Planner::new(&self.goals, &self.templates);
        let mut planned_so_far: Vec<(NaiveDate, Discipline)> = Vec::new();
        let mut decisions: Vec<DayDecision> = Vec::new();

        for offset in 0..i64::from(horizon) {
            token.check()?;
            let date = today + Duration::days(offset);
            let (day_start, day_end) = window_bounds(date, [0, 24], tz)?;

            let day_events: Vec<&CalendarEvent> = events
                .iter()
                .filter(|e| e.start >= day_start && e.start < day_end)
                .collect();
            let busy: Vec<Interval> = day_events.iter().map(|e| (e.start, e.end)).collect();
            let has_planned_event = day_events.iter().any(|e| e.is_planner_owned());

            let (wk_start, wk_end) = week_bounds(date, tz)?;
            let week_events: Vec<CalendarEvent> = events
                .iter()
                .filter(|e| e.start >= wk_start && e.start < wk_end)
                .cloned()
                .collect();
            let week_activities: Vec<_> = activities
                .iter()
                .filter(|a| a.timestamp >= wk_start && a.timestamp < wk_end)
                .cloned()
                .collect();
            let mut remaining = remaining_quota(
                &self.goals.weekly_structure,
                &week_events,
                &week_activities,
                now,
            );
            for (planned_date, discipline) in &planned_so_far {
                if *planned_date >= wk_start.with_timezone(&tz).date_naive()
                    && *planned_date < wk_end.with_timezone(&tz).date_naive()
                {
                    if let Some(count) = remaining.get_mut(discipline) {
                        *count = count.saturating_sub(1);
                    }
                }
            }

            let previous_discipline =
                self.previous_discipline(date, &planned_so_far, &events, &activities, tz);

            let reference_end = day_end;
            let window_samples: Vec<_> = samples
                .iter()
                .filter(|s| {
                    s.timestamp < reference_end
                        && s.timestamp >= reference_end - Duration::days(BASELINE_WINDOW_DAYS)
                })
                .cloned()
                .collect();
            let acute_activities: Vec<_> = activities
                .iter()
                .filter(|a| {
                    a.timestamp < reference_end
                        && a.timestamp
                            >= reference_end - Duration::hours(ACUTE_LOAD_WINDOW_HOURS)
                })
                .cloned()
                .collect();
            let snapshot = derive_snapshot(
                date,
                reference_end,
                latest_sample.as_ref(),
                &window_samples,
                &acute_activities,
            );

            let ctx = DayContext {
                date,
                today,
                snapshot,
                busy,
                has_planned_event,
                remaining,
                previous_discipline,
                recent_activities_summary: recent_summary.clone(),
            };
            let decision = planner.decide_day(&ctx, tz)?;
            if let DayOutcome::Planned(request) = &decision.outcome {
                planned_so_far.push((date, request.discipline));
            }
            decisions.push(decision);
        }

        // Bounded LM fan-out across independent candidate days
        let requests: Vec<PlanRequest> = decisions
            .iter()
            .filter_map(|d| match &d.outcome {
                DayOutcome::Planned(request) => Some(request.clone()),
                DayOutcome::Skipped(_) => None,
            })
            .collect();
        let plans = self.generate_all(&requests, token).await?;

        token.set_pending(
            decisions
                .iter()
                .map(|d| format!("plan {}", d.date))
                .collect(),
        );

        // Mutations in ascending date order; audits after each mutation
        let mut plan_iter = plans.into_iter();
        for decision in decisions {
            token.check()?;
            let op = format!("plan {}", decision.date);
            match decision.outcome {
                DayOutcome::Skipped(reason) => {
                    self.audit_skip(decision.date, reason, now).await?;
                    if reason != SkipReason::PastDate {
                        summary.skipped += 1;
                    }
                }
                DayOutcome::Planned(request) => {
                    let plan = plan_iter
                        .next()
                        .ok_or_else(|| AppError::internal("plan/decision count mismatch"))?;
                    self.persist_plan(
                        options, view, tz, &request, &plan, &mut events, budget, summary, now,
                    )
                    .await?;
                }
            }
            token.mark_attempted(&op);
        }

        Ok(())
    }

    /// Generate workout content for every planned request with bounded
    /// concurrency, preserving request order
    async fn generate_all(
        &self,
        requests: &[PlanRequest],
        token: &CycleToken,
    ) -> AppResult<Vec<WorkoutPlan>> {
        token.check()?;
        let semaphore = Arc::new(Semaphore::new(self.goals.safety.lm_concurrency));
        let generator = Arc::new(WorkoutGenerator::new(
            Arc::clone(&self.collab.lm),
            self.goals.models.clone(),
        ));

        let mut join_set = JoinSet::new();
        for (index, request) in requests.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let generator = Arc::clone(&generator);
            let goals = Arc::clone(&self.goals);
            let templates = Arc::clone(&self.templates);
            join_set.spawn(async move {
                let permit = semaphore.acquire().await;
                if permit.is_err() {
                    return (index, Err(AppError::internal("fan-out semaphore closed")));
                }
                let plan = generator.generate(&request, &goals, &templates).await;
                (index, plan)
            });
        }

        let mut plans: Vec<Option<WorkoutPlan>> = vec![None; requests.len()];
        while let Some(joined) = join_set.join_next().await {
            let (index, plan) =
                joined.map_err(|err| AppError::internal(format!("generation task: {err}")))?;
            plans[index] = Some(plan?);
        }
        plans
            .into_iter()
            .map(|p| p.ok_or_else(|| AppError::internal("missing generated plan")))
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_plan(
        &self,
        options: &CycleOptions,
        view: &CalendarView,
        tz: Tz,
        request: &PlanRequest,
        plan: &WorkoutPlan,
        events: &mut Vec<CalendarEvent>,
        budget: &mut MutationBudget,
        summary: &mut CycleSummary,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if plan.degraded {
            summary.degraded += 1;
        }

        let draft = CalendarEvent {
            external_id: None,
            summary: plan.render_summary(request.discipline),
            description: plan.render_description(),
            start: request.slot_start,
            end: request.slot_end(),
            tags: vec![request.discipline.tag()],
            origin: EventOrigin::Planned,
        };

        let mut reasoning = format!(
            "planned {} ({}) at {}",
            request.discipline,
            request.intensity_tier.as_str(),
            request.slot_start.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        );
        if request.health.recovery_tier == RecoveryTier::Unknown {
            reasoning.push_str("; no recent health sample, assumed good recovery");
        }

        if budget.exhausted() {
            let action = AuditAction::new(AGENT, ActionType::Plan, now, reasoning)
                .with_after(json!({
                    "date": request.date,
                    "discipline": request.discipline,
                    "buffered": "mutation budget exhausted",
                }))
                .with_sources(&["calendar", "health_samples", "activities", "goals"])
                .degraded(plan.degraded);
            self.collab.audit.append(&action).await?;
            summary.skipped += 1;
            return Ok(());
        }

        let outcome = view
            .upsert_slot(events, request.date, request.discipline, tz, &draft)
            .await?;
        if outcome.mutated() {
            budget.try_take();
        }

        let executed = outcome.mutated() && !options.dry_run;
        let action = AuditAction::new(AGENT, ActionType::Plan, now, reasoning)
            .with_confidence(0.9)
            .with_after(json!({
                "external_id": outcome.external_id(),
                "date": request.date,
                "discipline": request.discipline,
                "intensity": request.intensity_tier.as_str(),
                "start": draft.start,
                "end": draft.end,
                "model": plan.model,
            }))
            .with_sources(&["calendar", "health_samples", "activities", "goals"])
            .degraded(plan.degraded);
        let mut action = action;
        action.executed = executed;
        self.collab.audit.append(&action).await?;

        match &outcome {
            crate::providers::UpsertOutcome::Created(id) => {
                summary.created += 1;
                let mut created = draft;
                created.external_id = Some(id.clone());
                events.push(created);
                events.sort_by_key(|e| e.start);
            }
            crate::providers::UpsertOutcome::Updated(_) => summary.updated += 1,
            crate::providers::UpsertOutcome::Unchanged(_) => {}
        }
        Ok(())
    }

    async fn audit_skip(
        &self,
        date: NaiveDate,
        reason: SkipReason,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let action = match reason {
            SkipReason::PastDate => return Ok(()),
            SkipReason::TargetMet => AuditAction::new(
                AGENT,
                ActionType::SkipTargetMet,
                now,
                format!("{date}: weekly targets already met"),
            ),
            SkipReason::AlreadyScheduled => AuditAction::new(
                AGENT,
                ActionType::SkipDuplicate,
                now,
                format!("{date}: a planned workout already exists"),
            ),
            SkipReason::NoSlot(discipline) => AuditAction::new(
                AGENT,
                ActionType::Plan,
                now,
                format!("{date}: no_slot for {discipline}"),
            )
            .with_confidence(0.5)
            .with_after(json!({"skip_reason": "no_slot", "discipline": discipline})),
        };
        self.collab
            .audit
            .append(&action.with_sources(&["calendar", "goals"]))
            .await
    }

    /// Discipline planned or performed on the previous day, if any
    fn previous_discipline(
        &self,
        date: NaiveDate,
        planned_so_far: &[(NaiveDate, Discipline)],
        events: &[CalendarEvent],
        activities: &[crate::models::Activity],
        tz: Tz,
    ) -> Option<Discipline> {
        let yesterday = date - Duration::days(1);

        if let Some((_, discipline)) = planned_so_far.iter().find(|(d, _)| *d == yesterday) {
            return Some(*discipline);
        }

        if let Some(discipline) = events
            .iter()
            .filter(|e| e.is_planner_owned())
            .filter(|e| e.start.with_timezone(&tz).date_naive() == yesterday)
            .find_map(CalendarEvent::discipline)
        {
            return Some(discipline);
        }

        activities
            .iter()
            .filter(|a| a.timestamp.with_timezone(&tz).date_naive() == yesterday)
            .max_by_key(|a| a.timestamp)
            .map(|a| a.discipline)
    }
}

/// Truncated fingerprint of a panic payload
fn panic_fingerprint(join_err: &tokio::task::JoinError) -> String {
    let message = if join_err.is_panic() {
        format!("{join_err}")
    } else {
        "task cancelled".to_owned()
    };
    let mut fingerprint: String = message.chars().take(120).collect();
    if fingerprint.len() < message.len() {
        fingerprint.push('…');
    }
    fingerprint
}
