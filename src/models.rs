// ABOUTME: Domain entities shared across the planning and reconciliation components
// ABOUTME: Health samples, activities, calendar events, audit actions, and plan types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Core data model. Entities here are plain serde-friendly records; the
//! derivation logic that produces them lives in [`crate::intelligence`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::planning::{DISCIPLINE_TAG_PREFIX, PLANNED_SUMMARY_PREFIX};

/// Training discipline of an activity or planned workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    /// Running (incl. treadmill and trail)
    Run,
    /// Cycling (incl. indoor)
    Bike,
    /// Swimming (pool or open water)
    Swim,
    /// Strength / weight training
    Strength,
    /// Anything else the wearable reports
    Other,
}

impl Discipline {
    /// The disciplines the planner schedules, in default priority order
    pub const PLANNABLE: [Self; 4] = [Self::Strength, Self::Run, Self::Bike, Self::Swim];

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Bike => "bike",
            Self::Swim => "swim",
            Self::Strength => "strength",
            Self::Other => "other",
        }
    }

    /// Display name for event summaries
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Run => "Run",
            Self::Bike => "Bike",
            Self::Swim => "Swim",
            Self::Strength => "Strength",
            Self::Other => "Other",
        }
    }

    /// Machine-readable calendar tag (`workout:<discipline>`)
    #[must_use]
    pub fn tag(self) -> String {
        format!("{DISCIPLINE_TAG_PREFIX}{}", self.as_str())
    }

    /// Normalize a free-form activity type string from the wearable
    ///
    /// Collapses provider variants (treadmill running, lap swimming, indoor
    /// cycling, weight training, ...) onto the canonical disciplines.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("run") || lower.contains("treadmill") {
            Self::Run
        } else if lower.contains("bike") || lower.contains("cycl") || lower.contains("ride") {
            Self::Bike
        } else if lower.contains("swim") || lower.contains("pool") {
            Self::Swim
        } else if lower.contains("strength")
            || lower.contains("weight")
            || lower.contains("lift")
            || lower.contains("gym")
        {
            Self::Strength
        } else {
            Self::Other
        }
    }
}

impl std::fmt::Display for Discipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete recovery label derived from the health snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryTier {
    /// Score >= 80: ready for full intensity
    Excellent,
    /// Score 60-79: normal training
    Good,
    /// Score 40-59: reduce high-impact load
    Fair,
    /// Score < 40: minimal load only
    Poor,
    /// No recent health sample; planner treats as `good` and flags the audit
    Unknown,
}

/// Target load level for a generated workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntensityTier {
    /// Full planned load
    Normal,
    /// Shortened / lower-intensity variant
    Reduced,
    /// Minimal low-energy variant
    Backup,
}

impl IntensityTier {
    /// Shift one tier down (normal -> reduced -> backup)
    #[must_use]
    pub const fn downshift(self) -> Self {
        match self {
            Self::Normal => Self::Reduced,
            Self::Reduced | Self::Backup => Self::Backup,
        }
    }

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Reduced => "reduced",
            Self::Backup => "backup",
        }
    }
}

/// Timestamped measurement from one external health source
///
/// Unique on `(timestamp, source)`; created by ingestion and never mutated.
/// The raw payload is always retained for re-derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    /// Measurement timestamp
    pub timestamp: DateTime<Utc>,
    /// Reporting source (`garmin`, `test`, ...)
    pub source: String,
    /// Sleep duration in hours (0-24)
    pub sleep_duration_hours: Option<f64>,
    /// Sleep quality score (0-100)
    pub sleep_quality_score: Option<f64>,
    /// Resting heart rate (bpm)
    pub resting_hr: Option<f64>,
    /// Heart-rate variability score
    pub hrv_score: Option<f64>,
    /// Stress level (0-100)
    pub stress_level: Option<f64>,
    /// Device-reported recovery score (0-100)
    pub recovery_score: Option<f64>,
    /// Step count for the day
    pub steps: Option<i64>,
    /// Raw provider payload, retained verbatim
    pub raw_payload: serde_json::Value,
}

/// Completed workout as reported by the wearable; immutable after ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Start timestamp
    pub timestamp: DateTime<Utc>,
    /// Normalized discipline
    pub discipline: Discipline,
    /// Duration in minutes
    pub duration_minutes: f64,
    /// Distance in kilometers, when applicable
    pub distance_km: Option<f64>,
    /// Average heart rate (bpm)
    pub avg_hr: Option<f64>,
    /// Provider training-load figure for the session
    pub training_load: Option<f64>,
    /// Perceived exertion (1-10)
    pub perceived_exertion: Option<u8>,
    /// Calories burned
    pub calories: Option<f64>,
    /// Raw provider payload, retained verbatim
    pub raw_payload: serde_json::Value,
}

impl Activity {
    /// End timestamp derived from start and duration
    #[must_use]
    pub fn end(&self) -> DateTime<Utc> {
        self.timestamp + chrono::Duration::seconds((self.duration_minutes * 60.0) as i64)
    }
}

/// Who created a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Created by this planner; the only events the system ever mutates
    Planned,
    /// Anything else on the calendar; strictly read-only
    External,
}

/// An entry in the remote calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Remote identifier; absent until the first write round-trips
    pub external_id: Option<String>,
    /// Event title
    pub summary: String,
    /// Event body
    pub description: String,
    /// Start instant (`end > start` always holds)
    pub start: DateTime<Utc>,
    /// End instant
    pub end: DateTime<Utc>,
    /// Free-form labels; planner-owned events carry `workout:<discipline>`
    pub tags: Vec<String>,
    /// Ownership classification
    pub origin: EventOrigin,
}

impl CalendarEvent {
    /// Whether this event is owned by the planner
    ///
    /// The `workout:<discipline>` tag is authoritative; the summary prefix is
    /// accepted as a fallback so events survive tag-stripping calendars.
    #[must_use]
    pub fn is_planner_owned(&self) -> bool {
        self.tags
            .iter()
            .any(|t| t.starts_with(DISCIPLINE_TAG_PREFIX))
            || self.summary.contains(PLANNED_SUMMARY_PREFIX)
    }

    /// Discipline of a planner-owned event, when recognizable
    #[must_use]
    pub fn discipline(&self) -> Option<Discipline> {
        for tag in &self.tags {
            if let Some(name) = tag.strip_prefix(DISCIPLINE_TAG_PREFIX) {
                let parsed = Discipline::parse(name);
                if parsed != Discipline::Other {
                    return Some(parsed);
                }
            }
        }
        // Fallback: "[AI Workout] run: ..." style summaries
        let after_prefix = self.summary.find(PLANNED_SUMMARY_PREFIX).map(|idx| {
            self.summary[idx + PLANNED_SUMMARY_PREFIX.len()..]
                .trim_start()
                .split(':')
                .next()
                .unwrap_or("")
                .trim()
                .to_owned()
        })?;
        let parsed = Discipline::parse(&after_prefix);
        (parsed != Discipline::Other).then_some(parsed)
    }

    /// Whether the event summary or tags match any protected keyword
    /// (case-insensitive substring match)
    #[must_use]
    pub fn matches_keywords(&self, keywords: &[String]) -> bool {
        let summary = self.summary.to_lowercase();
        keywords.iter().any(|kw| {
            let kw = kw.to_lowercase();
            summary.contains(&kw)
                || self
                    .tags
                    .iter()
                    .any(|t| t.to_lowercase().contains(&kw))
        })
    }
}

/// Transient inputs the planner hands to the LM content generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    /// Target calendar date (user timezone)
    pub date: NaiveDate,
    /// Chosen discipline
    pub discipline: Discipline,
    /// Chosen intensity tier
    pub intensity_tier: IntensityTier,
    /// Slot start chosen by the conflict engine
    pub slot_start: DateTime<Utc>,
    /// Workout duration in minutes (from the template)
    pub duration_minutes: u32,
    /// One-line-per-activity summary of the recent 7 days
    pub recent_activities_summary: String,
    /// Health snapshot backing the intensity decision
    pub health: HealthSnapshot,
}

impl PlanRequest {
    /// Slot end derived from start and duration
    #[must_use]
    pub fn slot_end(&self) -> DateTime<Utc> {
        self.slot_start + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Recovery tuple derived from recent health rows and activities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Reference date the snapshot was computed for
    pub date: NaiveDate,
    /// Sleep duration from the most recent sample (hours)
    pub sleep_hours: Option<f64>,
    /// Sleep quality score (0-100)
    pub sleep_quality: Option<f64>,
    /// Stress level (0-100)
    pub stress_level: Option<f64>,
    /// Blended recovery score (0-100), absent when no recent sample exists
    pub recovery_score: Option<f64>,
    /// 7-day median resting heart rate
    pub resting_hr_baseline: Option<f64>,
    /// 7-day median stress level
    pub stress_baseline: Option<f64>,
    /// Sum of training load over the trailing 48 hours
    pub training_load_48h: f64,
    /// Discrete recovery label
    pub recovery_tier: RecoveryTier,
}

impl HealthSnapshot {
    /// Tier the planner acts on: `unknown` maps to the neutral `good`
    #[must_use]
    pub const fn effective_tier(&self) -> RecoveryTier {
        match self.recovery_tier {
            RecoveryTier::Unknown => RecoveryTier::Good,
            tier => tier,
        }
    }
}

/// One of the two generated workout alternatives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutOption {
    /// Short title (used in the event summary for Option A)
    pub title: String,
    /// Full option body: steps, target zones, duration
    pub detail: String,
}

/// LM output parsed into the persisted plan shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPlan {
    /// Primary alternative
    pub option_a: WorkoutOption,
    /// Secondary alternative
    pub option_b: WorkoutOption,
    /// Low-energy variant; template-derived when the model omitted one
    pub backup: String,
    /// Model that produced the content; `None` for the template fallback
    pub model: Option<String>,
    /// Whether the template-only fallback was used
    pub degraded: bool,
}

/// Action types recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A workout event was planned (or buffered when over budget)
    Plan,
    /// A future event was moved to a new free slot
    Reschedule,
    /// A future event was deleted
    Cancel,
    /// A past event matched a recorded activity
    MarkCompleted,
    /// A past event matched no recorded activity
    Missed,
    /// Duplicate insert treated as a no-op
    SkipDuplicate,
    /// Weekly target already met for every remaining discipline
    SkipTargetMet,
    /// Cycle aborted by deadline, cancellation, or contained panic
    CycleAborted,
    /// An external API rejected credentials
    PermissionDenied,
}

impl ActionType {
    /// Canonical snake_case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::MarkCompleted => "mark_completed",
            Self::Missed => "missed",
            Self::SkipDuplicate => "skip_duplicate",
            Self::SkipTargetMet => "skip_target_met",
            Self::CycleAborted => "cycle_aborted",
            Self::PermissionDenied => "permission_denied",
        }
    }
}

/// Immutable record of one planner or reconciler decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAction {
    /// Unique identifier
    pub id: Uuid,
    /// Decision timestamp
    pub timestamp: DateTime<Utc>,
    /// Component that made the decision
    pub agent: String,
    /// What was decided
    pub action: ActionType,
    /// Decision confidence (0-1)
    pub confidence: f64,
    /// State before the mutation, when applicable
    pub before_state: Option<serde_json::Value>,
    /// State after the mutation, when applicable
    pub after_state: Option<serde_json::Value>,
    /// Human-readable reasoning
    pub reasoning: String,
    /// Data sources consulted for the decision
    pub data_sources: Vec<String>,
    /// Whether the mutation was actually executed
    pub executed: bool,
    /// Whether the template-only LM fallback was in effect
    pub degraded: bool,
}

impl AuditAction {
    /// Create a new audit action with the given agent and type
    #[must_use]
    pub fn new(
        agent: impl Into<String>,
        action: ActionType,
        timestamp: DateTime<Utc>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            agent: agent.into(),
            action,
            confidence: 1.0,
            before_state: None,
            after_state: None,
            reasoning: reasoning.into(),
            data_sources: Vec::new(),
            executed: false,
            degraded: false,
        }
    }

    /// Set the confidence score
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Attach the before-state
    #[must_use]
    pub fn with_before(mut self, state: serde_json::Value) -> Self {
        self.before_state = Some(state);
        self
    }

    /// Attach the after-state
    #[must_use]
    pub fn with_after(mut self, state: serde_json::Value) -> Self {
        self.after_state = Some(state);
        self
    }

    /// Record the data sources consulted
    #[must_use]
    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.data_sources = sources.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    /// Mark the mutation as executed
    #[must_use]
    pub const fn executed(mut self) -> Self {
        self.executed = true;
        self
    }

    /// Flag the degraded (template-only) mode
    #[must_use]
    pub const fn degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }
}
