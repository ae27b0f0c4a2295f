// ABOUTME: Shared test fixtures: world builder, seeded collaborators, fixed clock
// ABOUTME: Reduces duplication across the integration suites
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence
#![allow(dead_code)]

//! Shared test utilities for `milo_scheduler` integration tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;

use milo_scheduler::config::{GoalsConfig, TemplateCatalog};
use milo_scheduler::models::{Activity, CalendarEvent, Discipline, EventOrigin, HealthSample};
use milo_scheduler::orchestrator::{Collaborators, Orchestrator};
use milo_scheduler::providers::synthetic::{
    FixedClock, MemoryAuditStore, ScriptedLm, SyntheticCalendar, SyntheticHealthStore,
};

/// Monday 2025-06-02, 05:00 UTC — before the morning window opens
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 5, 0, 0).unwrap()
}

/// A valid two-option LM body with a backup section
pub const TWO_OPTION_BODY: &str = "Option A: Steady Session\n\
    Warm up 10 min, work 30 min at a comfortable effort, cool down 5 min.\n\n\
    Option B: Interval Session\n\
    Warm up 10 min, 6x3 min strong with 2 min easy, cool down 10 min.\n\n\
    Backup (low energy): 15 min very easy movement.";

/// Everything one cycle needs, with in-memory collaborators
pub struct World {
    pub calendar: Arc<SyntheticCalendar>,
    pub health: Arc<SyntheticHealthStore>,
    pub audit: Arc<MemoryAuditStore>,
    pub lm: Arc<ScriptedLm>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Build a world around a goals document, clock pinned to [`test_now`]
pub fn build_world(goals_yaml: &str) -> World {
    let goals = Arc::new(GoalsConfig::from_yaml_str(goals_yaml).expect("test goals parse"));
    let templates = Arc::new(TemplateCatalog::default());

    let calendar = Arc::new(SyntheticCalendar::default());
    let health = Arc::new(SyntheticHealthStore::default());
    let audit = Arc::new(MemoryAuditStore::default());
    let lm = Arc::new(ScriptedLm::default());

    let orchestrator = Arc::new(Orchestrator::new(
        Collaborators {
            clock: Arc::new(FixedClock(test_now())),
            calendar: Arc::clone(&calendar) as Arc<dyn milo_scheduler::providers::CalendarClient>,
            health: Arc::clone(&health) as Arc<dyn milo_scheduler::providers::HealthStore>,
            audit: Arc::clone(&audit) as Arc<dyn milo_scheduler::providers::AuditStore>,
            lm: Arc::clone(&lm) as Arc<dyn milo_scheduler::llm::LmClient>,
        },
        goals,
        templates,
    ));

    World {
        calendar,
        health,
        audit,
        lm,
        orchestrator,
    }
}

/// Goals document with the given weekly targets, UTC timezone, one test model
pub fn goals_yaml(run: u32, bike: u32, swim: u32, strength: u32, policy: &str) -> String {
    format!(
        "weekly_structure:\n  run_sessions: {run}\n  bike_sessions: {bike}\n  swim_sessions: {swim}\n  strength_sessions: {strength}\npreferences:\n  preferred_workout_time: {policy}\n  morning_hours: [6, 9]\n  evening_hours: [17, 21]\n  user_timezone: UTC\nprotected_keywords: [interview, CEO, demo]\nmodels:\n  - name: test-model\n    kind: local\n"
    )
}

/// Seed a fresh health sample whose blend lands in the `good` tier
pub fn seed_good_recovery(world: &World) {
    let now = test_now();
    for days_back in 1..=7 {
        world.health.push_sample(baseline_sample(now - Duration::days(days_back)));
    }
    world.health.push_sample(baseline_sample(now - Duration::hours(6)));
}

fn baseline_sample(ts: DateTime<Utc>) -> HealthSample {
    HealthSample {
        timestamp: ts,
        source: "test".into(),
        sleep_duration_hours: Some(7.5),
        sleep_quality_score: Some(80.0),
        resting_hr: Some(52.0),
        hrv_score: Some(62.0),
        stress_level: Some(30.0),
        recovery_score: Some(72.0),
        steps: Some(9_500),
        raw_payload: json!({}),
    }
}

/// A recorded activity with the given discipline and start
pub fn activity(discipline: Discipline, ts: DateTime<Utc>, minutes: f64) -> Activity {
    Activity {
        timestamp: ts,
        discipline,
        duration_minutes: minutes,
        distance_km: matches!(discipline, Discipline::Run | Discipline::Bike).then_some(8.0),
        avg_hr: Some(148.0),
        training_load: Some(80.0),
        perceived_exertion: Some(6),
        calories: Some(450.0),
        raw_payload: json!({}),
    }
}

/// An external (non-planner) calendar event
pub fn external_event(summary: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        external_id: None,
        summary: summary.into(),
        description: String::new(),
        start,
        end,
        tags: vec![],
        origin: EventOrigin::External,
    }
}

/// A planner-owned event as an earlier cycle would have written it
pub fn planned_event(
    discipline: Discipline,
    start: DateTime<Utc>,
    minutes: i64,
) -> CalendarEvent {
    CalendarEvent {
        external_id: None,
        summary: format!("[AI Workout] {discipline}: Steady Session"),
        description: "Option A: Steady Session\ndetail\n\nOption B: Interval Session\ndetail\n\nBackup (low energy):\n15 min easy.".into(),
        start,
        end: start + Duration::minutes(minutes),
        tags: vec![discipline.tag()],
        origin: EventOrigin::Planned,
    }
}

/// Planner-owned events currently on the calendar
pub fn planned_events(world: &World) -> Vec<CalendarEvent> {
    world
        .calendar
        .snapshot()
        .into_iter()
        .filter(CalendarEvent::is_planner_owned)
        .collect()
}
