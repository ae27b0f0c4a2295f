// ABOUTME: End-to-end planning scenarios over in-memory collaborators
// ABOUTME: Fresh user, blocked windows, model fallback, met targets, removed targets
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

mod common;

use chrono::{Duration, TimeZone, Timelike, Utc};
use common::{
    activity, build_world, external_event, goals_yaml, planned_event, planned_events,
    seed_good_recovery, test_now, TWO_OPTION_BODY,
};
use milo_scheduler::models::{ActionType, Discipline};
use milo_scheduler::orchestrator::CycleOptions;

fn plan_only() -> CycleOptions {
    CycleOptions {
        reconcile: false,
        ..CycleOptions::default()
    }
}

/// Fresh user, empty calendar, recovery good: one event per day, alternating
/// disciplines starting with strength, all in the morning window
#[tokio::test]
async fn fresh_user_fills_three_mornings() {
    let world = build_world(&goals_yaml(2, 0, 0, 3, "morning"));
    seed_good_recovery(&world);
    for _ in 0..3 {
        world.lm.respond(TWO_OPTION_BODY);
    }

    let summary = world.orchestrator.run_cycle(&plan_only()).await.unwrap();
    assert_eq!(summary.created, 3);
    assert_eq!(summary.degraded, 0);

    let events = planned_events(&world);
    assert_eq!(events.len(), 3);

    let disciplines: Vec<Discipline> =
        events.iter().filter_map(|e| e.discipline()).collect();
    assert_eq!(
        disciplines,
        vec![Discipline::Strength, Discipline::Run, Discipline::Strength]
    );

    let mut dates = std::collections::HashSet::new();
    for event in &events {
        let hour = event.start.hour();
        assert!((6..9).contains(&hour), "event outside morning window: {hour}");
        assert!(dates.insert(event.start.date_naive()), "two events on one day");

        assert!(event.description.contains("Option A"));
        assert!(event.description.contains("Option B"));
        assert!(event.description.contains("Backup"));
        assert!(event.summary.starts_with("[AI Workout]"));
    }
}

/// Morning blocked on day two under the flexible policy: that workout moves
/// to the evening window, the others stay in the morning
#[tokio::test]
async fn blocked_morning_falls_back_to_evening() {
    let world = build_world(&goals_yaml(2, 0, 0, 3, "flexible"));
    seed_good_recovery(&world);
    for _ in 0..3 {
        world.lm.respond(TWO_OPTION_BODY);
    }

    let day2_morning_start = Utc.with_ymd_and_hms(2025, 6, 3, 6, 0, 0).unwrap();
    world.calendar.seed(external_event(
        "All-hands offsite",
        day2_morning_start,
        day2_morning_start + Duration::hours(3),
    ));

    let summary = world.orchestrator.run_cycle(&plan_only()).await.unwrap();
    assert_eq!(summary.created, 3);

    let events = planned_events(&world);
    for event in &events {
        let hour = event.start.hour();
        if event.start.date_naive() == day2_morning_start.date_naive() {
            assert!((17..21).contains(&hour), "expected evening slot, got {hour}");
        } else {
            assert!((6..9).contains(&hour), "expected morning slot, got {hour}");
        }
    }
}

/// Primary model times out, secondary parses: the audit names the secondary
/// model and the plan is not degraded
#[tokio::test]
async fn secondary_model_rescues_generation() {
    let goals = format!(
        "{}  - name: backup-model\n    kind: local\n",
        goals_yaml(1, 0, 0, 0, "morning")
    );
    let world = build_world(&goals);
    seed_good_recovery(&world);
    world
        .lm
        .fail(milo_scheduler::errors::AppError::transient("lm", "timeout"));
    world.lm.respond(TWO_OPTION_BODY);

    let options = CycleOptions {
        horizon_days: Some(1),
        reconcile: false,
        ..CycleOptions::default()
    };
    let summary = world.orchestrator.run_cycle(&options).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.degraded, 0);
    assert_eq!(world.lm.calls(), vec!["test-model", "backup-model"]);

    let plan_audit = world
        .audit
        .snapshot()
        .into_iter()
        .find(|a| a.action == ActionType::Plan && a.executed)
        .expect("plan audit entry");
    assert!(!plan_audit.degraded);
    assert_eq!(
        plan_audit.after_state.unwrap()["model"],
        serde_json::json!("backup-model")
    );
}

/// Every model fails: the event is still created from the template and the
/// audit carries degraded=true; the cycle succeeds
#[tokio::test]
async fn chain_exhaustion_degrades_to_template() {
    let world = build_world(&goals_yaml(1, 0, 0, 0, "morning"));
    seed_good_recovery(&world);
    // The scripted LM fails transiently once its queue is empty; queue nothing

    let options = CycleOptions {
        horizon_days: Some(1),
        reconcile: false,
        ..CycleOptions::default()
    };
    let summary = world.orchestrator.run_cycle(&options).await.unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.degraded, 1);

    let events = planned_events(&world);
    assert_eq!(events.len(), 1);
    assert!(events[0].description.contains("Option A"));
    assert!(events[0].description.contains("35 min steady run"));
    assert!(events[0].description.contains("Backup (low energy)"));

    let plan_audit = world
        .audit
        .snapshot()
        .into_iter()
        .find(|a| a.action == ActionType::Plan)
        .expect("plan audit entry");
    assert!(plan_audit.degraded);
}

/// Weekly run target already met by recorded activities: nothing is created
/// and each horizon day gets a skip_target_met entry
#[tokio::test]
async fn met_target_skips_every_day() {
    let world = build_world(&goals_yaml(2, 0, 0, 0, "morning"));
    seed_good_recovery(&world);
    // Both earlier in the current Monday-start week (now is Monday 05:00)
    let now = test_now();
    world
        .health
        .push_activity(activity(Discipline::Run, now - Duration::hours(4), 45.0));
    world
        .health
        .push_activity(activity(Discipline::Run, now - Duration::hours(2), 40.0));

    let summary = world.orchestrator.run_cycle(&plan_only()).await.unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.skipped, 3);
    assert!(planned_events(&world).is_empty());

    let skips = world
        .audit
        .snapshot()
        .into_iter()
        .filter(|a| a.action == ActionType::SkipTargetMet)
        .count();
    assert_eq!(skips, 3);
}

/// Config removes swim after prior scheduling: both future swim events are
/// purged with cancel/target_removed, and the freed budget can be replanned
#[tokio::test]
async fn removed_target_purges_future_events() {
    let world = build_world(&goals_yaml(1, 0, 0, 0, "morning"));
    seed_good_recovery(&world);
    world.lm.respond(TWO_OPTION_BODY);

    let day2 = Utc.with_ymd_and_hms(2025, 6, 3, 6, 0, 0).unwrap();
    let day3 = Utc.with_ymd_and_hms(2025, 6, 4, 6, 0, 0).unwrap();
    world.calendar.seed(planned_event(Discipline::Swim, day2, 45));
    world.calendar.seed(planned_event(Discipline::Swim, day3, 45));

    let summary = world
        .orchestrator
        .run_cycle(&CycleOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.deleted, 2);

    let events = planned_events(&world);
    assert!(
        events.iter().all(|e| e.discipline() != Some(Discipline::Swim)),
        "swim events survived the purge"
    );
    // The run target is free to fill one of the opened days
    assert_eq!(summary.created, 1);

    let cancels: Vec<_> = world
        .audit
        .snapshot()
        .into_iter()
        .filter(|a| a.action == ActionType::Cancel)
        .collect();
    assert_eq!(cancels.len(), 2);
    assert!(cancels.iter().all(|a| a.reasoning == "target_removed"));
}

/// Zero goals: no mutations at all, one skip per horizon day
#[tokio::test]
async fn all_zero_goals_never_mutate() {
    let world = build_world(&goals_yaml(0, 0, 0, 0, "morning"));
    seed_good_recovery(&world);

    let summary = world
        .orchestrator
        .run_cycle(&CycleOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.skipped, 3);
    assert!(world.calendar.snapshot().is_empty());
}

/// Missing health data: planning proceeds on the neutral default and the
/// audit entry flags the substitution
#[tokio::test]
async fn missing_health_data_plans_with_flag() {
    let world = build_world(&goals_yaml(1, 0, 0, 0, "morning"));
    world.lm.respond(TWO_OPTION_BODY);

    let options = CycleOptions {
        horizon_days: Some(1),
        reconcile: false,
        ..CycleOptions::default()
    };
    let summary = world.orchestrator.run_cycle(&options).await.unwrap();
    assert_eq!(summary.created, 1);

    let plan_audit = world
        .audit
        .snapshot()
        .into_iter()
        .find(|a| a.action == ActionType::Plan)
        .expect("plan audit entry");
    assert!(plan_audit.reasoning.contains("assumed good recovery"));
}

/// Calendar completely full in both windows: the day is skipped with no_slot
#[tokio::test]
async fn full_calendar_skips_with_no_slot() {
    let world = build_world(&goals_yaml(1, 0, 0, 0, "flexible"));
    seed_good_recovery(&world);

    for day in 2..=4 {
        let morning = Utc.with_ymd_and_hms(2025, 6, day, 6, 0, 0).unwrap();
        let evening = Utc.with_ymd_and_hms(2025, 6, day, 17, 0, 0).unwrap();
        world
            .calendar
            .seed(external_event("Standup marathon", morning, morning + Duration::hours(3)));
        world
            .calendar
            .seed(external_event("Evening class", evening, evening + Duration::hours(4)));
    }

    let summary = world.orchestrator.run_cycle(&plan_only()).await.unwrap();
    assert_eq!(summary.created, 0);
    assert_eq!(summary.skipped, 3);

    let no_slots = world
        .audit
        .snapshot()
        .into_iter()
        .filter(|a| a.reasoning.contains("no_slot"))
        .count();
    assert_eq!(no_slots, 3);
}
