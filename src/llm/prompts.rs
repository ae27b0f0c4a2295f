// ABOUTME: Prompt rendering for workout generation with a stable section order
// ABOUTME: Role line, goals, health snapshot, recent activity, template, output contract
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Prompt construction.
//!
//! The prompt shape is fixed: (a) role line, (b) goals summary, (c) health
//! snapshot, (d) recent 7-day activity summary, (e) the template for the
//! chosen discipline and tier, (f) the output-format instruction. Section
//! order is part of the generator's contract and must not be reordered.

use std::fmt::Write as _;

use crate::config::{GoalsConfig, WorkoutTemplate};
use crate::models::PlanRequest;

/// Render the full generation prompt for one plan request
#[must_use]
pub fn build_prompt(
    request: &PlanRequest,
    goals: &GoalsConfig,
    template: &WorkoutTemplate,
) -> String {
    let mut prompt = String::with_capacity(2_048);

    // (a) role line
    prompt.push_str(
        "You are a workout planning assistant writing one day's training session \
         for a recreational athlete.\n\n",
    );

    // (b) goals summary
    let ws = &goals.weekly_structure;
    let _ = writeln!(
        prompt,
        "=== WEEKLY GOALS ===\nrun: {}/wk, bike: {}/wk, swim: {}/wk, strength: {}/wk\n\
         Preferred time: {:?}",
        ws.run_sessions,
        ws.bike_sessions,
        ws.swim_sessions,
        ws.strength_sessions,
        goals.preferences.preferred_workout_time,
    );
    prompt.push('\n');

    // (c) health snapshot
    let health = &request.health;
    let _ = writeln!(prompt, "=== TODAY'S HEALTH ===");
    let _ = writeln!(prompt, "Date: {}", request.date);
    let _ = writeln!(
        prompt,
        "Recovery: {} (score: {})",
        health.recovery_tier_label(),
        health
            .recovery_score
            .map_or_else(|| "unknown".to_owned(), |s| format!("{s:.0}/100")),
    );
    let _ = writeln!(
        prompt,
        "Sleep: {}",
        health
            .sleep_hours
            .map_or_else(|| "unknown".to_owned(), |h| format!("{h:.1} h")),
    );
    let _ = writeln!(
        prompt,
        "Stress: {}",
        health
            .stress_level
            .map_or_else(|| "unknown".to_owned(), |s| format!("{s:.0}/100")),
    );
    let _ = writeln!(
        prompt,
        "48h training load: {:.0}",
        health.training_load_48h
    );
    prompt.push('\n');

    // (d) recent activity
    let _ = writeln!(
        prompt,
        "=== RECENT WORKOUTS (last 7 days) ===\n{}",
        request.recent_activities_summary
    );
    prompt.push('\n');

    // (e) template for the chosen discipline and tier
    let _ = writeln!(
        prompt,
        "=== PLANNED SESSION ===\nDiscipline: {}\nIntensity: {}\nTemplate:\n{}",
        request.discipline,
        request.intensity_tier.as_str(),
        template.render(request.intensity_tier)
    );
    prompt.push('\n');

    // (f) output contract
    prompt.push_str(
        "=== OUTPUT FORMAT ===\n\
         Write the session as plain text with exactly these labeled sections:\n\
         Option A: <short title>\n<detailed steps, target heart-rate zones, duration>\n\n\
         Option B: <short title>\n<a distinct alternative with the same training intent>\n\n\
         Backup (low energy): <a minimal variant for a bad day>\n\n\
         Start directly with 'Option A'. No preamble, no markdown fences.\n",
    );

    prompt
}

impl crate::models::HealthSnapshot {
    /// Lowercase tier label for prompt text
    #[must_use]
    pub fn recovery_tier_label(&self) -> &'static str {
        match self.recovery_tier {
            crate::models::RecoveryTier::Excellent => "excellent",
            crate::models::RecoveryTier::Good => "good",
            crate::models::RecoveryTier::Fair => "fair",
            crate::models::RecoveryTier::Poor => "poor",
            crate::models::RecoveryTier::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemplateCatalog;
    use crate::models::{Discipline, HealthSnapshot, IntensityTier, RecoveryTier};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn request() -> PlanRequest {
        PlanRequest {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            discipline: Discipline::Run,
            intensity_tier: IntensityTier::Normal,
            slot_start: Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
            duration_minutes: 50,
            recent_activities_summary: "No recent workouts".into(),
            health: HealthSnapshot {
                date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                sleep_hours: Some(7.2),
                sleep_quality: Some(81.0),
                stress_level: Some(28.0),
                recovery_score: Some(74.0),
                resting_hr_baseline: Some(52.0),
                stress_baseline: Some(31.0),
                training_load_48h: 120.0,
                recovery_tier: RecoveryTier::Good,
            },
        }
    }

    #[test]
    fn sections_appear_in_stable_order() {
        let goals = GoalsConfig::from_yaml_str(
            "weekly_structure:\n  run_sessions: 2\npreferences:\n  preferred_workout_time: morning\n  morning_hours: [6, 9]\n  evening_hours: [17, 21]\n  user_timezone: UTC\n",
        )
        .unwrap();
        let catalog = TemplateCatalog::default();
        let template = catalog.for_discipline(Discipline::Run).unwrap();

        let prompt = build_prompt(&request(), &goals, template);

        let order = [
            "workout planning assistant",
            "=== WEEKLY GOALS ===",
            "=== TODAY'S HEALTH ===",
            "=== RECENT WORKOUTS (last 7 days) ===",
            "=== PLANNED SESSION ===",
            "=== OUTPUT FORMAT ===",
        ];
        let mut last = 0;
        for marker in order {
            let idx = prompt.find(marker).unwrap_or_else(|| panic!("missing {marker}"));
            assert!(idx >= last, "{marker} out of order");
            last = idx;
        }
        assert!(prompt.contains("Recovery: good (score: 74/100)"));
        assert!(prompt.contains("Zone 2 (130-145 bpm)"));
    }
}
