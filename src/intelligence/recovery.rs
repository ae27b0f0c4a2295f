// ABOUTME: Health snapshot derivation: rolling baselines, acute load, recovery blend
// ABOUTME: Produces the recovery tier that drives intensity selection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Recovery scoring.
//!
//! Combines the most recent health sample with 7-day baselines and the acute
//! (48-hour) training load into a single blended score, then classifies it
//! into a discrete tier. The blend weights live in
//! [`crate::constants::recovery::RECOVERY_BLEND_WEIGHTS`].

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::constants::recovery::{
    EXCELLENT_THRESHOLD, FAIR_THRESHOLD, GOOD_THRESHOLD, LOAD_NORMALIZATION_CEILING,
    RECOVERY_BLEND_WEIGHTS, SNAPSHOT_STALENESS_HOURS,
};
use crate::models::{Activity, HealthSample, HealthSnapshot, RecoveryTier};

/// Neutral component score used when a measurement is missing
const NEUTRAL_COMPONENT: f64 = 50.0;

/// Gain applied to relative deviation from baseline for tuned components.
/// A 20% favorable deviation saturates the component at 100.
const BASELINE_TUNING_GAIN: f64 = 250.0;

/// Derive the health snapshot for a reference date
///
/// * `latest` — most recent sample with `timestamp < D + 1 day`
/// * `window_samples` — samples from the trailing 7-day baseline window
/// * `recent_activities` — activities from the trailing 48-hour window
/// * `reference_end` — exclusive end of day `D` as a UTC instant
///
/// When no sample exists within 48 hours of `D`, the tier is `unknown`; the
/// planner treats that as `good` and flags the decision in the audit entry.
#[must_use]
pub fn derive_snapshot(
    date: NaiveDate,
    reference_end: DateTime<Utc>,
    latest: Option<&HealthSample>,
    window_samples: &[HealthSample],
    recent_activities: &[Activity],
) -> HealthSnapshot {
    let training_load_48h = recent_activities
        .iter()
        .filter_map(|a| a.training_load)
        .sum::<f64>();

    let resting_hr_baseline = median(
        window_samples
            .iter()
            .filter_map(|s| s.resting_hr)
            .collect(),
    );
    let stress_baseline = median(
        window_samples
            .iter()
            .filter_map(|s| s.stress_level)
            .collect(),
    );
    let hrv_baseline = median(window_samples.iter().filter_map(|s| s.hrv_score).collect());

    let fresh_cutoff = reference_end - Duration::hours(SNAPSHOT_STALENESS_HOURS);
    let fresh_sample = latest.filter(|s| s.timestamp >= fresh_cutoff);

    let Some(sample) = fresh_sample else {
        return HealthSnapshot {
            date,
            sleep_hours: None,
            sleep_quality: None,
            stress_level: None,
            recovery_score: None,
            resting_hr_baseline,
            stress_baseline,
            training_load_48h,
            recovery_tier: RecoveryTier::Unknown,
        };
    };

    let score = blend_score(
        sample,
        hrv_baseline,
        resting_hr_baseline,
        training_load_48h,
    );

    HealthSnapshot {
        date,
        sleep_hours: sample.sleep_duration_hours,
        sleep_quality: sample.sleep_quality_score,
        stress_level: sample.stress_level,
        recovery_score: Some(score),
        resting_hr_baseline,
        stress_baseline,
        training_load_48h,
        recovery_tier: classify(score),
    }
}

/// Weighted blend of the five recovery components
fn blend_score(
    sample: &HealthSample,
    hrv_baseline: Option<f64>,
    rhr_baseline: Option<f64>,
    training_load_48h: f64,
) -> f64 {
    let sleep_component = sample
        .sleep_quality_score
        .map_or(NEUTRAL_COMPONENT, |q| q.clamp(0.0, 100.0));

    // Higher HRV than baseline is favorable
    let hrv_component = tuned_component(sample.hrv_score, hrv_baseline, true);

    // Lower resting HR than baseline is favorable
    let rhr_component = tuned_component(sample.resting_hr, rhr_baseline, false);

    let stress_component = sample
        .stress_level
        .map_or(NEUTRAL_COMPONENT, |s| (100.0 - s).clamp(0.0, 100.0));

    let normalized_load =
        (training_load_48h / LOAD_NORMALIZATION_CEILING * 100.0).clamp(0.0, 100.0);
    let load_component = 100.0 - normalized_load;

    let [w_sleep, w_hrv, w_rhr, w_stress, w_load] = RECOVERY_BLEND_WEIGHTS;
    (w_sleep * sleep_component
        + w_hrv * hrv_component
        + w_rhr * rhr_component
        + w_stress * stress_component
        + w_load * load_component)
        .clamp(0.0, 100.0)
}

/// Linear comparison of a current value against its 7-day baseline
///
/// Maps relative deviation onto 0-100 around a neutral 50; `higher_is_better`
/// selects the favorable direction. Missing data yields the neutral score.
fn tuned_component(current: Option<f64>, baseline: Option<f64>, higher_is_better: bool) -> f64 {
    match (current, baseline) {
        (Some(current), Some(baseline)) if baseline > 0.0 => {
            let deviation = (current - baseline) / baseline;
            let signed = if higher_is_better { deviation } else { -deviation };
            (NEUTRAL_COMPONENT + signed * BASELINE_TUNING_GAIN).clamp(0.0, 100.0)
        }
        _ => NEUTRAL_COMPONENT,
    }
}

/// Classify a blended score into a recovery tier
#[must_use]
pub fn classify(score: f64) -> RecoveryTier {
    if score >= EXCELLENT_THRESHOLD {
        RecoveryTier::Excellent
    } else if score >= GOOD_THRESHOLD {
        RecoveryTier::Good
    } else if score >= FAIR_THRESHOLD {
        RecoveryTier::Fair
    } else {
        RecoveryTier::Poor
    }
}

/// Median of an unsorted value list
fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
