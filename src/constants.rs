// ABOUTME: Named defaults, limits, and scoring weights for the scheduling engine
// ABOUTME: Single source of truth for planner cadence, retry policy, and recovery blend
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Centralized constants. Values that a deployment may want to tune live in
//! the goals configuration; values listed here are engine-level defaults.

/// Planning defaults
pub mod planning {
    /// Forward horizon in days the planner considers per cycle
    pub const DEFAULT_HORIZON_DAYS: u32 = 3;

    /// Trailing window in days the reconciler examines per cycle
    pub const DEFAULT_RECONCILE_DAYS: u32 = 7;

    /// Maximum range, in days, for a single calendar read
    pub const MAX_LIST_RANGE_DAYS: i64 = 90;

    /// Summary prefix carried by every planner-owned event
    pub const PLANNED_SUMMARY_PREFIX: &str = "[AI Workout]";

    /// Summary prefix applied when a matching activity was recorded
    pub const DONE_SUMMARY_PREFIX: &str = "[✓ Done]";

    /// Summary prefix applied when no matching activity was recorded
    pub const MISSED_SUMMARY_PREFIX: &str = "[✗ Missed]";

    /// Tag prefix identifying planner-owned events on round-trips
    pub const DISCIPLINE_TAG_PREFIX: &str = "workout:";
}

/// Safety limits enforced by the orchestrator
pub mod safety {
    /// Maximum calendar mutations per cycle before buffering
    pub const DEFAULT_MAX_MUTATIONS_PER_CYCLE: u32 = 8;

    /// Minimum notice, in hours, before a planned event may be rescheduled
    pub const DEFAULT_MIN_NOTICE_HOURS: i64 = 2;

    /// Cycle-wide deadline in seconds
    pub const DEFAULT_CYCLE_DEADLINE_SECS: u64 = 600;

    /// Bounded fan-out for concurrent LM generation
    pub const DEFAULT_LM_CONCURRENCY: usize = 2;
}

/// Retry policy for transient external failures
pub mod retry {
    /// Maximum attempts (initial call plus retries)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Base backoff delay in milliseconds
    pub const BASE_BACKOFF_MS: u64 = 1_000;

    /// Exponential backoff factor
    pub const BACKOFF_FACTOR: u64 = 2;

    /// Jitter applied to each backoff delay, as a fraction (±20%)
    pub const JITTER_FRACTION: f64 = 0.2;
}

/// LM generation defaults
pub mod llm {
    /// Per-call timeout for local models (seconds)
    pub const LOCAL_MODEL_TIMEOUT_SECS: u64 = 120;

    /// Per-call timeout for cloud models (seconds)
    pub const CLOUD_MODEL_TIMEOUT_SECS: u64 = 30;

    /// Hard ceiling on persisted workout description length
    pub const MAX_DESCRIPTION_CHARS: usize = 8_000;

    /// Marker appended when a description is truncated
    pub const TRUNCATION_MARKER: &str = "…";
}

/// Recovery scoring constants
pub mod recovery {
    /// Weights of the recovery blend, in component order:
    /// sleep quality, HRV (baseline-tuned), resting HR (baseline-tuned),
    /// inverted stress, inverted normalized 48-hour training load.
    ///
    /// Single authoritative weight set; must sum to 1.0.
    pub const RECOVERY_BLEND_WEIGHTS: [f64; 5] = [0.35, 0.25, 0.20, 0.15, 0.10];

    /// Minimum score for the `excellent` tier
    pub const EXCELLENT_THRESHOLD: f64 = 80.0;

    /// Minimum score for the `good` tier
    pub const GOOD_THRESHOLD: f64 = 60.0;

    /// Minimum score for the `fair` tier (below is `poor`)
    pub const FAIR_THRESHOLD: f64 = 40.0;

    /// Rolling baseline window for resting HR and stress medians (days)
    pub const BASELINE_WINDOW_DAYS: i64 = 7;

    /// Window for the acute training-load sum (hours)
    pub const ACUTE_LOAD_WINDOW_HOURS: i64 = 48;

    /// Samples older than this, relative to the reference date, yield an
    /// `unknown` recovery tier (hours)
    pub const SNAPSHOT_STALENESS_HOURS: i64 = 48;

    /// Training load treated as a 100% acute-load reading when normalizing
    pub const LOAD_NORMALIZATION_CEILING: f64 = 600.0;
}

/// Reconciliation matching windows
pub mod reconcile {
    /// Minutes before a planned start an activity may still match
    pub const MATCH_BEFORE_MINUTES: i64 = 30;

    /// Minutes after a planned end an activity may still match
    pub const MATCH_AFTER_MINUTES: i64 = 90;
}

#[cfg(test)]
mod tests {
    use super::recovery::RECOVERY_BLEND_WEIGHTS;

    #[test]
    fn recovery_blend_weights_sum_to_one() {
        let sum: f64 = RECOVERY_BLEND_WEIGHTS.iter().sum();
        assert!((sum - 1.0).abs() < f64::EPSILON * 8.0);
    }
}
