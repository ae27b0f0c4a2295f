// ABOUTME: Declarative training-goal configuration with weekly targets and preferences
// ABOUTME: YAML loading, range validation, and discipline priority resolution
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::constants::{planning, safety};
use crate::errors::{AppError, AppResult};
use crate::llm::ModelSpec;
use crate::models::Discipline;

/// Preferred-time policy for workout placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePolicy {
    /// Morning window only
    Morning,
    /// Evening window only
    Evening,
    /// Preferred window first, alternate window as fallback
    Flexible,
}

/// Weekly target session counts per discipline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyStructure {
    /// Swim sessions per week
    #[serde(default)]
    pub swim_sessions: u32,
    /// Bike sessions per week
    #[serde(default)]
    pub bike_sessions: u32,
    /// Run sessions per week
    #[serde(default)]
    pub run_sessions: u32,
    /// Strength sessions per week
    #[serde(default)]
    pub strength_sessions: u32,
}

impl WeeklyStructure {
    /// Target count for a discipline (`Other` is never targeted)
    #[must_use]
    pub const fn target_for(&self, discipline: Discipline) -> u32 {
        match discipline {
            Discipline::Swim => self.swim_sessions,
            Discipline::Bike => self.bike_sessions,
            Discipline::Run => self.run_sessions,
            Discipline::Strength => self.strength_sessions,
            Discipline::Other => 0,
        }
    }

    /// Whether every weekly target is zero
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.swim_sessions == 0
            && self.bike_sessions == 0
            && self.run_sessions == 0
            && self.strength_sessions == 0
    }
}

/// Scheduling preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    /// Which window to try first
    pub preferred_workout_time: TimePolicy,
    /// Morning window `[start_hour, end_hour)` in local time
    pub morning_hours: [u8; 2],
    /// Evening window `[start_hour, end_hour)` in local time
    pub evening_hours: [u8; 2],
    /// IANA timezone the user lives in
    pub user_timezone: String,
}

/// Safety limits enforced by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum calendar mutations per cycle
    #[serde(default = "SafetyLimits::default_max_mutations")]
    pub max_mutations_per_cycle: u32,
    /// Minimum notice, in hours, before a planned event may be disturbed
    #[serde(default = "SafetyLimits::default_min_notice")]
    pub min_notice_hours: i64,
    /// Cycle-wide deadline in seconds
    #[serde(default = "SafetyLimits::default_deadline")]
    pub cycle_deadline_secs: u64,
    /// Bounded fan-out for concurrent LM generation
    #[serde(default = "SafetyLimits::default_lm_concurrency")]
    pub lm_concurrency: usize,
}

impl SafetyLimits {
    const fn default_max_mutations() -> u32 {
        safety::DEFAULT_MAX_MUTATIONS_PER_CYCLE
    }

    const fn default_min_notice() -> i64 {
        safety::DEFAULT_MIN_NOTICE_HOURS
    }

    const fn default_deadline() -> u64 {
        safety::DEFAULT_CYCLE_DEADLINE_SECS
    }

    const fn default_lm_concurrency() -> usize {
        safety::DEFAULT_LM_CONCURRENCY
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_mutations_per_cycle: Self::default_max_mutations(),
            min_notice_hours: Self::default_min_notice(),
            cycle_deadline_secs: Self::default_deadline(),
            lm_concurrency: Self::default_lm_concurrency(),
        }
    }
}

/// The declarative goals document
///
/// Unknown keys are ignored. Missing required keys (`weekly_structure`,
/// `preferences`) or out-of-range values abort loading with a descriptive
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalsConfig {
    /// Weekly target counts per discipline
    pub weekly_structure: WeeklyStructure,
    /// Window and timezone preferences
    pub preferences: Preferences,
    /// Events matching any of these keywords are never touched
    #[serde(default)]
    pub protected_keywords: Vec<String>,
    /// Orchestrator safety limits
    #[serde(default)]
    pub safety: SafetyLimits,
    /// Discipline priority order; defaults to strength > run > bike > swim
    #[serde(default)]
    pub priority: Vec<Discipline>,
    /// 48-hour training-load ceiling above which intensity is downshifted
    #[serde(default = "GoalsConfig::default_load_ceiling")]
    pub training_load_ceiling_48h: f64,
    /// Forward planning horizon in days
    #[serde(default = "GoalsConfig::default_horizon")]
    pub horizon_days: u32,
    /// Ordered LM model chain (primary first)
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

impl GoalsConfig {
    const fn default_load_ceiling() -> f64 {
        300.0
    }

    const fn default_horizon() -> u32 {
        planning::DEFAULT_HORIZON_DAYS
    }

    /// Load and validate the goals document from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file is unreadable or unparseable, and
    /// `ConfigInvalid` when a value is out of range.
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(format!("cannot read goals file {}: {err}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate the goals document from a YAML string
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::load`].
    pub fn from_yaml_str(text: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` describing the first violation found.
    pub fn validate(&self) -> AppResult<()> {
        Self::validate_window("morning_hours", self.preferences.morning_hours)?;
        Self::validate_window("evening_hours", self.preferences.evening_hours)?;

        self.timezone()?;

        for discipline in &self.priority {
            if *discipline == Discipline::Other {
                return Err(AppError::config_invalid(
                    "priority list may only contain run, bike, swim, strength",
                ));
            }
        }

        if self.horizon_days == 0 {
            return Err(AppError::config_invalid("horizon_days must be at least 1"));
        }
        if self.safety.lm_concurrency == 0 {
            return Err(AppError::config_invalid(
                "safety.lm_concurrency must be at least 1",
            ));
        }

        Ok(())
    }

    fn validate_window(name: &str, window: [u8; 2]) -> AppResult<()> {
        let [start, end] = window;
        if start >= end || end > 24 {
            return Err(AppError::config_invalid(format!(
                "{name} must satisfy 0 <= start < end <= 24, got [{start}, {end})"
            )));
        }
        Ok(())
    }

    /// Parsed user timezone
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` when the zone string is not a known IANA zone.
    pub fn timezone(&self) -> AppResult<Tz> {
        self.preferences
            .user_timezone
            .parse::<Tz>()
            .map_err(|_| {
                AppError::config_invalid(format!(
                    "unknown IANA timezone: {}",
                    self.preferences.user_timezone
                ))
            })
    }

    /// Discipline priority order: configured, or the built-in default
    #[must_use]
    pub fn priority_order(&self) -> Vec<Discipline> {
        if self.priority.is_empty() {
            Discipline::PLANNABLE.to_vec()
        } else {
            let mut order = self.priority.clone();
            // Append any plannable discipline the config left out so a target
            // without a priority entry is still reachable
            for d in Discipline::PLANNABLE {
                if !order.contains(&d) {
                    order.push(d);
                }
            }
            order
        }
    }

    /// Preferred window hours for the configured policy
    #[must_use]
    pub const fn preferred_window(&self) -> [u8; 2] {
        match self.preferences.preferred_workout_time {
            TimePolicy::Morning | TimePolicy::Flexible => self.preferences.morning_hours,
            TimePolicy::Evening => self.preferences.evening_hours,
        }
    }

    /// Alternate window hours, used under the `flexible` policy
    #[must_use]
    pub const fn alternate_window(&self) -> [u8; 2] {
        match self.preferences.preferred_workout_time {
            TimePolicy::Morning | TimePolicy::Flexible => self.preferences.evening_hours,
            TimePolicy::Evening => self.preferences.morning_hours,
        }
    }
}
