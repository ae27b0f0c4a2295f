// ABOUTME: Configuration module for training goals and workout templates
// ABOUTME: Typed YAML-backed configuration with fail-fast validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Declarative configuration.
//!
//! Two documents drive the scheduler: the goals file (weekly targets,
//! preferred windows, safety limits) and the optional template catalog
//! (per-discipline workout recipes). Unknown keys are ignored; missing
//! required keys and out-of-range values fail fast with a descriptive error.

mod goals;
mod templates;

pub use goals::{GoalsConfig, Preferences, SafetyLimits, TimePolicy, WeeklyStructure};
pub use templates::{TemplateCatalog, TierVariant, WorkoutTemplate};
