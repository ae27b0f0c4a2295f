// ABOUTME: Pure planning logic: recovery scoring, conflicts, budgeting, intensity, planning
// ABOUTME: No I/O in this module tree; every function is decision-table testable
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Intelligence modules.
//!
//! Everything under this module is pure: inputs are already-fetched rows and
//! configuration, outputs are decisions. The orchestrator owns all I/O.

pub mod budget;
pub mod conflict;
pub mod intensity;
pub mod planner;
pub mod recovery;

pub use budget::{remaining_quota, week_bounds};
pub use conflict::{find_free_slot, merge_busy, overlaps, window_bounds};
pub use intensity::select_tier;
pub use planner::{DayContext, DayDecision, DayOutcome, Planner, SkipReason};
pub use recovery::derive_snapshot;
