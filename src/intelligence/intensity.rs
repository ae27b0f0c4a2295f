// ABOUTME: Intensity tier selection as a pure decision table
// ABOUTME: Keyed by recovery tier and discipline, with an acute-load downshift
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Intensity selection.
//!
//! The tier is a tagged variant chosen by a decision table rather than
//! free-form rules:
//!
//! | recovery  | run/bike | strength/swim |
//! |-----------|----------|---------------|
//! | poor      | reduced  | reduced       |
//! | fair      | reduced  | normal        |
//! | good      | normal   | normal        |
//! | excellent | normal   | normal        |
//!
//! When the 48-hour training load exceeds the configured ceiling, the result
//! shifts one tier down.

use crate::models::{Discipline, IntensityTier, RecoveryTier};

/// Select the intensity tier for a discipline given the recovery state
///
/// `Unknown` recovery is treated as the neutral `good`; the caller flags that
/// substitution in the audit entry.
#[must_use]
pub fn select_tier(
    recovery: RecoveryTier,
    discipline: Discipline,
    training_load_48h: f64,
    load_ceiling: f64,
) -> IntensityTier {
    let base = match (recovery, discipline) {
        (RecoveryTier::Poor, _) => IntensityTier::Reduced,
        (RecoveryTier::Fair, Discipline::Run | Discipline::Bike) => IntensityTier::Reduced,
        _ => IntensityTier::Normal,
    };

    if training_load_48h > load_ceiling {
        base.downshift()
    } else {
        base
    }
}
