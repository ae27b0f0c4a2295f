// ABOUTME: Per-discipline workout templates with main-set variants by intensity tier
// ABOUTME: Built-in defaults plus optional YAML overrides
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::models::{Discipline, IntensityTier};

/// One intensity variant of a workout recipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierVariant {
    /// Main-set description
    pub main_set: String,
    /// Total workout duration in minutes (warmup and cooldown included)
    pub duration_minutes: u32,
    /// Target heart-rate zone text, when applicable
    #[serde(default)]
    pub target_zone: Option<String>,
}

/// Structured recipe for one discipline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutTemplate {
    /// Warmup description shared by all tiers
    pub warmup: String,
    /// Cooldown description shared by all tiers
    pub cooldown: String,
    /// Full planned load
    pub normal: TierVariant,
    /// Shortened / lower-intensity variant
    pub reduced: TierVariant,
    /// Minimal low-energy variant
    pub backup: TierVariant,
}

impl WorkoutTemplate {
    /// The variant for a given intensity tier
    #[must_use]
    pub const fn variant(&self, tier: IntensityTier) -> &TierVariant {
        match tier {
            IntensityTier::Normal => &self.normal,
            IntensityTier::Reduced => &self.reduced,
            IntensityTier::Backup => &self.backup,
        }
    }

    /// Render the template as plain workout text for the given tier
    #[must_use]
    pub fn render(&self, tier: IntensityTier) -> String {
        let variant = self.variant(tier);
        let zone = variant
            .target_zone
            .as_deref()
            .map(|z| format!("Target: {z}\n"))
            .unwrap_or_default();
        format!(
            "Warmup: {}\nMain set: {}\n{zone}Cooldown: {}\nDuration: {} min",
            self.warmup, variant.main_set, self.cooldown, variant.duration_minutes
        )
    }
}

/// Catalog of workout templates keyed by discipline
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<Discipline, WorkoutTemplate>,
}

impl TemplateCatalog {
    /// Load the catalog from a YAML file, falling back to defaults for any
    /// discipline the file does not mention
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file exists but cannot be parsed.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|err| {
            AppError::config(format!(
                "cannot read template file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse the catalog from a YAML string, merged over the defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` on parse failure.
    pub fn from_yaml_str(text: &str) -> AppResult<Self> {
        let overrides: HashMap<Discipline, WorkoutTemplate> = serde_yaml::from_str(text)?;
        let mut catalog = Self::default();
        catalog.templates.extend(overrides);
        Ok(catalog)
    }

    /// Template for a discipline
    ///
    /// # Errors
    ///
    /// Returns `ConfigMissing` when no template exists; the built-in defaults
    /// cover every plannable discipline, so this only fires for `Other`.
    pub fn for_discipline(&self, discipline: Discipline) -> AppResult<&WorkoutTemplate> {
        self.templates
            .get(&discipline)
            .ok_or_else(|| AppError::config_missing(format!("template for {discipline}")))
    }

    /// Workout duration for a discipline and tier
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::for_discipline`].
    pub fn duration_minutes(
        &self,
        discipline: Discipline,
        tier: IntensityTier,
    ) -> AppResult<u32> {
        Ok(self.for_discipline(discipline)?.variant(tier).duration_minutes)
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        let mut templates = HashMap::new();

        templates.insert(
            Discipline::Run,
            WorkoutTemplate {
                warmup: "10 min easy jog, 4x20s strides".into(),
                cooldown: "5 min walk, calf and hip-flexor stretches".into(),
                normal: TierVariant {
                    main_set: "35 min steady run at conversational pace".into(),
                    duration_minutes: 50,
                    target_zone: Some("Zone 2 (130-145 bpm)".into()),
                },
                reduced: TierVariant {
                    main_set: "20 min easy run, walk breaks as needed".into(),
                    duration_minutes: 35,
                    target_zone: Some("Zone 1-2 (<135 bpm)".into()),
                },
                backup: TierVariant {
                    main_set: "15 min brisk walk or very easy jog".into(),
                    duration_minutes: 20,
                    target_zone: Some("Zone 1 (<120 bpm)".into()),
                },
            },
        );

        templates.insert(
            Discipline::Bike,
            WorkoutTemplate {
                warmup: "10 min easy spin, 3x30s high cadence".into(),
                cooldown: "5 min easy spin".into(),
                normal: TierVariant {
                    main_set: "45 min endurance ride, steady effort".into(),
                    duration_minutes: 60,
                    target_zone: Some("Zone 2 (125-140 bpm)".into()),
                },
                reduced: TierVariant {
                    main_set: "30 min easy ride, flat route".into(),
                    duration_minutes: 45,
                    target_zone: Some("Zone 1-2 (<130 bpm)".into()),
                },
                backup: TierVariant {
                    main_set: "20 min recovery spin, minimal resistance".into(),
                    duration_minutes: 25,
                    target_zone: Some("Zone 1 (<115 bpm)".into()),
                },
            },
        );

        templates.insert(
            Discipline::Swim,
            WorkoutTemplate {
                warmup: "200m easy freestyle, 4x50m drills".into(),
                cooldown: "100m easy backstroke".into(),
                normal: TierVariant {
                    main_set: "10x100m freestyle on 20s rest".into(),
                    duration_minutes: 45,
                    target_zone: None,
                },
                reduced: TierVariant {
                    main_set: "6x100m freestyle on 30s rest, easy pace".into(),
                    duration_minutes: 35,
                    target_zone: None,
                },
                backup: TierVariant {
                    main_set: "400m continuous easy swim, any stroke".into(),
                    duration_minutes: 25,
                    target_zone: None,
                },
            },
        );

        templates.insert(
            Discipline::Strength,
            WorkoutTemplate {
                warmup: "5 min rowing, dynamic mobility circuit".into(),
                cooldown: "5 min stretching, focus on worked muscle groups".into(),
                normal: TierVariant {
                    main_set: "Squat 4x6, bench 4x6, row 4x8, core circuit".into(),
                    duration_minutes: 60,
                    target_zone: None,
                },
                reduced: TierVariant {
                    main_set: "Squat 3x8 light, push-ups 3x12, row 3x10".into(),
                    duration_minutes: 45,
                    target_zone: None,
                },
                backup: TierVariant {
                    main_set: "Bodyweight circuit: squats, push-ups, planks, 2 rounds".into(),
                    duration_minutes: 25,
                    target_zone: None,
                },
            },
        );

        Self { templates }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_plannable_discipline() {
        let catalog = TemplateCatalog::default();
        for discipline in Discipline::PLANNABLE {
            assert!(catalog.for_discipline(discipline).is_ok(), "{discipline}");
        }
        assert!(catalog.for_discipline(Discipline::Other).is_err());
    }

    #[test]
    fn durations_shrink_with_tier() {
        let catalog = TemplateCatalog::default();
        for discipline in Discipline::PLANNABLE {
            let normal = catalog
                .duration_minutes(discipline, IntensityTier::Normal)
                .unwrap();
            let reduced = catalog
                .duration_minutes(discipline, IntensityTier::Reduced)
                .unwrap();
            let backup = catalog
                .duration_minutes(discipline, IntensityTier::Backup)
                .unwrap();
            assert!(normal > reduced && reduced > backup, "{discipline}");
        }
    }

    #[test]
    fn yaml_override_replaces_only_named_disciplines() {
        let yaml = r"
run:
  warmup: 'short jog'
  cooldown: 'walk'
  normal: { main_set: 'tempo 30', duration_minutes: 40 }
  reduced: { main_set: 'easy 20', duration_minutes: 30 }
  backup: { main_set: 'walk 15', duration_minutes: 15 }
";
        let catalog = TemplateCatalog::from_yaml_str(yaml).unwrap();
        assert_eq!(
            catalog
                .duration_minutes(Discipline::Run, IntensityTier::Normal)
                .unwrap(),
            40
        );
        // Untouched discipline keeps the default
        assert_eq!(
            catalog
                .duration_minutes(Discipline::Strength, IntensityTier::Normal)
                .unwrap(),
            60
        );
    }

    #[test]
    fn render_includes_all_sections() {
        let catalog = TemplateCatalog::default();
        let text = catalog
            .for_discipline(Discipline::Run)
            .unwrap()
            .render(IntensityTier::Normal);
        assert!(text.contains("Warmup:"));
        assert!(text.contains("Main set:"));
        assert!(text.contains("Cooldown:"));
        assert!(text.contains("Duration: 50 min"));
    }
}
