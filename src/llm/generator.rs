// ABOUTME: Workout content generation with model fallback chain and sanitization
// ABOUTME: Parses Option A/B sections, injects backups, falls back to the template
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Content generator.
//!
//! For each model in the configured chain, invoke with the model's per-call
//! timeout and classify the result: a parseable body wins; network, timeout,
//! and quota failures advance to the next model, as do non-parseable bodies.
//! After exhausting the chain, the template is rendered verbatim and the plan
//! is flagged `degraded`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{GoalsConfig, TemplateCatalog, WorkoutTemplate};
use crate::constants::llm::{MAX_DESCRIPTION_CHARS, TRUNCATION_MARKER};
use crate::errors::{AppResult, ErrorCode};
use crate::llm::prompts::build_prompt;
use crate::llm::{LmClient, ModelSpec};
use crate::models::{PlanRequest, WorkoutOption, WorkoutPlan};

/// Generator over an LM client and a model fallback chain
pub struct WorkoutGenerator {
    client: Arc<dyn LmClient>,
    chain: Vec<ModelSpec>,
}

impl WorkoutGenerator {
    /// Create a generator with the configured model chain (primary first)
    #[must_use]
    pub fn new(client: Arc<dyn LmClient>, chain: Vec<ModelSpec>) -> Self {
        Self { client, chain }
    }

    /// Generate a workout plan for one request
    ///
    /// Never fails on model trouble: chain exhaustion produces the
    /// deterministic template-only fallback with `degraded = true`.
    ///
    /// # Errors
    ///
    /// Returns an error only when the LM endpoint rejects credentials
    /// (permission failures are fatal for the cycle) or the template for the
    /// requested discipline is missing.
    pub async fn generate(
        &self,
        request: &PlanRequest,
        goals: &GoalsConfig,
        templates: &TemplateCatalog,
    ) -> AppResult<WorkoutPlan> {
        let template = templates.for_discipline(request.discipline)?;
        let prompt = build_prompt(request, goals, template);

        for model in &self.chain {
            let outcome = tokio::time::timeout(
                model.timeout(),
                self.client.generate(&prompt, model),
            )
            .await;

            let raw = match outcome {
                Ok(Ok(text)) => text,
                Ok(Err(err)) if err.code == ErrorCode::PermissionDenied => return Err(err),
                Ok(Err(err)) => {
                    warn!(model = %model.name, %err, "model failed, trying next");
                    continue;
                }
                Err(_) => {
                    warn!(
                        model = %model.name,
                        timeout_secs = model.timeout().as_secs(),
                        "model timed out, trying next"
                    );
                    continue;
                }
            };

            match parse_workout(&sanitize(&raw)) {
                Some((option_a, option_b, backup)) => {
                    info!(model = %model.name, date = %request.date, "generated workout");
                    return Ok(WorkoutPlan {
                        option_a,
                        option_b,
                        backup: backup.unwrap_or_else(|| {
                            template.render(crate::models::IntensityTier::Backup)
                        }),
                        model: Some(model.name.clone()),
                        degraded: false,
                    });
                }
                None => {
                    warn!(model = %model.name, "non-parseable body, trying next");
                }
            }
        }

        warn!(date = %request.date, "all models failed; using template fallback");
        Ok(Self::template_fallback(request, template))
    }

    /// Deterministic template-only plan used when every model failed
    fn template_fallback(request: &PlanRequest, template: &WorkoutTemplate) -> WorkoutPlan {
        let tier = request.intensity_tier;
        let secondary = if tier == crate::models::IntensityTier::Backup {
            tier
        } else {
            tier.downshift()
        };
        WorkoutPlan {
            option_a: WorkoutOption {
                title: format!(
                    "{} session ({})",
                    request.discipline.display_name(),
                    tier.as_str()
                ),
                detail: template.render(tier),
            },
            option_b: WorkoutOption {
                title: format!(
                    "{} session ({})",
                    request.discipline.display_name(),
                    secondary.as_str()
                ),
                detail: template.render(secondary),
            },
            backup: template.render(crate::models::IntensityTier::Backup),
            model: None,
            degraded: true,
        }
    }
}

impl WorkoutPlan {
    /// Render the description persisted in the calendar event
    ///
    /// Always contains the `Option A`, `Option B`, and `Backup (low energy)`
    /// sections; output longer than the hard ceiling is truncated with an
    /// ellipsis marker.
    #[must_use]
    pub fn render_description(&self) -> String {
        let text = format!(
            "Option A: {}\n{}\n\nOption B: {}\n{}\n\nBackup (low energy):\n{}",
            self.option_a.title,
            self.option_a.detail,
            self.option_b.title,
            self.option_b.detail,
            self.backup,
        );
        truncate_description(text)
    }

    /// Event summary: `[AI Workout] <discipline>: <Option A title>`
    #[must_use]
    pub fn render_summary(&self, discipline: crate::models::Discipline) -> String {
        format!(
            "{} {}: {}",
            crate::constants::planning::PLANNED_SUMMARY_PREFIX,
            discipline,
            self.option_a.title
        )
    }
}

/// Strip fences and preambles so parsing sees the labeled sections first
///
/// Removes enclosing Markdown fences, then drops everything before the first
/// `Option A` or `# ` heading (this discards "Here's your workout..." style
/// preambles).
#[must_use]
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();

    // Enclosing fences, with or without a language hint
    if text.starts_with("```") {
        if let Some(first_newline) = text.find('\n') {
            text = &text[first_newline + 1..];
        }
        if let Some(stripped) = text.trim_end().strip_suffix("```") {
            text = stripped;
        }
    }
    let text = text.trim();

    let option_idx = text.find("Option A");
    let heading_idx = text
        .lines()
        .scan(0usize, |offset, line| {
            let start = *offset;
            *offset += line.len() + 1;
            Some((start, line))
        })
        .find(|(_, line)| line.trim_start().starts_with("# "))
        .map(|(start, _)| start);

    let cut = match (option_idx, heading_idx) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    cut.map_or_else(|| text.to_owned(), |idx| text[idx..].to_owned())
}

/// Parse the sanitized body into the two options and an optional backup
///
/// Both `Option A` and `Option B` must be present, in that order; otherwise
/// the body is non-parseable and the caller advances the model chain.
#[must_use]
pub fn parse_workout(text: &str) -> Option<(WorkoutOption, WorkoutOption, Option<String>)> {
    let a_idx = text.find("Option A")?;
    let b_idx = text[a_idx..].find("Option B").map(|i| i + a_idx)?;
    let backup_idx = text[b_idx..].find("Backup").map(|i| i + b_idx);

    let a_section = &text[a_idx..b_idx];
    let b_section = backup_idx.map_or(&text[b_idx..], |idx| &text[b_idx..idx]);

    let option_a = parse_option(a_section, "Option A")?;
    let option_b = parse_option(b_section, "Option B")?;

    let backup = backup_idx.map(|idx| {
        let section = &text[idx..];
        match section.split_once('\n') {
            Some((head, rest)) => {
                let head = strip_backup_label(head);
                if head.is_empty() {
                    rest.trim().to_owned()
                } else {
                    format!("{head}\n{}", rest.trim()).trim().to_owned()
                }
            }
            None => strip_backup_label(section),
        }
    });

    Some((option_a, option_b, backup.filter(|b| !b.is_empty())))
}

/// Split one option section into title (heading remainder) and detail body
fn parse_option(section: &str, label: &str) -> Option<WorkoutOption> {
    let (head, rest) = section.split_once('\n').unwrap_or((section, ""));
    let title = strip_label(head, label);
    let detail = rest.trim().to_owned();
    if title.is_empty() && detail.is_empty() {
        return None;
    }
    Some(WorkoutOption {
        title: if title.is_empty() {
            format!("{label} workout")
        } else {
            title
        },
        detail,
    })
}

/// Remove the section label and surrounding markup from a heading line
fn strip_label(line: &str, label: &str) -> String {
    let after = line
        .find(label)
        .map_or(line, |idx| &line[idx + label.len()..]);
    after
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '*' | '#' | '(' | ')')
        })
        .to_owned()
}

/// Like [`strip_label`] for the backup heading, which may carry a
/// parenthesized qualifier such as `Backup (low energy):`
fn strip_backup_label(line: &str) -> String {
    let after = line
        .find("Backup")
        .map_or(line, |idx| &line[idx + "Backup".len()..]);
    let after = after.trim_start();
    let after = if after.starts_with('(') {
        after.split_once(')').map_or(after, |(_, rest)| rest)
    } else {
        after
    };
    after
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '*' | '#')
        })
        .to_owned()
}

/// Enforce the hard description-length ceiling
fn truncate_description(text: String) -> String {
    if text.chars().count() <= MAX_DESCRIPTION_CHARS {
        return text;
    }
    let truncated: String = text.chars().take(MAX_DESCRIPTION_CHARS - 1).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Discipline, IntensityTier};

    const VALID_BODY: &str = "Option A: Tempo Run\n\
        10 min warmup, 25 min at tempo, 5 min cooldown. Zone 3.\n\n\
        Option B: Hill Repeats\n\
        10 min warmup, 6x90s uphill strong, jog down, 10 min easy.\n\n\
        Backup (low energy): 20 min easy jog or brisk walk.";

    #[test]
    fn sanitize_strips_fences_and_preamble() {
        let raw = "Here's your workout for tomorrow!\n\n```markdown\nOption A: Easy Spin\nride easy\n\nOption B: Rollers\nride hills\n```";
        let clean = sanitize(raw);
        assert!(clean.starts_with("Option A"));
        assert!(!clean.contains("```"));
        assert!(!clean.contains("Here's"));
    }

    #[test]
    fn sanitize_keeps_heading_led_bodies() {
        let raw = "Some chatter first.\n# Today's Session\nOption A: X\nstuff\nOption B: Y\nmore";
        let clean = sanitize(raw);
        assert!(clean.starts_with("# Today's Session"));
    }

    #[test]
    fn parse_extracts_titles_and_details() {
        let (a, b, backup) = parse_workout(VALID_BODY).unwrap();
        assert_eq!(a.title, "Tempo Run");
        assert!(a.detail.contains("25 min at tempo"));
        assert_eq!(b.title, "Hill Repeats");
        assert!(b.detail.contains("6x90s uphill"));
        assert_eq!(backup.unwrap(), "20 min easy jog or brisk walk.");
    }

    #[test]
    fn parse_requires_both_options() {
        assert!(parse_workout("Option A: only one\nsome detail").is_none());
        assert!(parse_workout("no options at all").is_none());
    }

    #[test]
    fn parse_tolerates_markdown_headings() {
        let body = "## Option A — Long Ride\nsteady 90 min\n\n## Option B — Indoor Trainer\n60 min sweet spot";
        let (a, b, backup) = parse_workout(body).unwrap();
        assert_eq!(a.title, "Long Ride");
        assert_eq!(b.title, "Indoor Trainer");
        assert!(backup.is_none());
    }

    #[test]
    fn description_contains_contract_sections() {
        let (option_a, option_b, backup) = parse_workout(VALID_BODY).unwrap();
        let plan = WorkoutPlan {
            option_a,
            option_b,
            backup: backup.unwrap(),
            model: Some("test-model".into()),
            degraded: false,
        };
        let description = plan.render_description();
        assert!(description.contains("Option A"));
        assert!(description.contains("Option B"));
        assert!(description.contains("Backup (low energy)"));
    }

    #[test]
    fn summary_carries_prefix_discipline_and_title() {
        let (option_a, option_b, _) = parse_workout(VALID_BODY).unwrap();
        let plan = WorkoutPlan {
            option_a,
            option_b,
            backup: "walk".into(),
            model: None,
            degraded: false,
        };
        assert_eq!(
            plan.render_summary(Discipline::Run),
            "[AI Workout] run: Tempo Run"
        );
    }

    #[test]
    fn oversized_description_is_truncated_with_marker() {
        let plan = WorkoutPlan {
            option_a: WorkoutOption {
                title: "A".into(),
                detail: "x".repeat(9_000),
            },
            option_b: WorkoutOption {
                title: "B".into(),
                detail: "y".into(),
            },
            backup: "z".into(),
            model: None,
            degraded: false,
        };
        let description = plan.render_description();
        assert_eq!(description.chars().count(), MAX_DESCRIPTION_CHARS);
        assert!(description.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn tier_downshift_feeds_option_b_in_fallback() {
        use crate::models::{HealthSnapshot, PlanRequest, RecoveryTier};
        use chrono::{NaiveDate, TimeZone, Utc};

        let request = PlanRequest {
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            discipline: Discipline::Run,
            intensity_tier: IntensityTier::Normal,
            slot_start: Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap(),
            duration_minutes: 50,
            recent_activities_summary: String::new(),
            health: HealthSnapshot {
                date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
                sleep_hours: None,
                sleep_quality: None,
                stress_level: None,
                recovery_score: None,
                resting_hr_baseline: None,
                stress_baseline: None,
                training_load_48h: 0.0,
                recovery_tier: RecoveryTier::Unknown,
            },
        };
        let catalog = crate::config::TemplateCatalog::default();
        let template = catalog.for_discipline(Discipline::Run).unwrap();

        let plan = WorkoutGenerator::template_fallback(&request, template);
        assert!(plan.degraded);
        assert!(plan.model.is_none());
        assert!(plan.option_a.detail.contains("35 min steady run"));
        assert!(plan.option_b.detail.contains("20 min easy run"));
        assert!(plan.backup.contains("15 min brisk walk"));

        let description = plan.render_description();
        assert!(description.contains("Option A"));
        assert!(description.contains("Option B"));
        assert!(description.contains("Backup (low energy)"));
    }
}
