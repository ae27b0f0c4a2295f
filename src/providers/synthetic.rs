// ABOUTME: Deterministic in-memory collaborators for tests, demos, and dry runs
// ABOUTME: Synthetic calendar, health store, audit store, scripted LM, fixed clock
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Synthetic collaborators.
//!
//! Fully in-memory implementations of every collaborator trait. They back
//! the integration tests, the `--dry-run` overlay, and offline operation
//! when no real calendar client is wired in.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::llm::{LmClient, ModelSpec};
use crate::models::{Activity, AuditAction, CalendarEvent, HealthSample};
use crate::providers::{AuditStore, CalendarClient, Clock, HealthStore};

/// In-memory calendar
#[derive(Default)]
pub struct SyntheticCalendar {
    events: Mutex<Vec<CalendarEvent>>,
    counter: AtomicU64,
}

impl SyntheticCalendar {
    /// Seed an event, assigning an identifier when absent
    pub fn seed(&self, mut event: CalendarEvent) -> String {
        let id = event.external_id.clone().unwrap_or_else(|| self.next_id());
        event.external_id = Some(id.clone());
        self.events
            .lock()
            .expect("calendar lock poisoned")
            .push(event);
        id
    }

    /// All stored events, ascending by start
    #[must_use]
    pub fn snapshot(&self) -> Vec<CalendarEvent> {
        let mut events = self
            .events
            .lock()
            .expect("calendar lock poisoned")
            .clone();
        events.sort_by_key(|e| e.start);
        events
    }

    fn next_id(&self) -> String {
        format!("evt-{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[async_trait]
impl CalendarClient for SyntheticCalendar {
    async fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>> {
        let mut events: Vec<CalendarEvent> = self
            .events
            .lock()
            .expect("calendar lock poisoned")
            .iter()
            .filter(|e| e.start >= start && e.start < end)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start);
        Ok(events)
    }

    async fn insert(&self, event: &CalendarEvent) -> AppResult<String> {
        let id = self.next_id();
        let mut stored = event.clone();
        stored.external_id = Some(id.clone());
        self.events
            .lock()
            .expect("calendar lock poisoned")
            .push(stored);
        Ok(id)
    }

    async fn update(&self, external_id: &str, event: &CalendarEvent) -> AppResult<()> {
        let mut events = self.events.lock().expect("calendar lock poisoned");
        let slot = events
            .iter_mut()
            .find(|e| e.external_id.as_deref() == Some(external_id))
            .ok_or_else(|| AppError::not_found(format!("event {external_id}")))?;
        let mut updated = event.clone();
        updated.external_id = Some(external_id.to_owned());
        *slot = updated;
        Ok(())
    }

    async fn delete(&self, external_id: &str) -> AppResult<()> {
        let mut events = self.events.lock().expect("calendar lock poisoned");
        let before = events.len();
        events.retain(|e| e.external_id.as_deref() != Some(external_id));
        if events.len() == before {
            return Err(AppError::not_found(format!("event {external_id}")));
        }
        Ok(())
    }
}

/// Calendar decorator that fails the first N calls transiently
///
/// Exercises the retry loop without a network.
pub struct FlakyCalendar {
    inner: std::sync::Arc<dyn CalendarClient>,
    failures_left: AtomicU64,
}

impl FlakyCalendar {
    /// Wrap a client, failing the first `failures` calls
    #[must_use]
    pub fn new(inner: std::sync::Arc<dyn CalendarClient>, failures: u64) -> Self {
        Self {
            inner,
            failures_left: AtomicU64::new(failures),
        }
    }

    fn maybe_fail(&self) -> AppResult<()> {
        let left = self.failures_left.load(Ordering::Relaxed);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::Relaxed);
            return Err(AppError::transient("calendar", "injected 503"));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarClient for FlakyCalendar {
    async fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>> {
        self.maybe_fail()?;
        self.inner.list_range(start, end).await
    }

    async fn insert(&self, event: &CalendarEvent) -> AppResult<String> {
        self.maybe_fail()?;
        self.inner.insert(event).await
    }

    async fn update(&self, external_id: &str, event: &CalendarEvent) -> AppResult<()> {
        self.maybe_fail()?;
        self.inner.update(external_id, event).await
    }

    async fn delete(&self, external_id: &str) -> AppResult<()> {
        self.maybe_fail()?;
        self.inner.delete(external_id).await
    }
}

/// Dry-run overlay: reads pass through, mutations are recorded but not applied
pub struct DryRunCalendar {
    inner: std::sync::Arc<dyn CalendarClient>,
    counter: AtomicU64,
    suppressed: Mutex<Vec<String>>,
}

impl DryRunCalendar {
    /// Wrap a client, suppressing every mutation
    #[must_use]
    pub fn new(inner: std::sync::Arc<dyn CalendarClient>) -> Self {
        Self {
            inner,
            counter: AtomicU64::new(0),
            suppressed: Mutex::new(Vec::new()),
        }
    }

    /// Human-readable log of suppressed mutations
    #[must_use]
    pub fn suppressed(&self) -> Vec<String> {
        self.suppressed
            .lock()
            .expect("dry-run lock poisoned")
            .clone()
    }

    fn record(&self, entry: String) {
        info!("[dry-run] {entry}");
        self.suppressed
            .lock()
            .expect("dry-run lock poisoned")
            .push(entry);
    }
}

#[async_trait]
impl CalendarClient for DryRunCalendar {
    async fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>> {
        self.inner.list_range(start, end).await
    }

    async fn insert(&self, event: &CalendarEvent) -> AppResult<String> {
        self.record(format!("would create: {}", event.summary));
        Ok(format!(
            "dry-run-{}",
            self.counter.fetch_add(1, Ordering::Relaxed) + 1
        ))
    }

    async fn update(&self, external_id: &str, event: &CalendarEvent) -> AppResult<()> {
        self.record(format!("would update {external_id}: {}", event.summary));
        Ok(())
    }

    async fn delete(&self, external_id: &str) -> AppResult<()> {
        self.record(format!("would delete {external_id}"));
        Ok(())
    }
}

/// In-memory health store
#[derive(Default)]
pub struct SyntheticHealthStore {
    samples: Mutex<Vec<HealthSample>>,
    activities: Mutex<Vec<Activity>>,
}

impl SyntheticHealthStore {
    /// Add a health sample
    pub fn push_sample(&self, sample: HealthSample) {
        self.samples
            .lock()
            .expect("health lock poisoned")
            .push(sample);
    }

    /// Add a completed activity
    pub fn push_activity(&self, activity: Activity) {
        self.activities
            .lock()
            .expect("health lock poisoned")
            .push(activity);
    }
}

#[async_trait]
impl HealthStore for SyntheticHealthStore {
    async fn latest_sample_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Option<HealthSample>> {
        Ok(self
            .samples
            .lock()
            .expect("health lock poisoned")
            .iter()
            .filter(|s| s.timestamp < cutoff)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn samples_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<HealthSample>> {
        let mut samples: Vec<HealthSample> = self
            .samples
            .lock()
            .expect("health lock poisoned")
            .iter()
            .filter(|s| s.timestamp >= start && s.timestamp < end)
            .cloned()
            .collect();
        samples.sort_by_key(|s| s.timestamp);
        Ok(samples)
    }

    async fn activities_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Activity>> {
        let mut activities: Vec<Activity> = self
            .activities
            .lock()
            .expect("health lock poisoned")
            .iter()
            .filter(|a| a.timestamp >= start && a.timestamp < end)
            .cloned()
            .collect();
        activities.sort_by_key(|a| a.timestamp);
        Ok(activities)
    }
}

/// In-memory audit store preserving append order
#[derive(Default)]
pub struct MemoryAuditStore {
    actions: Mutex<Vec<AuditAction>>,
}

impl MemoryAuditStore {
    /// All recorded actions in append order
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditAction> {
        self.actions.lock().expect("audit lock poisoned").clone()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, action: &AuditAction) -> AppResult<()> {
        self.actions
            .lock()
            .expect("audit lock poisoned")
            .push(action.clone());
        Ok(())
    }
}

/// Clock pinned to a fixed instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Scripted LM client replaying queued outcomes in order
///
/// When the script runs dry, every further call fails transiently, which
/// drives the generator into its template fallback.
#[derive(Default)]
pub struct ScriptedLm {
    script: Mutex<VecDeque<AppResult<String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLm {
    /// Queue a successful response
    pub fn respond(&self, body: impl Into<String>) {
        self.script
            .lock()
            .expect("lm lock poisoned")
            .push_back(Ok(body.into()));
    }

    /// Queue a failure
    pub fn fail(&self, err: AppError) {
        self.script
            .lock()
            .expect("lm lock poisoned")
            .push_back(Err(err));
    }

    /// Model names of every call made, in order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lm lock poisoned").clone()
    }
}

#[async_trait]
impl LmClient for ScriptedLm {
    async fn generate(&self, _prompt: &str, model: &ModelSpec) -> AppResult<String> {
        self.calls
            .lock()
            .expect("lm lock poisoned")
            .push(model.name.clone());
        self.script
            .lock()
            .expect("lm lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(AppError::transient("lm", "script exhausted")))
    }
}
