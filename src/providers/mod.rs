// ABOUTME: Collaborator capability traits for the calendar, health store, audit store, and clock
// ABOUTME: The explicit dependency seam the core is constructed against
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! # Collaborator Service Provider Interface
//!
//! The core never talks to a concrete external system. Each collaborator is
//! expressed as a small capability trait, and the orchestrator receives an
//! explicit bundle of trait objects at construction; nothing reaches for
//! module-level singletons.
//!
//! ## Key Concepts
//!
//! - [`CalendarClient`]: list / upsert / delete on remote calendar events
//! - [`HealthStore`]: read access to ingested health samples and activities
//! - [`AuditStore`]: append-only decision log
//! - [`Clock`]: injectable time source so cycles are testable

mod calendar;
pub mod synthetic;

pub use calendar::{CalendarView, RetryPolicy, UpsertOutcome};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppResult;
use crate::models::{Activity, AuditAction, CalendarEvent, HealthSample};

/// Injectable time source
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation of [`Clock`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Remote calendar capability set
///
/// Implementations must be safe for concurrent use: the bounded LM fan-out
/// step may hold references from multiple tasks.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Events with `start` in `[start, end)`, ascending by start
    async fn list_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarEvent>>;

    /// Create an event; returns the remote identifier
    async fn insert(&self, event: &CalendarEvent) -> AppResult<String>;

    /// Replace an existing event identified by `external_id`
    async fn update(&self, external_id: &str, event: &CalendarEvent) -> AppResult<()>;

    /// Remove an event
    async fn delete(&self, external_id: &str) -> AppResult<()>;
}

/// Read access to ingested health rows
///
/// Rows are owned by the ingestion adapter; the core only reads.
#[async_trait]
pub trait HealthStore: Send + Sync {
    /// Most recent sample strictly before `cutoff`
    async fn latest_sample_before(&self, cutoff: DateTime<Utc>)
        -> AppResult<Option<HealthSample>>;

    /// Samples with timestamp in `[start, end)`, ascending
    async fn samples_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<HealthSample>>;

    /// Activities with timestamp in `[start, end)`, ascending
    async fn activities_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Activity>>;
}

/// Append-only audit log
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one decision record
    async fn append(&self, action: &AuditAction) -> AppResult<()>;
}
