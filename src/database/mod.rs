// ABOUTME: SQLite-backed health and audit stores over a sqlx connection pool
// ABOUTME: Idempotent sample upserts, activity rows, append-only audit trail
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! Persistence.
//!
//! The store is a collaborator: the core reads health rows and appends audit
//! rows; ingestion adapters own the writes. Each operation is its own short
//! transaction over the pool; there are no cross-call transactions.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{Activity, AuditAction, Discipline, HealthSample};
use crate::providers::{AuditStore, HealthStore};

/// SQLite store implementing [`HealthStore`] and [`AuditStore`]
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database and bootstrap the schema
    ///
    /// # Errors
    ///
    /// Returns a database error when the URL is invalid or the schema cannot
    /// be applied.
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|err| AppError::config(format!("invalid database URL: {err}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url, "database ready");
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS health_samples (
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                sleep_duration_hours REAL,
                sleep_quality_score REAL,
                resting_hr REAL,
                hrv_score REAL,
                stress_level REAL,
                recovery_score REAL,
                steps INTEGER,
                raw_payload TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (timestamp, source)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activities (
                timestamp TEXT NOT NULL,
                discipline TEXT NOT NULL,
                duration_minutes REAL NOT NULL,
                distance_km REAL,
                avg_hr REAL,
                training_load REAL,
                perceived_exertion INTEGER,
                calories REAL,
                raw_payload TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (timestamp, discipline)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_actions (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                agent TEXT NOT NULL,
                action_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                before_state TEXT,
                after_state TEXT,
                reasoning TEXT NOT NULL,
                data_sources TEXT NOT NULL DEFAULT '[]',
                executed INTEGER NOT NULL,
                degraded INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Idempotently insert a health sample
    ///
    /// Returns `false` when a row with the same `(timestamp, source)` already
    /// exists; the duplicate is a no-op per the ingestion contract.
    ///
    /// # Errors
    ///
    /// Returns a database error for anything other than a duplicate key.
    pub async fn upsert_sample(&self, sample: &HealthSample) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO health_samples (
                timestamp, source, sleep_duration_hours, sleep_quality_score,
                resting_hr, hrv_score, stress_level, recovery_score, steps, raw_payload
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (timestamp, source) DO NOTHING",
        )
        .bind(sample.timestamp)
        .bind(&sample.source)
        .bind(sample.sleep_duration_hours)
        .bind(sample.sleep_quality_score)
        .bind(sample.resting_hr)
        .bind(sample.hrv_score)
        .bind(sample.stress_level)
        .bind(sample.recovery_score)
        .bind(sample.steps)
        .bind(sample.raw_payload.to_string())
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() > 0;
        if !inserted {
            debug!(timestamp = %sample.timestamp, source = %sample.source, "duplicate sample skipped");
        }
        Ok(inserted)
    }

    /// Idempotently insert a completed activity
    ///
    /// # Errors
    ///
    /// Returns a database error for anything other than a duplicate key.
    pub async fn insert_activity(&self, activity: &Activity) -> AppResult<bool> {
        let result = sqlx::query(
            "INSERT INTO activities (
                timestamp, discipline, duration_minutes, distance_km,
                avg_hr, training_load, perceived_exertion, calories, raw_payload
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (timestamp, discipline) DO NOTHING",
        )
        .bind(activity.timestamp)
        .bind(activity.discipline.as_str())
        .bind(activity.duration_minutes)
        .bind(activity.distance_km)
        .bind(activity.avg_hr)
        .bind(activity.training_load)
        .bind(activity.perceived_exertion.map(i64::from))
        .bind(activity.calories)
        .bind(activity.raw_payload.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn sample_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<HealthSample> {
        let raw: String = row.try_get("raw_payload")?;
        Ok(HealthSample {
            timestamp: row.try_get("timestamp")?,
            source: row.try_get("source")?,
            sleep_duration_hours: row.try_get("sleep_duration_hours")?,
            sleep_quality_score: row.try_get("sleep_quality_score")?,
            resting_hr: row.try_get("resting_hr")?,
            hrv_score: row.try_get("hrv_score")?,
            stress_level: row.try_get("stress_level")?,
            recovery_score: row.try_get("recovery_score")?,
            steps: row.try_get("steps")?,
            raw_payload: serde_json::from_str(&raw)?,
        })
    }

    fn activity_from_row(row: &sqlx::sqlite::SqliteRow) -> AppResult<Activity> {
        let discipline: String = row.try_get("discipline")?;
        let raw: String = row.try_get("raw_payload")?;
        let exertion: Option<i64> = row.try_get("perceived_exertion")?;
        Ok(Activity {
            timestamp: row.try_get("timestamp")?,
            discipline: Discipline::parse(&discipline),
            duration_minutes: row.try_get("duration_minutes")?,
            distance_km: row.try_get("distance_km")?,
            avg_hr: row.try_get("avg_hr")?,
            training_load: row.try_get("training_load")?,
            perceived_exertion: exertion.and_then(|e| u8::try_from(e).ok()),
            calories: row.try_get("calories")?,
            raw_payload: serde_json::from_str(&raw)?,
        })
    }
}

#[async_trait]
impl HealthStore for SqliteStore {
    async fn latest_sample_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Option<HealthSample>> {
        let row = sqlx::query(
            "SELECT * FROM health_samples WHERE timestamp < ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::sample_from_row).transpose()
    }

    async fn samples_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<HealthSample>> {
        let rows = sqlx::query(
            "SELECT * FROM health_samples WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::sample_from_row).collect()
    }

    async fn activities_in(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Activity>> {
        let rows = sqlx::query(
            "SELECT * FROM activities WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::activity_from_row).collect()
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append(&self, action: &AuditAction) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO audit_actions (
                id, timestamp, agent, action_type, confidence,
                before_state, after_state, reasoning, data_sources, executed, degraded
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(action.id.to_string())
        .bind(action.timestamp)
        .bind(&action.agent)
        .bind(action.action.as_str())
        .bind(action.confidence)
        .bind(action.before_state.as_ref().map(ToString::to_string))
        .bind(action.after_state.as_ref().map(ToString::to_string))
        .bind(&action.reasoning)
        .bind(serde_json::to_string(&action.data_sources)?)
        .bind(action.executed)
        .bind(action.degraded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteStore {
    /// Audit actions in append order, newest last (operator tooling)
    ///
    /// # Errors
    ///
    /// Returns a database error on query failure.
    pub async fn audit_actions(&self, limit: i64) -> AppResult<Vec<(Uuid, String, String)>> {
        let rows = sqlx::query(
            "SELECT id, action_type, reasoning FROM audit_actions ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let id = Uuid::parse_str(&id)
                    .map_err(|err| AppError::internal(format!("bad audit id: {err}")))?;
                Ok((id, row.try_get("action_type")?, row.try_get("reasoning")?))
            })
            .collect()
    }
}
