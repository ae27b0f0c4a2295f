// ABOUTME: Centralized error handling and error types for the scheduling engine
// ABOUTME: Defines error codes, retry classification, and exit-code mapping
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! # Unified Error Handling System
//!
//! This module provides the centralized error type used across all components.
//! Every error carries an [`ErrorCode`] that drives the retry policy, the
//! audit trail, and the process exit code.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Standard error codes used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Configuration
    /// Goal or template configuration is unreadable or invalid
    ConfigError,
    /// Required configuration key is missing
    ConfigMissing,
    /// Configuration value is outside its acceptable range
    ConfigInvalid,

    // External services
    /// Transient failure from the calendar, wearable, LM, or store
    TransientExternal,
    /// External API rejected our credentials (401/403)
    PermissionDenied,
    /// Requested resource does not exist on the remote side
    NotFound,
    /// Non-retryable failure from an external service
    PermanentExternal,

    // Planning outcomes
    /// All configured LM models failed; template-only fallback was used
    Degraded,
    /// No free slot could be found for the chosen discipline
    ConflictUnresolved,

    // Store
    /// Duplicate key on insert; treated as an idempotent no-op
    IntegrityError,
    /// Database operation failed
    DatabaseError,

    // Lifecycle
    /// Cycle deadline was exceeded; remaining work aborted
    DeadlineExceeded,
    /// Another cycle already holds the advisory lock
    AlreadyRunning,

    // Internal
    /// Input validation failed
    InvalidInput,
    /// Serialization or deserialization failed
    SerializationError,
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Whether the failure is worth retrying with backoff
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::TransientExternal)
    }

    /// Process exit code for the CLI surface
    ///
    /// 0 = success (including degraded), 1 = user/config error,
    /// 2 = transient external failure, 3 = deadline/cancellation abort.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Degraded => 0,
            Self::ConfigError
            | Self::ConfigMissing
            | Self::ConfigInvalid
            | Self::InvalidInput
            | Self::AlreadyRunning => 1,
            Self::DeadlineExceeded => 3,
            _ => 2,
        }
    }

    /// User-facing description of this error class
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ConfigError => "Configuration is unreadable or invalid",
            Self::ConfigMissing => "Required configuration is missing",
            Self::ConfigInvalid => "Configuration value is out of range",
            Self::TransientExternal => "External service failed transiently",
            Self::PermissionDenied => "External service denied access",
            Self::NotFound => "Remote resource not found",
            Self::PermanentExternal => "External service failed permanently",
            Self::Degraded => "LM models unavailable; template fallback used",
            Self::ConflictUnresolved => "No free slot available",
            Self::IntegrityError => "Duplicate key on insert",
            Self::DatabaseError => "Database operation failed",
            Self::DeadlineExceeded => "Cycle deadline exceeded",
            Self::AlreadyRunning => "Another cycle is already running",
            Self::InvalidInput => "Invalid input",
            Self::SerializationError => "Serialization failed",
            Self::InternalError => "Internal error",
        }
    }
}

/// Application error with a code and human-readable message
#[derive(Debug, Clone, ThisError)]
pub struct AppError {
    /// Error classification driving retry and exit-code policy
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl AppError {
    /// Create a new error with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether this error should be retried with backoff
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Configuration error (unreadable or invalid config)
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Required configuration key is missing
    #[must_use]
    pub fn config_missing(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissing,
            format!("missing required configuration key: {key}"),
        )
    }

    /// Configuration value is out of range
    #[must_use]
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    /// Transient external failure (network, 5xx, timeout)
    #[must_use]
    pub fn transient(service: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::TransientExternal,
            format!("{service}: {message}"),
        )
    }

    /// External API rejected credentials
    #[must_use]
    pub fn permission_denied(service: &str) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!("{service}: access denied"),
        )
    }

    /// Remote resource does not exist
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        Self::new(ErrorCode::NotFound, format!("{resource} not found"))
    }

    /// Non-retryable external failure
    #[must_use]
    pub fn permanent(service: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::PermanentExternal,
            format!("{service}: {message}"),
        )
    }

    /// Duplicate key on store insert
    #[must_use]
    pub fn duplicate(what: impl Into<String>) -> Self {
        let what = what.into();
        Self::new(ErrorCode::IntegrityError, format!("duplicate {what}"))
    }

    /// Database failure
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Cycle deadline exceeded
    #[must_use]
    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, message)
    }

    /// Invalid input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(format!("YAML parse error: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::duplicate(db.message().to_owned())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::transient("store", err.to_string())
            }
            _ => Self::database(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::transient("http", err.to_string());
        }
        if let Some(status) = err.status() {
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Self::permission_denied("http");
            }
            if status.is_server_error() || status.as_u16() == 429 {
                return Self::transient("http", err.to_string());
            }
        }
        Self::permanent("http", err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
