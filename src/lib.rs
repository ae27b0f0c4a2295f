// ABOUTME: Main library entry point for the Milo workout scheduling engine
// ABOUTME: Exposes planning, reconciliation, and calendar write-back components
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

#![deny(unsafe_code)]

//! # Milo Scheduler
//!
//! An autonomous workout scheduler that continuously reconciles three sources
//! of truth — a wearable health feed, a remote calendar, and a declarative
//! training-goal configuration — and emits calendar events describing concrete
//! workouts tailored to the user's current physiological state.
//!
//! ## Architecture
//!
//! The engine is a single-shot callable cycle, designed to be invoked on a
//! periodic cadence by an external trigger (cron or equivalent):
//!
//! - **Config**: typed goals and workout templates loaded from YAML
//! - **Providers**: capability traits for the calendar, health store, audit
//!   store, and clock; the core never branches on concrete implementations
//! - **Intelligence**: pure planning logic — recovery scoring, conflict
//!   detection, weekly budgeting, intensity selection
//! - **LLM**: workout content generation with a model fallback chain and a
//!   deterministic template-only fallback
//! - **Reconciler**: closes the loop between planned and observed activity
//! - **Orchestrator**: drives one cycle with safety limits and audit logging

/// Typed configuration: training goals and workout templates
pub mod config;

/// Named defaults, limits, and scoring weights
pub mod constants;

/// SQLite-backed health and audit stores
pub mod database;

/// Centralized error handling and error types
pub mod errors;

/// Pure planning logic: recovery, conflicts, budgeting, intensity, planning
pub mod intelligence;

/// LM content generation: prompt rendering, fallback chain, sanitization
pub mod llm;

/// Process-wide advisory lock for single-flight cycles
pub mod lock;

/// Structured logging configuration
pub mod logging;

/// Domain entities shared across components
pub mod models;

/// Cycle orchestration: safety limits, deadline, audit trail
pub mod orchestrator;

/// Collaborator traits and the calendar view
pub mod providers;

/// Plan-versus-actual reconciliation
pub mod reconciler;
