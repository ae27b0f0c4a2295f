// ABOUTME: LM provider abstraction for pluggable workout-content generation
// ABOUTME: Defines the client contract, model specs, and per-call timeout policy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

//! # LM Provider Interface
//!
//! The content generator talks to language models through the [`LmClient`]
//! trait. A configured, ordered chain of [`ModelSpec`]s defines the fallback
//! sequence; each spec carries its own per-call timeout (defaulting by
//! endpoint kind). The core never branches on a concrete provider.

mod generator;
mod openai_compatible;
pub mod prompts;

pub use generator::WorkoutGenerator;
pub use openai_compatible::{ApiStyle, OpenAiCompatibleClient};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::llm::{CLOUD_MODEL_TIMEOUT_SECS, LOCAL_MODEL_TIMEOUT_SECS};
use crate::errors::AppResult;

/// Where a model is hosted; drives the default per-call timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Locally hosted model (Ollama, vLLM, `LocalAI`)
    #[default]
    Local,
    /// Hosted API model
    Cloud,
}

/// One entry of the configured model fallback chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Provider-specific model identifier
    pub name: String,
    /// Hosting kind
    #[serde(default)]
    pub kind: ModelKind,
    /// Per-call timeout override in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ModelSpec {
    /// A local model with default timeout
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Local,
            timeout_secs: None,
        }
    }

    /// A cloud model with default timeout
    #[must_use]
    pub fn cloud(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ModelKind::Cloud,
            timeout_secs: None,
        }
    }

    /// Effective per-call timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        let secs = self.timeout_secs.unwrap_or(match self.kind {
            ModelKind::Local => LOCAL_MODEL_TIMEOUT_SECS,
            ModelKind::Cloud => CLOUD_MODEL_TIMEOUT_SECS,
        });
        Duration::from_secs(secs)
    }
}

/// Language-model client contract
///
/// Implementations must honor the model's per-call timeout and classify
/// failures through [`crate::errors::ErrorCode`]: transient network, timeout,
/// and quota failures let the generator advance its fallback chain.
#[async_trait]
pub trait LmClient: Send + Sync {
    /// Generate raw text for a prompt with the given model
    async fn generate(&self, prompt: &str, model: &ModelSpec) -> AppResult<String>;
}
