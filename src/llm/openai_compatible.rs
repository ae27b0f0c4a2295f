// ABOUTME: HTTP client for OpenAI-compatible and Ollama generation endpoints
// ABOUTME: Single client covering local (Ollama, vLLM, LocalAI) and hosted APIs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Milo Training Intelligence

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::llm::{LmClient, ModelSpec};

/// Wire protocol spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiStyle {
    /// Ollama native `/api/generate`
    #[default]
    Ollama,
    /// `OpenAI`-compatible `/v1/chat/completions`
    OpenAi,
}

/// Reqwest-backed LM client
///
/// One client instance serves every model in the fallback chain; the per-call
/// timeout comes from the [`ModelSpec`].
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    style: ApiStyle,
}

impl OpenAiCompatibleClient {
    /// Create a client against a specific endpoint
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the underlying HTTP client cannot
    /// be constructed.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        style: ApiStyle,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| AppError::config(format!("cannot build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            style,
        })
    }

    /// Create a client from environment configuration
    ///
    /// - `MILO_LM_BASE_URL`: endpoint (default: Ollama at localhost:11434)
    /// - `MILO_LM_API_KEY`: bearer token, optional
    /// - `MILO_LM_API_STYLE`: `ollama` (default) or `openai`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the HTTP client cannot be built.
    pub fn from_env() -> AppResult<Self> {
        let base_url =
            env::var("MILO_LM_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".into());
        let api_key = env::var("MILO_LM_API_KEY").ok().filter(|k| !k.is_empty());
        let style = match env::var("MILO_LM_API_STYLE").as_deref() {
            Ok("openai") => ApiStyle::OpenAi,
            _ => ApiStyle::Ollama,
        };
        Self::new(base_url, api_key, style)
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> AppError {
        match status.as_u16() {
            401 | 403 => AppError::permission_denied("lm"),
            404 => AppError::not_found("lm endpoint"),
            429 => AppError::transient("lm", format!("rate limited: {body}")),
            code if status.is_server_error() => {
                AppError::transient("lm", format!("server error {code}: {body}"))
            }
            code => AppError::permanent("lm", format!("unexpected status {code}: {body}")),
        }
    }
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageBody,
}

#[derive(Deserialize)]
struct ChatMessageBody {
    content: String,
}

#[async_trait]
impl LmClient for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str, model: &ModelSpec) -> AppResult<String> {
        debug!(model = %model.name, style = ?self.style, "LM generate");

        let (url, body) = match self.style {
            ApiStyle::Ollama => (
                format!("{}/api/generate", self.base_url),
                json!({
                    "model": model.name,
                    "prompt": prompt,
                    "stream": false,
                }),
            ),
            ApiStyle::OpenAi => (
                format!("{}/v1/chat/completions", self.base_url),
                json!({
                    "model": model.name,
                    "messages": [{"role": "user", "content": prompt}],
                }),
            ),
        };

        let mut request = self.http.post(&url).timeout(model.timeout()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        match self.style {
            ApiStyle::Ollama => {
                let parsed: OllamaResponse = response.json().await?;
                Ok(parsed.response)
            }
            ApiStyle::OpenAi => {
                let parsed: ChatCompletionResponse = response.json().await?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| AppError::permanent("lm", "response carried no choices"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_retry_policy() {
        let transient = OpenAiCompatibleClient::classify_status(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "down",
        );
        assert!(transient.is_transient());

        let quota =
            OpenAiCompatibleClient::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "");
        assert!(quota.is_transient());

        let denied =
            OpenAiCompatibleClient::classify_status(reqwest::StatusCode::UNAUTHORIZED, "");
        assert_eq!(denied.code, crate::errors::ErrorCode::PermissionDenied);

        let permanent =
            OpenAiCompatibleClient::classify_status(reqwest::StatusCode::BAD_REQUEST, "");
        assert!(!permanent.is_transient());
    }
}
