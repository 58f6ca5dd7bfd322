#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/comps/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Google Gemini language model.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use comps_core::{CompsError, DataProvider, LanguageModel, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Gemini API base URL.
const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Environment variables searched for an API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

const PROVIDER_NAME: &str = "Gemini";

/// Connection settings for [`GeminiProvider`].
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Model name, with or without the `models/` prefix.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on response length.
    pub max_output_tokens: u32,
    /// Request timeout.
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Creates a configuration with the default model and deterministic sampling.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_output_tokens: 2048,
            timeout: Duration::from_secs(120),
        }
    }

    /// Reads the API key from `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        API_KEY_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                CompsError::ProviderNotConfigured(format!(
                    "{PROVIDER_NAME}: set {} or {}",
                    API_KEY_VARS[0], API_KEY_VARS[1]
                ))
            })
    }

    /// Sets the model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{API_BASE_URL}/models/{model}:generateContent")
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Gemini text-generation client.
#[derive(Debug)]
pub struct GeminiProvider {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Creates a provider from `config`.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build Gemini HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self { config, client }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn request_body(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }
}

impl DataProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Google Gemini single-turn text generation"
    }
}

#[async_trait]
impl LanguageModel for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.config.endpoint();
        debug!(model = %self.config.model, prompt_len = prompt.len(), "Calling Gemini");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| CompsError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompsError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| CompsError::Parse(format!("Gemini response: {e}")))?;
        response_text(parsed)
    }
}

/// Maps a failed HTTP exchange to an error kind.
fn classify_error(status: u16, body: &str) -> CompsError {
    let api_error = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|e| e.error);
    let api_status = api_error
        .as_ref()
        .and_then(|e| e.status.as_deref())
        .unwrap_or_default();
    let message = api_error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_else(|| body.chars().take(200).collect());

    match (status, api_status) {
        (429, _) | (_, "RESOURCE_EXHAUSTED") => CompsError::rate_limited(PROVIDER_NAME, None),
        (401 | 403, _) | (_, "UNAUTHENTICATED" | "PERMISSION_DENIED") => {
            CompsError::AuthenticationFailed(format!("{PROVIDER_NAME}: {message}"))
        }
        _ => CompsError::Network(format!("{PROVIDER_NAME} HTTP {status}: {message}")),
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(response: GenerateContentResponse) -> Result<String> {
    if let Some(error) = response.error {
        return Err(CompsError::Other(format!(
            "{PROVIDER_NAME} API error: {}",
            error.message
        )));
    }

    let candidate = response
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| CompsError::Unparsable("no candidates in model response".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| p.text)
        .collect();

    if text.trim().is_empty() {
        return Err(CompsError::Unparsable(format!(
            "empty model response (finish reason {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok(text)
}

// ============================================================================
// Gemini API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = GeminiConfig::new("secret-123");
        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.temperature, 0.0);
        assert!(!format!("{config:?}").contains("secret-123"));
    }

    #[rstest]
    #[case("gemini-2.0-flash")]
    #[case("models/gemini-2.0-flash")]
    fn test_endpoint(#[case] model: &str) {
        let config = GeminiConfig::new("k").with_model(model);
        assert_eq!(
            config.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let provider = GeminiProvider::new(GeminiConfig::new("k").with_temperature(0.2));
        let body = serde_json::to_value(provider.request_body("hello")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["temperature"], 0.2);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response = parse(
            r#"{"candidates": [{"content": {"role": "model", "parts": [
                {"text": "```json\n{\"columns\": "}, {"text": "[]}\n```"}
            ]}, "finishReason": "STOP"}]}"#,
        );
        assert_eq!(
            response_text(response).unwrap(),
            "```json\n{\"columns\": []}\n```"
        );
    }

    #[test]
    fn test_response_without_text_is_unparsable() {
        let response = parse(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#);
        let err = response_text(response).unwrap_err();
        assert!(matches!(err, CompsError::Unparsable(ref m) if m.contains("SAFETY")));

        let response = parse(r#"{"candidates": []}"#);
        assert!(matches!(
            response_text(response),
            Err(CompsError::Unparsable(_))
        ));
    }

    #[rstest]
    #[case(429, "", true)]
    #[case(
        400,
        r#"{"error": {"code": 400, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#,
        true
    )]
    #[case(500, r#"{"error": {"code": 500, "message": "Internal", "status": "INTERNAL"}}"#, false)]
    #[case(503, "upstream connect error", false)]
    fn test_rate_limit_classification(
        #[case] status: u16,
        #[case] body: &str,
        #[case] rate_limited: bool,
    ) {
        assert_eq!(classify_error(status, body).is_rate_limited(), rate_limited);
    }

    #[test]
    fn test_auth_classification() {
        let err = classify_error(
            403,
            r#"{"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}}"#,
        );
        assert!(matches!(err, CompsError::AuthenticationFailed(ref m) if m.contains("API key not valid")));
    }

    #[test]
    fn test_provider_info() {
        let provider = GeminiProvider::new(GeminiConfig::new("k"));
        assert_eq!(provider.name(), "Gemini");
        assert_eq!(provider.config().model, DEFAULT_MODEL);
    }
}
