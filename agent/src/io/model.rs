//! Language model client.
//!
//! [`ModelClient`] is the seam between the pipeline and the vendor API. The
//! production implementation talks to any OpenAI-compatible Chat Completions
//! endpoint (Groq or OpenAI); tests use scripted clients.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{JobError, JobResult};
use crate::io::config::AgentConfig;

pub const SYSTEM_PROMPT: &str = "You are a coding agent that generates code and shell commands. Always respond with valid JSON containing 'files' and 'shell' keys.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);
const ERROR_BODY_PREVIEW: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelCallError {
    #[error("authentication failed ({provider}): check the API key")]
    Authentication { provider: String },
    #[error("quota exceeded ({provider}): check account billing and limits")]
    Quota { provider: String },
    #[error("rate limited ({provider})")]
    RateLimited { provider: String },
    #[error("network error ({provider}): {reason}")]
    Network { provider: String, reason: String },
    #[error("HTTP {status} from {provider}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("empty response from {provider}")]
    EmptyContent { provider: String },
    #[error("invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl ModelCallError {
    fn retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Anything that turns a prompt into raw model text.
pub trait ModelClient {
    fn complete(&self, prompt: &str) -> Result<String, ModelCallError>;
}

/// Which vendor endpoint the worker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Groq,
    OpenAi,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }
}

/// Resolved endpoint settings for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[redacted]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl ProviderConfig {
    /// Pick a provider from the environment. Groq wins when both keys are set;
    /// placeholder keys from sample `.env` files count as unset.
    pub fn from_env<F>(env: F) -> JobResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let usable = |key: &str, placeholder: &str| {
            env(key).filter(|value| !value.trim().is_empty() && value != placeholder)
        };

        if let Some(api_key) = usable("GROQ_API_KEY", "your_groq_api_key_here") {
            return Ok(Self {
                provider: Provider::Groq,
                api_key,
                base_url: env("GROQ_BASE_URL")
                    .unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
                model: env("GROQ_MODEL").unwrap_or_else(|| "llama-3.3-70b-versatile".to_string()),
            });
        }
        if let Some(api_key) = usable("OPENAI_API_KEY", "your_openai_api_key_here") {
            return Ok(Self {
                provider: Provider::OpenAi,
                api_key,
                base_url: env("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
                model: env("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o".to_string()),
            });
        }
        Err(JobError::Configuration(
            "no valid LLM API key found; set GROQ_API_KEY or OPENAI_API_KEY".to_string(),
        ))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Blocking OpenAI-compatible Chat Completions client.
pub struct ChatCompletionsClient {
    client: Client,
    provider: ProviderConfig,
    max_tokens: u32,
    temperature: f64,
}

impl ChatCompletionsClient {
    pub fn new(provider: ProviderConfig, cfg: &AgentConfig) -> JobResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                JobError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        info!("using {} API", provider.provider.as_str());
        Ok(Self {
            client,
            provider,
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }

    fn name(&self) -> String {
        self.provider.provider.as_str().to_string()
    }

    fn send_once(&self, prompt: &str) -> Result<String, ModelCallError> {
        let url = format!(
            "{}/chat/completions",
            self.provider.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: &self.provider.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.provider.api_key)
            .json(&body)
            .send()
            .map_err(|err| ModelCallError::Network {
                provider: self.name(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        let text = response.text().map_err(|err| ModelCallError::Network {
            provider: self.name(),
            reason: format!("failed to read response body: {err}"),
        })?;
        debug!(status = status.as_u16(), bytes = text.len(), "model response received");

        if !status.is_success() {
            return Err(classify_failure(&self.name(), status, &text));
        }
        extract_content(&self.name(), &text)
    }
}

impl ModelClient for ChatCompletionsClient {
    #[instrument(skip_all, fields(provider = self.provider.provider.as_str(), model = %self.provider.model))]
    fn complete(&self, prompt: &str) -> Result<String, ModelCallError> {
        info!(
            "calling {} API with model {}",
            self.provider.provider.as_str(),
            self.provider.model
        );
        debug!(
            max_tokens = self.max_tokens,
            temperature = self.temperature,
            "request params"
        );

        let mut attempt = 0;
        loop {
            match self.send_once(prompt) {
                Ok(content) => {
                    debug!(chars = content.len(), "model response length");
                    return Ok(content);
                }
                Err(err) if err.retryable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(attempt, err = %err, "model call failed, retrying");
                    thread::sleep(RETRY_BACKOFF * attempt);
                }
                Err(err) => {
                    log_guidance(&err);
                    return Err(err);
                }
            }
        }
    }
}

fn classify_failure(provider: &str, status: StatusCode, body: &str) -> ModelCallError {
    let provider = provider.to_string();
    let lower = body.to_lowercase();
    match status.as_u16() {
        401 | 403 => ModelCallError::Authentication { provider },
        429 | 402 if lower.contains("quota") || lower.contains("billing") => {
            ModelCallError::Quota { provider }
        }
        429 => ModelCallError::RateLimited { provider },
        code => ModelCallError::Http {
            provider,
            status: code,
            body: truncate(body, ERROR_BODY_PREVIEW),
        },
    }
}

fn extract_content(provider: &str, body: &str) -> Result<String, ModelCallError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|err| ModelCallError::InvalidResponse {
            provider: provider.to_string(),
            reason: format!("{err}; raw: {}", truncate(body, ERROR_BODY_PREVIEW)),
        })?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ModelCallError::EmptyContent {
            provider: provider.to_string(),
        })
}

fn log_guidance(err: &ModelCallError) {
    error!("LLM API call failed: {err}");
    match err {
        ModelCallError::Authentication { .. } => {
            error!("authentication failed; check GROQ_API_KEY / OPENAI_API_KEY");
        }
        ModelCallError::Quota { .. } => {
            error!("API quota exceeded; check account billing and limits");
        }
        _ => {}
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn groq_key_takes_precedence() {
        let cfg = ProviderConfig::from_env(env_from(&[
            ("GROQ_API_KEY", "gsk"),
            ("OPENAI_API_KEY", "sk"),
        ]))
        .expect("provider");
        assert_eq!(cfg.provider, Provider::Groq);
        assert_eq!(cfg.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(cfg.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn placeholder_keys_are_ignored() {
        let cfg = ProviderConfig::from_env(env_from(&[
            ("GROQ_API_KEY", "your_groq_api_key_here"),
            ("OPENAI_API_KEY", "sk"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
        ]))
        .expect("provider");
        assert_eq!(cfg.provider, Provider::OpenAi);
        assert_eq!(cfg.model, "gpt-4o-mini");
    }

    #[test]
    fn missing_keys_are_a_configuration_error() {
        let err = ProviderConfig::from_env(env_from(&[])).unwrap_err();
        assert!(matches!(err, JobError::Configuration(_)));
    }

    #[test]
    fn debug_output_redacts_key() {
        let cfg = ProviderConfig::from_env(env_from(&[("OPENAI_API_KEY", "sk-secret")]))
            .expect("provider");
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }

    #[test]
    fn failures_are_classified_for_operators() {
        assert_eq!(
            classify_failure("groq", StatusCode::UNAUTHORIZED, "bad key"),
            ModelCallError::Authentication {
                provider: "groq".to_string()
            }
        );
        assert_eq!(
            classify_failure(
                "openai",
                StatusCode::TOO_MANY_REQUESTS,
                "You exceeded your current quota"
            ),
            ModelCallError::Quota {
                provider: "openai".to_string()
            }
        );
        assert!(classify_failure("openai", StatusCode::TOO_MANY_REQUESTS, "slow down").retryable());
        assert!(classify_failure("openai", StatusCode::BAD_GATEWAY, "").retryable());
        assert!(!classify_failure("openai", StatusCode::BAD_REQUEST, "").retryable());
    }

    #[test]
    fn content_is_extracted_from_first_choice() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "{\"files\": {}}"}}]}"#;
        assert_eq!(extract_content("groq", body).expect("content"), "{\"files\": {}}");
    }

    #[test]
    fn empty_content_is_distinguished() {
        for body in [
            r#"{"choices": []}"#,
            r#"{"choices": [{"message": {"content": null}}]}"#,
            r#"{"choices": [{"message": {"content": "  "}}]}"#,
        ] {
            assert!(matches!(
                extract_content("groq", body),
                Err(ModelCallError::EmptyContent { .. })
            ));
        }
        assert!(matches!(
            extract_content("groq", "<html>"),
            Err(ModelCallError::InvalidResponse { .. })
        ));
    }
}
