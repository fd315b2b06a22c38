use crate::api::{CompletionParams, CompletionProvider, ProviderError};
use crate::config::Config;
use crate::logw;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::Duration;

const SYSTEM_PROMPT: &str =
    "You are a creative writing assistant designed to output JSON. Reply with JSON only.";
const MAX_PROMPT_BYTES: usize = 120_000;
const MAX_LOGGED_BODY_CHARS: usize = 800;

fn trim_copy_utf8_safe(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }

    let mut cut = max_bytes.min(input.len());
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    input[..cut].to_string()
}

/// OpenAI-compatible chat-completions client. One instance is built from
/// [`Config`] at start-up and shared by reference.
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiProvider {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client, cfg))
    }

    pub fn with_client(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.openai_key.clone(),
            model: cfg.openai_model.clone(),
            endpoint: format!("{}/chat/completions", cfg.openai_base_url.trim_end_matches('/')),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> Result<String, ProviderError> {
        let prompt = trim_copy_utf8_safe(prompt, MAX_PROMPT_BYTES);

        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt},
            ],
        });
        if let Some(temperature) = params.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = params.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let raw = resp.text().await.map_err(transport_error)?;

        if !status.is_success() {
            logw(format!("OpenAI HTTP {}", status.as_u16()));
            if !raw.is_empty() {
                let snippet = raw.chars().take(MAX_LOGGED_BODY_CHARS).collect::<String>();
                logw(format!("OpenAI raw body: {}", snippet));
            }
            return Err(classify_http_error(status, &raw));
        }

        extract_message_text(&raw)
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

fn error_message(raw: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(raw).ok()?;
    let err = root.get("error")?;
    let msg = err.get("message").and_then(|v| v.as_str()).unwrap_or_default();
    let code = err.get("code").and_then(|v| v.as_str());
    let typ = err.get("type").and_then(|v| v.as_str());
    let label = code.or(typ);
    Some(match label {
        Some(label) => format!("{} ({})", msg, label),
        None => msg.to_string(),
    })
}

pub(crate) fn classify_http_error(status: StatusCode, raw: &str) -> ProviderError {
    let message = error_message(raw).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    });

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => ProviderError::Timeout(message),
        _ => ProviderError::Http {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions body.
pub(crate) fn extract_message_text(raw: &str) -> Result<String, ProviderError> {
    let root: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ProviderError::Malformed(format!("response is not JSON: {}", e)))?;

    if let Some(msg) = error_message(raw) {
        return Err(ProviderError::Malformed(msg));
    }

    let choice = root
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| ProviderError::Malformed("response has no choices".to_string()))?;

    let finish_reason = choice.get("finish_reason").and_then(|v| v.as_str());
    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default();

    if finish_reason == Some("content_filter") {
        return Err(ProviderError::EmptyResponse(
            "response blocked by content filter".to_string(),
        ));
    }
    if content.trim().is_empty() {
        return Err(ProviderError::EmptyResponse(format!(
            "no text returned (finish_reason: {})",
            finish_reason.unwrap_or("unknown")
        )));
    }
    if finish_reason == Some("length") {
        logw("OpenAI response hit max_tokens; output may be truncated.");
    }

    Ok(content.to_string())
}
