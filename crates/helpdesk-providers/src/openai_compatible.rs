//! Unified OpenAI-compatible chat client.
//!
//! One struct serves every registry provider; providers differ only by
//! endpoint URL, auth style and API key.

use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::generator::{GenerateParams, Generator};
use serde_json::{Value, json};
use std::time::Duration;

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// A generator that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    /// Provider name (e.g., "huggingface", "groq").
    name: String,
    /// Model sent with every request; empty defers to `GenerateParams::model`.
    model: String,
    api_key: String,
    base_url: String,
    chat_path: String,
    models_path: String,
    auth_style: AuthStyle,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config.
    ///
    /// Fails with `ApiKeyMissing` when the provider requires auth and no key
    /// resolves from config or env.
    pub fn from_registry(
        registry: &ProviderConfig,
        model: &str,
        api_key: &str,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = registry.resolve_api_key(api_key);
        if registry.requires_auth() && api_key.is_empty() {
            return Err(HelpdeskError::ApiKeyMissing(format!(
                "{} (set api_key or one of {:?})",
                registry.name, registry.env_keys
            )));
        }
        let model = if model.is_empty() {
            registry.default_model.to_string()
        } else {
            model.to_string()
        };

        Ok(Self {
            name: registry.name.to_string(),
            model,
            api_key,
            base_url: registry.resolve_base_url(endpoint),
            chat_path: registry.chat_path.to_string(),
            models_path: registry.models_path.to_string(),
            auth_style: registry.auth_style,
            client: build_client(timeout)?,
        })
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = if !api_key.is_empty() {
            api_key.to_string()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            model: model.to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            models_path: "/models".to_string(),
            auth_style,
            client: build_client(timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        apply_auth(req, self.auth_style, &self.api_key)
    }

    fn request_body(&self, prompt: &str, params: &GenerateParams) -> Value {
        let model = if self.model.is_empty() {
            params.model.as_str()
        } else {
            self.model.as_str()
        };
        json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
        })
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HelpdeskError::Http(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn apply_auth(
    req: reqwest::RequestBuilder,
    auth_style: AuthStyle,
    api_key: &str,
) -> reqwest::RequestBuilder {
    match auth_style {
        AuthStyle::Bearer if !api_key.is_empty() => {
            req.header("Authorization", format!("Bearer {api_key}"))
        }
        _ => req,
    }
}

/// Map a transport failure, keeping timeouts distinct so callers fail closed.
pub(crate) fn map_send_error(name: &str, url: &str, e: reqwest::Error) -> HelpdeskError {
    if e.is_timeout() {
        HelpdeskError::Timeout(format!("{name} request to {url} timed out"))
    } else {
        HelpdeskError::Http(format!("{name} connection failed ({url}): {e}"))
    }
}

/// Pull the first choice's text out of a chat completion payload.
fn parse_completion(name: &str, json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| HelpdeskError::Generation(format!("{name}: no choices in response")))?;
    Ok(choice["message"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl Generator for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String> {
        let body = self.request_body(prompt, params);
        let url = format!("{}{}", self.base_url, self.chat_path);
        tracing::debug!("📤 {} chat request ({} prompt chars)", self.name, prompt.len());

        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let resp = self
            .apply_auth(req)
            .send()
            .await
            .map_err(|e| map_send_error(&self.name, &url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HelpdeskError::Generation(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                HelpdeskError::Timeout(format!("{} response body timed out", self.name))
            } else {
                HelpdeskError::Generation(format!("{}: invalid response body: {e}", self.name))
            }
        })?;
        parse_completion(&self.name, &json)
    }

    async fn health_check(&self) -> Result<bool> {
        if self.auth_style != AuthStyle::None {
            // Cloud providers: a resolved key is as far as we check without spending tokens
            return Ok(!self.api_key.is_empty());
        }

        let url = format!("{}{}", self.base_url, self.models_path);
        let resp = self.client.get(&url).send().await;
        Ok(resp.is_ok())
    }
}
