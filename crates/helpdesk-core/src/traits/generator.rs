//! Generative text service trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::Result;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self::from(&LlmConfig::default())
    }
}

impl From<&LlmConfig> for GenerateParams {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }
}

/// A service that turns a filled prompt into text.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a completion for a single user prompt.
    async fn generate(&self, prompt: &str, params: &GenerateParams) -> Result<String>;

    async fn health_check(&self) -> Result<bool>;
}
