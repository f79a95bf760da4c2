//! # Helpdesk Providers
//!
//! Clients for the two external black-box services: the generative text
//! model and the embedding model.
//!
//! Every OpenAI-compatible backend (Hugging Face router, OpenAI, Groq,
//! OpenRouter, Ollama, llama.cpp) is served by `OpenAiCompatibleProvider`;
//! configured fallbacks are chained through `FailoverGenerator`.

pub mod embeddings;
pub mod failover;
pub mod openai_compatible;
pub mod provider_registry;

use helpdesk_core::config::{EmbeddingConfig, LlmConfig};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::{Embedder, Generator};
use std::sync::Arc;
use std::time::Duration;

use openai_compatible::OpenAiCompatibleProvider;

fn build_one(
    provider: &str,
    model: &str,
    api_key: &str,
    endpoint: &str,
    timeout: Duration,
) -> Result<Box<dyn Generator>> {
    if provider.starts_with("custom:") {
        return Ok(Box::new(OpenAiCompatibleProvider::custom(
            provider, model, api_key, timeout,
        )?));
    }
    let registry = provider_registry::get_provider_config(provider)
        .ok_or_else(|| HelpdeskError::ProviderNotFound(provider.into()))?;
    Ok(Box::new(OpenAiCompatibleProvider::from_registry(
        registry, model, api_key, endpoint, timeout,
    )?))
}

/// Create the generator from `[llm]`, wrapping it in a failover chain when
/// fallbacks are configured.
pub fn create_generator(llm: &LlmConfig) -> Result<Arc<dyn Generator>> {
    let timeout = Duration::from_secs(llm.timeout_secs);
    let primary = build_one(&llm.provider, &llm.model, &llm.api_key, &llm.endpoint, timeout)?;
    if llm.fallbacks.is_empty() {
        return Ok(Arc::from(primary));
    }

    let mut chain = vec![primary];
    for fb in &llm.fallbacks {
        match build_one(&fb.provider, &fb.model, &fb.api_key, &fb.endpoint, timeout) {
            Ok(g) => chain.push(g),
            // a broken fallback must not take down a working primary
            Err(e) => tracing::warn!("⚠️ Skipping fallback {}: {}", fb.provider, e),
        }
    }
    tracing::info!("🔗 Generator failover chain: {} providers", chain.len());
    Ok(Arc::new(failover::FailoverGenerator::new(chain)?))
}

/// Create the embedder from `[embedding]`.
pub fn create_embedder(cfg: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match cfg.provider.as_str() {
        "hashing" => Ok(Arc::new(embeddings::HashingEmbedder::new(cfg.dimension))),
        name => {
            let registry = provider_registry::get_provider_config(name)
                .ok_or_else(|| HelpdeskError::ProviderNotFound(name.into()))?;
            Ok(Arc::new(embeddings::OpenAiCompatibleEmbedder::from_registry(
                registry,
                &cfg.model,
                &cfg.api_key,
                &cfg.endpoint,
                cfg.dimension,
                Duration::from_secs(cfg.timeout_secs),
            )?))
        }
    }
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    let mut names = provider_registry::all_provider_names();
    names.push("custom");
    names
}
