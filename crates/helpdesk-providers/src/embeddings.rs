//! Embedding functions.
//!
//! `OpenAiCompatibleEmbedder` calls a remote `/embeddings` endpoint;
//! `HashingEmbedder` is an offline signed feature-hashing embedder whose
//! vectors are stable across processes, so a persisted index built with it
//! stays valid.

use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::Embedder;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::openai_compatible::{apply_auth, build_client, map_send_error};
use crate::provider_registry::{AuthStyle, ProviderConfig};

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ─── Remote ──────────────────────────────────────────────────────────────────

pub struct OpenAiCompatibleEmbedder {
    name: String,
    model: String,
    dimension: usize,
    api_key: String,
    auth_style: AuthStyle,
    url: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleEmbedder {
    pub fn from_registry(
        registry: &ProviderConfig,
        model: &str,
        api_key: &str,
        endpoint: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = registry.resolve_api_key(api_key);
        if registry.requires_auth() && api_key.is_empty() {
            return Err(HelpdeskError::ApiKeyMissing(format!(
                "{} embeddings (set embedding.api_key or one of {:?})",
                registry.name, registry.env_keys
            )));
        }
        Ok(Self {
            name: format!("{}:{}", registry.name, model),
            model: model.to_string(),
            dimension,
            api_key,
            auth_style: registry.auth_style,
            url: format!(
                "{}{}",
                registry.resolve_base_url(endpoint),
                registry.embeddings_path
            ),
            client: build_client(timeout)?,
        })
    }

    fn parse_vectors(&self, json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
        let data = json["data"]
            .as_array()
            .ok_or_else(|| HelpdeskError::Embedding(format!("{}: no data in response", self.name)))?;
        if data.len() != expected {
            return Err(HelpdeskError::Embedding(format!(
                "{}: expected {expected} vectors, got {}",
                self.name,
                data.len()
            )));
        }

        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for (pos, item) in data.iter().enumerate() {
            let idx = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
            let mut vector: Vec<f32> = item["embedding"]
                .as_array()
                .ok_or_else(|| {
                    HelpdeskError::Embedding(format!("{}: item {pos} has no embedding", self.name))
                })?
                .iter()
                .map(|x| x.as_f64().unwrap_or_default() as f32)
                .collect();
            if vector.len() != self.dimension {
                return Err(HelpdeskError::Embedding(format!(
                    "{}: dimension {} does not match configured {}",
                    self.name,
                    vector.len(),
                    self.dimension
                )));
            }
            l2_normalize(&mut vector);
            indexed.push((idx, vector));
        }
        indexed.sort_by_key(|(idx, _)| *idx);
        Ok(indexed.into_iter().map(|(_, v)| v).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let body = json!({ "model": self.model, "input": texts });
        let req = self.client.post(&self.url).json(&body);
        let resp = apply_auth(req, self.auth_style, &self.api_key)
            .send()
            .await
            .map_err(|e| match map_send_error(&self.name, &self.url, e) {
                HelpdeskError::Http(msg) => HelpdeskError::Embedding(msg),
                other => other,
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(HelpdeskError::Embedding(format!(
                "{} embeddings error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| HelpdeskError::Embedding(format!("{}: {e}", self.name)))?;
        self.parse_vectors(&json, texts.len())
    }
}

// ─── Local ───────────────────────────────────────────────────────────────────

/// Deterministic signed feature hashing over word unigrams and bigrams.
pub struct HashingEmbedder {
    name: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            name: "hashing-v1".to_string(),
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens = Self::tokens(text);
        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider_registry::get_provider_config;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed_text("Como faço para cancelar minha assinatura?");
        let b = e.embed_text("Como faço para cancelar minha assinatura?");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_similar_texts_score_higher() {
        let e = HashingEmbedder::new(384);
        let q = e.embed_text("prazo de reembolso");
        let near = e.embed_text("Qual o prazo de reembolso de uma compra?");
        let far = e.embed_text("Como configurar o domínio do site");
        assert!(dot(&q, &near) > dot(&q, &far));
    }

    #[test]
    fn test_hashing_case_insensitive() {
        let e = HashingEmbedder::new(32);
        assert_eq!(e.embed_text("Reembolso"), e.embed_text("reembolso"));
    }

    #[tokio::test]
    async fn test_embed_batch_order() {
        let e = HashingEmbedder::new(32);
        let texts = vec!["um".to_string(), "dois".to_string()];
        let out = e.embed(&texts).await.unwrap();
        assert_eq!(out[0], e.embed_text("um"));
        assert_eq!(out[1], e.embed_text("dois"));
        assert_eq!(e.embed_one("dois").await.unwrap(), out[1]);
    }

    #[test]
    fn test_parse_remote_vectors_reorders_by_index() {
        let e = OpenAiCompatibleEmbedder::from_registry(
            get_provider_config("ollama").unwrap(),
            "nomic-embed-text",
            "",
            "http://127.0.0.1:9/v1",
            2,
            Duration::from_secs(1),
        )
        .unwrap();
        let json = json!({"data": [
            {"index": 1, "embedding": [0.0, 2.0]},
            {"index": 0, "embedding": [3.0, 0.0]},
        ]});
        let vectors = e.parse_vectors(&json, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);

        let wrong_dim = json!({"data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]});
        assert!(e.parse_vectors(&wrong_dim, 1).is_err());
    }
}
