//! Embedding function trait.

use async_trait::async_trait;

use crate::error::Result;

/// Maps texts to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier persisted alongside an index.
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Embed a batch; output order matches input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| {
            crate::error::HelpdeskError::Embedding(format!("{} returned no vector", self.name()))
        })
    }
}
