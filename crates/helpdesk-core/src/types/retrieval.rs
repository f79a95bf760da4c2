use serde::{Deserialize, Serialize};

/// One row of the knowledge corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub url: String,
    pub body: String,
}

impl SourceDocument {
    /// Text that gets chunked and embedded.
    pub fn indexed_text(&self) -> String {
        format!("Título: {}\n\nConteúdo: {}", self.title, self.body)
    }
}

/// A stored chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub source_title: String,
    pub source_url: String,
    /// Cosine similarity; higher is more relevant.
    pub similarity_score: f32,
    pub chunk_index: usize,
}
