//! # Helpdesk Knowledge
//!
//! Retrieval pipeline behind the general-knowledge handler.
//!
//! ```text
//! CSV corpus ─▶ TextChunker ─▶ Embedder ─▶ VectorStore (SQLite, index.db)
//!                                              │ load (no re-embedding)
//! question ─▶ Embedder ─▶ cosine top-k ◀───────┘
//! ```

pub mod chunker;
pub mod corpus;
pub mod retriever;
pub mod store;

pub use chunker::{DocumentChunk, TextChunker};
pub use corpus::{CorpusStats, corpus_stats, load_csv};
pub use retriever::{KnowledgeRetriever, RetrieverStats, SetupOutcome};
pub use store::VectorStore;
