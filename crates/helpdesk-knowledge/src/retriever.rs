//! Knowledge retriever: persisted index plus exhaustive cosine search.

use helpdesk_core::config::KnowledgeConfig;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::traits::Embedder;
use helpdesk_core::types::{RetrievedChunk, SourceDocument};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::chunker::{DocumentChunk, TextChunker};
use crate::store::{StoredChunk, VectorStore};

const EMBED_BATCH: usize = 64;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// What `setup` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SetupOutcome {
    /// Existing collection loaded; nothing was embedded.
    Loaded { chunks: usize },
    /// Collection (re)built from the corpus.
    Built { documents: usize, chunks: usize },
    /// No persisted collection and no corpus to build one from.
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub collection_name: String,
    pub persist_directory: String,
    pub total_chunks: usize,
    pub embedder: String,
    pub ready: bool,
}

pub struct KnowledgeRetriever {
    collection: String,
    persist_dir: PathBuf,
    embedder: Arc<dyn Embedder>,
    chunker: TextChunker,
    embed_timeout: Duration,
    index: RwLock<Option<Arc<Vec<StoredChunk>>>>,
}

impl KnowledgeRetriever {
    pub fn new(cfg: &KnowledgeConfig, embedder: Arc<dyn Embedder>, embed_timeout: Duration) -> Self {
        Self {
            collection: cfg.collection_name.clone(),
            persist_dir: cfg.persist_dir(),
            embedder,
            chunker: TextChunker::from_config(cfg),
            embed_timeout,
            index: RwLock::new(None),
        }
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Load the persisted collection, or build it from `corpus`.
    ///
    /// Loading never re-embeds. `force_rebuild` discards the persisted
    /// collection and requires a corpus.
    pub async fn setup(
        &self,
        corpus: Option<&[SourceDocument]>,
        force_rebuild: bool,
    ) -> Result<SetupOutcome> {
        let store = VectorStore::open(&self.persist_dir)?;

        if !force_rebuild {
            if let Some((info, chunks)) = store.load(&self.collection)? {
                if info.embedder != self.embedder.name()
                    || info.dimension != self.embedder.dimension()
                {
                    return Err(HelpdeskError::Retrieval(format!(
                        "collection '{}' was built with {} (dim {}), configured embedder is {} \
                         (dim {}); rebuild the index",
                        self.collection,
                        info.embedder,
                        info.dimension,
                        self.embedder.name(),
                        self.embedder.dimension()
                    )));
                }
                let n = chunks.len();
                *self.index.write().await = Some(Arc::new(chunks));
                tracing::info!(
                    "📚 Loaded collection '{}' ({} chunks) from {}",
                    self.collection,
                    n,
                    store.path().display()
                );
                return Ok(SetupOutcome::Loaded { chunks: n });
            }
        }

        let Some(docs) = corpus else {
            if force_rebuild {
                return Err(HelpdeskError::Corpus(
                    "force rebuild requested without a corpus".into(),
                ));
            }
            tracing::warn!(
                "⚠️ No collection '{}' in {} and no corpus to build it",
                self.collection,
                self.persist_dir.display()
            );
            return Ok(SetupOutcome::Missing);
        };

        let chunks = self.chunker.chunk_documents(docs);
        tracing::info!(
            "🔨 Building collection '{}': {} documents → {} chunks",
            self.collection,
            docs.len(),
            chunks.len()
        );
        let embeddings = self.embed_chunks(&chunks).await?;
        store.rebuild(
            &self.collection,
            self.embedder.name(),
            self.embedder.dimension(),
            &chunks,
            &embeddings,
        )?;

        let n = chunks.len();
        let stored = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredChunk { chunk, embedding })
            .collect();
        *self.index.write().await = Some(Arc::new(stored));
        Ok(SetupOutcome::Built {
            documents: docs.len(),
            chunks: n,
        })
    }

    async fn embed_chunks(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embed_with_timeout(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(HelpdeskError::Embedding(format!(
                    "{} returned {} vectors for {} texts",
                    self.embedder.name(),
                    vectors.len(),
                    texts.len()
                )));
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    async fn embed_with_timeout(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed(texts))
            .await
            .map_err(|_| {
                HelpdeskError::Retrieval(format!(
                    "embedding timed out after {}s",
                    self.embed_timeout.as_secs_f32()
                ))
            })?
    }

    pub async fn is_ready(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Top-`k` chunks by cosine similarity, highest first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let index = self
            .index
            .read()
            .await
            .clone()
            .ok_or(HelpdeskError::RetrieverNotInitialized)?;
        if k == 0 || index.is_empty() {
            return Ok(vec![]);
        }

        let query_vec = self
            .embed_with_timeout(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| HelpdeskError::Retrieval("empty query embedding".into()))?;
        if query_vec.len() != self.embedder.dimension() {
            return Err(HelpdeskError::Retrieval(format!(
                "query embedding has dimension {}, index expects {}",
                query_vec.len(),
                self.embedder.dimension()
            )));
        }

        let mut scored: Vec<(f32, usize)> = index
            .iter()
            .enumerate()
            .map(|(i, c)| (cosine_similarity(&query_vec, &c.embedding), i))
            .collect();
        // stable: ties keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let results: Vec<RetrievedChunk> = scored
            .into_iter()
            .take(k)
            .map(|(score, i)| {
                let c = &index[i].chunk;
                RetrievedChunk {
                    content: c.content.clone(),
                    source_title: c.title.clone(),
                    source_url: c.url.clone(),
                    similarity_score: score,
                    chunk_index: c.chunk_index,
                }
            })
            .collect();
        tracing::debug!(
            "🔎 search k={} → {} hits (best {:.3})",
            k,
            results.len(),
            results.first().map(|r| r.similarity_score).unwrap_or_default()
        );
        Ok(results)
    }

    pub async fn stats(&self) -> RetrieverStats {
        let index = self.index.read().await;
        RetrieverStats {
            collection_name: self.collection.clone(),
            persist_directory: self.persist_dir.display().to_string(),
            total_chunks: index.as_ref().map(|i| i.len()).unwrap_or(0),
            embedder: self.embedder.name().to_string(),
            ready: index.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use helpdesk_providers::embeddings::HashingEmbedder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hashing embedder that counts how many texts it embedded.
    struct Counting {
        inner: HashingEmbedder,
        texts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Embedder for Counting {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    struct Stalled;

    #[async_trait]
    impl Embedder for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }
        fn dimension(&self) -> usize {
            4
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    fn config(dir: &std::path::Path) -> KnowledgeConfig {
        KnowledgeConfig {
            persist_directory: dir.display().to_string(),
            ..Default::default()
        }
    }

    fn counting() -> (Arc<dyn Embedder>, Arc<AtomicUsize>) {
        let texts = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Counting {
                inner: HashingEmbedder::new(256),
                texts: texts.clone(),
            }),
            texts,
        )
    }

    fn corpus() -> Vec<SourceDocument> {
        vec![
            SourceDocument {
                title: "Reembolso".into(),
                url: "https://help.example.com/reembolso".into(),
                body: "O reembolso pode ser solicitado em até sete dias após a compra.".into(),
            },
            SourceDocument {
                title: "Senha".into(),
                url: "https://help.example.com/senha".into(),
                body: "Para trocar a senha acesse a página de perfil e clique em segurança.".into(),
            },
            SourceDocument {
                title: "Certificado".into(),
                url: "https://help.example.com/certificado".into(),
                body: "O certificado de conclusão fica disponível ao terminar todas as aulas.".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_search_before_setup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        let err = r.search("reembolso", 3).await.unwrap_err();
        assert!(matches!(err, HelpdeskError::RetrieverNotInitialized));
        assert!(!r.is_ready().await);
    }

    #[tokio::test]
    async fn test_missing_without_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        assert_eq!(r.setup(None, false).await.unwrap(), SetupOutcome::Missing);
        assert!(r.setup(None, true).await.is_err());
    }

    #[tokio::test]
    async fn test_exact_keyword_match_ranks_first() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        let docs = corpus();
        let outcome = r.setup(Some(&docs), false).await.unwrap();
        assert_eq!(outcome, SetupOutcome::Built { documents: 3, chunks: 3 });

        let hits = r.search("certificado de conclusão", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_title, "Certificado");

        let all = r.search("certificado de conclusão", 3).await.unwrap();
        assert_eq!(all[0].source_title, "Certificado");
        assert!(all.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[tokio::test]
    async fn test_k_zero_and_k_larger_than_index() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        r.setup(Some(&corpus()), false).await.unwrap();
        assert!(r.search("senha", 0).await.unwrap().is_empty());
        assert_eq!(r.search("senha", 50).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_load_is_idempotent_and_skips_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let docs = corpus();
        {
            let (e, _) = counting();
            let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
            r.setup(Some(&docs), false).await.unwrap();
        }

        let (e, embedded) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        // corpus is offered but the persisted index wins
        assert_eq!(
            r.setup(Some(&docs), false).await.unwrap(),
            SetupOutcome::Loaded { chunks: 3 }
        );
        let first = r.search("trocar a senha", 2).await.unwrap();
        assert_eq!(r.setup(None, false).await.unwrap(), SetupOutcome::Loaded { chunks: 3 });
        let second = r.search("trocar a senha", 2).await.unwrap();

        assert_eq!(first, second);
        // only the two query embeddings
        assert_eq!(embedded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_rebuild_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        r.setup(Some(&corpus()), false).await.unwrap();

        let smaller = vec![corpus().remove(0)];
        let outcome = r.setup(Some(&smaller), true).await.unwrap();
        assert_eq!(outcome, SetupOutcome::Built { documents: 1, chunks: 1 });
        assert_eq!(r.stats().await.total_chunks, 1);
    }

    #[tokio::test]
    async fn test_embedder_mismatch_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5))
            .setup(Some(&corpus()), false)
            .await
            .unwrap();

        let other: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(64));
        let r = KnowledgeRetriever::new(&config(dir.path()), other, Duration::from_secs(5));
        let err = r.setup(None, false).await.unwrap_err();
        assert!(matches!(err, HelpdeskError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_embedding_timeout_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let r = KnowledgeRetriever::new(
            &config(dir.path()),
            Arc::new(Stalled),
            Duration::from_millis(50),
        );
        let err = r.setup(Some(&corpus()), false).await.unwrap_err();
        assert!(matches!(err, HelpdeskError::Retrieval(_)));
        assert!(!r.is_ready().await);
    }

    #[tokio::test]
    async fn test_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (e, _) = counting();
        let r = KnowledgeRetriever::new(&config(dir.path()), e, Duration::from_secs(5));
        let before = r.stats().await;
        assert!(!before.ready);
        assert_eq!(before.collection_name, "project_faq");
        r.setup(Some(&corpus()), false).await.unwrap();
        let after = r.stats().await;
        assert!(after.ready);
        assert_eq!(after.total_chunks, 3);
        assert_eq!(after.embedder, "hashing-v1");
    }

    #[test]
    fn test_cosine() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
