//! SQLite-backed persistence for embedded chunks.
//!
//! One database file per persist directory; collections are keyed by name
//! and record which embedder produced their vectors so a mismatched load
//! can be refused.

use chrono::{DateTime, Utc};
use helpdesk_core::error::{HelpdeskError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::chunker::DocumentChunk;

pub const INDEX_FILE: &str = "index.db";

fn storage_err(e: impl std::fmt::Display) -> HelpdeskError {
    HelpdeskError::Storage(e.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub embedder: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

pub struct VectorStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl VectorStore {
    /// Open (or create) `{dir}/index.db`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(INDEX_FILE);
        let conn = Connection::open(&path).map_err(storage_err)?;
        Self::init(conn, path)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::init(conn, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                embedder TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS chunks (
                collection TEXT NOT NULL,
                position INTEGER NOT NULL,
                content TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                PRIMARY KEY (collection, position)
            );",
        )
        .map_err(storage_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(storage_err)
    }

    pub fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT name, embedder, dimension, chunk_count, created_at
                 FROM collections WHERE name = ?1",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(storage_err)?;

        row.map(|(name, embedder, dimension, chunk_count, created_at)| -> Result<CollectionInfo> {
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .map_err(storage_err)?;
            Ok(CollectionInfo {
                name,
                embedder,
                dimension: dimension as usize,
                chunk_count: chunk_count as usize,
                created_at,
            })
        })
        .transpose()
    }

    /// Read a whole collection in insertion order. `None` if it was never built.
    pub fn load(&self, name: &str) -> Result<Option<(CollectionInfo, Vec<StoredChunk>)>> {
        let Some(info) = self.collection_info(name)? else {
            return Ok(None);
        };

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT content, title, url, chunk_index, total_chunks, embedding
                 FROM chunks WHERE collection = ?1 ORDER BY position",
            )
            .map_err(storage_err)?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok(StoredChunk {
                    chunk: DocumentChunk {
                        content: row.get(0)?,
                        title: row.get(1)?,
                        url: row.get(2)?,
                        chunk_index: row.get::<_, i64>(3)? as usize,
                        total_chunks: row.get::<_, i64>(4)? as usize,
                    },
                    embedding: decode_embedding(&row.get::<_, Vec<u8>>(5)?),
                })
            })
            .map_err(storage_err)?;

        let chunks = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage_err)?;
        if chunks.len() != info.chunk_count {
            return Err(HelpdeskError::Storage(format!(
                "collection '{name}' is incomplete: expected {} chunks, found {}",
                info.chunk_count,
                chunks.len()
            )));
        }
        Ok(Some((info, chunks)))
    }

    /// Replace a collection atomically.
    pub fn rebuild(
        &self,
        name: &str,
        embedder: &str,
        dimension: usize,
        chunks: &[DocumentChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<CollectionInfo> {
        if chunks.len() != embeddings.len() {
            return Err(HelpdeskError::Storage(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let created_at = Utc::now();
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_err)?;
        tx.execute("DELETE FROM chunks WHERE collection = ?1", params![name])
            .map_err(storage_err)?;
        tx.execute("DELETE FROM collections WHERE name = ?1", params![name])
            .map_err(storage_err)?;
        tx.execute(
            "INSERT INTO collections (name, embedder, dimension, chunk_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                name,
                embedder,
                dimension as i64,
                chunks.len() as i64,
                created_at.to_rfc3339()
            ],
        )
        .map_err(storage_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chunks
                     (collection, position, content, title, url, chunk_index, total_chunks, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(storage_err)?;
            for (pos, (chunk, embedding)) in chunks.iter().zip(embeddings).enumerate() {
                stmt.execute(params![
                    name,
                    pos as i64,
                    chunk.content,
                    chunk.title,
                    chunk.url,
                    chunk.chunk_index as i64,
                    chunk.total_chunks as i64,
                    encode_embedding(embedding),
                ])
                .map_err(storage_err)?;
            }
        }
        tx.commit().map_err(storage_err)?;

        Ok(CollectionInfo {
            name: name.to_string(),
            embedder: embedder.to_string(),
            dimension,
            chunk_count: chunks.len(),
            created_at,
        })
    }
}

/// Little-endian f32 blob.
pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str, idx: usize) -> DocumentChunk {
        DocumentChunk {
            content: content.into(),
            title: "Artigo".into(),
            url: "https://help.example.com/a".into(),
            chunk_index: idx,
            total_chunks: 2,
        }
    }

    #[test]
    fn test_embedding_blob_layout() {
        let blob = encode_embedding(&[1.0, -0.5]);
        assert_eq!(blob.len(), 8);
        assert_eq!(&blob[..4], &1.0f32.to_le_bytes());
        assert_eq!(decode_embedding(&blob), vec![1.0, -0.5]);
    }

    #[test]
    fn test_missing_collection() {
        let store = VectorStore::open_in_memory().unwrap();
        assert!(store.load("project_faq").unwrap().is_none());
        assert!(store.collection_info("project_faq").unwrap().is_none());
    }

    #[test]
    fn test_rebuild_and_load() {
        let store = VectorStore::open_in_memory().unwrap();
        let chunks = vec![chunk("primeiro", 0), chunk("segundo", 1)];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        store.rebuild("faq", "hashing-v1", 2, &chunks, &vectors).unwrap();

        let (info, loaded) = store.load("faq").unwrap().unwrap();
        assert_eq!(info.embedder, "hashing-v1");
        assert_eq!(info.dimension, 2);
        assert_eq!(info.chunk_count, 2);
        assert_eq!(loaded[0].chunk.content, "primeiro");
        assert_eq!(loaded[1].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_rebuild_replaces_collection() {
        let store = VectorStore::open_in_memory().unwrap();
        store
            .rebuild("faq", "e", 1, &[chunk("a", 0), chunk("b", 1)], &[vec![1.0], vec![1.0]])
            .unwrap();
        store.rebuild("faq", "e", 1, &[chunk("c", 0)], &[vec![1.0]]).unwrap();
        let (_, loaded) = store.load("faq").unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].chunk.content, "c");
    }

    #[test]
    fn test_rebuild_rejects_length_mismatch() {
        let store = VectorStore::open_in_memory().unwrap();
        let err = store.rebuild("faq", "e", 1, &[chunk("a", 0)], &[]).unwrap_err();
        assert!(matches!(err, HelpdeskError::Storage(_)));
        assert!(store.load("faq").unwrap().is_none());
    }

    #[test]
    fn test_collections_are_isolated() {
        let store = VectorStore::open_in_memory().unwrap();
        store.rebuild("a", "e", 1, &[chunk("x", 0)], &[vec![1.0]]).unwrap();
        store.rebuild("b", "e", 1, &[chunk("y", 0)], &[vec![1.0]]).unwrap();
        store.rebuild("a", "e", 1, &[chunk("z", 0)], &[vec![1.0]]).unwrap();
        assert_eq!(store.load("a").unwrap().unwrap().1[0].chunk.content, "z");
        assert_eq!(store.load("b").unwrap().unwrap().1[0].chunk.content, "y");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::open(dir.path()).unwrap();
            store.rebuild("faq", "e", 1, &[chunk("x", 0)], &[vec![0.5]]).unwrap();
        }
        let store = VectorStore::open(dir.path()).unwrap();
        assert!(store.path().ends_with(INDEX_FILE));
        assert_eq!(store.load("faq").unwrap().unwrap().1[0].embedding, vec![0.5]);
    }
}
