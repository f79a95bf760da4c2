//! CSV corpus loader.

use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::SourceDocument;
use serde::Serialize;
use std::io::Read;
use std::path::Path;

use crate::chunker::TextChunker;

pub const TITLE_COLUMN: &str = "article_name";
pub const URL_COLUMN: &str = "article_url";
pub const BODY_COLUMN: &str = "article_content";

/// Load documents from a CSV file with `article_name`, `article_url` and
/// `article_content` columns. Rows with a blank body are dropped.
pub fn load_csv(path: &Path) -> Result<Vec<SourceDocument>> {
    let file = std::fs::File::open(path).map_err(|e| {
        HelpdeskError::Corpus(format!("cannot open {}: {e}", path.display()))
    })?;
    let docs = load_csv_reader(file)?;
    tracing::info!("📄 Loaded {} articles from {}", docs.len(), path.display());
    Ok(docs)
}

pub fn load_csv_reader<R: Read>(reader: R) -> Result<Vec<SourceDocument>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|e| HelpdeskError::Corpus(format!("cannot read CSV header: {e}")))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let (Some(title_idx), Some(url_idx), Some(body_idx)) =
        (column(TITLE_COLUMN), column(URL_COLUMN), column(BODY_COLUMN))
    else {
        return Err(HelpdeskError::Corpus(format!(
            "CSV must contain the columns [{TITLE_COLUMN}, {URL_COLUMN}, {BODY_COLUMN}]"
        )));
    };

    let mut docs = Vec::new();
    let mut dropped = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = record
            .map_err(|e| HelpdeskError::Corpus(format!("bad CSV record {}: {e}", line + 1)))?;
        let body = record.get(body_idx).unwrap_or_default();
        if body.trim().is_empty() {
            dropped += 1;
            continue;
        }
        docs.push(SourceDocument {
            title: record.get(title_idx).unwrap_or_default().to_string(),
            url: record.get(url_idx).unwrap_or_default().to_string(),
            body: body.to_string(),
        });
    }
    if dropped > 0 {
        tracing::debug!("Dropped {dropped} rows with empty {BODY_COLUMN}");
    }
    Ok(docs)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_articles: usize,
    pub total_chunks: usize,
    /// Mean body length in characters.
    pub avg_content_length: f64,
    pub articles_with_multiple_chunks: usize,
}

pub fn corpus_stats(docs: &[SourceDocument], chunker: &TextChunker) -> CorpusStats {
    let mut total_chunks = 0;
    let mut multi = 0;
    let mut total_len = 0usize;
    for doc in docs {
        let n = chunker.split(&doc.indexed_text()).len();
        total_chunks += n;
        if n > 1 {
            multi += 1;
        }
        total_len += doc.body.chars().count();
    }
    CorpusStats {
        total_articles: docs.len(),
        total_chunks,
        avg_content_length: if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        },
        articles_with_multiple_chunks: multi,
    }
}
