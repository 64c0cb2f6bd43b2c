//! Keyword retrieval index with JSON persistence

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlgate_core::{Result, RetrievalIndex, RetrievalMatch};
use sqlgate_schema::SchemaIndex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::fs;

/// Document with pre-computed word set
#[derive(Debug, Clone)]
struct IndexedDocument {
    text: String,
    words: HashSet<String>,
}

impl IndexedDocument {
    fn new(text: String) -> Self {
        let words = extract_words(&text);
        Self { text, words }
    }
}

/// On-disk format
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    documents: Vec<String>,
}

/// In-memory retrieval index scored by word-set cosine similarity.
///
/// Thread-safe; clones share the same documents.
#[derive(Clone, Default)]
pub struct KeywordIndex {
    documents: Arc<RwLock<Vec<IndexedDocument>>>,
    path: Option<PathBuf>,
}

impl KeywordIndex {
    /// Index that is never persisted; `save` and `load` do nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index backed by a JSON file at `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            documents: Arc::default(),
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Add the table and column documentation of a schema index. Returns how
    /// many documents were new.
    pub async fn add_schema_index(&self, index: &SchemaIndex) -> Result<usize> {
        let mut documents = self.write();
        let before = documents.len();
        for text in index.documents() {
            insert_unique(&mut documents, text);
        }
        Ok(documents.len() - before)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<IndexedDocument>> {
        self.documents.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<IndexedDocument>> {
        self.documents.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl RetrievalIndex for KeywordIndex {
    async fn search(&self, text: &str, k: usize) -> Result<Vec<RetrievalMatch>> {
        let query_words = extract_words(text);
        let documents = self.read();

        let mut scored: Vec<(usize, f32)> = documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (i, cosine_similarity(&query_words, &doc.words)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| RetrievalMatch {
                text: documents[i].text.clone(),
                score,
            })
            .collect())
    }

    async fn add_document(&self, text: &str) -> Result<()> {
        insert_unique(&mut self.write(), text);
        Ok(())
    }

    async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = IndexFile {
            documents: self.read().iter().map(|d| d.text.clone()).collect(),
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }

        // write-then-rename so a crash never leaves a truncated index behind
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        fs::write(&tmp, &json).await?;
        fs::rename(&tmp, path).await?;

        tracing::info!(path = %path.display(), documents = file.documents.len(), "Saved retrieval index");
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if !fs::try_exists(path).await? {
            tracing::info!(path = %path.display(), "No retrieval index on disk, starting empty");
            self.write().clear();
            return Ok(());
        }

        let bytes = fs::read(path).await?;
        let file: IndexFile = serde_json::from_slice(&bytes)?;

        let mut documents = self.write();
        documents.clear();
        for text in &file.documents {
            insert_unique(&mut documents, text);
        }

        tracing::info!(path = %path.display(), documents = documents.len(), "Loaded retrieval index");
        Ok(())
    }
}

fn insert_unique(documents: &mut Vec<IndexedDocument>, text: &str) {
    let text = text.trim();
    if text.is_empty() || documents.iter().any(|d| d.text == text) {
        return;
    }
    documents.push(IndexedDocument::new(text.to_string()));
}

/// Extract lower-cased words; anything other than letters, digits and `_`
/// separates words.
fn extract_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Cosine similarity of two word sets: `|a ∩ b| / sqrt(|a| * |b|)`.
fn cosine_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (smaller, larger) = if a.len() < b.len() { (a, b) } else { (b, a) };
    let shared = smaller.iter().filter(|w| larger.contains(*w)).count();

    shared as f32 / ((a.len() * b.len()) as f32).sqrt()
}
