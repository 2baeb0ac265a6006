/// The knowledge corpus behind the assistant.
///
/// Documents are loaded once at startup, optionally have missing embeddings filled in, and
/// are then frozen behind an `Arc` for the lifetime of the process. Nothing writes to the
/// corpus after `main` hands it to the pipeline, so concurrent requests share it without
/// locking.
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::KnowledgeDocument;
use farm_common::embedding::EmbeddingProvider;

#[derive(Debug, Default)]
pub struct Corpus {
    documents: Vec<KnowledgeDocument>,
}

impl Corpus {
    pub fn from_documents(documents: Vec<KnowledgeDocument>) -> Self {
        {
            let mut seen = HashSet::with_capacity(documents.len());
            for doc in &documents {
                if !seen.insert(doc.id.as_str()) {
                    warn!(id = %doc.id, "duplicate knowledge document id, both entries can be cited");
                }
            }
        }
        let corpus = Self { documents };

        let dims = corpus.embedding_dimensions();
        if dims.len() > 1 {
            warn!(
                ?dims,
                "knowledge documents have mixed embedding lengths, similarity scores will be unreliable"
            );
        }
        corpus
    }

    /// Load a JSON array of documents from disk.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let documents: Vec<KnowledgeDocument> = load_json(path)?;
        info!(path = %path.display(), documents = documents.len(), "knowledge corpus loaded");
        Ok(Self::from_documents(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents visible for `city_id`: that city's plus the city-agnostic ones, in corpus
    /// order. No city (or a blank one) returns the whole corpus.
    pub fn filter_by_city(&self, city_id: Option<&str>) -> Vec<&KnowledgeDocument> {
        match city_id.map(str::trim).filter(|c| !c.is_empty()) {
            None => self.documents.iter().collect(),
            Some(city) => self
                .documents
                .iter()
                .filter(|doc| doc.applies_to(city))
                .collect(),
        }
    }

    /// Distinct non-empty embedding lengths present in the corpus.
    pub fn embedding_dimensions(&self) -> BTreeSet<usize> {
        self.documents
            .iter()
            .map(|d| d.embedding.len())
            .filter(|&n| n > 0)
            .collect()
    }

    /// Embed every document that has no embedding yet, in a single batch.
    ///
    /// On failure the corpus is left as it was and the error is logged; ranking then falls
    /// back to corpus order for those documents. Returns the number of documents updated.
    pub async fn index_missing(&mut self, embedder: &dyn EmbeddingProvider) -> usize {
        let missing: Vec<usize> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_empty())
            .map(|(idx, _)| idx)
            .collect();
        if missing.is_empty() {
            return 0;
        }

        let texts: Vec<&str> = missing
            .iter()
            .map(|&idx| self.documents[idx].text.as_str())
            .collect();
        let vectors = match embedder.embed_batch(&texts).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, missing = missing.len(), "corpus indexing failed, keeping documents unembedded");
                return 0;
            }
        };
        if vectors.len() != missing.len() {
            warn!(
                expected = missing.len(),
                got = vectors.len(),
                "embedding batch size mismatch, keeping documents unembedded"
            );
            return 0;
        }

        for (&idx, vector) in missing.iter().zip(vectors) {
            self.documents[idx].embedding = vector;
        }
        info!(updated = missing.len(), "missing document embeddings computed");
        missing.len()
    }
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AppError::Json {
        path: path.display().to_string(),
        source,
    })
}
