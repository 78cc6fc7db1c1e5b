//! Semantic retrieval over the knowledge base.
//!
//! Documents are embedded once at build time; a query is embedded with the
//! same [`Embedder`] and matched by exact L2 distance. Search never fails:
//! an unbuilt index or an embedding error yields no context, and the router
//! proceeds without grounding.

pub mod corpus;
pub mod embedder;
pub mod index;

pub use corpus::{load_documents, Document};
pub use embedder::{create_embedder, Embedder, HashingEmbedder};
pub use index::{RetrievedDocument, VectorIndex};

use crate::artifacts::{self, ArtifactKind};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

const COMPONENT: &str = "semantic retriever";

/// Returned by [`SemanticRetriever::build_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub documents: usize,
}

pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    index: Option<VectorIndex>,
}

impl fmt::Debug for SemanticRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticRetriever")
            .field("embedder", &self.embedder.name())
            .field("documents", &self.len())
            .finish()
    }
}

impl SemanticRetriever {
    /// An unbuilt retriever; [`search`](Self::search) returns nothing.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            index: None,
        }
    }

    /// Load a saved index, rejecting one built with a different embedder.
    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index: VectorIndex = artifacts::load(path, ArtifactKind::VectorIndex)?;
        index.check().map_err(|reason| Error::corrupt(path, reason))?;

        if index.embedder() != embedder.name() {
            return Err(Error::corrupt(
                path,
                format!(
                    "index was built with embedder '{}', current embedder is '{}'",
                    index.embedder(),
                    embedder.name()
                ),
            ));
        }
        if index.dimension() != embedder.dimension() {
            return Err(Error::corrupt(
                path,
                format!(
                    "index dimension {} does not match embedder dimension {}",
                    index.dimension(),
                    embedder.dimension()
                ),
            ));
        }

        tracing::info!(
            path = %path.display(),
            documents = index.len(),
            embedder = index.embedder(),
            "Vector index loaded"
        );
        Ok(Self {
            embedder,
            index: Some(index),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map_or(0, VectorIndex::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load `*.{extension}` documents from `dir` and index them.
    pub fn build_index(&mut self, dir: &Path, extension: &str) -> Result<IndexSummary> {
        let documents = load_documents(dir, extension)?;
        self.build_from_documents(documents)
    }

    /// Embed and index `documents`, keeping their order. The previous index
    /// is replaced only on success.
    pub fn build_from_documents(&mut self, documents: Vec<Document>) -> Result<IndexSummary> {
        if documents.is_empty() {
            return Err(Error::EmptyCorpus(Default::default()));
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let vectors = self.embedder.embed(&texts)?;
        let index = VectorIndex::new(
            self.embedder.name(),
            self.embedder.dimension(),
            vectors,
            documents,
        )
        .map_err(Error::Embedding)?;

        let summary = IndexSummary {
            documents: index.len(),
        };
        tracing::info!(
            documents = summary.documents,
            embedder = self.embedder.name(),
            "Vector index built"
        );
        self.index = Some(index);
        Ok(summary)
    }

    /// Up to `top_k` documents nearest to `query`, most similar first.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievedDocument> {
        let Some(index) = self.index.as_ref().filter(|i| !i.is_empty()) else {
            return Vec::new();
        };

        match self.embedder.embed(&[query]) {
            Ok(mut vectors) => match vectors.pop() {
                Some(vector) => index.search(&vector, top_k),
                None => Vec::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Query embedding failed; continuing without context");
                Vec::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| Error::not_ready(COMPONENT, "nothing to save before build_index()"))?;
        artifacts::save(path, ArtifactKind::VectorIndex, index)?;
        tracing::info!(path = %path.display(), documents = index.len(), "Vector index saved");
        Ok(())
    }
}
