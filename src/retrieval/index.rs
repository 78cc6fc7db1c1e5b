//! Exact (brute-force) L2 index with a parallel document list.

use super::corpus::Document;
use serde::{Deserialize, Serialize};

/// Embeddings and the documents they came from, position for position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    embedder: String,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    documents: Vec<Document>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub document: Document,
    /// Squared L2 distance to the query; smaller is closer.
    pub distance: f32,
}

impl VectorIndex {
    pub fn new(
        embedder: impl Into<String>,
        dimension: usize,
        vectors: Vec<Vec<f32>>,
        documents: Vec<Document>,
    ) -> std::result::Result<Self, String> {
        let index = Self {
            embedder: embedder.into(),
            dimension,
            vectors,
            documents,
        };
        index.check()?;
        Ok(index)
    }

    /// Index entries must match documents one to one and share one width.
    pub(crate) fn check(&self) -> std::result::Result<(), String> {
        if self.vectors.len() != self.documents.len() {
            return Err(format!(
                "index holds {} vectors but {} documents",
                self.vectors.len(),
                self.documents.len()
            ));
        }
        if let Some(v) = self.vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(format!(
                "vector of width {} in an index of dimension {}",
                v.len(),
                self.dimension
            ));
        }
        if self.vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err("index contains non-finite values".into());
        }
        Ok(())
    }

    pub fn embedder(&self) -> &str {
        &self.embedder
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Up to `top_k` nearest documents, ascending by distance. Equal
    /// distances keep index order.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievedDocument> {
        if query.len() != self.dimension || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, distance)| RetrievedDocument {
                document: self.documents[i].clone(),
                distance,
            })
            .collect()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
