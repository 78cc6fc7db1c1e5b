//! TF-IDF text vectorizer over word n-grams.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Fitted TF-IDF vectorizer.
///
/// Vocabulary terms are kept in sorted order; a term's position is its
/// column in the feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: Vec<String>,
    idf: Vec<f64>,
    max_ngram: usize,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TfidfVectorizer {
    /// Learn vocabulary and IDF weights from already-lowercased documents.
    pub fn fit(documents: &[String], max_features: usize, max_ngram: usize) -> Result<Self> {
        let max_ngram = max_ngram.max(1);
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = ngrams(doc, max_ngram);
            let mut unique = HashSet::new();
            for term in terms {
                *term_counts.entry(term.clone()).or_insert(0) += 1;
                unique.insert(term);
            }
            for term in unique {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        if term_counts.is_empty() {
            return Err(Error::Training(
                "empty vocabulary: patterns contain no words of two or more characters".into(),
            ));
        }

        // Most frequent first; BTreeMap iteration already breaks ties alphabetically.
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);

        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        vocabulary.sort();

        let n_docs = documents.len() as f64;
        let idf = vocabulary
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        let mut vectorizer = Self {
            vocabulary,
            idf,
            max_ngram,
            index: HashMap::new(),
        };
        vectorizer.rebuild_index();
        Ok(vectorizer)
    }

    /// Restore the term lookup after deserialization and check shapes.
    pub(crate) fn rebuild_index(&mut self) {
        self.index = self
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i))
            .collect();
    }

    pub(crate) fn check_consistency(&self) -> std::result::Result<(), String> {
        if self.vocabulary.is_empty() {
            return Err("vectorizer has an empty vocabulary".into());
        }
        if self.vocabulary.len() != self.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                self.vocabulary.len(),
                self.idf.len()
            ));
        }
        if self.index.len() != self.vocabulary.len() {
            return Err("vocabulary contains duplicate terms".into());
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// L2-normalised TF-IDF vector. Text with no known terms maps to zeros.
    pub fn transform(&self, text: &str) -> Vec<f64> {
        let mut features = vec![0.0; self.vocabulary.len()];
        for term in ngrams(text, self.max_ngram) {
            if let Some(&col) = self.index.get(&term) {
                features[col] += 1.0;
            }
        }
        for (value, idf) in features.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        let norm = features.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in &mut features {
                *value /= norm;
            }
        }
        features
    }
}

/// Words are runs of two or more word characters (letters, digits, `_`).
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| word.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn ngrams(text: &str, max_ngram: usize) -> Vec<String> {
    let tokens = tokenize(text);
    let mut terms = Vec::with_capacity(tokens.len() * max_ngram);
    for n in 1..=max_ngram {
        if tokens.len() < n {
            break;
        }
        for window in tokens.windows(n) {
            terms.push(window.join(" "));
        }
    }
    terms
}
