//! Local intent classifier.
//!
//! Maps free text to one of the trained intent labels with a confidence
//! score, and carries each label's canned responses alongside the model.
//!
//! ## Design
//! - TF-IDF over word unigrams and bigrams, multinomial logistic regression
//! - Confidence is the model's own maximum class probability, uncalibrated:
//!   it is only meaningful relative to the training corpus
//! - Vectorizer, weights, labels and responses persist as one artifact

pub mod corpus;
pub mod softmax;
pub mod vectorizer;

pub use corpus::{load_intents, parse_intents, IntentRecord};

use crate::artifacts::{self, ArtifactKind};
use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use softmax::{SoftmaxRegression, TrainParams};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use vectorizer::TfidfVectorizer;

const COMPONENT: &str = "intent classifier";

/// Result of classifying one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentPrediction {
    /// Predicted label, always one of the trained labels.
    pub intent: String,
    /// Maximum class probability, in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Canned replies for `intent` (possibly empty).
    pub responses: Vec<String>,
}

/// Returned by [`IntentClassifier::train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Number of trainable labels.
    pub intents: usize,
    /// Number of (pattern, label) examples.
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TrainedState {
    vectorizer: TfidfVectorizer,
    model: SoftmaxRegression,
    labels: Vec<String>,
    responses: BTreeMap<String, Vec<String>>,
}

impl TrainedState {
    fn check(&self) -> std::result::Result<(), String> {
        self.vectorizer.check_consistency()?;
        self.model
            .check_shape(self.labels.len(), self.vectorizer.dimension())?;

        if self.labels.len() < 2 {
            return Err(format!("expected at least 2 labels, found {}", self.labels.len()));
        }
        if self.labels.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("labels are not sorted and unique".into());
        }
        if let Some(label) = self.labels.iter().find(|l| !self.responses.contains_key(*l)) {
            return Err(format!("no response entry for label '{label}'"));
        }
        Ok(())
    }
}

/// Text → intent classifier. Untrained until [`train`](Self::train) or
/// [`load`](Self::load) succeeds; prediction before that is `NotReady`.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    config: ClassifierConfig,
    state: Option<TrainedState>,
}

impl IntentClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Load a previously saved classifier.
    pub fn load(path: &Path, config: ClassifierConfig) -> Result<Self> {
        let mut state: TrainedState = artifacts::load(path, ArtifactKind::IntentClassifier)?;
        state.vectorizer.rebuild_index();
        state.check().map_err(|reason| Error::corrupt(path, reason))?;

        tracing::info!(
            path = %path.display(),
            labels = state.labels.len(),
            features = state.vectorizer.dimension(),
            "Intent classifier loaded"
        );
        Ok(Self {
            config,
            state: Some(state),
        })
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Trained labels in sorted order (empty when untrained).
    pub fn labels(&self) -> &[String] {
        self.state.as_ref().map_or(&[], |s| s.labels.as_slice())
    }

    /// Fit on the corpus, replacing any previous state only on success.
    pub fn train(&mut self, intents: &[IntentRecord]) -> Result<TrainingSummary> {
        corpus::validate(intents)?;

        let mut responses = BTreeMap::new();
        let mut texts = Vec::new();
        let mut tags = Vec::new();
        for intent in intents {
            responses.insert(intent.tag.clone(), intent.responses.clone());
            for pattern in &intent.patterns {
                texts.push(pattern.to_lowercase());
                tags.push(intent.tag.as_str());
            }
        }

        let labels: Vec<String> = tags
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        if labels.len() < 2 {
            return Err(Error::Training(format!(
                "need examples for at least two intents, found {}",
                labels.len()
            )));
        }

        let vectorizer =
            TfidfVectorizer::fit(&texts, self.config.max_features, self.config.max_ngram)?;
        let x: Vec<Vec<f64>> = texts.iter().map(|t| vectorizer.transform(t)).collect();
        let y: Vec<usize> = tags
            .iter()
            .map(|tag| labels.iter().position(|l| l == tag).unwrap_or_default())
            .collect();

        let (model, report) = SoftmaxRegression::fit(
            &x,
            &y,
            labels.len(),
            TrainParams {
                inverse_regularization: self.config.inverse_regularization,
                max_iter: self.config.max_iter,
                learning_rate: self.config.learning_rate,
                tolerance: self.config.tolerance,
            },
        );
        if !report.converged {
            tracing::warn!(
                iterations = report.iterations,
                "Intent classifier stopped at max_iter before converging"
            );
        }

        let summary = TrainingSummary {
            intents: labels.len(),
            samples: texts.len(),
        };
        tracing::info!(
            intents = summary.intents,
            samples = summary.samples,
            features = vectorizer.dimension(),
            iterations = report.iterations,
            "Intent classifier trained"
        );

        self.state = Some(TrainedState {
            vectorizer,
            model,
            labels,
            responses,
        });
        Ok(summary)
    }

    /// Classify one utterance.
    pub fn predict(&self, text: &str) -> Result<IntentPrediction> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::not_ready(COMPONENT, "call train() or load() first"))?;

        let features = state.vectorizer.transform(&text.to_lowercase());
        let probs = state.model.probabilities(&features);
        let best = softmax::argmax(&probs)
            .ok_or_else(|| Error::not_ready(COMPONENT, "model has no classes"))?;

        let intent = state.labels[best].clone();
        let responses = state.responses.get(&intent).cloned().unwrap_or_default();
        Ok(IntentPrediction {
            intent,
            confidence: probs[best].clamp(0.0, 1.0),
            responses,
        })
    }

    /// Persist the fitted state as one artifact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| Error::not_ready(COMPONENT, "nothing to save before training"))?;
        artifacts::save(path, ArtifactKind::IntentClassifier, state)?;
        tracing::info!(path = %path.display(), "Intent classifier saved");
        Ok(())
    }
}
