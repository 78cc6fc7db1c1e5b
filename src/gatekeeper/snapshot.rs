//! Versioned, immutable model snapshots.
//!
//! A request clones the current `Arc<ModelSnapshot>` once and uses it for
//! its whole pipeline. Retraining builds new components off to the side and
//! swaps a new snapshot in with a single pointer update, so in-flight
//! requests never observe a half-replaced model.

use crate::classifier::IntentClassifier;
use crate::retrieval::SemanticRetriever;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Classifier and retriever that serve together, tagged with a version.
#[derive(Debug)]
pub struct ModelSnapshot {
    pub version: u64,
    pub classifier: Arc<IntentClassifier>,
    pub retriever: Arc<SemanticRetriever>,
    pub created_at: DateTime<Utc>,
}

impl ModelSnapshot {
    pub fn new(
        version: u64,
        classifier: Arc<IntentClassifier>,
        retriever: Arc<SemanticRetriever>,
    ) -> Self {
        Self {
            version,
            classifier,
            retriever,
            created_at: Utc::now(),
        }
    }
}

/// Shared pointer to the current snapshot.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<ModelSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot serving right now.
    pub fn current(&self) -> Arc<ModelSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Install a new classifier, keeping the retriever. Returns the new version.
    pub fn replace_classifier(&self, classifier: Arc<IntentClassifier>) -> u64 {
        self.swap(|old| ModelSnapshot::new(old.version + 1, classifier, Arc::clone(&old.retriever)))
    }

    /// Install a new retriever, keeping the classifier. Returns the new version.
    pub fn replace_retriever(&self, retriever: Arc<SemanticRetriever>) -> u64 {
        self.swap(|old| ModelSnapshot::new(old.version + 1, Arc::clone(&old.classifier), retriever))
    }

    fn swap(&self, next: impl FnOnce(&ModelSnapshot) -> ModelSnapshot) -> u64 {
        let mut guard = self.current.write();
        let snapshot = next(&guard);
        let version = snapshot.version;
        *guard = Arc::new(snapshot);
        tracing::info!(version, "Model snapshot swapped");
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::IntentRecord;
    use crate::config::ClassifierConfig;
    use crate::retrieval::HashingEmbedder;

    fn empty_snapshot() -> ModelSnapshot {
        ModelSnapshot::new(
            1,
            Arc::new(IntentClassifier::new(ClassifierConfig::default())),
            Arc::new(SemanticRetriever::new(Arc::new(HashingEmbedder::new(16)))),
        )
    }

    #[test]
    fn swaps_bump_version_and_keep_other_component() {
        let handle = SnapshotHandle::new(empty_snapshot());
        let before = handle.current();
        assert_eq!(before.version, 1);

        let mut classifier = IntentClassifier::new(ClassifierConfig::default());
        classifier
            .train(&[
                IntentRecord::new("greeting", &["hi", "hello"], &["Hello!"]),
                IntentRecord::new("billing", &["refund policy"], &[]),
            ])
            .unwrap();

        assert_eq!(handle.replace_classifier(Arc::new(classifier)), 2);
        let after = handle.current();
        assert!(after.classifier.is_ready());
        assert!(Arc::ptr_eq(&before.retriever, &after.retriever));

        // The earlier snapshot is untouched.
        assert!(!before.classifier.is_ready());
        assert_eq!(before.version, 1);

        let retriever = Arc::new(SemanticRetriever::new(Arc::new(HashingEmbedder::new(16))));
        assert_eq!(handle.replace_retriever(Arc::clone(&retriever)), 3);
        assert!(Arc::ptr_eq(&handle.current().retriever, &retriever));
        assert!(Arc::ptr_eq(&handle.current().classifier, &after.classifier));
    }
}
