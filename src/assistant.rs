//! Service façade: wires the classifier, retriever, router and exchange log
//! together and exposes the chat, admin and stats operations.

use crate::classifier::{load_intents, IntentClassifier, TrainingSummary};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::gatekeeper::{
    BrandNormalizer, ModelSnapshot, ResponsePicker, ResponseRouter, RouteOutcome, SnapshotHandle,
};
use crate::providers::{create_backend, GenerativeBackend};
use crate::retrieval::{create_embedder, Embedder, IndexSummary, SemanticRetriever};
use crate::telemetry::{
    ChatExchange, ExchangeLog, ExchangeQuery, ExchangeSink, ExchangeStats, NullSink,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Result of an admin operation plus the snapshot version it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    #[serde(flatten)]
    pub summary: T,
    pub model_version: u64,
}

/// Readiness report for `/health` and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub classifier_ready: bool,
    pub intents: Vec<String>,
    pub documents: usize,
    pub generative_backend: Option<String>,
    pub model_version: u64,
}

/// Pre-built parts for [`Assistant::new`].
pub struct Components {
    pub classifier: IntentClassifier,
    pub retriever: SemanticRetriever,
    pub embedder: Arc<dyn Embedder>,
    pub backend: Option<Arc<dyn GenerativeBackend>>,
    pub sink: Arc<dyn ExchangeSink>,
}

pub struct Assistant {
    config: Config,
    snapshots: SnapshotHandle,
    router: ResponseRouter,
    embedder: Arc<dyn Embedder>,
    backend_name: Option<String>,
    sink: Arc<dyn ExchangeSink>,
    /// Serialises retrain and rebuild.
    admin_lock: tokio::sync::Mutex<()>,
}

impl Assistant {
    pub fn new(config: Config, components: Components) -> Result<Self> {
        let Components {
            classifier,
            retriever,
            embedder,
            backend,
            sink,
        } = components;

        let backend_name = backend.as_ref().map(|b| b.name().to_string());
        let router = ResponseRouter::new(config.router.clone(), config.persona.preamble.clone())
            .with_backend(backend, Duration::from_secs(config.generative.timeout_secs.max(1)))
            .with_brand(BrandNormalizer::new(&config.brand)?)
            .with_sink(Arc::clone(&sink));

        let snapshots = SnapshotHandle::new(ModelSnapshot::new(
            1,
            Arc::new(classifier),
            Arc::new(retriever),
        ));

        Ok(Self {
            config,
            snapshots,
            router,
            embedder,
            backend_name,
            sink,
            admin_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Load saved artifacts, training or indexing from the data directory
    /// when they are missing or unreadable.
    ///
    /// Component failures are logged and leave that component not ready;
    /// only configuration errors are fatal.
    pub fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.retrieval)?;
        let classifier = bootstrap_classifier(&config);
        let retriever = bootstrap_retriever(&config, Arc::clone(&embedder));
        let backend = create_backend(&config)?;
        let sink = open_sink(&config);

        Ok(Self::new(
            config,
            Components {
                classifier,
                retriever,
                embedder,
                backend,
                sink,
            },
        )?)
    }

    /// Replace the canned-response picker (seeded pickers in tests).
    pub fn with_picker(mut self, picker: Arc<dyn ResponsePicker>) -> Self {
        self.router = self.router.with_picker(picker);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<ModelSnapshot> {
        self.snapshots.current()
    }

    pub fn status(&self) -> Status {
        let snapshot = self.snapshots.current();
        Status {
            classifier_ready: snapshot.classifier.is_ready(),
            intents: snapshot.classifier.labels().to_vec(),
            documents: snapshot.retriever.len(),
            generative_backend: self.backend_name.clone(),
            model_version: snapshot.version,
        }
    }

    /// Answer one message.
    pub async fn chat(&self, message: &str) -> Result<RouteOutcome> {
        let snapshot = self.snapshots.current();
        self.router.route(&snapshot, message).await
    }

    /// Retrain the classifier from the intents corpus, persist it, and swap
    /// it into a new snapshot. The serving snapshot is unchanged on failure.
    pub async fn retrain(&self) -> Result<Versioned<TrainingSummary>> {
        let _guard = self.admin_lock.lock().await;

        let intents_path = self.config.paths.intents_path();
        let artifact = self.config.paths.classifier_artifact();
        let classifier_config = self.config.classifier.clone();

        let (classifier, summary) = tokio::task::spawn_blocking(move || -> Result<_> {
            let intents = load_intents(&intents_path)?;
            let mut classifier = IntentClassifier::new(classifier_config);
            let summary = classifier.train(&intents)?;
            classifier.save(&artifact)?;
            Ok((classifier, summary))
        })
        .await
        .map_err(|e| Error::Training(format!("training task failed: {e}")))??;

        let model_version = self.snapshots.replace_classifier(Arc::new(classifier));
        tracing::info!(
            intents = summary.intents,
            samples = summary.samples,
            version = model_version,
            "Classifier retrained"
        );
        Ok(Versioned {
            summary,
            model_version,
        })
    }

    /// Rebuild the vector index from the knowledge base.
    ///
    /// An empty knowledge base installs an empty retriever (search returns
    /// nothing) and reports `EmptyCorpus`.
    pub async fn rebuild_index(&self) -> Result<Versioned<IndexSummary>> {
        let _guard = self.admin_lock.lock().await;

        let kb_dir = self.config.paths.knowledge_base_dir();
        let extension = self.config.retrieval.extension.clone();
        let artifact = self.config.paths.index_artifact();
        let embedder = Arc::clone(&self.embedder);

        let built = tokio::task::spawn_blocking(move || -> Result<_> {
            let mut retriever = SemanticRetriever::new(embedder);
            let summary = retriever.build_index(&kb_dir, &extension)?;
            retriever.save(&artifact)?;
            Ok((retriever, summary))
        })
        .await
        .map_err(|e| Error::not_ready("semantic retriever", format!("index task failed: {e}")))?;

        match built {
            Ok((retriever, summary)) => {
                let model_version = self.snapshots.replace_retriever(Arc::new(retriever));
                tracing::info!(
                    documents = summary.documents,
                    version = model_version,
                    "Vector index rebuilt"
                );
                Ok(Versioned {
                    summary,
                    model_version,
                })
            }
            Err(Error::EmptyCorpus(dir)) => {
                let empty = SemanticRetriever::new(Arc::clone(&self.embedder));
                let version = self.snapshots.replace_retriever(Arc::new(empty));
                let artifact = self.config.paths.index_artifact();
                if artifact.exists() {
                    if let Err(e) = std::fs::remove_file(&artifact) {
                        tracing::warn!(path = %artifact.display(), error = %e, "Failed to remove stale index");
                    }
                }
                tracing::warn!(dir = %dir.display(), version, "Knowledge base is empty; serving without context");
                Err(Error::EmptyCorpus(dir))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn stats(&self) -> Result<ExchangeStats> {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.stats())
            .await
            .map_err(|e| Error::Logging(format!("stats task failed: {e}")))?
    }

    pub async fn recent(&self, query: ExchangeQuery) -> Result<Vec<ChatExchange>> {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.recent(&query))
            .await
            .map_err(|e| Error::Logging(format!("query task failed: {e}")))?
    }
}

fn bootstrap_classifier(config: &Config) -> IntentClassifier {
    let artifact = config.paths.classifier_artifact();
    match IntentClassifier::load(&artifact, config.classifier.clone()) {
        Ok(classifier) => return classifier,
        Err(Error::ArtifactMissing(_)) => {
            tracing::info!(path = %artifact.display(), "No saved classifier; training from corpus");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Saved classifier unusable; retraining from corpus");
        }
    }

    let mut classifier = IntentClassifier::new(config.classifier.clone());
    let trained = load_intents(&config.paths.intents_path()).and_then(|intents| classifier.train(&intents));
    match trained {
        Ok(_) => {
            if let Err(e) = classifier.save(&artifact) {
                tracing::warn!(error = %e, "Failed to save trained classifier");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Classifier training failed; chat is unavailable until /api/train succeeds");
        }
    }
    classifier
}

fn bootstrap_retriever(config: &Config, embedder: Arc<dyn Embedder>) -> SemanticRetriever {
    let artifact = config.paths.index_artifact();
    match SemanticRetriever::load(&artifact, Arc::clone(&embedder)) {
        Ok(retriever) => return retriever,
        Err(Error::ArtifactMissing(_)) => {
            tracing::info!(path = %artifact.display(), "No saved index; building from knowledge base");
        }
        Err(e) => {
            tracing::warn!(error = %e, "Saved index unusable; rebuilding");
        }
    }

    let mut retriever = SemanticRetriever::new(embedder);
    match retriever.build_index(&config.paths.knowledge_base_dir(), &config.retrieval.extension) {
        Ok(_) => {
            if let Err(e) = retriever.save(&artifact) {
                tracing::warn!(error = %e, "Failed to save vector index");
            }
        }
        Err(e @ Error::EmptyCorpus(_)) => {
            tracing::warn!(error = %e, "Serving without knowledge-base context");
        }
        Err(e) => {
            tracing::error!(error = %e, "Vector index build failed; serving without context");
        }
    }
    retriever
}

fn open_sink(config: &Config) -> Arc<dyn ExchangeSink> {
    if !config.store.enabled {
        return Arc::new(NullSink);
    }
    match ExchangeLog::open(&config.store.db_path, config.store.max_exchanges) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::warn!(error = %e, "Exchange log unavailable; exchanges will not be recorded");
            Arc::new(NullSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatekeeper::{FirstPicker, ResponseType};
    use tempfile::TempDir;

    const INTENTS: &str = r#"{"intents": [
        {"tag": "greeting", "patterns": ["hi", "hello"], "responses": ["Hello!"]},
        {"tag": "billing", "patterns": ["refund policy"], "responses": []}
    ]}"#;

    fn config_in(tmp: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = tmp.path().join("data");
        config.paths.artifacts_dir = tmp.path().join("models");
        config.store.db_path = tmp.path().join("exchanges.db");
        config.generative.provider = "none".into();
        config
    }

    fn write_data(config: &Config) {
        std::fs::create_dir_all(config.paths.knowledge_base_dir()).unwrap();
        std::fs::write(config.paths.intents_path(), INTENTS).unwrap();
        std::fs::write(
            config.paths.knowledge_base_dir().join("returns.txt"),
            "Return window is 30 days.",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn bootstrap_trains_indexes_and_saves() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);

        let assistant = Assistant::bootstrap(config.clone()).unwrap();
        let status = assistant.status();
        assert!(status.classifier_ready);
        assert_eq!(status.intents, vec!["billing", "greeting"]);
        assert_eq!(status.documents, 1);
        assert_eq!(status.generative_backend, None);
        assert!(config.paths.classifier_artifact().exists());
        assert!(config.paths.index_artifact().exists());

        // Second start loads the saved artifacts.
        std::fs::remove_file(config.paths.intents_path()).unwrap();
        let reloaded = Assistant::bootstrap(config).unwrap();
        assert!(reloaded.status().classifier_ready);
        assert_eq!(reloaded.status().documents, 1);
    }

    #[tokio::test]
    async fn bootstrap_without_data_is_not_ready_but_alive() {
        let tmp = TempDir::new().unwrap();
        let assistant = Assistant::bootstrap(config_in(&tmp)).unwrap();
        assert!(!assistant.status().classifier_ready);

        let err = assistant.chat("hello").await.unwrap_err();
        assert!(matches!(err, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn chat_logs_and_stats_count() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);
        let assistant = Assistant::bootstrap(config)
            .unwrap()
            .with_picker(Arc::new(FirstPicker));

        let hello = assistant.chat("hello").await.unwrap();
        assert_eq!(hello.response_type, ResponseType::ConfidentCanned);
        assert_eq!(hello.response, "Hello!");

        let refund = assistant.chat("refund policy").await.unwrap();
        assert_eq!(refund.response_type, ResponseType::ErrorNoContent);

        assistant.chat("hi").await.unwrap();

        let stats = assistant.stats().await.unwrap();
        assert_eq!(stats.total_exchanges, 3);
        assert_eq!(stats.top_intents[0].intent, "greeting");
        assert_eq!(stats.top_intents[0].count, 2);

        let recent = assistant
            .recent(ExchangeQuery {
                intent: Some("billing".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn retrain_swaps_snapshot_and_keeps_old_one_intact() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);
        let assistant = Assistant::bootstrap(config.clone()).unwrap();
        let before = assistant.snapshot();

        std::fs::write(
            config.paths.intents_path(),
            r#"{"intents": [
                {"tag": "greeting", "patterns": ["hi", "hello"], "responses": ["Hello!"]},
                {"tag": "billing", "patterns": ["refund policy"], "responses": []},
                {"tag": "shipping", "patterns": ["where is my order"], "responses": []}
            ]}"#,
        )
        .unwrap();

        let report = assistant.retrain().await.unwrap();
        assert_eq!(report.summary.intents, 3);
        assert_eq!(report.model_version, before.version + 1);
        assert_eq!(assistant.status().intents.len(), 3);
        assert_eq!(before.classifier.labels().len(), 2);
    }

    #[tokio::test]
    async fn failed_retrain_keeps_serving_snapshot() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);
        let assistant = Assistant::bootstrap(config.clone()).unwrap();
        let version = assistant.status().model_version;

        std::fs::write(config.paths.intents_path(), r#"{"intents": []}"#).unwrap();
        assert!(matches!(assistant.retrain().await, Err(Error::Training(_))));
        assert_eq!(assistant.status().model_version, version);
        assert!(assistant.chat("hello").await.is_ok());
    }

    #[tokio::test]
    async fn rebuild_with_empty_knowledge_base_installs_empty_retriever() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);
        let assistant = Assistant::bootstrap(config.clone()).unwrap();
        assert_eq!(assistant.status().documents, 1);

        std::fs::remove_file(config.paths.knowledge_base_dir().join("returns.txt")).unwrap();
        let err = assistant.rebuild_index().await.unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus(_)));
        assert_eq!(assistant.status().documents, 0);
        assert!(!config.paths.index_artifact().exists());
    }

    #[tokio::test]
    async fn rebuild_picks_up_new_documents() {
        let tmp = TempDir::new().unwrap();
        let config = config_in(&tmp);
        write_data(&config);
        let assistant = Assistant::bootstrap(config.clone()).unwrap();

        std::fs::write(
            config.paths.knowledge_base_dir().join("shipping.txt"),
            "Orders ship in two days.",
        )
        .unwrap();
        let report = assistant.rebuild_index().await.unwrap();
        assert_eq!(report.summary.documents, 2);
        assert_eq!(assistant.status().documents, 2);
    }

    #[tokio::test]
    async fn disabled_store_reports_empty_stats() {
        let tmp = TempDir::new().unwrap();
        let mut config = config_in(&tmp);
        config.store.enabled = false;
        write_data(&config);
        let assistant = Assistant::bootstrap(config.clone()).unwrap();

        assistant.chat("hello").await.unwrap();
        assert_eq!(assistant.stats().await.unwrap().total_exchanges, 0);
        assert!(!config.store.db_path.exists());
    }
}
