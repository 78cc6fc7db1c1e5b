//! Response routing engine.
//!
//! Confident, low-stakes intents are answered from canned responses;
//! everything else goes to the generative backend with retrieved context,
//! degrading to canned fallbacks or a fixed apology when it is missing or
//! fails.

use super::brand::BrandNormalizer;
use super::picker::{RandomPicker, ResponsePicker};
use super::snapshot::ModelSnapshot;
use crate::classifier::IntentPrediction;
use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::providers::{GenerationRequest, GenerativeBackend};
use crate::sentiment::{self, SentimentResult};
use crate::telemetry::{ChatExchange, ExchangeSink};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ── Response type ────────────────────────────────────────────────

/// Which path produced a reply. Persisted in the exchange log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    /// Confident whitelisted intent answered from its canned responses.
    ConfidentCanned,
    /// Generated by the backend, optionally grounded on retrieved documents.
    Generative,
    /// Backend failed; a canned response for the predicted intent was used.
    FallbackAfterGenerativeFailure,
    /// No backend configured; a canned response for the predicted intent was used.
    FallbackNoGenerative,
    /// Nothing to say: no usable backend and no canned responses.
    ErrorNoContent,
}

impl ResponseType {
    pub const ALL: [Self; 5] = [
        Self::ConfidentCanned,
        Self::Generative,
        Self::FallbackAfterGenerativeFailure,
        Self::FallbackNoGenerative,
        Self::ErrorNoContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfidentCanned => "confident_canned",
            Self::Generative => "generative",
            Self::FallbackAfterGenerativeFailure => "fallback_after_generative_failure",
            Self::FallbackNoGenerative => "fallback_no_generative",
            Self::ErrorNoContent => "error_no_content",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown response type '{s}'"))
    }
}

// ── Routing decision ─────────────────────────────────────────────

/// First-stage decision, before any backend is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Answer from the predicted intent's canned responses.
    Canned,
    /// Retrieve context and call the generative backend.
    RetrievalAugmented,
}

/// Canned iff `confidence >= threshold` and the intent is whitelisted.
/// Sentiment is deliberately not an input.
pub fn decide(prediction: &IntentPrediction, config: &RouterConfig) -> Route {
    let whitelisted = config
        .canned_intents
        .iter()
        .any(|intent| *intent == prediction.intent);
    if whitelisted && prediction.confidence >= config.confidence_threshold {
        Route::Canned
    } else {
        Route::RetrievalAugmented
    }
}

// ── Route outcome ────────────────────────────────────────────────

/// Final reply plus everything the caller and the exchange log need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub response: String,
    pub intent: String,
    pub confidence: f64,
    pub sentiment: SentimentResult,
    pub response_type: ResponseType,
    /// Snapshot version that served the request.
    pub model_version: u64,
    /// Identifiers of the documents passed as context, most similar first.
    pub context_documents: Vec<String>,
}

// ── Response router ──────────────────────────────────────────────

/// Per-request pipeline: classify, decide, answer, normalize, log.
///
/// Holds no model state of its own; each call gets the snapshot to use.
pub struct ResponseRouter {
    config: RouterConfig,
    persona: String,
    backend: Option<Arc<dyn GenerativeBackend>>,
    generative_timeout: Duration,
    brand: BrandNormalizer,
    picker: Arc<dyn ResponsePicker>,
    sink: Option<Arc<dyn ExchangeSink>>,
}

impl ResponseRouter {
    pub fn new(config: RouterConfig, persona: impl Into<String>) -> Self {
        Self {
            config,
            persona: persona.into(),
            backend: None,
            generative_timeout: Duration::from_secs(30),
            brand: BrandNormalizer::disabled(),
            picker: Arc::new(RandomPicker::new()),
            sink: None,
        }
    }

    pub fn with_backend(
        mut self,
        backend: Option<Arc<dyn GenerativeBackend>>,
        timeout: Duration,
    ) -> Self {
        self.backend = backend;
        self.generative_timeout = timeout;
        self
    }

    pub fn with_brand(mut self, brand: BrandNormalizer) -> Self {
        self.brand = brand;
        self
    }

    pub fn with_picker(mut self, picker: Arc<dyn ResponsePicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ExchangeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Answer one message against `snapshot`.
    ///
    /// Fails only for blank input or an unready classifier; backend and
    /// logging failures are absorbed into the outcome. The exchange append
    /// is awaited before returning, so its latency is part of every request
    /// and stats read afterwards already include this reply.
    pub async fn route(&self, snapshot: &ModelSnapshot, message: &str) -> Result<RouteOutcome> {
        let started = Instant::now();
        if message.trim().is_empty() {
            return Err(Error::InvalidInput("message must not be empty".into()));
        }

        let prediction = snapshot.classifier.predict(message)?;
        let sentiment = sentiment::analyze(message);

        let (raw_response, response_type, context_documents) =
            self.respond(snapshot, message, &prediction).await;
        let response = self.brand.apply(&raw_response).into_owned();

        tracing::debug!(
            intent = %prediction.intent,
            confidence = prediction.confidence,
            sentiment = %sentiment.label,
            response_type = %response_type,
            version = snapshot.version,
            "Routed message"
        );

        let outcome = RouteOutcome {
            response,
            intent: prediction.intent,
            confidence: prediction.confidence,
            sentiment,
            response_type,
            model_version: snapshot.version,
            context_documents,
        };

        self.log_exchange(message, &outcome, started.elapsed()).await;
        Ok(outcome)
    }

    async fn respond(
        &self,
        snapshot: &ModelSnapshot,
        message: &str,
        prediction: &IntentPrediction,
    ) -> (String, ResponseType, Vec<String>) {
        if decide(prediction, &self.config) == Route::Canned {
            if let Some(reply) = self.picker.pick(&prediction.responses) {
                return (reply.to_string(), ResponseType::ConfidentCanned, Vec::new());
            }
            tracing::debug!(
                intent = %prediction.intent,
                "Whitelisted intent has no canned responses; using the generative path"
            );
        }

        let Some(ref backend) = self.backend else {
            let (reply, kind) = self.fallback(
                prediction,
                ResponseType::FallbackNoGenerative,
                &self.config.generative_missing_message,
            );
            return (reply, kind, Vec::new());
        };

        let hits = snapshot.retriever.search(message, self.config.top_k);
        let context_documents: Vec<String> = hits.iter().map(|h| h.document.id.clone()).collect();
        let context = (!hits.is_empty()).then(|| {
            hits.iter()
                .map(|h| h.document.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });

        let request = GenerationRequest {
            persona: self.persona.clone(),
            context,
            message: message.to_string(),
        };

        match self.generate(backend.as_ref(), &request).await {
            Ok(text) => (text, ResponseType::Generative, context_documents),
            Err(e) => {
                tracing::warn!(
                    backend = backend.name(),
                    error = %e,
                    "Generative call failed; falling back"
                );
                let (reply, kind) = self.fallback(
                    prediction,
                    ResponseType::FallbackAfterGenerativeFailure,
                    &self.config.generative_failed_message,
                );
                (reply, kind, context_documents)
            }
        }
    }

    async fn generate(
        &self,
        backend: &dyn GenerativeBackend,
        request: &GenerationRequest,
    ) -> Result<String> {
        match tokio::time::timeout(self.generative_timeout, backend.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::GenerativeBackend(format!(
                "timed out after {}s",
                self.generative_timeout.as_secs_f32()
            ))),
        }
    }

    /// A canned response for the predicted intent tagged `kind`, or the
    /// apology tagged `ErrorNoContent` when the intent has none.
    fn fallback(
        &self,
        prediction: &IntentPrediction,
        kind: ResponseType,
        apology: &str,
    ) -> (String, ResponseType) {
        match self.picker.pick(&prediction.responses) {
            Some(reply) => (reply.to_string(), kind),
            None => (apology.to_string(), ResponseType::ErrorNoContent),
        }
    }

    /// Best-effort append. Errors (and panics) in the sink are reported as
    /// warnings only.
    async fn log_exchange(&self, message: &str, outcome: &RouteOutcome, latency: Duration) {
        let Some(ref sink) = self.sink else {
            return;
        };

        let exchange = ChatExchange::new(message, outcome, latency);
        let sink = Arc::clone(sink);
        match tokio::task::spawn_blocking(move || sink.record(&exchange)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Failed to log exchange"),
            Err(e) => tracing::warn!(error = %e, "Exchange logging task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{IntentClassifier, IntentRecord};
    use crate::config::{BrandConfig, ClassifierConfig};
    use crate::gatekeeper::picker::FirstPicker;
    use crate::retrieval::{Document, HashingEmbedder, SemanticRetriever};
    use crate::telemetry::{ExchangeQuery, ExchangeStats};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Test doubles ─────────────────────────────────────────────

    #[derive(Default)]
    struct MockBackend {
        reply: Option<String>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl MockBackend {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.into()),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GenerativeBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply
                .clone()
                .ok_or_else(|| Error::GenerativeBackend("quota exceeded".into()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        fail: bool,
        records: Mutex<Vec<ChatExchange>>,
    }

    impl ExchangeSink for RecordingSink {
        fn record(&self, exchange: &ChatExchange) -> Result<()> {
            if self.fail {
                return Err(Error::Logging("disk full".into()));
            }
            self.records.lock().push(exchange.clone());
            Ok(())
        }

        fn stats(&self) -> Result<ExchangeStats> {
            Ok(ExchangeStats::default())
        }

        fn recent(&self, _query: &ExchangeQuery) -> Result<Vec<ChatExchange>> {
            Ok(self.records.lock().clone())
        }
    }

    // ── Fixtures ─────────────────────────────────────────────────

    fn scenario_corpus() -> Vec<IntentRecord> {
        vec![
            IntentRecord::new("greeting", &["hi", "hello"], &["Hello!"]),
            IntentRecord::new("billing", &["refund policy"], &[]),
        ]
    }

    fn snapshot_with(intents: &[IntentRecord], documents: Vec<Document>) -> ModelSnapshot {
        let mut classifier = IntentClassifier::new(ClassifierConfig::default());
        classifier.train(intents).unwrap();
        let mut retriever = SemanticRetriever::new(Arc::new(HashingEmbedder::new(64)));
        if !documents.is_empty() {
            retriever.build_from_documents(documents).unwrap();
        }
        ModelSnapshot::new(1, Arc::new(classifier), Arc::new(retriever))
    }

    fn router() -> ResponseRouter {
        ResponseRouter::new(RouterConfig::default(), "I am a test persona.")
            .with_picker(Arc::new(FirstPicker))
    }

    fn with_backend(backend: Arc<MockBackend>) -> ResponseRouter {
        router().with_backend(Some(backend), Duration::from_secs(5))
    }

    fn prediction(intent: &str, confidence: f64) -> IntentPrediction {
        IntentPrediction {
            intent: intent.into(),
            confidence,
            responses: vec!["Hello!".into()],
        }
    }

    // ── Decision function ────────────────────────────────────────

    #[test]
    fn threshold_is_inclusive() {
        let config = RouterConfig::default();
        let at = config.confidence_threshold;
        assert_eq!(decide(&prediction("greeting", at), &config), Route::Canned);

        let below = f64::from_bits(at.to_bits() - 1);
        assert!(below < at);
        assert_eq!(
            decide(&prediction("greeting", below), &config),
            Route::RetrievalAugmented
        );
    }

    #[test]
    fn confident_but_not_whitelisted_is_not_canned() {
        let config = RouterConfig::default();
        assert_eq!(
            decide(&prediction("billing", 0.99), &config),
            Route::RetrievalAugmented
        );
    }

    #[test]
    fn whitelist_comes_from_config() {
        let config = RouterConfig {
            canned_intents: vec!["billing".into()],
            confidence_threshold: 0.5,
            ..RouterConfig::default()
        };
        assert_eq!(decide(&prediction("billing", 0.5), &config), Route::Canned);
        assert_eq!(
            decide(&prediction("greeting", 0.99), &config),
            Route::RetrievalAugmented
        );
    }

    #[test]
    fn response_type_names_round_trip() {
        for t in ResponseType::ALL {
            assert_eq!(t.as_str().parse::<ResponseType>().unwrap(), t);
            assert_eq!(
                serde_json::to_value(t).unwrap(),
                serde_json::Value::String(t.as_str().into())
            );
        }
    }

    // ── End-to-end routing ───────────────────────────────────────

    #[tokio::test]
    async fn confident_greeting_is_canned_without_backend_call() {
        let backend = Arc::new(MockBackend::replying("generated"));
        let router = with_backend(Arc::clone(&backend));
        let snapshot = snapshot_with(&scenario_corpus(), Vec::new());

        let outcome = router.route(&snapshot, "hello").await.unwrap();
        assert_eq!(outcome.intent, "greeting");
        assert_eq!(outcome.response_type, ResponseType::ConfidentCanned);
        assert_eq!(outcome.response, "Hello!");
        assert_eq!(outcome.model_version, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confident_whitelisted_intent_without_responses_goes_generative() {
        let intents = vec![
            IntentRecord::new("greeting", &["hi", "hello"], &[]),
            IntentRecord::new("billing", &["refund policy"], &["See our refunds page."]),
        ];
        let backend = Arc::new(MockBackend::replying("Hi there, how can I help?"));
        let router = with_backend(Arc::clone(&backend));

        let outcome = router
            .route(&snapshot_with(&intents, Vec::new()), "hello")
            .await
            .unwrap();
        assert_eq!(outcome.intent, "greeting");
        assert!(outcome.confidence >= RouterConfig::default().confidence_threshold);
        assert_eq!(outcome.response_type, ResponseType::Generative);
        assert_eq!(outcome.response, "Hi there, how can I help?");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_backend_and_no_responses_is_error_no_content() {
        let router = router();
        let snapshot = snapshot_with(&scenario_corpus(), Vec::new());

        let outcome = router.route(&snapshot, "refund policy").await.unwrap();
        assert_eq!(outcome.intent, "billing");
        assert_eq!(outcome.response_type, ResponseType::ErrorNoContent);
        assert_eq!(outcome.response, RouterConfig::default().generative_missing_message);
    }

    #[tokio::test]
    async fn no_backend_with_responses_is_fallback_no_generative() {
        let intents = vec![
            IntentRecord::new("greeting", &["hi", "hello"], &["Hello!"]),
            IntentRecord::new("billing", &["refund policy"], &["See our refunds page."]),
        ];
        let outcome = router()
            .route(&snapshot_with(&intents, Vec::new()), "refund policy")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::FallbackNoGenerative);
        assert_eq!(outcome.response, "See our refunds page.");
    }

    #[tokio::test]
    async fn low_confidence_goes_generative_with_context() {
        let backend = Arc::new(MockBackend::replying("You can return items within 30 days."));
        let router = with_backend(Arc::clone(&backend));
        let snapshot = snapshot_with(
            &scenario_corpus(),
            vec![Document::new("returns.txt", "Return window is 30 days.")],
        );

        let outcome = router
            .route(&snapshot, "what is your return policy")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::Generative);
        assert_eq!(outcome.response, "You can return items within 30 days.");
        assert_eq!(outcome.context_documents, vec!["returns.txt"]);

        let request = backend.last_request.lock().clone().unwrap();
        assert_eq!(request.context.as_deref(), Some("Return window is 30 days."));
        assert_eq!(request.persona, "I am a test persona.");
        assert_eq!(request.message, "what is your return policy");
    }

    #[tokio::test]
    async fn context_documents_are_joined_with_blank_lines() {
        let backend = Arc::new(MockBackend::replying("ok"));
        let router = with_backend(Arc::clone(&backend));
        let snapshot = snapshot_with(
            &scenario_corpus(),
            vec![
                Document::new("a.txt", "Return window is 30 days."),
                Document::new("b.txt", "Refunds take five days."),
                Document::new("c.txt", "Shipping is free."),
            ],
        );

        router.route(&snapshot, "return refund days").await.unwrap();
        let context = backend.last_request.lock().clone().unwrap().context.unwrap();
        assert_eq!(context.split("\n\n").count(), 2);
    }

    #[tokio::test]
    async fn empty_index_calls_backend_without_context() {
        let backend = Arc::new(MockBackend::replying("ok"));
        let router = with_backend(Arc::clone(&backend));
        let snapshot = snapshot_with(&scenario_corpus(), Vec::new());

        let outcome = router.route(&snapshot, "refund policy").await.unwrap();
        assert_eq!(outcome.response_type, ResponseType::Generative);
        assert!(backend.last_request.lock().clone().unwrap().context.is_none());
    }

    #[tokio::test]
    async fn backend_failure_falls_back_to_canned() {
        let intents = vec![
            IntentRecord::new("greeting", &["hi", "hello"], &["Hello!"]),
            IntentRecord::new(
                "billing",
                &["refund policy", "billing question"],
                &["Refunds take 5 days.", "Contact billing@example.com."],
            ),
        ];
        let backend = Arc::new(MockBackend::failing());
        let router = with_backend(Arc::clone(&backend));

        let outcome = router
            .route(&snapshot_with(&intents, Vec::new()), "refund policy")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::FallbackAfterGenerativeFailure);
        assert!(["Refunds take 5 days.", "Contact billing@example.com."]
            .contains(&outcome.response.as_str()));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_failure_without_responses_is_error_no_content() {
        let router = with_backend(Arc::new(MockBackend::failing()));
        let outcome = router
            .route(&snapshot_with(&scenario_corpus(), Vec::new()), "refund policy")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::ErrorNoContent);
        assert_eq!(outcome.response, RouterConfig::default().generative_failed_message);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_backend_times_out_into_fallback() {
        let backend = Arc::new(MockBackend {
            reply: Some("too late".into()),
            delay: Some(Duration::from_secs(3600)),
            ..MockBackend::default()
        });
        let router = router().with_backend(Some(backend), Duration::from_secs(30));

        let outcome = router
            .route(&snapshot_with(&scenario_corpus(), Vec::new()), "refund policy")
            .await
            .unwrap();
        assert_eq!(outcome.response_type, ResponseType::ErrorNoContent);
    }

    #[tokio::test]
    async fn brand_is_normalized_on_every_path() {
        let brand = BrandNormalizer::new(&BrandConfig {
            legacy_name: Some("OldBot".into()),
            current_name: "NewBot".into(),
        })
        .unwrap();
        let intents = vec![
            IntentRecord::new("greeting", &["hi", "hello"], &["Hello from OLDBOT!"]),
            IntentRecord::new("billing", &["refund policy"], &[]),
        ];
        let snapshot = snapshot_with(&intents, Vec::new());

        let canned = router().with_brand(brand.clone());
        assert_eq!(
            canned.route(&snapshot, "hello").await.unwrap().response,
            "Hello from NewBot!"
        );

        let generative = with_backend(Arc::new(MockBackend::replying("oldbot says hi")))
            .with_brand(brand);
        assert_eq!(
            generative.route(&snapshot, "refund policy").await.unwrap().response,
            "NewBot says hi"
        );
    }

    #[tokio::test]
    async fn blank_message_is_invalid_input() {
        let err = router()
            .route(&snapshot_with(&scenario_corpus(), Vec::new()), "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unready_classifier_is_not_ready() {
        let snapshot = ModelSnapshot::new(
            0,
            Arc::new(IntentClassifier::new(ClassifierConfig::default())),
            Arc::new(SemanticRetriever::new(Arc::new(HashingEmbedder::new(8)))),
        );
        let err = router().route(&snapshot, "hello").await.unwrap_err();
        assert!(matches!(err, Error::NotReady { .. }));
    }

    #[tokio::test]
    async fn exchanges_are_logged() {
        let sink = Arc::new(RecordingSink::default());
        let router = router().with_sink(Arc::clone(&sink) as Arc<dyn ExchangeSink>);
        let snapshot = snapshot_with(&scenario_corpus(), Vec::new());

        router.route(&snapshot, "hello").await.unwrap();
        let records = sink.records.lock().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_message, "hello");
        assert_eq!(records[0].bot_response, "Hello!");
        assert_eq!(records[0].response_type, ResponseType::ConfidentCanned);
    }

    #[tokio::test]
    async fn logging_failure_does_not_affect_response() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let router = router().with_sink(sink);
        let outcome = router
            .route(&snapshot_with(&scenario_corpus(), Vec::new()), "hello")
            .await
            .unwrap();
        assert_eq!(outcome.response, "Hello!");
        assert_eq!(outcome.response_type, ResponseType::ConfidentCanned);
    }
}
