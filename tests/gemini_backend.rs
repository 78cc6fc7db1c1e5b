//! Retrieval-augmented path against a mocked Gemini endpoint.

use intentgate::classifier::{IntentClassifier, IntentRecord};
use intentgate::config::Config;
use intentgate::gatekeeper::FirstPicker;
use intentgate::providers::create_backend;
use intentgate::retrieval::{Document, HashingEmbedder, SemanticRetriever};
use intentgate::telemetry::NullSink;
use intentgate::{Assistant, Components, ResponseType};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(api_url: &str) -> Config {
    let mut config = Config::default();
    config.generative.provider = "gemini".into();
    config.generative.api_key = Some("test-key".into());
    config.generative.api_url = api_url.into();
    config.generative.timeout_secs = 5;
    config.brand.legacy_name = Some("OldBot".into());
    config.brand.current_name = "Helper".into();
    config
}

fn build(config: Config) -> Assistant {
    let mut classifier = IntentClassifier::new(config.classifier.clone());
    classifier
        .train(&[
            IntentRecord::new("greeting", &["hi", "hello"], &["Hello from oldbot!"]),
            IntentRecord::new("billing", &["refund policy"], &["Refunds take 5 days."]),
        ])
        .unwrap();

    let embedder = Arc::new(HashingEmbedder::new(64));
    let mut retriever = SemanticRetriever::new(embedder.clone());
    retriever
        .build_from_documents(vec![Document::new("returns.txt", "Return window is 30 days.")])
        .unwrap();

    let backend = create_backend(&config).unwrap();
    assert!(backend.is_some());

    Assistant::new(
        config,
        Components {
            classifier,
            retriever,
            embedder,
            backend,
            sink: Arc::new(NullSink),
        },
    )
    .unwrap()
    .with_picker(Arc::new(FirstPicker))
}

fn reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": { "parts": [{ "text": text }], "role": "model" },
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn generative_reply_is_grounded_and_brand_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_string_contains("Return window is 30 days."))
        .and(body_string_contains("what is your return policy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("OLDBOT says: 30 days.")))
        .expect(1)
        .mount(&server)
        .await;

    let assistant = build(config(&server.uri()));
    let outcome = assistant.chat("what is your return policy").await.unwrap();
    assert_eq!(outcome.response_type, ResponseType::Generative);
    assert_eq!(outcome.response, "Helper says: 30 days.");
    assert_eq!(outcome.context_documents, vec!["returns.txt"]);
}

#[tokio::test]
async fn upstream_error_degrades_to_canned_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let assistant = build(config(&server.uri()));
    let outcome = assistant.chat("what is your return policy").await.unwrap();
    assert_eq!(
        outcome.response_type,
        ResponseType::FallbackAfterGenerativeFailure
    );
    assert_eq!(outcome.response, "Refunds take 5 days.");
}

#[tokio::test]
async fn canned_greeting_never_calls_upstream_and_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reply("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let assistant = build(config(&server.uri()));
    let outcome = assistant.chat("hello").await.unwrap();
    assert_eq!(outcome.response_type, ResponseType::ConfidentCanned);
    assert_eq!(outcome.response, "Hello from Helper!");
}
