//! Exchange log: one append-only record per answered message, plus the
//! aggregate queries behind `/api/stats`.

pub mod store;

pub use store::ExchangeLog;

use crate::error::Result;
use crate::gatekeeper::{ResponseType, RouteOutcome};
use crate::sentiment::Sentiment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Records ─────────────────────────────────────────────────────

/// One logged chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    /// Row ID, assigned by the store.
    #[serde(default)]
    pub id: i64,
    pub request_id: String,
    pub user_message: String,
    pub bot_response: String,
    pub intent: String,
    pub confidence: f64,
    pub sentiment: Sentiment,
    pub polarity: f64,
    pub response_type: ResponseType,
    pub model_version: u64,
    pub latency_ms: u64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatExchange {
    pub fn new(user_message: &str, outcome: &RouteOutcome, latency: Duration) -> Self {
        Self {
            id: 0,
            request_id: uuid::Uuid::new_v4().to_string(),
            user_message: user_message.to_string(),
            bot_response: outcome.response.clone(),
            intent: outcome.intent.clone(),
            confidence: outcome.confidence,
            sentiment: outcome.sentiment.label,
            polarity: outcome.sentiment.polarity,
            response_type: outcome.response_type,
            model_version: outcome.model_version,
            latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            timestamp: Utc::now(),
        }
    }
}

/// Filters for [`ExchangeSink::recent`]. Newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExchangeQuery {
    pub intent: Option<String>,
    pub response_type: Option<ResponseType>,
    pub sentiment: Option<Sentiment>,
    /// Exchanges at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Maximum results (default 100).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCount {
    pub intent: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCount {
    pub sentiment: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTypeCount {
    pub response_type: String,
    pub count: i64,
}

/// Aggregates over the whole log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExchangeStats {
    pub total_exchanges: i64,
    /// Five most frequent intents, by descending count.
    pub top_intents: Vec<IntentCount>,
    pub sentiment_distribution: Vec<SentimentCount>,
    pub response_types: Vec<ResponseTypeCount>,
    /// Mean confidence, rounded to two decimals (0 when empty).
    pub average_confidence: f64,
}

// ── Sink trait ──────────────────────────────────────────────────

/// Append-and-aggregate store for chat exchanges. Implementations are
/// called from blocking threads.
pub trait ExchangeSink: Send + Sync {
    fn record(&self, exchange: &ChatExchange) -> Result<()>;

    fn stats(&self) -> Result<ExchangeStats>;

    fn recent(&self, query: &ExchangeQuery) -> Result<Vec<ChatExchange>>;
}

/// Sink used when the exchange log is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ExchangeSink for NullSink {
    fn record(&self, _exchange: &ChatExchange) -> Result<()> {
        Ok(())
    }

    fn stats(&self) -> Result<ExchangeStats> {
        Ok(ExchangeStats::default())
    }

    fn recent(&self, _query: &ExchangeQuery) -> Result<Vec<ChatExchange>> {
        Ok(Vec::new())
    }
}
