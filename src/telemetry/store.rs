use super::{
    ChatExchange, ExchangeQuery, ExchangeSink, ExchangeStats, IntentCount, ResponseTypeCount,
    SentimentCount,
};
use crate::error::{Error, Result};
use crate::gatekeeper::ResponseType;
use crate::sentiment::Sentiment;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::Error::FromSqlConversionFailure;
use rusqlite::{params, Connection, Row};
use std::path::Path;

const SELECT_COLUMNS: &str = "SELECT id, request_id, user_message, bot_response, intent, confidence,
        sentiment, polarity, response_type, model_version, latency_ms, timestamp
 FROM exchanges";

/// A text column holding one of our enum names. Unknown names are a
/// conversion failure rather than a silent default.
fn parse_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    row.get::<_, String>(idx)?
        .parse()
        .map_err(|e: String| FromSqlConversionFailure(idx, Type::Text, e.into()))
}

// ── SQLite store ────────────────────────────────────────────────

/// SQLite-backed exchange log.
pub struct ExchangeLog {
    conn: Mutex<Connection>,
    /// Retention cap; 0 keeps everything.
    max_exchanges: u64,
}

impl ExchangeLog {
    pub fn open(db_path: &Path, max_exchanges: u64) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Logging(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous  = NORMAL;
             PRAGMA temp_store   = MEMORY;",
        )?;
        Self::init_schema(&conn)?;

        tracing::info!(path = %db_path.display(), "Exchange log opened");
        Ok(Self {
            conn: Mutex::new(conn),
            max_exchanges,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_exchanges: 0,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exchanges (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                request_id    TEXT NOT NULL,
                user_message  TEXT NOT NULL,
                bot_response  TEXT NOT NULL,
                intent        TEXT NOT NULL,
                confidence    REAL NOT NULL,
                sentiment     TEXT NOT NULL,
                polarity      REAL NOT NULL DEFAULT 0,
                response_type TEXT NOT NULL,
                model_version INTEGER NOT NULL DEFAULT 0,
                latency_ms    INTEGER NOT NULL DEFAULT 0,
                timestamp     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_exchanges_intent ON exchanges(intent);
            CREATE INDEX IF NOT EXISTS idx_exchanges_timestamp ON exchanges(timestamp);",
        )?;
        Ok(())
    }

    fn row_to_exchange(row: &Row<'_>) -> rusqlite::Result<ChatExchange> {
        Ok(ChatExchange {
            id: row.get(0)?,
            request_id: row.get(1)?,
            user_message: row.get(2)?,
            bot_response: row.get(3)?,
            intent: row.get(4)?,
            confidence: row.get(5)?,
            sentiment: parse_text(row, 6)?,
            polarity: row.get(7)?,
            response_type: parse_text(row, 8)?,
            model_version: u64::try_from(row.get::<_, i64>(9)?).unwrap_or_default(),
            latency_ms: u64::try_from(row.get::<_, i64>(10)?).unwrap_or_default(),
            timestamp: DateTime::parse_from_rfc3339(&row.get::<_, String>(11)?)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
        })
    }

    fn prune_if_needed(&self, conn: &Connection) -> Result<()> {
        if self.max_exchanges == 0 {
            return Ok(());
        }
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get(0))?;
        let max = i64::try_from(self.max_exchanges).unwrap_or(i64::MAX);
        if count > max {
            conn.execute(
                "DELETE FROM exchanges WHERE id IN (
                    SELECT id FROM exchanges ORDER BY id ASC LIMIT ?1
                )",
                params![count - max],
            )?;
        }
        Ok(())
    }

    fn grouped_counts(conn: &Connection, sql: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}

impl ExchangeSink for ExchangeLog {
    fn record(&self, exchange: &ChatExchange) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO exchanges
                (request_id, user_message, bot_response, intent, confidence, sentiment,
                 polarity, response_type, model_version, latency_ms, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                exchange.request_id,
                exchange.user_message,
                exchange.bot_response,
                exchange.intent,
                exchange.confidence,
                exchange.sentiment.as_str(),
                exchange.polarity,
                exchange.response_type.as_str(),
                i64::try_from(exchange.model_version).unwrap_or(i64::MAX),
                i64::try_from(exchange.latency_ms).unwrap_or(i64::MAX),
                exchange.timestamp.to_rfc3339(),
            ],
        )?;

        self.prune_if_needed(&conn)?;
        Ok(())
    }

    fn stats(&self) -> Result<ExchangeStats> {
        let conn = self.conn.lock();

        let total_exchanges: i64 =
            conn.query_row("SELECT COUNT(*) FROM exchanges", [], |row| row.get(0))?;

        let top_intents = Self::grouped_counts(
            &conn,
            "SELECT intent, COUNT(*) AS cnt FROM exchanges
             GROUP BY intent ORDER BY cnt DESC, intent ASC LIMIT 5",
        )?
        .into_iter()
        .map(|(intent, count)| IntentCount { intent, count })
        .collect();

        let sentiment_distribution = Self::grouped_counts(
            &conn,
            "SELECT sentiment, COUNT(*) AS cnt FROM exchanges
             GROUP BY sentiment ORDER BY cnt DESC, sentiment ASC",
        )?
        .into_iter()
        .map(|(sentiment, count)| SentimentCount { sentiment, count })
        .collect();

        let response_types = Self::grouped_counts(
            &conn,
            "SELECT response_type, COUNT(*) AS cnt FROM exchanges
             GROUP BY response_type ORDER BY cnt DESC, response_type ASC",
        )?
        .into_iter()
        .map(|(response_type, count)| ResponseTypeCount {
            response_type,
            count,
        })
        .collect();

        let average: Option<f64> =
            conn.query_row("SELECT AVG(confidence) FROM exchanges", [], |row| row.get(0))?;
        let average_confidence = (average.unwrap_or(0.0) * 100.0).round() / 100.0;

        Ok(ExchangeStats {
            total_exchanges,
            top_intents,
            sentiment_distribution,
            response_types,
            average_confidence,
        })
    }

    fn recent(&self, q: &ExchangeQuery) -> Result<Vec<ChatExchange>> {
        let conn = self.conn.lock();

        let mut sql = format!("{SELECT_COLUMNS} WHERE 1=1");
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(ref intent) = q.intent {
            sql.push_str(&format!(" AND intent = ?{param_idx}"));
            bind_values.push(Box::new(intent.clone()));
            param_idx += 1;
        }
        if let Some(response_type) = q.response_type {
            sql.push_str(&format!(" AND response_type = ?{param_idx}"));
            bind_values.push(Box::new(response_type.as_str()));
            param_idx += 1;
        }
        if let Some(sentiment) = q.sentiment {
            sql.push_str(&format!(" AND sentiment = ?{param_idx}"));
            bind_values.push(Box::new(sentiment.as_str()));
            param_idx += 1;
        }
        if let Some(ref since) = q.since {
            sql.push_str(&format!(" AND timestamp >= ?{param_idx}"));
            bind_values.push(Box::new(since.to_rfc3339()));
            param_idx += 1;
        }

        sql.push_str(" ORDER BY id DESC");

        sql.push_str(&format!(" LIMIT ?{param_idx}"));
        bind_values.push(Box::new(q.limit.unwrap_or(100)));
        param_idx += 1;

        if let Some(offset) = q.offset {
            sql.push_str(&format!(" OFFSET ?{param_idx}"));
            bind_values.push(Box::new(offset));
        }

        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_exchange)?;

        let mut exchanges = Vec::new();
        for row in rows {
            exchanges.push(row?);
        }
        Ok(exchanges)
    }
}
