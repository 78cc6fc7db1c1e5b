use super::{GenerationRequest, GenerativeBackend};
use crate::config::{FixedAnswer, GenerativeConfig, PersonaConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

// ── Gemini backend ───────────────────────────────────────────────

/// Google Gemini `generateContent` over REST.
///
/// Identity questions ("who are you", ...) and configured fixed answers are
/// answered locally without a network call.
pub struct GeminiBackend {
    /// API key, sent as the `key` query parameter.
    api_key: String,
    /// Model to use (e.g. "gemini-2.5-flash").
    model: String,
    /// Full `...:generateContent` URL.
    endpoint: String,
    temperature: f64,
    max_output_tokens: u32,
    timeout: Duration,
    /// Speaker label closing the prompt.
    speaker: String,
    identity_keywords: Vec<String>,
    fixed_answers: Vec<FixedAnswer>,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &GenerativeConfig, persona: &PersonaConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| Error::Config("generative.api_key is required for gemini".into()))?;

        Ok(Self {
            api_key,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.api_url.trim_end_matches('/'),
                config.model
            ),
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            speaker: persona.name.clone(),
            identity_keywords: lowercase_all(&persona.identity_keywords),
            fixed_answers: persona
                .fixed_answers
                .iter()
                .map(|fixed| FixedAnswer {
                    keywords: lowercase_all(&fixed.keywords),
                    answer: fixed.answer.clone(),
                })
                .collect(),
            client: reqwest::Client::new(),
        })
    }

    /// Canned reply for identity or fixed-answer questions, if any matches.
    fn local_answer(&self, request: &GenerationRequest) -> Option<String> {
        let message = request.message.to_lowercase();
        let mentions = |keywords: &[String]| keywords.iter().any(|k| message.contains(k.as_str()));

        if mentions(&self.identity_keywords) {
            return Some(request.persona.clone());
        }
        self.fixed_answers
            .iter()
            .find(|fixed| mentions(&fixed.keywords))
            .map(|fixed| fixed.answer.clone())
    }

    /// Persona, optional knowledge-base context, then the user turn.
    fn build_prompt(&self, request: &GenerationRequest) -> String {
        let mut prompt = format!("{}\n\n", request.persona);
        if let Some(context) = request.context.as_deref().filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("Context from knowledge base:\n{context}\n\n"));
        }
        prompt.push_str(&format!("User: {}\n{}:", request.message, self.speaker));
        prompt
    }
}

fn lowercase_all(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Concatenated text of the first candidate's parts.
fn candidate_text(body: &serde_json::Value) -> Option<String> {
    let parts = body["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if let Some(answer) = self.local_answer(request) {
            tracing::debug!("Answered from persona without calling Gemini");
            return Ok(answer);
        }

        let payload = serde_json::json!({
            "contents": [{
                "parts": [{ "text": self.build_prompt(request) }]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::GenerativeBackend(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::GenerativeBackend(format!(
                "Gemini API error {status}: {snippet}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::GenerativeBackend(format!("malformed response: {e}")))?;

        candidate_text(&body).ok_or_else(|| {
            let reason = body["candidates"][0]["finishReason"]
                .as_str()
                .or_else(|| body["promptFeedback"]["blockReason"].as_str())
                .unwrap_or("no candidate text");
            Error::GenerativeBackend(format!("empty response: {reason}"))
        })
    }
}
