//! Generative text backends.
//!
//! The router talks to a [`GenerativeBackend`]; which one (if any) is built
//! from config by [`create_backend`]. Every failure is a
//! `GenerativeBackend` error so the router can fall back uniformly.

pub mod gemini;

pub use gemini::GeminiBackend;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One generation call: persona preamble, optional grounding context, and
/// the user's message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub persona: String,
    pub context: Option<String>,
    pub message: String,
}

#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Short identifier for logs, e.g. `gemini-2.5-flash`.
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Build the configured backend. `Ok(None)` means no backend is available
/// and the router should use its no-generative fallback.
pub fn create_backend(config: &Config) -> Result<Option<Arc<dyn GenerativeBackend>>> {
    let generative = &config.generative;
    match generative.provider.as_str() {
        "none" => {
            tracing::info!("Generative backend disabled");
            Ok(None)
        }
        "gemini" if !generative.is_configured() => {
            tracing::warn!(
                "No Gemini API key configured (set GEMINI_API_KEY); \
                 low-confidence messages will use canned fallbacks"
            );
            Ok(None)
        }
        "gemini" => {
            let backend = GeminiBackend::new(generative, &config.persona)?;
            tracing::info!(model = backend.name(), "Gemini backend initialized");
            Ok(Some(Arc::new(backend)))
        }
        other => Err(Error::Config(format!(
            "unknown generative.provider '{other}' (expected \"gemini\" or \"none\")"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_provider_yields_no_backend() {
        let mut config = Config::default();
        config.generative.provider = "none".into();
        config.generative.api_key = Some("key".into());
        assert!(create_backend(&config).unwrap().is_none());
    }

    #[test]
    fn gemini_without_key_yields_no_backend() {
        let config = Config::default();
        assert!(create_backend(&config).unwrap().is_none());
    }

    #[test]
    fn gemini_with_key_is_built() {
        let mut config = Config::default();
        config.generative.api_key = Some("key".into());
        let backend = create_backend(&config).unwrap().unwrap();
        assert_eq!(backend.name(), "gemini-2.5-flash");
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let mut config = Config::default();
        config.generative.provider = "openai".into();
        assert!(matches!(create_backend(&config), Err(Error::Config(_))));
    }
}
