//! Configuration loading.
//!
//! Settings come from a TOML file (every section optional), then a few
//! environment variables override secrets so they never need to live on disk.

pub mod schema;

pub use schema::{
    BrandConfig, ClassifierConfig, Config, EmbedderKind, FixedAnswer, GatewayConfig,
    GenerativeConfig, PathsConfig, PersonaConfig, RetrievalConfig, RouterConfig, StoreConfig,
};

use crate::error::{Error, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Default config location, e.g. `~/.config/intentgate/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "intentgate")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

impl Config {
    /// Load the config from `path`, or from the default location when it
    /// exists, or fall back to defaults. Environment overrides and
    /// validation are applied in every case.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match resolved {
            Some(ref p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                let parsed = Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config file: {}", p.display()))?;
                tracing::info!(path = %p.display(), "Loaded configuration");
                parsed
            }
            None => {
                tracing::info!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Secrets from the environment win over the file.
    pub fn apply_env_overrides(&mut self) {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .filter(|key| !key.trim().is_empty());
        if api_key.is_some() {
            self.generative.api_key = api_key;
        }

        if let Some(token) = std::env::var("INTENTGATE_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            self.gateway.admin_token = Some(token);
        }
    }

    fn expand_paths(&mut self) -> anyhow::Result<()> {
        self.paths.data_dir = expand(&self.paths.data_dir)?;
        self.paths.artifacts_dir = expand(&self.paths.artifacts_dir)?;
        self.store.db_path = expand(&self.store.db_path)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.router.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "router.confidence_threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.router.top_k == 0 {
            return Err(Error::Config("router.top_k must be at least 1".into()));
        }
        if self.retrieval.dimension == 0 {
            return Err(Error::Config("retrieval.dimension must be at least 1".into()));
        }
        if self.classifier.max_features == 0 || self.classifier.max_ngram == 0 {
            return Err(Error::Config(
                "classifier.max_features and classifier.max_ngram must be at least 1".into(),
            ));
        }
        if self.classifier.inverse_regularization <= 0.0 {
            return Err(Error::Config(
                "classifier.inverse_regularization must be positive".into(),
            ));
        }
        if let Some(ref legacy) = self.brand.legacy_name {
            let legacy = legacy.trim();
            if legacy.is_empty() {
                return Err(Error::Config("brand.legacy_name cannot be empty".into()));
            }
            crate::gatekeeper::brand::check_replacement(legacy, &self.brand.current_name)?;
        }
        if self.gateway.request_timeout_secs <= self.generative.timeout_secs {
            tracing::warn!(
                request_timeout = self.gateway.request_timeout_secs,
                generative_timeout = self.generative.timeout_secs,
                "Gateway request timeout does not exceed the generative timeout; \
                 slow generative calls will surface as HTTP timeouts instead of fallbacks"
            );
        }
        Ok(())
    }
}

fn expand(path: &Path) -> anyhow::Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
