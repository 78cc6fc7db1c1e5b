use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ── Top-level config ─────────────────────────────────────────────

/// Full service configuration, loaded from `config.toml`.
///
/// Every section falls back to its defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub router: RouterConfig,
    pub classifier: ClassifierConfig,
    pub retrieval: RetrievalConfig,
    pub generative: GenerativeConfig,
    pub persona: PersonaConfig,
    pub brand: BrandConfig,
    pub store: StoreConfig,
    pub gateway: GatewayConfig,
}

// ── Paths ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the training data (`intents.json`, `knowledge_base/`).
    pub data_dir: PathBuf,
    /// Where trained classifier and index artifacts are written.
    pub artifacts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            artifacts_dir: PathBuf::from("models"),
        }
    }
}

impl PathsConfig {
    pub fn intents_path(&self) -> PathBuf {
        self.data_dir.join("intents.json")
    }

    pub fn knowledge_base_dir(&self) -> PathBuf {
        self.data_dir.join("knowledge_base")
    }

    pub fn classifier_artifact(&self) -> PathBuf {
        self.artifacts_dir.join("classifier.json")
    }

    pub fn index_artifact(&self) -> PathBuf {
        self.artifacts_dir.join("index.json")
    }
}

// ── Router ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum classifier confidence for a canned answer (inclusive).
    pub confidence_threshold: f64,
    /// Low-stakes intents that may be answered from canned responses.
    pub canned_intents: Vec<String>,
    /// Number of knowledge-base documents passed as generative context.
    pub top_k: usize,
    /// Reply when the generative call failed and no canned content exists.
    pub generative_failed_message: String,
    /// Reply when no generative backend is configured and no canned content exists.
    pub generative_missing_message: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            canned_intents: vec!["greeting".into(), "goodbye".into(), "thanks".into()],
            top_k: 2,
            generative_failed_message:
                "I'm having trouble connecting to my knowledge base. Please try again.".into(),
            generative_missing_message:
                "I need a generative backend to answer complex questions. Please configure one."
                    .into(),
        }
    }
}

// ── Classifier ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Vocabulary cap (most frequent n-grams are kept).
    pub max_features: usize,
    /// Largest n-gram length; unigrams are always included.
    pub max_ngram: usize,
    /// Inverse L2 regularization strength (larger = weaker penalty).
    pub inverse_regularization: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Stop once every gradient component is below this value.
    pub tolerance: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_features: 100,
            max_ngram: 2,
            inverse_regularization: 100.0,
            max_iter: 1000,
            learning_rate: 1.0,
            tolerance: 1e-4,
        }
    }
}

// ── Retrieval ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Deterministic feature-hashing embedder, no model download.
    Hashing,
    /// all-MiniLM-L6-v2 via fastembed (requires `embedding-local`).
    Fastembed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RetrievalConfig {
    pub embedder: EmbedderKind,
    /// Embedding width. Must match between index build and query.
    pub dimension: usize,
    /// File extension of knowledge-base documents.
    pub extension: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderKind::Hashing,
            dimension: 384,
            extension: "txt".into(),
        }
    }
}

// ── Generative backend ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GenerativeConfig {
    /// `gemini` or `none`.
    pub provider: String,
    /// API key. Overridden by `GEMINI_API_KEY` / `GOOGLE_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub temperature: f64,
    pub max_output_tokens: u32,
    /// Upper bound on one generative call, including retries inside the client.
    pub timeout_secs: u64,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            api_key: None,
            model: "gemini-2.5-flash".into(),
            api_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            temperature: 0.7,
            max_output_tokens: 1024,
            timeout_secs: 30,
        }
    }
}

impl GenerativeConfig {
    /// A backend is usable only with a provider and a non-empty key.
    pub fn is_configured(&self) -> bool {
        self.provider != "none"
            && self
                .api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty())
    }
}

// ── Persona ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PersonaConfig {
    /// Assistant name used as the reply speaker in prompts.
    pub name: String,
    /// System preamble prepended to every generative prompt.
    pub preamble: String,
    /// Messages containing one of these are answered with the preamble directly.
    pub identity_keywords: Vec<String>,
    /// Further keyword-triggered answers, checked after the identity keywords.
    pub fixed_answers: Vec<FixedAnswer>,
}

/// A reply returned verbatim, without a generative call, when the message
/// contains any of `keywords` (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FixedAnswer {
    pub keywords: Vec<String>,
    pub answer: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Assistant".into(),
            preamble: "I am a hybrid AI assistant. I combine lightweight local machine learning \
                       for intent and sentiment with a retrieval-augmented language model for \
                       complex questions. I answer concisely and say so when I do not know."
                .into(),
            identity_keywords: vec![
                "who are you".into(),
                "what are you".into(),
                "tell me about yourself".into(),
            ],
            fixed_answers: Vec::new(),
        }
    }
}

// ── Brand ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BrandConfig {
    /// Legacy product name replaced in every reply (case-insensitive).
    pub legacy_name: Option<String>,
    /// Current product name.
    pub current_name: String,
}

// ── Exchange log ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct StoreConfig {
    pub enabled: bool,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Retention cap enforced by the log itself (0 = unlimited).
    pub max_exchanges: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from("exchanges.db"),
            max_exchanges: 0,
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Bearer token for `/api/train` and `/api/embed`. Overridden by
    /// `INTENTGATE_ADMIN_TOKEN`. When unset the admin routes are open.
    pub admin_token: Option<String>,
    pub max_body_bytes: usize,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            allowed_origins: vec![
                "http://localhost:5173".into(),
                "http://localhost:3000".into(),
            ],
            admin_token: None,
            max_body_bytes: 65_536,
            request_timeout_secs: 60,
        }
    }
}
