//! Error taxonomy shared by the classifier, retriever, router and exchange log.

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A model or index was used before it was trained, built or loaded.
    #[error("{component} is not ready: {reason}")]
    NotReady {
        component: &'static str,
        reason: String,
    },

    /// The training corpus is empty or malformed.
    #[error("training failed: {0}")]
    Training(String),

    /// No documents were found to index. Recoverable: callers may continue
    /// with an empty retriever.
    #[error("no documents found in {}", .0.display())]
    EmptyCorpus(PathBuf),

    /// A persisted artifact is inconsistent or only partially present.
    #[error("corrupt artifact {}: {reason}", path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    /// The embedder failed or returned vectors that do not fit the index.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The artifact file does not exist yet.
    #[error("artifact not found: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// Network, quota, timeout or malformed upstream response from the
    /// generative backend. Always recoverable via the fallback path.
    #[error("generative backend error: {0}")]
    GenerativeBackend(String),

    /// The exchange log could not be written or queried.
    #[error("exchange log error: {0}")]
    Logging(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_ready(component: &'static str, reason: impl Into<String>) -> Self {
        Self::NotReady {
            component,
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the service can keep serving after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EmptyCorpus(_) | Self::GenerativeBackend(_) | Self::Logging(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Logging(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_variants() {
        assert!(Error::EmptyCorpus(PathBuf::from("kb")).is_recoverable());
        assert!(Error::GenerativeBackend("quota".into()).is_recoverable());
        assert!(Error::Logging("disk full".into()).is_recoverable());
        assert!(!Error::not_ready("classifier", "untrained").is_recoverable());
        assert!(!Error::corrupt("index.json", "count mismatch").is_recoverable());
        assert!(!Error::Embedding("2 vectors for 3 documents".into()).is_recoverable());
    }

    #[test]
    fn messages_name_the_component() {
        let err = Error::not_ready("intent classifier", "call train() or load() first");
        assert_eq!(
            err.to_string(),
            "intent classifier is not ready: call train() or load() first"
        );
    }
}
