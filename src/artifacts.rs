//! Whole-unit artifact persistence.
//!
//! Each trained component is written as one JSON envelope. Writes go to a
//! temp file in the target directory and are renamed into place, so a reader
//! sees either the previous artifact or the complete new one.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

const FORMAT: &str = "intentgate-artifact";
const FORMAT_VERSION: u32 = 1;

/// Kind tag stored in the envelope so a classifier file can never be loaded
/// as an index and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    IntentClassifier,
    VectorIndex,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    format: &'a str,
    version: u32,
    kind: ArtifactKind,
    created_at: DateTime<Utc>,
    payload: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    format: String,
    version: u32,
    kind: ArtifactKind,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    payload: T,
}

/// Atomically write `payload` to `path`, creating parent directories.
pub fn save<T: Serialize>(path: &Path, kind: ArtifactKind, payload: &T) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let envelope = EnvelopeRef {
        format: FORMAT,
        version: FORMAT_VERSION,
        kind,
        created_at: Utc::now(),
        payload,
    };
    let bytes = serde_json::to_vec(&envelope)
        .map_err(|e| Error::corrupt(path, format!("serialization failed: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::debug!(path = %path.display(), ?kind, bytes = bytes.len(), "Artifact saved");
    Ok(())
}

/// Load and unwrap an artifact. A missing file is `ArtifactMissing`; any
/// parse failure, missing field or envelope mismatch is `CorruptArtifact`.
pub fn load<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> Result<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::ArtifactMissing(path.to_path_buf()))
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let envelope: Envelope<T> = serde_json::from_slice(&bytes)
        .map_err(|e| Error::corrupt(path, format!("unreadable artifact: {e}")))?;

    if envelope.format != FORMAT {
        return Err(Error::corrupt(
            path,
            format!("unexpected format tag '{}'", envelope.format),
        ));
    }
    if envelope.version != FORMAT_VERSION {
        return Err(Error::corrupt(
            path,
            format!(
                "unsupported artifact version {} (expected {FORMAT_VERSION})",
                envelope.version
            ),
        ));
    }
    if envelope.kind != kind {
        return Err(Error::corrupt(
            path,
            format!("expected {kind:?} artifact, found {:?}", envelope.kind),
        ));
    }

    Ok(envelope.payload)
}
