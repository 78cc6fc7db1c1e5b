use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One knowledge-base document. `id` is the source file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// Read every `*.{extension}` file directly under `dir`, sorted by file name.
///
/// A missing directory or one without matching files is `EmptyCorpus`.
/// Files that are blank or not valid UTF-8 are skipped with a warning.
pub fn load_documents(dir: &Path, extension: &str) -> Result<Vec<Document>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::EmptyCorpus(dir.to_path_buf()))
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let extension = extension.trim_start_matches('.');
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => {
                tracing::warn!(document = %id, "Skipping blank knowledge-base document");
            }
            Ok(content) => documents.push(Document { id, content }),
            Err(e) => {
                tracing::warn!(document = %id, error = %e, "Skipping unreadable knowledge-base document");
            }
        }
    }

    if documents.is_empty() {
        return Err(Error::EmptyCorpus(dir.to_path_buf()));
    }
    Ok(documents)
}
