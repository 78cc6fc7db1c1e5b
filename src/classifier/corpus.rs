use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One intent: example utterances plus candidate replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRecord {
    pub tag: String,
    pub patterns: Vec<String>,
    pub responses: Vec<String>,
}

impl IntentRecord {
    pub fn new(tag: &str, patterns: &[&str], responses: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
            responses: responses.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    intents: Vec<IntentRecord>,
}

/// Read `{"intents": [...]}` from disk. Missing fields or a missing file are
/// training errors, since they leave nothing to train on.
pub fn load_intents(path: &Path) -> Result<Vec<IntentRecord>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::Training(format!("cannot read intents file {}: {e}", path.display()))
    })?;
    parse_intents(&raw)
}

pub fn parse_intents(raw: &str) -> Result<Vec<IntentRecord>> {
    let file: CorpusFile = serde_json::from_str(raw)
        .map_err(|e| Error::Training(format!("malformed intents corpus: {e}")))?;
    Ok(file.intents)
}

/// Reject corpora the trainer cannot make sense of.
pub(crate) fn validate(intents: &[IntentRecord]) -> Result<()> {
    if intents.is_empty() {
        return Err(Error::Training("intent corpus is empty".into()));
    }

    let mut seen = HashSet::new();
    for intent in intents {
        if intent.tag.trim().is_empty() {
            return Err(Error::Training("intent with an empty tag".into()));
        }
        if !seen.insert(intent.tag.as_str()) {
            return Err(Error::Training(format!("duplicate intent tag '{}'", intent.tag)));
        }
    }

    if intents.iter().all(|i| i.patterns.is_empty()) {
        return Err(Error::Training("no intent has any example pattern".into()));
    }
    Ok(())
}
