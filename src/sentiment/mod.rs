//! Lexicon-based sentiment tagger.
//!
//! Scores each known opinion word, adjusts it for a preceding intensifier
//! or a nearby negation, and averages. The label only feeds the exchange
//! log; routing never reads it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Polarity above this is positive.
pub const POSITIVE_THRESHOLD: f64 = 0.1;
/// Polarity below this is negative.
pub const NEGATIVE_THRESHOLD: f64 = -0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_polarity(polarity: f64) -> Self {
        if polarity > POSITIVE_THRESHOLD {
            Self::Positive
        } else if polarity < NEGATIVE_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Self::Positive),
            "negative" => Ok(Self::Negative),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown sentiment '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: Sentiment,
    /// In `[-1.0, 1.0]`, rounded to two decimals.
    pub polarity: f64,
}

// ── Lexicon ─────────────────────────────────────────────────────────────

const LEXICON: &[(&str, f64)] = &[
    // positive
    ("amazing", 0.6),
    ("appreciate", 0.5),
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("brilliant", 0.9),
    ("cool", 0.35),
    ("delighted", 0.7),
    ("easy", 0.43),
    ("enjoy", 0.4),
    ("excellent", 1.0),
    ("fantastic", 0.4),
    ("fast", 0.2),
    ("fine", 0.42),
    ("glad", 0.5),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("helpful", 0.5),
    ("impressive", 1.0),
    ("love", 0.5),
    ("lovely", 0.5),
    ("nice", 0.6),
    ("perfect", 1.0),
    ("pleased", 0.5),
    ("quick", 0.33),
    ("satisfied", 0.5),
    ("thank", 0.2),
    ("thanks", 0.2),
    ("useful", 0.3),
    ("welcome", 0.8),
    ("wonderful", 1.0),
    // negative
    ("angry", -0.5),
    ("annoyed", -0.4),
    ("annoying", -0.8),
    ("awful", -1.0),
    ("bad", -0.7),
    ("broken", -0.4),
    ("confusing", -0.3),
    ("disappointed", -0.75),
    ("disappointing", -0.6),
    ("frustrated", -0.7),
    ("frustrating", -0.4),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("poor", -0.4),
    ("problem", -0.2),
    ("sad", -0.5),
    ("slow", -0.3),
    ("terrible", -1.0),
    ("unhappy", -0.6),
    ("useless", -0.5),
    ("worse", -0.4),
    ("worst", -1.0),
    ("wrong", -0.5),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.2),
    ("so", 1.2),
    ("extremely", 1.5),
    ("incredibly", 1.5),
    ("super", 1.3),
    ("quite", 1.1),
    ("slightly", 0.5),
    ("somewhat", 0.7),
];

const NEGATIONS: &[&str] = &["not", "no", "never", "nothing", "hardly", "without"];

/// How many preceding words a negation reaches.
const NEGATION_WINDOW: usize = 3;

/// Negated opinion words flip and soften.
const NEGATION_FACTOR: f64 = -0.5;

fn lookup(table: &[(&str, f64)], word: &str) -> Option<f64> {
    table.iter().find(|(w, _)| *w == word).map(|(_, v)| *v)
}

fn is_negation(word: &str) -> bool {
    NEGATIONS.contains(&word) || word.ends_with("n't")
}

fn words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Raw polarity in `[-1.0, 1.0]`; 0.0 when no opinion word is present.
pub fn polarity(text: &str) -> f64 {
    let tokens = words(text);
    let mut scores = Vec::new();

    for (i, word) in tokens.iter().enumerate() {
        let Some(mut score) = lookup(LEXICON, word) else {
            continue;
        };

        if let Some(multiplier) = i
            .checked_sub(1)
            .and_then(|prev| lookup(INTENSIFIERS, &tokens[prev]))
        {
            score *= multiplier;
        }

        let window_start = i.saturating_sub(NEGATION_WINDOW);
        if tokens[window_start..i].iter().any(|w| is_negation(w)) {
            score *= NEGATION_FACTOR;
        }

        scores.push(score.clamp(-1.0, 1.0));
    }

    if scores.is_empty() {
        return 0.0;
    }
    (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
}

/// Tag `text` with a coarse polarity label.
pub fn analyze(text: &str) -> SentimentResult {
    let raw = polarity(text);
    SentimentResult {
        label: Sentiment::from_polarity(raw),
        polarity: (raw * 100.0).round() / 100.0,
    }
}
