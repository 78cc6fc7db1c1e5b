//! Legacy brand-name replacement applied to every outgoing reply.

use crate::config::BrandConfig;
use crate::error::{Error, Result};
use regex::{NoExpand, Regex};
use std::borrow::Cow;

/// Case-insensitive literal replacement of a legacy product name.
#[derive(Debug, Clone)]
pub struct BrandNormalizer {
    legacy: Option<Regex>,
    current: String,
}

impl BrandNormalizer {
    pub fn new(config: &BrandConfig) -> Result<Self> {
        let legacy = match config.legacy_name.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => {
                check_replacement(name, &config.current_name)?;
                Some(
                    Regex::new(&format!("(?i){}", regex::escape(name)))
                        .map_err(|e| Error::Config(format!("brand.legacy_name: {e}")))?,
                )
            }
        };
        Ok(Self {
            legacy,
            current: config.current_name.clone(),
        })
    }

    /// A normalizer that leaves text untouched.
    pub fn disabled() -> Self {
        Self {
            legacy: None,
            current: String::new(),
        }
    }

    /// Replaces until no legacy occurrence is left. A replacement can splice a
    /// new occurrence together with the surrounding text, so this repeats.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let Some(ref legacy) = self.legacy else {
            return Cow::Borrowed(text);
        };

        let mut out = Cow::Borrowed(text);
        while legacy.is_match(&out) {
            out = Cow::Owned(legacy.replace_all(&out, NoExpand(&self.current)).into_owned());
        }
        out
    }
}

/// Rejects replacements that `apply` could not drive to a fixpoint.
///
/// A shorter replacement shrinks the text on every pass, so it always
/// terminates. A replacement at least as long as the legacy name must not
/// contain it and must not overlap it at either edge; then one pass leaves
/// nothing to match.
pub(crate) fn check_replacement(legacy: &str, current: &str) -> Result<()> {
    let legacy = legacy.to_lowercase();
    let current = current.to_lowercase();
    if current.contains(&legacy) {
        return Err(Error::Config(
            "brand.current_name must not contain brand.legacy_name".into(),
        ));
    }
    if current.chars().count() < legacy.chars().count() {
        return Ok(());
    }
    let overlaps = (1..legacy.len())
        .filter(|&i| legacy.is_char_boundary(i))
        .any(|i| current.starts_with(&legacy[i..]) || current.ends_with(&legacy[..i]));
    if overlaps {
        return Err(Error::Config(
            "brand.current_name must not overlap brand.legacy_name unless it is shorter".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(legacy: &str, current: &str) -> BrandNormalizer {
        BrandNormalizer::new(&BrandConfig {
            legacy_name: Some(legacy.into()),
            current_name: current.into(),
        })
        .unwrap()
    }

    #[test]
    fn replaces_every_case_variant() {
        let n = normalizer("PratChat", "Prat.AI");
        assert_eq!(
            n.apply("PratChat, pratchat, PRATCHAT and Pratchat"),
            "Prat.AI, Prat.AI, Prat.AI and Prat.AI"
        );
    }

    #[test]
    fn is_idempotent() {
        let n = normalizer("OldBot", "NewBot");
        for text in ["Hi from oldbot!", "nothing to see", "OLDBOTOLDBOT", ""] {
            let once = n.apply(text).into_owned();
            let twice = n.apply(&once).into_owned();
            assert_eq!(once, twice, "{text}");
        }
    }

    #[test]
    fn spliced_occurrences_are_also_replaced() {
        let n = normalizer("ab", "a");
        let out = n.apply("abb").into_owned();
        assert_eq!(out, "a");
        assert_eq!(n.apply(&out), out);
    }

    #[test]
    fn long_spliced_chains_reach_a_fixpoint() {
        let n = normalizer("ab", "a");
        let text = format!("a{}", "b".repeat(12));
        let once = n.apply(&text).into_owned();
        assert_eq!(once, "a");
        assert_eq!(n.apply(&once), once);

        let n = normalizer("OldBot", "Bot");
        let text = format!("{}Bot", "Old".repeat(20));
        let once = n.apply(&text).into_owned();
        assert_eq!(once, "Bot");
        assert_eq!(n.apply(&once), once);
    }

    #[test]
    fn rejects_overlapping_replacement_that_does_not_shrink() {
        for current in ["bxx", "xxa", "Bot Ab", "xxxab"] {
            let config = BrandConfig {
                legacy_name: Some("ab".into()),
                current_name: current.into(),
            };
            assert!(
                matches!(BrandNormalizer::new(&config), Err(Error::Config(_))),
                "{current}"
            );
        }
    }

    #[test]
    fn accepts_disjoint_or_shrinking_replacement() {
        for (legacy, current) in [
            ("OldBot", "NewBot"),
            ("OldBot", "Helper"),
            ("PratChat", "Prat.AI"),
            ("old", "$1 new"),
            ("ab", "b"),
        ] {
            let config = BrandConfig {
                legacy_name: Some(legacy.into()),
                current_name: current.into(),
            };
            assert!(BrandNormalizer::new(&config).is_ok(), "{legacy} -> {current}");
        }
    }

    #[test]
    fn legacy_name_is_literal_not_a_pattern() {
        let n = normalizer("Prat.Chat", "Prat.AI");
        assert_eq!(n.apply("PratXChat"), "PratXChat");
        assert_eq!(n.apply("prat.chat"), "Prat.AI");
    }

    #[test]
    fn replacement_is_not_expanded() {
        let n = normalizer("old", "$1 new");
        assert_eq!(n.apply("old"), "$1 new");
    }

    #[test]
    fn disabled_or_blank_leaves_text_unchanged() {
        assert!(matches!(BrandNormalizer::disabled().apply("PratChat"), Cow::Borrowed(_)));
        let blank = BrandNormalizer::new(&BrandConfig {
            legacy_name: Some("  ".into()),
            current_name: "X".into(),
        })
        .unwrap();
        assert_eq!(blank.apply("anything"), "anything");
    }
}
