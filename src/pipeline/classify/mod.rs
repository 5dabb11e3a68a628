//! Deterministic text classifiers.
//!
//! Every classifier is a pure function over valid UTF-8 and never fails.
//! Empty input maps to the neutral or default label.

pub mod form;
pub mod iki;
pub mod intent;
pub mod kotodama;
pub mod mood;
pub mod phase;
pub mod tags;

pub use form::{map_to_form, Form, FormResult};
pub use iki::{classify_iki, IkiResult, IkiState};
pub use intent::{classify_intent, classify_response_mode, wants_detail, Intent, ResponseMode};
pub use kotodama::{determine_role, map_to_kotodama, KotodamaResult, KotodamaRow, Role};
pub use mood::{classify_mood, Mood};
pub use phase::{estimate_phase, Phase, PhaseFlags, PhaseResult};
pub use tags::{extract_domain_tags, extract_four_layer_tags, extract_kojiki_tags, DomainTag, FourLayerTag};

use regex::Regex;

/// Ordered `(pattern, label)` rules. Declaration order breaks ties.
pub struct RuleTable<L> {
    rules: Vec<(Regex, L)>,
}

impl<L: Clone + PartialEq> RuleTable<L> {
    /// Build a table from static patterns. Only used for compile-time tables,
    /// so an invalid pattern is a programming error.
    pub fn new(rules: Vec<(&'static str, L)>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(pattern, label)| (Regex::new(pattern).unwrap(), label))
                .collect(),
        }
    }

    /// Label of the first matching rule, or `default`.
    pub fn first_match(&self, text: &str, default: L) -> L {
        self.rules
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, label)| label.clone())
            .unwrap_or(default)
    }

    /// Labels of every matching rule, deduplicated, in declaration order.
    pub fn all_matches(&self, text: &str) -> Vec<L> {
        let mut out: Vec<L> = Vec::new();
        for (re, label) in &self.rules {
            if re.is_match(text) && !out.contains(label) {
                out.push(label.clone());
            }
        }
        out
    }

    /// Matching labels together with the matched substring.
    pub fn matches_with_text<'t>(&self, text: &'t str) -> Vec<(L, &'t str)> {
        self.rules
            .iter()
            .filter_map(|(re, label)| re.find(text).map(|m| (label.clone(), m.as_str())))
            .collect()
    }
}

/// Split a message into tokens on whitespace and sentence punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| {
        c.is_whitespace() || matches!(c, '、' | '。' | ',' | '.' | '!' | '?' | '！' | '？' | '・')
    })
    .filter(|t| !t.is_empty())
    .map(str::to_string)
    .collect()
}
