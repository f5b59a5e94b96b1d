//! Inline citation markers in generated answers

use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Phrases a model uses when the context cannot answer the question
const NO_ANSWER_PHRASES: &[&str] = &[
    "not provided",
    "not included",
    "not covered",
    "insufficient information",
    "cannot be determined",
    "does not contain",
    "not available in the context",
];

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("valid marker regex"))
}

fn dangling_space_regex() -> &'static Regex {
    static DANGLING: OnceLock<Regex> = OnceLock::new();
    DANGLING.get_or_init(|| Regex::new(r"[ \t]+([.,;:!?])").expect("valid spacing regex"))
}

/// Answer text after invalid citation markers were removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedAnswer {
    pub text: String,
    /// Distinct valid indices referenced, ascending
    pub cited: Vec<usize>,
    /// Marker entries, as written, that referenced no provided source
    pub removed: Vec<String>,
}

/// Keep only markers that reference indices in `1..=source_count`
///
/// A marker mixing valid and invalid indices is rewritten with the valid ones only; a
/// marker with no valid index is dropped along with the whitespace before it.
pub fn sanitize(answer: &str, source_count: usize) -> SanitizedAnswer {
    let mut cited = BTreeSet::new();
    let mut removed = Vec::new();

    let rewritten = marker_regex().replace_all(answer, |caps: &Captures| {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for token in caps[1].split(',').map(str::trim) {
            // digits too long for usize can never name a provided source
            match token.parse::<usize>() {
                Ok(i) if i >= 1 && i <= source_count => valid.push(i),
                _ => invalid.push(token.to_string()),
            }
        }

        cited.extend(valid.iter().copied());
        if invalid.is_empty() {
            return caps[0].to_string();
        }
        removed.extend(invalid);
        if valid.is_empty() {
            String::new()
        } else {
            let joined: Vec<String> = valid.iter().map(|i| i.to_string()).collect();
            format!("[{}]", joined.join(", "))
        }
    });

    let text = if removed.is_empty() {
        rewritten.into_owned()
    } else {
        dangling_space_regex()
            .replace_all(&rewritten, "$1")
            .trim_end()
            .to_string()
    };

    SanitizedAnswer {
        text,
        cited: cited.into_iter().collect(),
        removed,
    }
}

/// Whether the answer contains at least one citation marker
pub fn has_citations(answer: &str) -> bool {
    marker_regex().is_match(answer)
}

/// Whether the answer states that the context cannot answer the question
pub fn is_no_answer(answer: &str) -> bool {
    let lower = answer.to_lowercase();
    NO_ANSWER_PHRASES.iter().any(|phrase| lower.contains(phrase))
}
