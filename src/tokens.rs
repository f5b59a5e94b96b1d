//! Token counting with the cl100k_base encoding
//!
//! Falls back to a chars/4 estimate if the encoding cannot be loaded.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static ENCODING: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn encoding() -> Option<&'static CoreBPE> {
    ENCODING
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!("cl100k_base unavailable, estimating tokens: {}", e);
                None
            }
        })
        .as_ref()
}

/// Number of tokens in `text`
pub fn count(text: &str) -> usize {
    match encoding() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate(text),
    }
}

/// Rough estimate used when no tokenizer is available
pub fn estimate(text: &str) -> usize {
    text.chars().count() / 4
}
