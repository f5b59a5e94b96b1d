//! Prompt assembly for cited answers

use crate::retrieval::SourceCitation;

/// Rules given to the generation model
pub const SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant that provides accurate, well-cited answers.

Rules:
- Use ONLY the provided context to answer questions
- EVERY claim must be followed by inline citations like [1], [2], or [1,2]
- Multiple related claims can share citations if from the same source
- Do NOT invent citation numbers that don't exist
- If the context doesn't contain enough information, explicitly state what's missing and do not cite anything
- Be concise but thorough
- Structure your answer clearly with proper paragraphs";

/// System and user messages for one generation call
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    /// Numbered context blocks followed by the question
    pub fn build(query: &str, sources: &[SourceCitation]) -> Self {
        let context = sources
            .iter()
            .map(|source| format!("[{}] {}", source.citation_index, source.text()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let user = format!(
            "Context:\n{}\n\nQuestion:\n{}\n\nProvide a well-structured answer with inline citations [1], [2], etc. for every claim you make.",
            context,
            query.trim()
        );

        Self {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}
