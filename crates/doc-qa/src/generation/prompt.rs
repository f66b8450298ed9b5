//! Prompt templates for RAG generation

use crate::types::Chunk;

/// Line the model sees in place of a context block when retrieval found nothing
pub const NO_CONTEXT_NOTICE: &str =
    "No document context was found for this question. No documents have been uploaded or none are relevant.";

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Concatenate retrieved chunks, best match first, within `max_chars`
    ///
    /// Whole chunks are dropped from the lowest-ranked end until the block fits.
    /// If even the best chunk is over budget it is cut to fit.
    pub fn build_context(chunks: &[Chunk], max_chars: usize) -> String {
        let mut context = String::new();
        let mut used = 0usize;

        for (i, chunk) in chunks.iter().enumerate() {
            let section = Self::format_section(i + 1, chunk);
            let len = section.chars().count();

            if used + len > max_chars {
                if i == 0 {
                    context.extend(section.chars().take(max_chars));
                    tracing::debug!("Top chunk truncated to {} chars", max_chars);
                } else {
                    tracing::debug!(
                        "Context budget reached, dropped {} lower-ranked chunks",
                        chunks.len() - i
                    );
                }
                break;
            }

            context.push_str(&section);
            used += len;
        }

        context.trim_end().to_string()
    }

    fn format_section(rank: usize, chunk: &Chunk) -> String {
        format!(
            "[{}] {} (part {})\n{}\n\n---\n\n",
            rank,
            chunk.source_id,
            chunk.sequence_index + 1,
            chunk.text.trim()
        )
    }

    /// Build the full RAG prompt with strict grounding
    pub fn build_rag_prompt(context: &str, history: &str, question: &str) -> String {
        let context = if context.trim().is_empty() {
            NO_CONTEXT_NOTICE
        } else {
            context
        };
        let history = if history.trim().is_empty() {
            "(no previous conversation)"
        } else {
            history
        };

        format!(
            r#"You are a helpful assistant that answers questions about the user's uploaded documents.

RULES:
1. Answer ONLY from the CONTEXT below
2. If the context does not contain the answer, say that the documents do not provide enough information
3. Do not use outside knowledge or guess
4. Use the conversation history only to understand what the question refers to

CONTEXT FROM DOCUMENTS:
{context}

CONVERSATION HISTORY:
{history}

QUESTION: {question}

Answer:"#,
            context = context,
            history = history,
            question = question.trim()
        )
    }
}
