//! Grounded prompt assembly.
//!
//! The prompt carries a system instruction, a context block (retrieved
//! chunks labeled with `[cN]` citation tokens, or a bounded transcript
//! excerpt when retrieval yielded nothing), a capped window of prior turns,
//! and the user question.

use crate::chat::{ChatRole, ChatTurn};
use crate::retrieval::Citation;

const GROUNDED_INSTRUCTION: &str = "You are a helpful assistant answering questions about a \
video transcript.\nAnswer STRICTLY using the provided context chunks; cite the [cN] token of \
every chunk a claim is drawn from.";

const TRANSCRIPT_INSTRUCTION: &str = "You are a helpful assistant answering questions about a \
video transcript.\nUse the transcript context if available. If it is not present, say so.";

/// Truncate to at most `cap` characters, respecting codepoint boundaries.
pub fn truncate_chars(text: &str, cap: usize) -> &str {
    match text.char_indices().nth(cap) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Render citation context chunks with their `[cN]` labels.
///
/// Labels are positional (`c1` is the first chunk shown to the model); the
/// structured [`Citation`] list returned to the caller carries the real
/// chunk indices and time ranges.
pub fn render_citation_block(citations: &[Citation]) -> String {
    citations
        .iter()
        .enumerate()
        .map(|(i, citation)| format!("[c{}] {}", i + 1, citation.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Assemble the full prompt for one chat request.
pub fn build_prompt(
    citations: &[Citation],
    transcript_excerpt: &str,
    history: &[ChatTurn],
    question: &str,
) -> String {
    let grounded = !citations.is_empty();
    let mut prompt = String::new();
    prompt.push_str(if grounded {
        GROUNDED_INSTRUCTION
    } else {
        TRANSCRIPT_INSTRUCTION
    });
    prompt.push('\n');

    if grounded {
        prompt.push_str("Context chunks (most relevant first):\n---\n");
        prompt.push_str(&render_citation_block(citations));
        prompt.push_str("\n---\n\n");
    } else if !transcript_excerpt.is_empty() {
        prompt.push_str("Transcript (truncated):\n---\n");
        prompt.push_str(transcript_excerpt);
        prompt.push_str("\n---\n\n");
    }

    if !history.is_empty() {
        prompt.push_str("Previous turns:\n");
        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            prompt.push_str(&format!("{role}: {}\n", turn.content));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User question: {question}\nAnswer:"));
    prompt
}
