use crate::error::QueryError;
use crate::generation::ChatModel;
use crate::models::{Answer, RetrievedChunk};
use std::collections::BTreeSet;

/// Fixed grounding instruction rendered into every prompt. "I don't know."
/// is a successful answer, not an error.
pub const GROUNDING_INSTRUCTION: &str = "You are a grounded company knowledge assistant.\n\
Always base answers strictly on the provided context.\n\
If the answer isn't present, reply with \"I don't know.\"\n\
Respond concisely and clearly.";

pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{GROUNDING_INSTRUCTION}\n\n\
         Question:\n{question}\n\n\
         Context:\n{context}\n\n\
         Rule: Prefer the most recent policy by effective date."
    )
}

/// Unique `source` values across the context chunks, lexicographically
/// sorted. A chunk without a source contributes the literal `"unknown"`.
pub fn collect_sources(chunks: &[RetrievedChunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|chunk| chunk.source().unwrap_or("unknown").to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Renders the grounded prompt, invokes the generation model, and returns
/// the answer together with its sources and raw context snippets.
pub async fn synthesize_answer<M>(
    model: &M,
    question: &str,
    chunks: &[RetrievedChunk],
) -> Result<Answer, QueryError>
where
    M: ChatModel + ?Sized,
{
    let prompt = build_prompt(question, chunks);
    let text = model.generate(&prompt).await?;

    Ok(Answer {
        text,
        sources: collect_sources(chunks),
        contexts: chunks.iter().map(|chunk| chunk.text.clone()).collect(),
    })
}
