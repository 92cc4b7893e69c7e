//! History compression: extract the referenced slice of a long answer.

use tracing::warn;

use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::markers::has_anaphora;

/// Short answers pass through whole; extraction only pays off past this.
const PASSTHROUGH_CHARS: usize = 200;

/// Return the part of `prior_answer` that `question` refers to.
///
/// Pass-through cases (no LLM call):
///   - the prior answer is short enough to carry verbatim;
///   - the question has no reference markers, so there is nothing to
///     anchor an extraction on.
/// Otherwise a deterministic extraction runs with a tight output budget.
/// Extraction failure degrades to the full prior answer.
pub async fn compress(caller: &LlmCaller, prior_answer: &str, question: &str) -> String {
    if prior_answer.len() <= PASSTHROUGH_CHARS || !has_anaphora(question) {
        return prior_answer.to_string();
    }

    let system = "\
From the assistant answer below, extract ONLY the part the user's new \
question refers to — the named point, item, or passage. Keep the original \
wording. Output nothing else. If unsure which part is meant, output the \
whole answer's key points in under 80 words.";

    let user = format!("[assistant answer]\n{prior_answer}\n\n[new question]\n{question}");

    match caller
        .call(task::COMPRESSION, system, vec![ChatMessage::user(user)])
        .await
    {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
        Ok(_) => prior_answer.to_string(),
        Err(e) => {
            warn!(error = %e, "compression failed, carrying full prior answer");
            prior_answer.to_string()
        }
    }
}
