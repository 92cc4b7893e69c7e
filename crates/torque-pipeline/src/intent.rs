//! Intent classification: standalone vs. context-dependent.

use torque_core::types::IntentResult;
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller, LlmError};

use crate::markers::has_anaphora;

/// Does the query rely on prior turns to be understood?
///
/// Explicit anaphora decides without an LLM call. Runs in the parallel
/// phase; the controller substitutes `Standalone` when this errors.
pub async fn classify(
    caller: &LlmCaller,
    question: &str,
    last_assistant: Option<&str>,
) -> Result<IntentResult, LlmError> {
    if has_anaphora(question) {
        return Ok(IntentResult::ContextDependent);
    }

    let system = "\
Decide whether the question can be understood on its own or needs the \
previous conversation turn. Reply with ONE WORD: standalone or \
context_dependent.";

    let mut user = String::new();
    if let Some(prior) = last_assistant {
        // long prior answers are truncated; the head is enough signal here
        let head: String = prior.chars().take(400).collect();
        user.push_str(&format!("[previous answer] {head}\n"));
    }
    user.push_str(&format!("[question] {question}"));

    let resp = caller
        .call(task::INTENT_CLASSIFICATION, system, vec![ChatMessage::user(user)])
        .await?;

    if resp.content.to_lowercase().contains("context_dependent") {
        Ok(IntentResult::ContextDependent)
    } else {
        Ok(IntentResult::Standalone)
    }
}
