//! Query reformulation: vague follow-up → standalone retrieval query.

use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller, LlmError};

/// Rewrite a context-dependent query into a standalone one optimized for
/// vector retrieval: pronouns resolved, entities materialized, locations
/// replaced when the new turn switches them.
///
/// With empty context there is nothing to resolve and the input comes back
/// unchanged — the controller additionally skips this call entirely for
/// standalone turns, which keeps the idempotence contract trivially true.
/// Errors propagate so the controller can fall back to the original query
/// with a warning flag.
pub async fn reformulate(
    caller: &LlmCaller,
    question: &str,
    context: &str,
    source: &str,
) -> Result<String, LlmError> {
    if context.trim().is_empty() {
        return Ok(question.to_string());
    }

    let system = format!(
        "Rewrite the user's question as ONE standalone search query for the \
         `{source}` corpus. Resolve pronouns and references using ONLY the \
         provided context — never invent facts that are not in it. Keep \
         entity names, model names and locations explicit. Output only the \
         rewritten query, no quotes, no explanation."
    );

    let user = format!("[context]\n{context}\n\n[question]\n{question}");

    let resp = caller
        .call(task::REFORMULATION, &system, vec![ChatMessage::user(user)])
        .await?;

    let rewritten = resp.content.trim().trim_matches('"').trim().to_string();
    if rewritten.is_empty() {
        return Ok(question.to_string());
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use torque_llm::{ChatRequest, ChatResponse, LlmProvider, ProviderError, TaskRegistry};

    struct NeverCalled;

    #[async_trait]
    impl LlmProvider for NeverCalled {
        fn name(&self) -> &str {
            "never"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            panic!("empty context must not call the LLM");
        }
    }

    #[tokio::test]
    async fn empty_context_returns_input_unchanged() {
        let caller = LlmCaller::single_provider(TaskRegistry::default(), Arc::new(NeverCalled));
        let out = reformulate(&caller, "Haval H6 brake problems", "", "conversations")
            .await
            .unwrap();
        assert_eq!(out, "Haval H6 brake problems");
    }

    #[tokio::test]
    async fn quotes_are_stripped_from_the_rewrite() {
        struct Quoter;

        #[async_trait]
        impl LlmProvider for Quoter {
            fn name(&self) -> &str {
                "quoter"
            }
            async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
                Ok(ChatResponse {
                    content: "\"Haval H6 transmission issues summary\"".to_string(),
                    model: "m".to_string(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "end_turn".to_string(),
                })
            }
        }

        let caller = LlmCaller::single_provider(TaskRegistry::default(), Arc::new(Quoter));
        let out = reformulate(
            &caller,
            "summarize point 3 above",
            "3. Trans jerking in 2nd gear",
            "conversations",
        )
        .await
        .unwrap();
        assert_eq!(out, "Haval H6 transmission issues summary");
    }
}
