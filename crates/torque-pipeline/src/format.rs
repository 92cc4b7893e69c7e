//! Format detection: user-imposed output-shape directives.

use torque_core::types::FormatDirective;
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller, LlmError};

use crate::markers::has_format_trigger;

/// Directives longer than this are noise, not formatting instructions.
const MAX_DIRECTIVE_CHARS: usize = 200;

/// Detect a format directive in the question.
///
/// The substring pre-gate skips the LLM on the majority of queries; when
/// it fires, the cheapest-tier model either echoes the directive verbatim
/// or answers `null`. The controller substitutes `None` on error.
pub async fn detect(caller: &LlmCaller, question: &str) -> Result<FormatDirective, LlmError> {
    if !has_format_trigger(question) {
        return Ok(None);
    }

    let system = "\
Does the user impose a specific output format (word budget, bullet list, \
table, tone, document type)? If yes, reply with the directive verbatim, \
e.g.: in 200 words. If no, reply exactly: null";

    let resp = caller
        .call(task::FORMAT_DETECTION, system, vec![ChatMessage::user(question)])
        .await?;

    Ok(parse_directive(&resp.content))
}

pub fn parse_directive(raw: &str) -> FormatDirective {
    let trimmed = raw.trim().trim_matches('"').trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("none")
    {
        return None;
    }
    let directive: String = trimmed.chars().take(MAX_DIRECTIVE_CHARS).collect();
    Some(directive)
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
            panic!("gated questions must not call the LLM");
        }
    }

    #[tokio::test]
    async fn ungated_question_skips_the_llm() {
        let caller = LlmCaller::single_provider(TaskRegistry::default(), Arc::new(NeverCalled));
        let directive = detect(&caller, "Why does the AC fail?").await.unwrap();
        assert!(directive.is_none());
    }

    #[test]
    fn null_and_empty_replies_mean_no_directive() {
        assert_eq!(parse_directive("null"), None);
        assert_eq!(parse_directive("  NULL \n"), None);
        assert_eq!(parse_directive(""), None);
    }

    #[test]
    fn directive_comes_back_verbatim() {
        assert_eq!(
            parse_directive("in 200 words"),
            Some("in 200 words".to_string())
        );
        assert_eq!(
            parse_directive("\"as a bulleted list\""),
            Some("as a bulleted list".to_string())
        );
    }
}
