//! Domain classification: in-domain, out-of-domain, or small talk.

use tracing::warn;

use torque_core::config::CompanyConfig;
use torque_core::types::{ClassificationResult, DomainClass, Message, Role};
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::markers::has_anaphora;

/// Classify one utterance given up to the last two turns.
///
/// The follow-up rule runs first and without an LLM: if the previous
/// exchange happened at all and the current utterance points back at it,
/// the turn is in-domain no matter what its topical keywords say
/// ("summarize point 3 above" contains no car vocabulary).
///
/// Classifier outages fail open to in-domain: a degraded grounded answer
/// beats refusing a legitimate question.
pub async fn classify(
    caller: &LlmCaller,
    question: &str,
    history: &[Message],
    company: &CompanyConfig,
) -> ClassificationResult {
    if !history.is_empty() && has_anaphora(question) {
        return ClassificationResult::with_reason(DomainClass::InDomain, "follow-up rule");
    }

    let system = format!(
        "You decide whether a user question belongs to the assistant's domain: \
         {domain}. Enabled data sources: {sources}. \
         Reply with ONE WORD: in_domain, out_of_domain, or small_talk. \
         Greetings, thanks and chit-chat are small_talk. Questions about \
         unrelated topics (weather, sports, politics) are out_of_domain.",
        domain = company.domain_label,
        sources = company.sources.join(", "),
    );

    let mut user = String::new();
    for m in history.iter().rev().take(2).rev() {
        let tag = match m.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        user.push_str(&format!("[{tag}] {}\n", m.content));
    }
    user.push_str(&format!("[current question] {question}"));

    match caller
        .call(task::DOMAIN_CLASSIFICATION, &system, vec![ChatMessage::user(user)])
        .await
    {
        Ok(resp) => parse_label(&resp.content),
        Err(e) => {
            warn!(error = %e, "domain classifier failed, assuming in_domain");
            ClassificationResult::with_reason(DomainClass::InDomain, "classifier unavailable")
        }
    }
}

fn parse_label(raw: &str) -> ClassificationResult {
    let lower = raw.to_lowercase();
    let class = if lower.contains("out_of_domain") {
        DomainClass::OutOfDomain
    } else if lower.contains("small_talk") {
        DomainClass::SmallTalk
    } else {
        // unparseable output also lands here on purpose
        DomainClass::InDomain
    };
    ClassificationResult::new(class)
}
