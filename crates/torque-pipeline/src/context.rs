//! Context selection: how much prior history does this turn need?

use tracing::warn;

use torque_core::types::{ContextAction, ContextDecision, Message};
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::markers::{has_anaphora, has_meta_verb};

/// Decide which prior turns to carry forward. Only called with non-empty
/// history.
///
/// A meta-operation ("summarize that") is decided heuristically — the verb
/// plus a backward reference is unambiguous and not worth an LLM call.
/// Everything else goes to the selector task, with `Continuation` over the
/// last two turns as the degraded default.
pub async fn select(
    caller: &LlmCaller,
    question: &str,
    history: &[Message],
    window: usize,
) -> ContextDecision {
    if has_meta_verb(question) && has_anaphora(question) {
        return ContextDecision::meta_op();
    }

    let system = "\
You decide how much conversation history the current question needs. \
Reply with LABEL N where LABEL is one of TOPIC_SWITCH, DATA_REQUEST, \
META_OP, CONTINUATION and N is how many trailing history messages matter.

TOPIC_SWITCH — unrelated to the history; N is 0.
META_OP — operates on the last assistant answer (summarize/translate/\
reformat); N is 1.
DATA_REQUEST — asks for new data but leans on context (\"what about white \
ones?\"); N is 2 or more.
CONTINUATION — continues the current thread; N is 2 or more.";

    let mut user = String::new();
    for m in history {
        user.push_str(&format!("[{:?}] {}\n", m.role, m.content));
    }
    user.push_str(&format!("[current question] {question}"));

    let fallback = ContextDecision {
        action: ContextAction::Continuation,
        messages_to_include: history.len().min(2),
    };

    match caller
        .call(task::CONTEXT_SELECTION, system, vec![ChatMessage::user(user)])
        .await
    {
        Ok(resp) => parse_decision(&resp.content, history.len().min(window)).unwrap_or(fallback),
        Err(e) => {
            warn!(error = %e, "context selector failed, defaulting to continuation");
            fallback
        }
    }
}

/// Parse "LABEL N". The count is clamped to [0, cap] and forced to the
/// label's fixed value where the contract defines one.
fn parse_decision(raw: &str, cap: usize) -> Option<ContextDecision> {
    let upper = raw.to_uppercase();

    let action = if upper.contains("TOPIC_SWITCH") {
        ContextAction::TopicSwitch
    } else if upper.contains("META_OP") {
        ContextAction::MetaOp
    } else if upper.contains("DATA_REQUEST") {
        ContextAction::DataRequest
    } else if upper.contains("CONTINUATION") {
        ContextAction::Continuation
    } else {
        return None;
    };

    let parsed_n: Option<usize> = upper
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse().ok());

    let messages_to_include = match action {
        ContextAction::TopicSwitch => 0,
        ContextAction::MetaOp => 1.min(cap),
        _ => parsed_n.unwrap_or(2).clamp(0, cap).max(1.min(cap)),
    };

    Some(ContextDecision {
        action,
        messages_to_include,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_switch_forces_zero_messages() {
        let d = parse_decision("TOPIC_SWITCH 3", 4).unwrap();
        assert_eq!(d.action, ContextAction::TopicSwitch);
        assert_eq!(d.messages_to_include, 0);
        assert!(d.is_standalone());
    }

    #[test]
    fn meta_op_forces_one_message() {
        let d = parse_decision("META_OP 4", 4).unwrap();
        assert_eq!(d.action, ContextAction::MetaOp);
        assert_eq!(d.messages_to_include, 1);
    }

    #[test]
    fn count_is_clamped_to_the_window() {
        let d = parse_decision("CONTINUATION 9", 4).unwrap();
        assert_eq!(d.messages_to_include, 4);
    }

    #[test]
    fn unparseable_label_is_none() {
        assert!(parse_decision("no idea", 4).is_none());
    }
}
