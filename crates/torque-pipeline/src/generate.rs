//! Final answer generation: prompt assembly + streaming.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use torque_core::types::Mode;
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller, LlmError, StreamEvent};

use crate::error::PipelineError;

/// What grounds the answer.
#[derive(Debug, Clone)]
pub enum Grounding {
    /// Retrieved corpus context; `empty` means the index had no matches.
    Retrieved { context_text: String, empty: bool },
    /// Pre-formatted result from the SQL path.
    Structured(String),
}

/// Everything the generator needs for one answer.
#[derive(Debug, Clone)]
pub struct AnswerInputs {
    pub question: String,
    pub grounding: Grounding,
    pub format_override: Option<String>,
    /// Last assistant turn, carried only for meta-operations.
    pub last_assistant: Option<String>,
    /// Thinking mode only: annotate claims with [block-id] citations.
    pub citations: bool,
    /// Set when reformulation failed and the original query was used.
    pub reformulation_fallback: bool,
}

pub fn build_system(mode: Mode, domain_label: &str, citations: bool) -> String {
    let mut system = format!(
        "You are a grounded assistant for {domain_label} data. Answer ONLY \
         from the provided context; when the context does not contain the \
         answer, say so plainly instead of guessing."
    );

    match mode {
        Mode::Thinking => {
            system.push_str(
                "\nGive a thorough, well-structured answer. Work through the \
                 evidence before concluding.",
            );
            if citations {
                system.push_str(
                    "\nAnnotate factual claims with the source block id in \
                     square brackets, e.g. [blk-12].",
                );
            }
        }
        Mode::Conversational | Mode::Structured => {
            system.push_str("\nBe concise and direct.");
        }
    }
    system
}

pub fn build_user(inputs: &AnswerInputs) -> String {
    let mut user = String::new();

    if let Some(directive) = &inputs.format_override {
        user.push_str(&format!(
            "FORMAT OVERRIDE: the user asked for \"{directive}\". Follow it \
             and ignore the default answer structure.\n\n"
        ));
    }

    match &inputs.grounding {
        Grounding::Retrieved { context_text, empty } => {
            if *empty {
                user.push_str(
                    "[context]\nThe corpus search returned no matching \
                     records for this query.\n\n",
                );
            } else {
                user.push_str(&format!("[context]\n{context_text}\n\n"));
            }
        }
        Grounding::Structured(result) => {
            user.push_str(&format!("[database result]\n{result}\n\n"));
        }
    }

    if let Some(prior) = &inputs.last_assistant {
        user.push_str(&format!("[your previous answer]\n{prior}\n\n"));
    }

    if inputs.reformulation_fallback {
        user.push_str(
            "[note] The question could not be rewritten into a standalone \
             form; it is given verbatim and may reference earlier turns.\n\n",
        );
    }

    user.push_str(&format!("[question]\n{}", inputs.question));
    user
}

/// Stream the final answer, forwarding tokens to the caller and returning
/// the accumulated text for the cache and history writes.
///
/// Cancellation stops forwarding immediately; tokens already emitted are
/// not rolled back and no text is returned (so nothing is cached).
pub async fn stream_answer(
    caller: &Arc<LlmCaller>,
    mode: Mode,
    inputs: &AnswerInputs,
    domain_label: &str,
    tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Result<String, PipelineError> {
    let task_name = match mode {
        Mode::Thinking => task::ANSWER_THINKING,
        _ => task::ANSWER_NON_THINKING,
    };
    let system = build_system(mode, domain_label, inputs.citations);
    let messages = vec![ChatMessage::user(build_user(inputs))];

    let (inner_tx, mut inner_rx) = mpsc::channel::<StreamEvent>(64);
    let caller = Arc::clone(caller);
    let handle = tokio::spawn(async move {
        caller.stream(task_name, &system, messages, inner_tx).await
    });

    let mut full = String::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                handle.abort();
                return Err(PipelineError::Cancelled);
            }
            event = inner_rx.recv() => match event {
                Some(StreamEvent::TextDelta { text }) => {
                    full.push_str(&text);
                    let _ = tx.send(StreamEvent::TextDelta { text }).await;
                }
                Some(done @ StreamEvent::Done { .. }) => {
                    let _ = tx.send(done).await;
                    break;
                }
                Some(StreamEvent::Error { message }) => {
                    return Err(PipelineError::Generation(LlmError::Provider(
                        torque_llm::ProviderError::Unavailable(message),
                    )));
                }
                None => break,
            }
        }
    }

    match handle.await {
        Ok(Ok(())) => Ok(full),
        Ok(Err(e)) => Err(PipelineError::Generation(e)),
        Err(e) => {
            warn!(error = %e, "generation task join failed");
            Err(PipelineError::Generation(LlmError::Provider(
                torque_llm::ProviderError::Unavailable(e.to_string()),
            )))
        }
    }
}

/// Small-talk generation: one short, friendly turn. No retrieval, no SQL.
pub async fn small_talk(
    caller: &LlmCaller,
    question: &str,
    domain_label: &str,
) -> Result<String, LlmError> {
    let system = format!(
        "You are a friendly assistant for {domain_label} questions. The user \
         is making small talk. Reply warmly in one or two sentences and \
         offer to help with {domain_label} data."
    );
    let resp = caller
        .call(task::SMALL_TALK, &system, vec![ChatMessage::user(question)])
        .await?;
    Ok(resp.content.trim().to_string())
}

/// Thinking mode: should the answer carry citation annotations?
/// Parallel-phase task; defaults to true on error.
pub async fn citation_check(caller: &LlmCaller, question: &str) -> Result<bool, LlmError> {
    let system = "\
Would citing source passages make this answer more trustworthy? Factual or \
analytical questions: yes. Pure reformatting or conversational asks: no. \
Reply with ONE WORD: yes or no.";
    let resp = caller
        .call(task::CITATION_CHECK, system, vec![ChatMessage::user(question)])
        .await?;
    Ok(!resp.content.to_lowercase().contains("no"))
}

/// Thinking mode: salient search keywords used to widen retrieval.
pub async fn extract_keywords(caller: &LlmCaller, question: &str) -> Result<Vec<String>, LlmError> {
    let system = "\
List the 3-6 most salient search keywords for this question. Reply with \
the keywords only, comma-separated, no numbering.";
    let resp = caller
        .call(
            task::KEYWORD_EXTRACTION,
            system,
            vec![ChatMessage::user(question)],
        )
        .await?;
    Ok(resp
        .content
        .split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && k.len() < 40)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> AnswerInputs {
        AnswerInputs {
            question: "Summarize the dealership issues".to_string(),
            grounding: Grounding::Retrieved {
                context_text: "Brakes wear early. AC fails in summer.".to_string(),
                empty: false,
            },
            format_override: None,
            last_assistant: None,
            citations: false,
            reformulation_fallback: false,
        }
    }

    #[test]
    fn format_override_leads_the_prompt() {
        let mut i = inputs();
        i.format_override = Some("in 200 words".to_string());
        let user = build_user(&i);
        assert!(user.starts_with("FORMAT OVERRIDE"));
        assert!(user.contains("in 200 words"));
        assert!(user.contains("ignore the default answer structure"));
    }

    #[test]
    fn empty_retrieval_is_stated_in_the_prompt() {
        let mut i = inputs();
        i.grounding = Grounding::Retrieved {
            context_text: String::new(),
            empty: true,
        };
        let user = build_user(&i);
        assert!(user.contains("no matching"));
    }

    #[test]
    fn meta_op_carries_the_prior_answer() {
        let mut i = inputs();
        i.last_assistant = Some("1. Brakes 2. AC".to_string());
        let user = build_user(&i);
        assert!(user.contains("[your previous answer]"));
        assert!(user.contains("1. Brakes 2. AC"));
    }

    #[test]
    fn citations_only_appear_in_thinking_mode() {
        let with = build_system(Mode::Thinking, "automotive dealership", true);
        assert!(with.contains("square brackets"));
        let without = build_system(Mode::Conversational, "automotive dealership", true);
        assert!(!without.contains("square brackets"));
    }

    #[test]
    fn reformulation_fallback_adds_a_warning() {
        let mut i = inputs();
        i.reformulation_fallback = true;
        assert!(build_user(&i).contains("could not be rewritten"));
    }
}
