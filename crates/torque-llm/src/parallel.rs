//! Labeled concurrent fan-out.
//!
//! The pipeline's parallel phase runs several independent LLM tasks at
//! once. Each task is labeled; failures are captured under their label and
//! never cancel siblings, so the caller can substitute a safe default per
//! task. Result order is by label, not completion.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use tokio::task::JoinSet;
use tracing::warn;

use crate::error::LlmError;
use crate::provider::ProviderError;

pub type LabeledTask<T> = (
    String,
    Pin<Box<dyn Future<Output = Result<T, LlmError>> + Send>>,
);

/// Box a future for `run_labeled`.
pub fn labeled<T, F>(name: &str, fut: F) -> LabeledTask<T>
where
    F: Future<Output = Result<T, LlmError>> + Send + 'static,
{
    (name.to_string(), Box::pin(fut))
}

/// Run all tasks concurrently; wall time is the max of the task times.
///
/// A panicking task is recorded as an error under its label; it does not
/// take the sibling tasks down with it.
pub async fn run_labeled<T: Send + 'static>(
    tasks: Vec<LabeledTask<T>>,
) -> BTreeMap<String, Result<T, LlmError>> {
    let mut set = JoinSet::new();
    for (name, fut) in tasks {
        set.spawn(async move { (name, fut.await) });
    }

    let mut results = BTreeMap::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((name, result)) => {
                results.insert(name, result);
            }
            Err(e) => {
                // The task's label is lost when it panics; the caller sees the
                // missing label and applies its default for that slot.
                warn!(error = %e, "parallel task panicked");
            }
        }
    }
    results
}
