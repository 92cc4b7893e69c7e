use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::error::Result;
use crate::types::SqlQueryType;

const SYSTEM: &str = "\
You classify the question into exactly one query type for a dealership \
database. Reply with ONE WORD from: AGGREGATION, FILTERING, COMPARISON, \
HISTORY, SEMANTIC.

AGGREGATION — counts, sums, averages (\"how many\", \"total\").
FILTERING — list rows matching attributes (\"show open claims for brakes\").
COMPARISON — compare two or more named entities side by side.
HISTORY — the full record trail for one vehicle identifier (VIN).
SEMANTIC — anything open-ended that doesn't fit above.";

/// One-word LLM classification of the question. Unparseable output falls
/// back to SEMANTIC, the most general plan.
pub async fn classify_query(caller: &LlmCaller, question: &str) -> Result<SqlQueryType> {
    let resp = caller
        .call(
            task::SQL_CLASSIFICATION,
            SYSTEM,
            vec![ChatMessage::user(question)],
        )
        .await?;

    Ok(SqlQueryType::parse(&resp.content).unwrap_or(SqlQueryType::Semantic))
}
