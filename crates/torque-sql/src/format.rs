use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::error::Result;
use crate::execute::Row;

const SYSTEM: &str = "\
You turn SQL query results into a direct natural-language answer for a \
dealership analyst. State the numbers plainly, mention units (claims, \
vehicles, visits) and keep it to a few sentences. If the result set is \
empty, say that no matching records were found.";

/// How many rows the formatter prompt may carry. Anything past this is
/// summarized as a count; the row cap upstream already bounds the total.
const PROMPT_ROW_LIMIT: usize = 50;

/// Turn result rows into prose via the formatting task.
pub async fn format_rows(caller: &LlmCaller, question: &str, rows: &[Row]) -> Result<String> {
    let shown = &rows[..rows.len().min(PROMPT_ROW_LIMIT)];
    let rows_json = serde_json::to_string(shown).unwrap_or_else(|_| "[]".to_string());

    let user = if rows.len() > PROMPT_ROW_LIMIT {
        format!(
            "Question: {question}\nTotal rows: {} (first {PROMPT_ROW_LIMIT} shown)\nRows: {rows_json}",
            rows.len()
        )
    } else {
        format!("Question: {question}\nRows: {rows_json}")
    };

    let resp = caller
        .call(task::RESULT_FORMATTING, SYSTEM, vec![ChatMessage::user(user)])
        .await?;

    Ok(resp.content.trim().to_string())
}
