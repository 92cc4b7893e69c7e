use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::error::Result;
use crate::types::SqlQueryType;

const SYSTEM: &str = "\
Extract the entities the question mentions, for a dealership database. \
Return ONLY a JSON object. Possible keys (omit absent ones): \
vin, dealership, model, variant, color, claim_type, status, city, \
date_from, date_to, month, year. \
Be tolerant of typos and abbreviations (\"tyres\" -> \"tyre\", \
\"trans\" -> \"transmission\"). Months are integers 1-12. \
Dates are ISO YYYY-MM-DD. If nothing is extractable, return {}.";

/// LLM entity extraction. The result feeds the SQL generator and becomes
/// part of the recorded plan.
pub async fn extract_entities(
    caller: &LlmCaller,
    question: &str,
    query_type: SqlQueryType,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let user = format!("Query type: {query_type:?}\nQuestion: {question}");
    let resp = caller
        .call(
            task::SQL_ENTITY_EXTRACTION,
            SYSTEM,
            vec![ChatMessage::user(user)],
        )
        .await?;

    Ok(parse_entity_json(&resp.content))
}

/// Pull the first JSON object out of the response, tolerating code fences
/// and surrounding prose. Unparseable output degrades to an empty map.
pub fn parse_entity_json(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    let trimmed = raw.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => trimmed,
    };

    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}
