use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller};

use crate::error::Result;
use crate::schema::SCHEMA_DESCRIPTION;
use crate::types::SqlQueryType;

const SYSTEM_PREFIX: &str = "\
Write a single SQLite SELECT statement answering the question. \
Output ONLY the SQL — no prose, no code fences, no comments. \
Never write anything except a SELECT. One statement only.";

/// Produce the SQL for the plan. `History` bypasses generation entirely:
/// arbitrary generated SQL over four tables keyed by one VIN is exactly
/// where models hallucinate joins, so that shape is fixed in code.
pub async fn generate_sql(
    caller: &LlmCaller,
    question: &str,
    query_type: SqlQueryType,
    entities: &serde_json::Map<String, serde_json::Value>,
) -> Result<String> {
    if query_type == SqlQueryType::History {
        if let Some(vin) = entities.get("vin").and_then(|v| v.as_str()) {
            return Ok(history_sql(vin));
        }
        // no VIN extracted; fall through to generation, the validator
        // still gates whatever comes back
    }

    let system = format!("{SYSTEM_PREFIX}\n\n{SCHEMA_DESCRIPTION}");
    let user = format!(
        "Query type: {query_type:?}\nEntities: {}\nQuestion: {question}",
        serde_json::Value::Object(entities.clone())
    );

    let resp = caller
        .call(task::SQL_GENERATION, &system, vec![ChatMessage::user(user)])
        .await?;

    Ok(strip_code_fences(&resp.content))
}

/// Fixed multi-table history aggregation for one vehicle.
///
/// The VIN is reduced to its safe character set before splicing; VINs are
/// alphanumeric by construction and anything else is an injection attempt.
pub fn history_sql(vin: &str) -> String {
    let clean: String = vin.chars().filter(char::is_ascii_alphanumeric).collect();

    format!(
        "SELECT v.vin, v.model, v.variant, v.year, \
                w.claim_type, w.status, w.claim_date, \
                s.visit_date, s.odometer_km, s.work_done \
         FROM vehicles v \
         LEFT JOIN warranty_claims w ON w.vin = v.vin \
         LEFT JOIN service_visits s ON s.vin = v.vin \
         WHERE v.vin = '{clean}' \
         ORDER BY w.claim_date, s.visit_date"
    )
}

/// Models wrap SQL in markdown fences despite instructions; strip them.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let without_close = without_open.strip_suffix("```").unwrap_or(without_open);
    without_close.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_sql;

    #[test]
    fn history_sql_passes_the_validator() {
        let sql = history_sql("MA3ETLF1S00112233");
        assert!(sql.starts_with("SELECT"));
        assert!(validate_sql(&sql).is_ok());
    }

    #[test]
    fn history_sql_strips_injection_characters() {
        let sql = history_sql("X'; DROP TABLE vehicles; --");
        assert!(!sql.contains(';'));
        assert!(!sql.contains("--"));
        assert!(sql.contains("v.vin = 'XDROPTABLEvehicles'"));
        assert!(validate_sql(&sql).is_ok());
    }

    #[test]
    fn strips_sql_code_fences() {
        assert_eq!(
            strip_code_fences("```sql\nSELECT 1\n```"),
            "SELECT 1".to_string()
        );
        assert_eq!(strip_code_fences("SELECT 2"), "SELECT 2");
    }
}
