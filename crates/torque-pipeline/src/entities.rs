//! Entity routing: detect first-class entities for entity-capable sources.

use torque_core::types::EntitySet;
use torque_llm::registry::task;
use torque_llm::{ChatMessage, LlmCaller, LlmError};

/// Extract first-class entities (person/customer names) from the query.
///
/// Runs in the parallel phase for entity-capable sources and is suppressed
/// for meta-operations. The controller substitutes an empty set on error.
pub async fn extract(
    caller: &LlmCaller,
    query: &str,
    source: &str,
) -> Result<EntitySet, LlmError> {
    let system = format!(
        "Extract the person or customer names the query explicitly mentions, \
         for looking up records in the `{source}` source. Return ONLY a JSON \
         array of name strings. No titles, no vehicle models, no places. \
         If there are none, return []."
    );

    let resp = caller
        .call(task::ENTITY_EXTRACTION, &system, vec![ChatMessage::user(query)])
        .await?;

    Ok(EntitySet::from_entities(parse_name_list(&resp.content)))
}

/// Pull a JSON string array out of the response, tolerating fences and
/// prose. Garbage degrades to no entities.
pub fn parse_name_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    let candidate = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(s), Some(e)) if e >= s => &trimmed[s..=e],
        _ => return Vec::new(),
    };

    match serde_json::from_str::<Vec<String>>(candidate) {
        Ok(names) => names
            .into_iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torque_core::types::EntityQueryType;

    #[test]
    fn parses_single_name() {
        let names = parse_name_list(r#"["Ali Raza"]"#);
        assert_eq!(names, vec!["Ali Raza"]);
        assert_eq!(
            EntitySet::from_entities(names).query_type,
            EntityQueryType::Single
        );
    }

    #[test]
    fn parses_fenced_multi_name_array() {
        let names = parse_name_list("```json\n[\"Ali\", \"Sara Khan\"]\n```");
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn prose_or_garbage_means_no_entities() {
        assert!(parse_name_list("No names found.").is_empty());
        assert!(parse_name_list(r#"{"name": "Ali"}"#).is_empty());
    }
}
