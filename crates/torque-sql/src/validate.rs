//! Hardened SQL validator.
//!
//! Everything the generator produces is untrusted. The policy is strict
//! and non-LLM:
//!   1. Exactly one statement, and it must start with SELECT.
//!   2. No forbidden keywords anywhere, matched case-insensitively on word
//!      boundaries (so `created_at` does not trip `CREATE`).
//!   3. No SQL comments (`--`, `/*`) — the classic way to smuggle a second
//!      statement past a prefix check.
//!   4. At most one `;`, and only at the absolute end.
//! Row and wall-clock caps are enforced separately at execution.

use crate::error::SqlError;

/// `(keyword, reason)` pairs. First match wins.
const FORBIDDEN: &[(&str, &str)] = &[
    ("drop", "schema destruction"),
    ("delete", "row deletion"),
    ("update", "row mutation"),
    ("insert", "row insertion"),
    ("alter", "schema mutation"),
    ("create", "schema creation"),
    ("truncate", "table truncation"),
    ("grant", "privilege escalation"),
    ("revoke", "privilege mutation"),
    ("exec", "procedure execution"),
    ("attach", "attaches another database file"),
    ("pragma", "engine configuration access"),
];

/// Check one generated statement against the read-only policy.
pub fn validate_sql(sql: &str) -> Result<(), SqlError> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(SqlError::Invalid("empty statement".to_string()));
    }

    let lower = trimmed.to_lowercase();

    if !starts_with_select(&lower) {
        return Err(SqlError::Invalid(
            "only SELECT statements are allowed".to_string(),
        ));
    }

    if lower.contains("--") || lower.contains("/*") {
        return Err(SqlError::Invalid("SQL comments are not allowed".to_string()));
    }

    // Any `;` that is not the final character means a second statement.
    let semis = lower.matches(';').count();
    if semis > 1 || (semis == 1 && !lower.ends_with(';')) {
        return Err(SqlError::Invalid(
            "multi-statement input is not allowed".to_string(),
        ));
    }

    for (keyword, reason) in FORBIDDEN {
        if contains_word(&lower, keyword) {
            return Err(SqlError::Invalid(format!(
                "forbidden keyword `{}`: {}",
                keyword.to_uppercase(),
                reason
            )));
        }
    }

    Ok(())
}

fn starts_with_select(lower: &str) -> bool {
    match lower.strip_prefix("select") {
        // "selection" must not pass; require a boundary after the keyword
        Some(rest) => rest
            .chars()
            .next()
            .map(|c| !is_word_char(c))
            .unwrap_or(false),
        None => false,
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Substring match restricted to word boundaries.
fn contains_word(haystack: &str, word: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(word) {
        let start = from + pos;
        let end = start + word.len();

        let before_ok = start == 0
            || !haystack[..start]
                .chars()
                .next_back()
                .map(is_word_char)
                .unwrap_or(false);
        let after_ok = end == haystack.len()
            || !haystack[end..]
                .chars()
                .next()
                .map(is_word_char)
                .unwrap_or(false);

        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(sql: &str) {
        assert!(validate_sql(sql).is_ok(), "expected accept: {sql}");
    }

    fn rejected(sql: &str) -> String {
        match validate_sql(sql) {
            Err(SqlError::Invalid(reason)) => reason,
            other => panic!("expected rejection for `{sql}`, got {other:?}"),
        }
    }

    // --- accepted statements ---

    #[test]
    fn plain_select_passes() {
        ok("SELECT COUNT(*) FROM warranty_claims WHERE claim_type = 'tyre'");
    }

    #[test]
    fn select_with_single_trailing_semicolon_passes() {
        ok("SELECT vin FROM vehicles;");
    }

    #[test]
    fn select_with_joins_and_strftime_passes() {
        ok("SELECT d.name, COUNT(*) FROM warranty_claims w \
            JOIN dealerships d ON d.id = w.dealership_id \
            WHERE strftime('%m', w.claim_date) = '12' GROUP BY d.name");
    }

    #[test]
    fn column_containing_forbidden_substring_passes() {
        // `created_at` contains "create"; word boundary must save it
        ok("SELECT created_at FROM warranty_claims WHERE id = 1");
    }

    #[test]
    fn updated_at_column_passes() {
        ok("SELECT updated_at, deleted_flag FROM service_visits");
    }

    // --- rejected statements ---

    #[test]
    fn non_select_is_rejected() {
        let reason = rejected("DELETE FROM warranty_claims");
        assert!(reason.contains("SELECT"));
    }

    #[test]
    fn selection_prefix_does_not_count_as_select() {
        rejected("selection FROM x");
    }

    #[test]
    fn lowercase_drop_is_rejected() {
        let reason = rejected("SELECT 1; drop table vehicles");
        // multi-statement check fires first; either reason is a correct block
        assert!(reason.contains("multi-statement") || reason.contains("DROP"));
    }

    #[test]
    fn embedded_delete_keyword_is_rejected() {
        let reason = rejected("SELECT * FROM vehicles WHERE vin IN (DELETE FROM x)");
        assert!(reason.contains("DELETE"));
    }

    #[test]
    fn line_comment_is_rejected() {
        rejected("SELECT * FROM vehicles -- WHERE vin = 'x'");
    }

    #[test]
    fn block_comment_is_rejected() {
        rejected("SELECT /* sneaky */ * FROM vehicles");
    }

    #[test]
    fn two_semicolons_are_rejected() {
        rejected("SELECT 1;;");
    }

    #[test]
    fn interior_semicolon_is_rejected() {
        rejected("SELECT 1; SELECT 2");
    }

    #[test]
    fn bare_pragma_keyword_is_rejected() {
        let reason = rejected("SELECT x FROM t WHERE y = (PRAGMA schema_version)");
        assert!(reason.contains("PRAGMA"));
    }

    #[test]
    fn case_mixed_forbidden_keyword_is_rejected() {
        let reason = rejected("SELECT 1 UNION TrUnCaTe TABLE x");
        assert!(reason.contains("TRUNCATE"));
    }

    #[test]
    fn empty_input_is_rejected() {
        rejected("   ");
    }
}
