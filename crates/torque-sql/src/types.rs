use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlQueryType {
    /// Counts, sums, averages over a table.
    Aggregation,
    /// Row selection by attribute filters.
    Filtering,
    /// Side-by-side comparison of two or more entities.
    Comparison,
    /// Full history for one identifier (VIN); uses the fixed multi-table
    /// aggregation, never generated SQL.
    History,
    /// Open-ended; the model picks the tables.
    Semantic,
}

impl SqlQueryType {
    /// Parse a classifier label. Tolerant of surrounding prose.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.to_uppercase();
        // order matters only for sanity; labels never overlap
        for (label, qt) in [
            ("AGGREGATION", SqlQueryType::Aggregation),
            ("FILTERING", SqlQueryType::Filtering),
            ("COMPARISON", SqlQueryType::Comparison),
            ("HISTORY", SqlQueryType::History),
            ("SEMANTIC", SqlQueryType::Semantic),
        ] {
            if upper.contains(label) {
                return Some(qt);
            }
        }
        None
    }
}

/// The plan produced for one structured-mode request.
#[derive(Debug, Clone)]
pub struct SqlPlan {
    pub query_type: SqlQueryType,
    pub entities: serde_json::Map<String, serde_json::Value>,
    pub generated_sql: String,
    /// True only after the validator accepted `generated_sql`.
    pub validation_ok: bool,
}

/// Final output of the SQL path.
#[derive(Debug, Clone)]
pub struct SqlAnswer {
    pub text: String,
    pub plan: SqlPlan,
    pub row_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tolerates_surrounding_prose() {
        assert_eq!(
            SqlQueryType::parse("The query type is: AGGREGATION."),
            Some(SqlQueryType::Aggregation)
        );
        assert_eq!(SqlQueryType::parse("history"), Some(SqlQueryType::History));
        assert_eq!(SqlQueryType::parse("no label here"), None);
    }
}
