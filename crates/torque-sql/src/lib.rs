//! Text-to-SQL path for structured-mode requests.
//!
//! classify → extract entities → generate SQL → validate → execute
//! read-only → format rows into prose. Generated SQL is always untrusted:
//! nothing reaches the database without passing the validator, and
//! execution is capped on both rows and wall time.

pub mod classify;
pub mod entities;
pub mod error;
pub mod execute;
pub mod format;
pub mod generate;
pub mod schema;
pub mod types;
pub mod validate;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use torque_llm::LlmCaller;

use crate::error::Result;

pub use crate::error::SqlError;
pub use crate::execute::SqlExecutor;
pub use crate::types::{SqlAnswer, SqlPlan, SqlQueryType};

pub struct SqlPath {
    caller: Arc<LlmCaller>,
    executor: SqlExecutor,
    row_cap: usize,
    time_cap: Duration,
}

impl SqlPath {
    pub fn new(
        caller: Arc<LlmCaller>,
        executor: SqlExecutor,
        row_cap: usize,
        time_cap: Duration,
    ) -> Self {
        Self {
            caller,
            executor,
            row_cap,
            time_cap,
        }
    }

    /// Run the full structured-data pipeline for one question.
    pub async fn run(&self, question: &str) -> Result<SqlAnswer> {
        let query_type = classify::classify_query(&self.caller, question).await?;
        let entities = entities::extract_entities(&self.caller, question, query_type).await?;
        let sql = generate::generate_sql(&self.caller, question, query_type, &entities).await?;

        validate::validate_sql(&sql)?;
        let plan = SqlPlan {
            query_type,
            entities,
            generated_sql: sql.clone(),
            validation_ok: true,
        };

        info!(
            query_type = ?plan.query_type,
            sql = %plan.generated_sql,
            "sql plan validated"
        );

        let rows = self.executor.execute(&sql, self.row_cap, self.time_cap)?;
        let row_count = rows.len();
        let text = format::format_rows(&self.caller, question, &rows).await?;

        Ok(SqlAnswer {
            text,
            plan,
            row_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use torque_llm::{
        ChatRequest, ChatResponse, LlmProvider, ProviderError, TaskRegistry,
    };

    /// Scripted provider: answers by matching markers in the system prompt,
    /// so each SQL sub-stage gets its own canned reply.
    struct Scripted;

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            let content = if req.system.contains("classify the question") {
                "AGGREGATION".to_string()
            } else if req.system.contains("Extract the entities") {
                r#"{"claim_type": "tyre", "month": 12}"#.to_string()
            } else if req.system.contains("Write a single SQLite SELECT") {
                "SELECT COUNT(*) FROM warranty_claims WHERE claim_type = 'tyre' \
                 AND strftime('%m', claim_date) = '12'"
                    .to_string()
            } else {
                "There were 3 tyre complaints in December.".to_string()
            };
            Ok(ChatResponse {
                content,
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    /// Generator that emits a destructive statement — must never execute.
    struct Hostile;

    #[async_trait]
    impl LlmProvider for Hostile {
        fn name(&self) -> &str {
            "hostile"
        }
        async fn send(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            let content = if req.system.contains("classify the question") {
                "FILTERING".to_string()
            } else if req.system.contains("Extract the entities") {
                "{}".to_string()
            } else {
                "DELETE FROM warranty_claims".to_string()
            };
            Ok(ChatResponse {
                content,
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
            })
        }
    }

    fn seeded_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::TEST_DDL).unwrap();
        conn.execute_batch(
            "INSERT INTO warranty_claims (vin, claim_type, description, status, claim_date)
             VALUES ('VIN1', 'tyre', 'worn', 'open', '2025-12-01'),
                    ('VIN2', 'tyre', 'flat', 'closed', '2025-12-12'),
                    ('VIN3', 'tyre', 'bald', 'open', '2025-12-20'),
                    ('VIN4', 'brake', 'squeal', 'open', '2025-11-02');",
        )
        .unwrap();
        conn
    }

    fn path(provider: Arc<dyn LlmProvider>) -> SqlPath {
        let caller = Arc::new(torque_llm::LlmCaller::single_provider(
            TaskRegistry::default(),
            provider,
        ));
        SqlPath::new(
            caller,
            SqlExecutor::from_connection(seeded_conn()),
            1000,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn aggregation_question_runs_end_to_end() {
        let p = path(Arc::new(Scripted));
        let answer = p.run("How many tyre complaints in December?").await.unwrap();
        assert_eq!(answer.plan.query_type, SqlQueryType::Aggregation);
        assert!(answer.plan.validation_ok);
        assert!(answer.plan.generated_sql.starts_with("SELECT COUNT(*)"));
        assert_eq!(answer.row_count, 1);
        assert!(answer.text.contains("tyre"));
    }

    #[tokio::test]
    async fn destructive_generation_is_rejected_before_execution() {
        let p = path(Arc::new(Hostile));
        let err = p.run("Delete all warranty claims").await.unwrap_err();
        let reason = match err {
            SqlError::Invalid(reason) => reason,
            other => panic!("expected Invalid, got {other:?}"),
        };
        assert!(reason.contains("SELECT"));
    }

    #[tokio::test]
    async fn stage_prompts_stay_distinguishable() {
        // the scripted provider keys off distinct system markers; make sure
        // they stay distinct if prompts are edited
        let caller = Arc::new(torque_llm::LlmCaller::single_provider(
            TaskRegistry::default(),
            Arc::new(Scripted),
        ));
        let qt = classify::classify_query(&caller, "How many?").await.unwrap();
        assert_eq!(qt, SqlQueryType::Aggregation);
        let ents = entities::extract_entities(&caller, "How many?", qt)
            .await
            .unwrap();
        assert_eq!(ents.get("claim_type").and_then(|v| v.as_str()), Some("tyre"));
    }
}
