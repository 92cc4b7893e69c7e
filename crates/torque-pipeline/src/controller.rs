//! Pipeline controller — the per-request state machine.
//!
//! `START → CACHE_CHECK → DOMAIN → {OOD | SMALL_TALK | PARALLEL_PREP} →
//! {DIRECT_ENTITY | COMPRESS → REFORMULATE → ENTITY_RECHECK? → RETRIEVE |
//! SQL_PIPELINE} → GENERATE → CACHE_STORE → HISTORY_APPEND → END`.
//!
//! Degradation rules: a dead session store means history-less mode and no
//! cache traffic; a dead cache means every lookup is a miss and nothing is
//! stored; parallel-phase failures become safe defaults. Only final
//! generation and SQL infrastructure errors fail the request.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use torque_cache::SemanticCache;
use torque_core::config::{CompanyConfig, RetrievalConfig, TorqueConfig};
use torque_core::types::{
    ContextAction, ContextDecision, DomainClass, EntitySet, IntentResult, Message, Mode, Role,
};
use torque_index::VectorIndex;
use torque_llm::parallel::{labeled, run_labeled};
use torque_llm::{EmbeddingProvider, LlmCaller, StreamEvent};
use torque_memory::SessionMemory;
use torque_sql::{SqlError, SqlPath};

use crate::error::{PipelineError, Result};
use crate::generate::{self, AnswerInputs, Grounding};
use crate::{compress, context, domain, entities, format, intent, retrieve, reformulate};

/// One request into the pipeline.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    /// `None` bypasses session memory and the semantic cache entirely.
    pub session_id: Option<String>,
    pub mode: Mode,
    pub source: String,
    pub company_id: String,
}

/// Which way the request resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CacheHit,
    OutOfDomain,
    SmallTalk,
    DirectEntity,
    Retrieval,
    Structured,
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub text: String,
    pub route: Route,
    pub correlation_id: String,
}

/// Typed controller states. Each transition logs exactly one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    CacheCheck,
    Domain,
    OodShortCircuit,
    SmallTalk,
    ParallelPrep,
    DirectEntity,
    Compress,
    Reformulate,
    EntityRecheck,
    Retrieve,
    SqlPipeline,
    Generate,
    CacheStore,
    HistoryAppend,
    End,
}

/// Result slot for one parallel-phase task.
enum Prep {
    Intent(IntentResult),
    Format(Option<String>),
    Entities(EntitySet),
    Citations(bool),
    Keywords(Vec<String>),
}

/// The request-processing engine. Process-wide singleton holding the
/// shared stores; all per-request state lives on the stack of `answer`.
pub struct Pipeline {
    caller: Arc<LlmCaller>,
    embedder: Arc<dyn EmbeddingProvider>,
    memory: Arc<dyn SessionMemory>,
    cache: Arc<SemanticCache>,
    index: Arc<dyn VectorIndex>,
    sql: Option<Arc<SqlPath>>,
    company: CompanyConfig,
    retrieval: RetrievalConfig,
    session_window: usize,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        caller: Arc<LlmCaller>,
        embedder: Arc<dyn EmbeddingProvider>,
        memory: Arc<dyn SessionMemory>,
        cache: Arc<SemanticCache>,
        index: Arc<dyn VectorIndex>,
        sql: Option<Arc<SqlPath>>,
        config: &TorqueConfig,
    ) -> Self {
        Self {
            caller,
            embedder,
            memory,
            cache,
            index,
            sql,
            company: config.company.clone(),
            retrieval: config.retrieval.clone(),
            session_window: config.memory.session_window,
        }
    }

    /// Answer one utterance. Tokens stream through `tx`; the returned
    /// outcome carries the full text and the route taken.
    pub async fn answer(
        &self,
        req: AnswerRequest,
        tx: mpsc::Sender<StreamEvent>,
        cancel: Option<CancellationToken>,
    ) -> Result<AnswerOutcome> {
        let cid = Uuid::now_v7().to_string();
        let cancel = cancel.unwrap_or_default();
        self.transition(&cid, State::Start);

        let mut cache_down = false;
        let mut memory_down = false;

        // CACHE_CHECK — before the user turn is appended, so a hit sees
        // the same history that produced the stored answer.
        if let Some(sid) = &req.session_id {
            self.transition(&cid, State::CacheCheck);
            match self.cache.lookup(sid, &req.question).await {
                Ok(Some(hit)) => {
                    emit_text(&tx, &hit.response).await;
                    self.transition(&cid, State::HistoryAppend);
                    self.append_turns(sid, &req.question, &hit.response, &mut memory_down)
                        .await;
                    self.transition(&cid, State::End);
                    return Ok(AnswerOutcome {
                        text: hit.response,
                        route: Route::CacheHit,
                        correlation_id: cid,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "cache lookup failed, treating as miss");
                    cache_down = true;
                }
            }
        }

        // History fetch (prior turns only; this turn is appended at the end).
        let history: Vec<Message> = match &req.session_id {
            Some(sid) => match self.memory.history(sid).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(error = %e, "session store unreachable, history-less mode");
                    memory_down = true;
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let last_assistant: Option<String> = history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.clone());

        // DOMAIN
        self.transition(&cid, State::Domain);
        let classification =
            domain::classify(&self.caller, &req.question, &history, &self.company).await;

        match classification.class {
            DomainClass::OutOfDomain => {
                self.transition(&cid, State::OodShortCircuit);
                let refusal = self.refusal();
                emit_text(&tx, &refusal).await;
                // refused turns still shape the conversation window; never cached
                self.finish_history(&cid, &req, &refusal, memory_down).await;
                self.transition(&cid, State::End);
                return Ok(AnswerOutcome {
                    text: refusal,
                    route: Route::OutOfDomain,
                    correlation_id: cid,
                });
            }
            DomainClass::SmallTalk => {
                self.transition(&cid, State::SmallTalk);
                let text = generate::small_talk(&self.caller, &req.question, &self.company.domain_label)
                    .await
                    .map_err(PipelineError::Generation)?;
                emit_text(&tx, &text).await;
                self.finish_history(&cid, &req, &text, memory_down).await;
                self.transition(&cid, State::End);
                return Ok(AnswerOutcome {
                    text,
                    route: Route::SmallTalk,
                    correlation_id: cid,
                });
            }
            DomainClass::InDomain => {}
        }

        // Structured mode hands the whole request to the SQL path.
        if req.mode == Mode::Structured {
            return self
                .run_structured(&cid, &req, &tx, cache_down, memory_down)
                .await;
        }

        // Context selection prefilter (non-empty history only).
        let decision: Option<ContextDecision> = if history.is_empty() {
            None
        } else {
            Some(
                context::select(&self.caller, &req.question, &history, self.session_window).await,
            )
        };
        let meta_op = decision
            .map(|d| d.action == ContextAction::MetaOp)
            .unwrap_or(false);
        let entity_capable = self.company.entity_sources.contains(&req.source)
            && self.index.supports_entity_lookup(&req.source);

        // PARALLEL_PREP
        self.transition(&cid, State::ParallelPrep);
        let prep = self
            .run_parallel_prep(&req, last_assistant.as_deref(), meta_op, entity_capable)
            .await;

        let decision_standalone = decision.map(|d| d.is_standalone()).unwrap_or(true);
        let standalone = decision_standalone || prep.intent == IntentResult::Standalone;

        // DIRECT_ENTITY — one entity, entity-capable source, not a meta-op.
        if let Some(entity) = prep.entities.single() {
            if entity_capable && !meta_op {
                return self
                    .run_direct_entity(
                        &cid, &req, entity, &prep, &tx, &cancel, cache_down, memory_down,
                    )
                    .await;
            }
        }

        // COMPRESS → REFORMULATE (skipped for standalone turns).
        let mut reformulation_fallback = false;
        let working_query = if standalone {
            req.question.clone()
        } else {
            self.transition(&cid, State::Compress);
            let compressed_context = self
                .build_compressed_context(&req.question, &history, decision)
                .await;

            self.transition(&cid, State::Reformulate);
            match reformulate::reformulate(
                &self.caller,
                &req.question,
                &compressed_context,
                &req.source,
            )
            .await
            {
                Ok(q) => q,
                Err(e) => {
                    warn!(error = %e, "reformulation failed, using original query");
                    reformulation_fallback = true;
                    req.question.clone()
                }
            }
        };

        // ENTITY_RECHECK on the reformulated query — suppressed for meta-ops.
        if !meta_op && entity_capable && working_query != req.question {
            self.transition(&cid, State::EntityRecheck);
            if let Ok(set) = entities::extract(&self.caller, &working_query, &req.source).await {
                if let Some(entity) = set.single() {
                    return self
                        .run_direct_entity(
                            &cid, &req, entity, &prep, &tx, &cancel, cache_down, memory_down,
                        )
                        .await;
                }
            }
        }

        // RETRIEVE
        self.transition(&cid, State::Retrieve);
        let search_query = if prep.keywords.is_empty() {
            working_query.clone()
        } else {
            format!("{} {}", working_query, prep.keywords.join(" "))
        };
        let retrieval = retrieve::run(
            self.embedder.as_ref(),
            self.index.as_ref(),
            &search_query,
            &req.company_id,
            &req.source,
            &self.retrieval,
        )
        .await;

        // GENERATE
        self.transition(&cid, State::Generate);
        let inputs = AnswerInputs {
            question: working_query,
            grounding: Grounding::Retrieved {
                empty: retrieval.empty,
                context_text: retrieval.context_text,
            },
            format_override: prep.format.clone(),
            last_assistant: if meta_op { last_assistant } else { None },
            citations: req.mode == Mode::Thinking && prep.citations,
            reformulation_fallback,
        };
        let text = generate::stream_answer(
            &self.caller,
            req.mode,
            &inputs,
            &self.company.domain_label,
            &tx,
            &cancel,
        )
        .await?;

        self.finish_cached(&cid, &req, &text, cache_down, memory_down)
            .await;
        Ok(AnswerOutcome {
            text,
            route: Route::Retrieval,
            correlation_id: cid,
        })
    }

    // -------------------------------------------------------------------------
    // Sub-flows
    // -------------------------------------------------------------------------

    /// Parallel fan-out: intent + format always; entity extraction for
    /// entity-capable non-meta turns; citation check and keywords in
    /// thinking mode. Every failure collapses to that task's safe default.
    async fn run_parallel_prep(
        &self,
        req: &AnswerRequest,
        last_assistant: Option<&str>,
        meta_op: bool,
        entity_capable: bool,
    ) -> PrepOutcome {
        let mut tasks = Vec::new();

        {
            let caller = Arc::clone(&self.caller);
            let q = req.question.clone();
            let prior = last_assistant.map(String::from);
            tasks.push(labeled("intent", async move {
                intent::classify(&caller, &q, prior.as_deref())
                    .await
                    .map(Prep::Intent)
            }));
        }
        {
            let caller = Arc::clone(&self.caller);
            let q = req.question.clone();
            tasks.push(labeled("format", async move {
                format::detect(&caller, &q).await.map(Prep::Format)
            }));
        }
        if entity_capable && !meta_op {
            let caller = Arc::clone(&self.caller);
            let q = req.question.clone();
            let source = req.source.clone();
            tasks.push(labeled("entities", async move {
                entities::extract(&caller, &q, &source).await.map(Prep::Entities)
            }));
        }
        if req.mode == Mode::Thinking {
            let caller = Arc::clone(&self.caller);
            let q = req.question.clone();
            tasks.push(labeled("citations", async move {
                generate::citation_check(&caller, &q).await.map(Prep::Citations)
            }));
            let caller = Arc::clone(&self.caller);
            let q = req.question.clone();
            tasks.push(labeled("keywords", async move {
                generate::extract_keywords(&caller, &q)
                    .await
                    .map(Prep::Keywords)
            }));
        }

        let results = run_labeled(tasks).await;
        let mut outcome = PrepOutcome::defaults();

        for (label, result) in results {
            match result {
                Ok(Prep::Intent(v)) => outcome.intent = v,
                Ok(Prep::Format(v)) => outcome.format = v,
                Ok(Prep::Entities(v)) => outcome.entities = v,
                Ok(Prep::Citations(v)) => outcome.citations = v,
                Ok(Prep::Keywords(v)) => outcome.keywords = v,
                Err(e) => {
                    warn!(task = %label, error = %e, "parallel task failed, using default")
                }
            }
        }
        outcome
    }

    /// Render the turns the context decision selected, with the latest
    /// assistant answer compressed down to the referenced slice.
    async fn build_compressed_context(
        &self,
        question: &str,
        history: &[Message],
        decision: Option<ContextDecision>,
    ) -> String {
        let take = decision
            .map(|d| d.messages_to_include)
            .unwrap_or(2)
            .min(history.len());
        if take == 0 {
            return String::new();
        }

        let selected = &history[history.len() - take..];
        let last_assistant_idx = selected
            .iter()
            .rposition(|m| m.role == Role::Assistant);

        let mut out = String::new();
        for (i, m) in selected.iter().enumerate() {
            let content = if Some(i) == last_assistant_idx {
                compress::compress(&self.caller, &m.content, question).await
            } else {
                m.content.clone()
            };
            let tag = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push_str(&format!("[{tag}] {content}\n"));
        }
        out
    }

    /// Short-circuit: fetch one entity's records and generate directly,
    /// skipping retrieval and SQL. Costs exactly one generation call.
    #[allow(clippy::too_many_arguments)]
    async fn run_direct_entity(
        &self,
        cid: &str,
        req: &AnswerRequest,
        entity: &str,
        prep: &PrepOutcome,
        tx: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
        cache_down: bool,
        memory_down: bool,
    ) -> Result<AnswerOutcome> {
        self.transition(cid, State::DirectEntity);
        info!(entity, "direct entity lookup");

        let blocks = match self
            .index
            .lookup_entity(
                &req.company_id,
                &req.source,
                entity,
                self.retrieval.top_k_rerank,
            )
            .await
        {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!(error = %e, "entity lookup failed, treating as no records");
                Vec::new()
            }
        };
        let built = retrieve::build_context(&blocks, self.retrieval.max_context_chars);

        self.transition(cid, State::Generate);
        let inputs = AnswerInputs {
            question: req.question.clone(),
            grounding: Grounding::Retrieved {
                empty: built.empty,
                context_text: built.context_text,
            },
            format_override: prep.format.clone(),
            last_assistant: None,
            citations: req.mode == Mode::Thinking && prep.citations,
            reformulation_fallback: false,
        };
        let text = generate::stream_answer(
            &self.caller,
            req.mode,
            &inputs,
            &self.company.domain_label,
            tx,
            cancel,
        )
        .await?;

        self.finish_cached(cid, req, &text, cache_down, memory_down)
            .await;
        Ok(AnswerOutcome {
            text,
            route: Route::DirectEntity,
            correlation_id: cid.to_string(),
        })
    }

    /// Structured mode: the SQL path replaces compress/reformulate/retrieve.
    /// Validator and capacity rejections become polite answers, never cached.
    async fn run_structured(
        &self,
        cid: &str,
        req: &AnswerRequest,
        tx: &mpsc::Sender<StreamEvent>,
        cache_down: bool,
        memory_down: bool,
    ) -> Result<AnswerOutcome> {
        self.transition(cid, State::SqlPipeline);

        let Some(sql) = &self.sql else {
            let text = "Structured data queries are not enabled for this deployment.".to_string();
            emit_text(tx, &text).await;
            self.finish_history(cid, req, &text, memory_down).await;
            self.transition(cid, State::End);
            return Ok(AnswerOutcome {
                text,
                route: Route::Structured,
                correlation_id: cid.to_string(),
            });
        };

        match sql.run(&req.question).await {
            Ok(answer) => {
                emit_text(tx, &answer.text).await;
                self.finish_cached(cid, req, &answer.text, cache_down, memory_down)
                    .await;
                Ok(AnswerOutcome {
                    text: answer.text,
                    route: Route::Structured,
                    correlation_id: cid.to_string(),
                })
            }
            Err(SqlError::Invalid(reason)) => {
                info!(reason = %reason, "sql plan rejected by validator");
                let text = "I couldn't turn that into a safe database query. Could you \
                            rephrase it — for example, name the claim type, dealership, \
                            or date range you're interested in?"
                    .to_string();
                emit_text(tx, &text).await;
                self.finish_history(cid, req, &text, memory_down).await;
                self.transition(cid, State::End);
                Ok(AnswerOutcome {
                    text,
                    route: Route::Structured,
                    correlation_id: cid.to_string(),
                })
            }
            Err(SqlError::Capacity(reason)) => {
                info!(reason = %reason, "sql execution hit a capacity cap");
                let text = "That query matches too much data to answer in one go. Could \
                            you narrow it down — a shorter date range or a specific \
                            dealership would help."
                    .to_string();
                emit_text(tx, &text).await;
                self.finish_history(cid, req, &text, memory_down).await;
                self.transition(cid, State::End);
                Ok(AnswerOutcome {
                    text,
                    route: Route::Structured,
                    correlation_id: cid.to_string(),
                })
            }
            Err(e) => Err(PipelineError::Sql(e)),
        }
    }

    // -------------------------------------------------------------------------
    // Terminal bookkeeping
    // -------------------------------------------------------------------------

    /// CACHE_STORE then HISTORY_APPEND for successfully generated answers.
    async fn finish_cached(
        &self,
        cid: &str,
        req: &AnswerRequest,
        text: &str,
        cache_down: bool,
        memory_down: bool,
    ) {
        if let Some(sid) = &req.session_id {
            // a dead session store also disables caching for the request
            if !cache_down && !memory_down {
                self.transition(cid, State::CacheStore);
                if let Err(e) = self.cache.store(sid, &req.question, text).await {
                    warn!(error = %e, "cache store failed");
                }
            }
        }
        self.finish_history(cid, req, text, memory_down).await;
        self.transition(cid, State::End);
    }

    /// HISTORY_APPEND without a cache write (refusals, rejections, hits).
    async fn finish_history(&self, cid: &str, req: &AnswerRequest, text: &str, memory_down: bool) {
        if let Some(sid) = &req.session_id {
            if !memory_down {
                self.transition(cid, State::HistoryAppend);
                let mut down = memory_down;
                self.append_turns(sid, &req.question, text, &mut down).await;
            }
        }
    }

    async fn append_turns(&self, sid: &str, question: &str, answer: &str, memory_down: &mut bool) {
        if let Err(e) = self.memory.append(sid, Role::User, question).await {
            warn!(error = %e, "user turn append failed");
            *memory_down = true;
            return;
        }
        if let Err(e) = self.memory.append(sid, Role::Assistant, answer).await {
            warn!(error = %e, "assistant turn append failed");
            *memory_down = true;
        }
    }

    fn refusal(&self) -> String {
        format!(
            "I can only help with questions about {} data — things like \
             vehicle issues, warranty claims, service records, and customer \
             conversations. That one is outside what I can answer.",
            self.company.domain_label
        )
    }

    fn transition(&self, cid: &str, state: State) {
        info!(correlation = cid, state = ?state, "pipeline: transition");
    }
}

/// Parallel-phase results after defaulting. The defaults are the safe
/// direction for each task: treat the turn as standalone, impose no
/// format, route no entities, keep citations on.
struct PrepOutcome {
    intent: IntentResult,
    format: Option<String>,
    entities: EntitySet,
    citations: bool,
    keywords: Vec<String>,
}

impl PrepOutcome {
    fn defaults() -> Self {
        Self {
            intent: IntentResult::Standalone,
            format: None,
            entities: EntitySet::empty(),
            citations: true,
            keywords: Vec::new(),
        }
    }
}

/// Emit a complete, non-streamed text (cached replies, refusals, SQL
/// answers) as a single delta followed by Done.
async fn emit_text(tx: &mpsc::Sender<StreamEvent>, text: &str) {
    let _ = tx
        .send(StreamEvent::TextDelta {
            text: text.to_string(),
        })
        .await;
    let _ = tx
        .send(StreamEvent::Done {
            model: String::new(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: "end_turn".to_string(),
        })
        .await;
}
