//! Session orchestration.
//!
//! One `AnalystSession` per user interaction stream. The session wires the
//! pipeline (resolve mode, generate from model or template, strip fences,
//! validate, execute) and owns the per-session policies: the bounded
//! result cache, last-question-wins cancellation, and downgrade-not-abort
//! on collaborator failure.

use std::collections::{HashMap, VecDeque};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::SchemaCatalog;
use crate::config::Limits;
use crate::error::{AnalystError, Result};
use crate::examples::ExampleStore;
use crate::exec::{DemoDataProvider, ExecutionResult, QueryExecutor};
use crate::llm::{extract_sql, LlmClient, PromptBuilder};
use crate::mode::ModeController;
use crate::rules::BusinessRuleSet;
use crate::safety::{GeneratedQuery, SqlSafetyValidator};
use crate::templates::TemplateLibrary;

/// Cached results kept per session.
const CACHE_CAPACITY: usize = 32;

/// A complete answer: the validated statement and its result set.
#[derive(Debug, Clone)]
pub struct Answer {
    /// The statement that was executed.
    pub query: GeneratedQuery,
    /// The rows, with their mandatory source marker.
    pub result: ExecutionResult,
    /// True if the result came from the session cache.
    pub from_cache: bool,
}

/// A single user's analyst session.
pub struct AnalystSession {
    prompt_builder: PromptBuilder,
    validator: SqlSafetyValidator,
    templates: TemplateLibrary,
    demo: DemoDataProvider,
    llm: Option<Box<dyn LlmClient>>,
    live: Option<Box<dyn QueryExecutor>>,
    controller: ModeController,
    cache: ResultCache,
    today: NaiveDate,
}

impl AnalystSession {
    /// Creates a session with no collaborators attached (demo mode until
    /// `with_model`/`with_warehouse` are called). Fails fast if the rule
    /// set references a table missing from the catalog.
    pub fn new(
        catalog: SchemaCatalog,
        rules: BusinessRuleSet,
        examples: ExampleStore,
        limits: Limits,
        today: NaiveDate,
    ) -> Result<Self> {
        let prompt_builder = PromptBuilder::new(catalog.clone(), rules.clone(), examples)?;
        let validator = SqlSafetyValidator::new(catalog.clone(), rules, limits);
        let demo = DemoDataProvider::new(catalog, today);

        Ok(Self {
            prompt_builder,
            validator,
            templates: TemplateLibrary::new(),
            demo,
            llm: None,
            live: None,
            controller: ModeController::new(false, false),
            cache: ResultCache::new(CACHE_CAPACITY),
            today,
        })
    }

    /// Attaches a language model client.
    pub fn with_model(mut self, client: Box<dyn LlmClient>) -> Self {
        self.llm = Some(client);
        self.controller = ModeController::new(true, self.live.is_some());
        self
    }

    /// Attaches a live warehouse executor.
    pub fn with_warehouse(mut self, executor: Box<dyn QueryExecutor>) -> Self {
        self.live = Some(executor);
        self.controller = ModeController::new(self.llm.is_some(), true);
        self
    }

    /// The session's current operating mode.
    pub fn mode(&self) -> crate::mode::Mode {
        self.controller.current()
    }

    /// Explicit user-triggered re-resolution of the mode, the only upward
    /// transition.
    pub fn retry_connection(&mut self) -> crate::mode::Mode {
        self.controller
            .retry_connection(self.llm.is_some(), self.live.is_some())
    }

    /// Answers a question end to end.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        self.ask_cancellable(question, CancellationToken::new())
            .await?
            .ok_or_else(|| AnalystError::internal("request cancelled without a canceller"))
    }

    /// Answers a question, discarding the result if `cancel` fires first.
    /// A superseded request returns `Ok(None)`: the caller renders nothing
    /// rather than stale output.
    pub async fn ask_cancellable(
        &mut self,
        question: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Answer>> {
        info!(mode = %self.controller.current(), "processing question");

        let raw_sql = self.generate_sql(question).await?;
        if cancel.is_cancelled() {
            info!("request superseded during generation; discarding");
            return Ok(None);
        }

        let mut query =
            self.validator
                .validate(&raw_sql, question, self.controller.current())?;
        for warning in &query.warnings {
            warn!(%warning, "validator finding");
        }

        if let Some(cached) = self.cache.get(&query.validated_sql) {
            query.mode = self.controller.current();
            return Ok(Some(Answer {
                query,
                result: cached,
                from_cache: true,
            }));
        }

        let result = self.execute(&query).await?;
        if cancel.is_cancelled() {
            info!("request superseded during execution; discarding");
            return Ok(None);
        }

        self.cache.insert(query.validated_sql.clone(), result.clone());

        // The answer reflects the mode it was actually served under, which
        // a mid-request demotion may have changed.
        query.mode = self.controller.current();

        Ok(Some(Answer {
            query,
            result,
            from_cache: false,
        }))
    }

    /// Produces candidate SQL from the model, or from the template library
    /// when the model is unavailable. Model exhaustion demotes the mode and
    /// falls through rather than failing the request.
    async fn generate_sql(&mut self, question: &str) -> Result<String> {
        if self.controller.current().uses_model() {
            if let Some(llm) = &self.llm {
                let messages = self.prompt_builder.build(question, self.today);
                match llm.generate(&messages).await {
                    Ok(response) => {
                        return extract_sql(&response).ok_or_else(|| {
                            AnalystError::unsafe_statement(
                                "model response contained no SQL statement",
                            )
                        });
                    }
                    Err(e) if e.is_downgrade() => {
                        warn!(error = %e, "model unavailable; demoting mode");
                        let mode = self.controller.model_lost();
                        info!(mode = %mode, "continuing with template library");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let template = self.templates.select(question);
        info!(template = template.name, "using fixed template");
        Ok(template.sql)
    }

    /// Executes a validated statement, demoting to synthetic data when the
    /// live warehouse drops mid-session.
    async fn execute(&mut self, query: &GeneratedQuery) -> Result<ExecutionResult> {
        if self.controller.current().uses_live_warehouse() {
            if let Some(live) = &self.live {
                match live.execute(&query.validated_sql).await {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_downgrade() => {
                        warn!(error = %e, "warehouse unreachable; demoting mode");
                        let mode = self.controller.warehouse_lost();
                        info!(mode = %mode, "continuing with demo data");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.demo.synthesize(&query.validated_sql)
    }
}

/// Bounded FIFO cache keyed by validated SQL.
#[derive(Debug, Default)]
struct ResultCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, ExecutionResult>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &str) -> Option<ExecutionResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, result: ExecutionResult) {
        if self.entries.contains_key(&key) {
            return;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, result);
    }
}
