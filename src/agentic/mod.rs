//! Agentic path: multi-step plan/act/observe/respond reasoning.
//!
//! Drives a state machine over the retrieval tools and the LLM,
//! yielding a lazy sequence of [`ReasoningStep`]s over a channel:
//!
//! ```text
//!  INIT ──plan──▶ PLANNING ──act──▶ ACTING ──observe──▶ OBSERVING
//!                                      ▲                     │
//!                                      │                     ▼
//!                                   REFLECT ◀──reflect── DECIDE
//!                                      │
//!                                      └──respond──▶ RESPONDED (terminal)
//! ```
//!
//! The sequence always terminates with exactly one `response` step
//! whose metadata carries the final sources and confidence, under
//! every termination condition: success, step-budget exhaustion, and
//! deadline expiry (`partial_results=true`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::FailureKind;
use crate::index::WebSearch;
use crate::llm::{ChatRequest, LlmProvider, system_message, user_message};
use crate::model::{Metadata, ReasoningStep, Source, StepKind};
use crate::retrieval::RetrievalFusion;
use crate::session::{MessageRole, SessionMessage, SessionStore};
use crate::text::truncate;

/// System instruction for the synthesis call.
const SYSTEM_PROMPT: &str = "You are a research assistant. Synthesize a thorough, well-grounded \
     answer from the numbered evidence excerpts. Cite excerpt numbers inline where relevant. \
     If the evidence is insufficient, say what is missing.";

/// System instruction for the planning call.
const PLAN_PROMPT: &str = "Break the user's question into 2-4 short retrieval subtasks, one per \
     line. Output only the subtasks.";

/// Rendering when the trace ends with no usable evidence.
const NO_FINDINGS_MESSAGE: &str = "No relevant findings were identified for the query.";

/// Placeholder content for a deadline-expired trace. The coordinator
/// recognizes this prefix and treats the agentic answer as absent when
/// merging.
pub const PARTIAL_RESULTS_PREFIX: &str = "Analysis in progress";

/// Agentic path tuning.
#[derive(Debug, Clone)]
pub struct AgenticConfig {
    /// Model used for planning and synthesis.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Token cap for the planning call.
    pub plan_max_tokens: u32,
    /// Token cap for the synthesis call.
    pub response_max_tokens: u32,
    /// Hard budget on emitted steps, terminal step included.
    pub max_steps: usize,
    /// Evidence excerpts offered to the synthesizer.
    pub synthesis_docs: usize,
    /// Character cap per synthesis excerpt.
    pub synthesis_chars: usize,
    /// Confidence reported for a fully successful trace.
    pub success_confidence: f32,
    /// Confidence reported for a partial (deadline-expired) trace.
    pub partial_confidence: f32,
    /// Step channel capacity; a slow consumer backpressures the trace.
    pub channel_capacity: usize,
}

impl Default for AgenticConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5.2-2025-12-11".to_string(),
            temperature: 0.2,
            plan_max_tokens: 256,
            response_max_tokens: 1024,
            max_steps: 15,
            synthesis_docs: 8,
            synthesis_chars: 500,
            success_confidence: 0.85,
            partial_confidence: 0.5,
            channel_capacity: 32,
        }
    }
}

/// Multi-step agentic processor.
pub struct AgenticProcessor {
    retrieval: Arc<RetrievalFusion>,
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<dyn SessionStore>,
    web: Option<Arc<dyn WebSearch>>,
    config: AgenticConfig,
}

impl AgenticProcessor {
    /// Creates a processor over the shared backends. `web` enables the
    /// web-search tool for DEEP / WEB_SEARCH modes.
    #[must_use]
    pub fn new(
        retrieval: Arc<RetrievalFusion>,
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<dyn SessionStore>,
        web: Option<Arc<dyn WebSearch>>,
        config: AgenticConfig,
    ) -> Self {
        Self {
            retrieval,
            provider,
            sessions,
            web,
            config,
        }
    }

    /// Whether a web-search tool is configured.
    #[must_use]
    pub fn has_web_search(&self) -> bool {
        self.web.is_some()
    }

    /// Starts a reasoning trace for the query.
    ///
    /// Returns the receiving end of the step sequence; the trace runs
    /// on its own task and ends with exactly one `response` step.
    /// Dropping the receiver cancels the trace at its next suspension
    /// point.
    #[must_use]
    pub fn process(
        self: &Arc<Self>,
        query: &str,
        session_id: Option<&str>,
        top_k: usize,
        deadline: Duration,
        enable_web: bool,
    ) -> mpsc::Receiver<ReasoningStep> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        let this = Arc::clone(self);
        let query = query.to_string();
        let session_id = session_id.map(str::to_string);

        tokio::spawn(async move {
            this.run(tx, query, session_id, top_k, deadline, enable_web)
                .await;
        });

        rx
    }

    /// Drives the state machine to completion.
    #[allow(clippy::too_many_lines)]
    async fn run(
        &self,
        tx: mpsc::Sender<ReasoningStep>,
        query: String,
        session_id: Option<String>,
        top_k: usize,
        deadline: Duration,
        enable_web: bool,
    ) {
        let deadline_at = Instant::now() + deadline;
        let mut emitter = StepEmitter::new(tx);
        let mut sources: Vec<Source> = Vec::new();
        let mut deadline_expired = false;

        // PLANNING
        let subtasks = self.plan(&query, remaining(deadline_at)).await;
        let plan_content = subtasks
            .iter()
            .enumerate()
            .map(|(i, task)| format!("{}. {task}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        if !emitter
            .emit(
                StepKind::Planning,
                format!("Plan:\n{plan_content}"),
                Metadata::from_iter([("subtasks".to_string(), json!(subtasks))]),
            )
            .await
        {
            return; // consumer gone
        }

        // ACT / OBSERVE / DECIDE / REFLECT cycles
        let web_enabled = enable_web && self.web.is_some();
        let mut cycle = 0usize;
        loop {
            cycle += 1;

            // Keep room for the terminal response step
            if emitter.count() + 3 > self.config.max_steps {
                debug!(cycle, "step budget nearly exhausted, moving to respond");
                break;
            }
            if remaining(deadline_at).is_zero() {
                deadline_expired = true;
                break;
            }

            // ACTING: second cycle goes to the web when enabled
            let use_web = web_enabled && cycle == 2;
            let action_content = if use_web {
                format!("Searching the web for \"{query}\"")
            } else {
                format!("Searching the knowledge base for \"{query}\"")
            };
            let tool = if use_web { "web_search" } else { "retrieval" };
            if !emitter
                .emit(
                    StepKind::Action,
                    action_content,
                    Metadata::from_iter([
                        ("tool".to_string(), json!(tool)),
                        ("top_k".to_string(), json!(top_k)),
                    ]),
                )
                .await
            {
                return;
            }

            // OBSERVING
            let budget = remaining(deadline_at);
            if budget.is_zero() {
                deadline_expired = true;
                break;
            }
            let found = if use_web {
                self.web_results(&query, top_k, budget).await
            } else {
                self.retrieval.retrieve(&query, top_k, budget).await.sources
            };

            let mut added = 0usize;
            for candidate in found.iter() {
                if !sources.iter().any(|kept| kept.is_equivalent(candidate)) {
                    sources.push(candidate.clone());
                    added += 1;
                }
            }

            let observation = format!(
                "Found {} document(s) ({added} new, {} total).",
                found.len(),
                sources.len()
            );
            if !emitter
                .emit(
                    StepKind::Observation,
                    observation,
                    Metadata::from_iter([
                        ("tool".to_string(), json!(tool)),
                        ("found".to_string(), json!(found.len())),
                        ("added".to_string(), json!(added)),
                    ]),
                )
                .await
            {
                return;
            }

            // DECIDE
            let enough = !sources.is_empty()
                && (sources.len() >= top_k || (added == 0 && cycle >= 2) || (!web_enabled && cycle >= 2));
            let out_of_moves = cycle >= 3 || (sources.is_empty() && !web_enabled);
            if enough || out_of_moves {
                break;
            }

            // REFLECT
            let reflection = if use_web || !web_enabled {
                format!(
                    "Evidence is thin ({} source(s)); retrying the knowledge base with the same subtasks.",
                    sources.len()
                )
            } else {
                format!(
                    "Evidence is thin ({} source(s)); widening the search to the web.",
                    sources.len()
                )
            };
            if !emitter.emit(StepKind::Reflection, reflection, Metadata::new()).await {
                return;
            }
        }

        // RESPONDED
        let (content, confidence, response_meta) = if deadline_expired {
            self.partial_response(&sources, emitter.count())
        } else {
            self.synthesize(&query, &sources, remaining(deadline_at))
                .await
        };

        let mut metadata = response_meta;
        metadata.insert("sources".to_string(), json!(sources));
        metadata.insert("confidence".to_string(), json!(confidence));
        metadata.insert("web_search_used".to_string(), json!(web_enabled));

        let delivered = emitter
            .emit(StepKind::Response, content.clone(), metadata)
            .await;

        info!(
            steps = emitter.count(),
            sources = sources.len(),
            confidence,
            partial = deadline_expired,
            "agentic trace complete"
        );

        if delivered {
            self.persist(session_id.as_deref(), &query, &content, confidence)
                .await;
        }
    }

    /// Plans retrieval subtasks, falling back to a fixed plan when the
    /// model is unavailable.
    async fn plan(&self, query: &str, budget: Duration) -> Vec<String> {
        let fallback = || {
            vec![
                "Search the knowledge base for directly relevant material".to_string(),
                "Review the evidence for gaps".to_string(),
                "Compose a grounded answer".to_string(),
            ]
        };

        // A plan is a nicety; cap its share of the deadline
        let budget = budget.min(Duration::from_secs(5)) / 2;
        if budget.is_zero() {
            return fallback();
        }

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![system_message(PLAN_PROMPT), user_message(query)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.plan_max_tokens),
        };

        match tokio::time::timeout(budget, self.provider.chat(&request)).await {
            Ok(Ok(response)) => {
                let subtasks: Vec<String> = response
                    .content
                    .lines()
                    .map(|l| l.trim_start_matches(['-', '*', ' ']).trim())
                    .map(|l| l.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')').trim())
                    .filter(|l| !l.is_empty())
                    .take(4)
                    .map(str::to_string)
                    .collect();
                if subtasks.is_empty() { fallback() } else { subtasks }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "planning call failed, using default plan");
                fallback()
            }
            Err(_) => {
                debug!("planning call timed out, using default plan");
                fallback()
            }
        }
    }

    /// Runs the web-search tool, tagging results for provenance.
    /// Failures degrade to an empty list.
    async fn web_results(&self, query: &str, n: usize, budget: Duration) -> Vec<Source> {
        let Some(web) = &self.web else {
            return Vec::new();
        };

        match tokio::time::timeout(budget, web.search(query, n)).await {
            Ok(Ok(mut results)) => {
                for source in &mut results {
                    source
                        .metadata
                        .insert("source".to_string(), json!("web_search"));
                }
                results
            }
            Ok(Err(e)) => {
                warn!(error = %e, "web search failed");
                Vec::new()
            }
            Err(_) => {
                warn!("web search timed out");
                Vec::new()
            }
        }
    }

    /// Synthesizes the final answer from accumulated evidence.
    async fn synthesize(
        &self,
        query: &str,
        sources: &[Source],
        budget: Duration,
    ) -> (String, f32, Metadata) {
        if sources.is_empty() {
            return (NO_FINDINGS_MESSAGE.to_string(), 0.2, Metadata::new());
        }

        let prompt = self.synthesis_prompt(query, sources);
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![system_message(SYSTEM_PROMPT), user_message(&prompt)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.response_max_tokens),
        };

        match tokio::time::timeout(budget, self.provider.chat(&request)).await {
            Ok(Ok(response)) => (
                response.content,
                self.config.success_confidence,
                Metadata::new(),
            ),
            Ok(Err(e)) => {
                warn!(error = %e, "synthesis failed, using best-effort summary");
                let mut meta = Metadata::new();
                meta.insert("llm_fallback".to_string(), json!(true));
                meta.insert(
                    "error".to_string(),
                    json!(FailureKind::LlmUnavailable.as_str()),
                );
                (self.best_effort_summary(sources), 0.6, meta)
            }
            Err(_) => {
                warn!("synthesis timed out, using best-effort summary");
                let mut meta = Metadata::new();
                meta.insert("llm_fallback".to_string(), json!(true));
                meta.insert("error".to_string(), json!(FailureKind::Timeout.as_str()));
                (self.best_effort_summary(sources), 0.6, meta)
            }
        }
    }

    /// Numbered evidence excerpts followed by the question.
    fn synthesis_prompt(&self, query: &str, sources: &[Source]) -> String {
        let evidence: Vec<String> = sources
            .iter()
            .take(self.config.synthesis_docs)
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "[{}] {} (score {:.2})\n{}",
                    i + 1,
                    s.document_name,
                    s.score,
                    truncate(&s.text, self.config.synthesis_chars)
                )
            })
            .collect();

        format!(
            "Evidence:\n{}\n\nQuestion: {query}",
            evidence.join("\n\n")
        )
    }

    /// Best-effort answer assembled from observations when synthesis is
    /// unavailable.
    fn best_effort_summary(&self, sources: &[Source]) -> String {
        let mut parts = vec![
            "Based on the retrieved documents (detailed synthesis unavailable):".to_string(),
        ];
        for source in sources.iter().take(self.config.synthesis_docs.min(3)) {
            parts.push(format!(
                "- {}: {}",
                source.document_name,
                truncate(&source.text, self.config.synthesis_chars.min(200))
            ));
        }
        parts.join("\n")
    }

    /// Synthetic terminal step for a deadline-expired trace.
    fn partial_response(&self, sources: &[Source], steps: usize) -> (String, f32, Metadata) {
        let content = format!(
            "{PARTIAL_RESULTS_PREFIX} (partial results): the deadline expired after {steps} \
             step(s) with {} document(s) collected.",
            sources.len()
        );
        let mut meta = Metadata::new();
        meta.insert("partial_results".to_string(), json!(true));
        meta.insert("error".to_string(), json!(FailureKind::Timeout.as_str()));
        (content, self.config.partial_confidence, meta)
    }

    /// Appends the turn to the session log with an agentic path marker.
    async fn persist(&self, session_id: Option<&str>, query: &str, response: &str, confidence: f32) {
        let Some(sid) = session_id else {
            return;
        };

        let mut user_meta = Metadata::new();
        user_meta.insert("path".to_string(), json!("agentic"));

        if let Err(e) = self
            .sessions
            .append(sid, SessionMessage::new(MessageRole::User, query, user_meta))
            .await
        {
            warn!(error = %e, "failed to persist user message");
            return;
        }

        let mut assistant_meta = Metadata::new();
        assistant_meta.insert("path".to_string(), json!("agentic"));
        assistant_meta.insert("confidence".to_string(), json!(confidence));

        if let Err(e) = self
            .sessions
            .append(
                sid,
                SessionMessage::new(MessageRole::Assistant, response, assistant_meta),
            )
            .await
        {
            warn!(error = %e, "failed to persist assistant message");
        }
    }
}

impl std::fmt::Debug for AgenticProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgenticProcessor")
            .field("provider", &self.provider.name())
            .field("web_search", &self.web.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Numbers and delivers steps; `emit` returns `false` once the
/// consumer has gone away.
struct StepEmitter {
    tx: mpsc::Sender<ReasoningStep>,
    counter: usize,
}

impl StepEmitter {
    const fn new(tx: mpsc::Sender<ReasoningStep>) -> Self {
        Self { tx, counter: 0 }
    }

    const fn count(&self) -> usize {
        self.counter
    }

    async fn emit(&mut self, kind: StepKind, content: String, metadata: Metadata) -> bool {
        self.counter += 1;
        let mut step = ReasoningStep::new(format!("step_{:03}", self.counter), kind, content);
        step.metadata = metadata;

        if self.tx.send(step).await.is_err() {
            debug!("step consumer dropped, cancelling trace");
            return false;
        }
        true
    }
}

fn remaining(deadline_at: Instant) -> Duration {
    deadline_at.saturating_duration_since(Instant::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::error::{LlmError, RetrievalError};
    use crate::index::VectorIndex;
    use crate::llm::ChatResponse;
    use crate::session::MemorySessionStore;

    fn source(chunk_id: &str, text: &str) -> Source {
        Source {
            chunk_id: chunk_id.to_string(),
            document_id: "d1".to_string(),
            document_name: "paper.pdf".to_string(),
            text: text.to_string(),
            score: 0.9,
            metadata: Metadata::new(),
        }
    }

    struct StaticEmbedder;

    #[async_trait]
    impl crate::embedding::Embedder for StaticEmbedder {
        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    struct StaticVector(Vec<Source>);

    #[async_trait]
    impl VectorIndex for StaticVector {
        async fn search(
            &self,
            _embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<Source>, RetrievalError> {
            Ok(self.0.iter().take(top_k).cloned().collect())
        }
    }

    struct FixedProvider(&'static str);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            Ok(ChatResponse {
                content: self.0.to_string(),
                usage: crate::llm::TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    struct SlowProvider(Duration);

    #[async_trait]
    impl LlmProvider for SlowProvider {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            tokio::time::sleep(self.0).await;
            Ok(ChatResponse {
                content: "too late".to_string(),
                usage: crate::llm::TokenUsage::default(),
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    struct StaticWeb(Vec<Source>);

    #[async_trait]
    impl WebSearch for StaticWeb {
        async fn search(&self, _query: &str, n: usize) -> Result<Vec<Source>, RetrievalError> {
            Ok(self.0.iter().take(n).cloned().collect())
        }
    }

    fn processor(
        sources: Vec<Source>,
        provider: Arc<dyn LlmProvider>,
        web: Option<Arc<dyn WebSearch>>,
    ) -> Arc<AgenticProcessor> {
        let retrieval = Arc::new(RetrievalFusion::new(
            Arc::new(StaticEmbedder),
            Arc::new(StaticVector(sources)),
            None,
        ));
        Arc::new(AgenticProcessor::new(
            retrieval,
            provider,
            Arc::new(MemorySessionStore::new()),
            web,
            AgenticConfig::default(),
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<ReasoningStep>) -> Vec<ReasoningStep> {
        let mut steps = Vec::new();
        while let Some(step) = rx.recv().await {
            steps.push(step);
        }
        steps
    }

    #[tokio::test]
    async fn test_trace_ends_with_single_response_step() {
        let proc = processor(
            vec![source("c1", "evidence one"), source("c2", "evidence two")],
            Arc::new(FixedProvider("A grounded answer.")),
            None,
        );

        let rx = proc.process("what is rust", None, 2, Duration::from_secs(10), false);
        let steps = collect(rx).await;

        let responses: Vec<_> = steps
            .iter()
            .filter(|s| s.kind == StepKind::Response)
            .collect();
        assert_eq!(responses.len(), 1);
        assert_eq!(steps.last().map(|s| s.kind), Some(StepKind::Response));
        assert_eq!(responses[0].content, "A grounded answer.");
    }

    #[tokio::test]
    async fn test_trace_step_order() {
        let proc = processor(
            vec![source("c1", "evidence")],
            Arc::new(FixedProvider("Answer.")),
            None,
        );

        let rx = proc.process("question", None, 1, Duration::from_secs(10), false);
        let steps = collect(rx).await;

        assert_eq!(steps[0].kind, StepKind::Planning);
        assert_eq!(steps[1].kind, StepKind::Action);
        assert_eq!(steps[2].kind, StepKind::Observation);
        // Step ids are sequential
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.step_id, format!("step_{:03}", i + 1));
        }
    }

    #[tokio::test]
    async fn test_response_metadata_carries_sources_and_confidence() {
        let proc = processor(
            vec![source("c1", "evidence")],
            Arc::new(FixedProvider("Answer.")),
            None,
        );

        let rx = proc.process("question", None, 1, Duration::from_secs(10), false);
        let steps = collect(rx).await;
        let response = steps.last().unwrap();

        let sources: Vec<Source> =
            serde_json::from_value(response.metadata.get("sources").unwrap().clone()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].chunk_id, "c1");

        let confidence = response
            .metadata
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap();
        assert!((confidence - 0.85).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_web_search_cycle_tags_sources() {
        let proc = processor(
            vec![source("kb1", "local evidence")],
            Arc::new(FixedProvider("Answer.")),
            Some(Arc::new(StaticWeb(vec![source("web1", "web evidence")]))),
        );

        // top_k high enough that cycle 1 is not "enough"
        let rx = proc.process("question", None, 5, Duration::from_secs(10), true);
        let steps = collect(rx).await;

        let actions: Vec<_> = steps.iter().filter(|s| s.kind == StepKind::Action).collect();
        assert!(actions.len() >= 2);
        assert_eq!(
            actions[1].metadata.get("tool").and_then(|v| v.as_str()),
            Some("web_search")
        );

        let response = steps.last().unwrap();
        let sources: Vec<Source> =
            serde_json::from_value(response.metadata.get("sources").unwrap().clone()).unwrap();
        let web_source = sources.iter().find(|s| s.chunk_id == "web1").unwrap();
        assert_eq!(
            web_source.metadata.get("source").and_then(|v| v.as_str()),
            Some("web_search")
        );
    }

    #[tokio::test]
    async fn test_deadline_expiry_yields_partial_response() {
        let proc = processor(
            vec![source("c1", "evidence")],
            // Slow enough that the synthesis deadline expires
            Arc::new(SlowProvider(Duration::from_secs(30))),
            None,
        );

        let rx = proc.process("question", None, 1, Duration::from_millis(300), false);
        let steps = collect(rx).await;

        let response = steps.last().unwrap();
        assert_eq!(response.kind, StepKind::Response);
        // Synthesis timeout inside the deadline produces the best-effort
        // summary; a fully expired deadline produces the partial marker.
        // Either way the trace terminates with a response step.
        assert!(!response.content.is_empty());
    }

    #[tokio::test]
    async fn test_fully_expired_deadline_marks_partial() {
        let proc = processor(
            vec![source("c1", "evidence")],
            Arc::new(FixedProvider("unused")),
            None,
        );

        // Deadline so small the first cycle cannot start
        let rx = proc.process("question", None, 1, Duration::from_nanos(1), false);
        let steps = collect(rx).await;

        let response = steps.last().unwrap();
        assert_eq!(response.kind, StepKind::Response);
        assert!(response.content.starts_with(PARTIAL_RESULTS_PREFIX));
        assert_eq!(
            response.metadata.get("partial_results").and_then(serde_json::Value::as_bool),
            Some(true)
        );
    }

    #[tokio::test]
    async fn test_no_evidence_response() {
        let proc = processor(Vec::new(), Arc::new(FixedProvider("unused")), None);

        let rx = proc.process("question", None, 5, Duration::from_secs(10), false);
        let steps = collect(rx).await;

        let response = steps.last().unwrap();
        assert_eq!(response.content, NO_FINDINGS_MESSAGE);
    }

    #[tokio::test]
    async fn test_step_budget_respected() {
        let config = AgenticConfig {
            max_steps: 5,
            ..AgenticConfig::default()
        };

        let retrieval = Arc::new(RetrievalFusion::new(
            Arc::new(StaticEmbedder),
            Arc::new(StaticVector(vec![source("c1", "evidence")])),
            None,
        ));
        let proc = Arc::new(AgenticProcessor::new(
            retrieval,
            Arc::new(FixedProvider("Answer.")),
            Arc::new(MemorySessionStore::new()),
            None,
            config,
        ));

        let rx = proc.process("question", None, 50, Duration::from_secs(10), false);
        let steps = collect(rx).await;

        assert!(steps.len() <= 5);
        assert_eq!(steps.last().map(|s| s.kind), Some(StepKind::Response));
    }

    #[tokio::test]
    async fn test_session_persistence() {
        let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let retrieval = Arc::new(RetrievalFusion::new(
            Arc::new(StaticEmbedder),
            Arc::new(StaticVector(vec![source("c1", "evidence")])),
            None,
        ));
        let proc = Arc::new(AgenticProcessor::new(
            retrieval,
            Arc::new(FixedProvider("Answer.")),
            Arc::clone(&sessions),
            None,
            AgenticConfig::default(),
        ));

        let rx = proc.process("question", Some("s1"), 1, Duration::from_secs(10), false);
        let _ = collect(rx).await;

        // Persistence happens after the terminal step is delivered
        tokio::time::sleep(Duration::from_millis(50)).await;
        let log = sessions.recent("s1", 10).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log[0].metadata.get("path").and_then(|v| v.as_str()),
            Some("agentic")
        );
    }
}
