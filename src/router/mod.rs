//! Hybrid query router: mode dispatch and stream orchestration.
//!
//! Single entry point for queries. Resolves AUTO mode through the
//! complexity analyzer, dispatches to the speculative and/or agentic
//! path, and drives a bounded stream of [`ResponseChunk`]s back to the
//! caller with exactly one terminal FINAL chunk, even on error.
//! Dropping the stream cancels all in-flight path work.

mod rate_limit;

pub use rate_limit::RateLimiter;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::agentic::AgenticProcessor;
use crate::analyze::ComplexityAnalyzer;
use crate::config::EngineConfig;
use crate::coordinate::{PathAnswer, ResponseCoordinator, VersionLog};
use crate::error::{FailureKind, Result};
use crate::model::{
    Metadata, PathSource, QueryMode, QueryRequest, ReasoningStep, ResponseChunk, ResponseType,
    Source, SpeculativeResponse, StepKind,
};
use crate::speculative::SpeculativeProcessor;

/// Bounded depth of the output stream; slow consumers backpressure the
/// producing paths.
const STREAM_BUFFER: usize = 8;

/// Grace added to the agentic deadline before the router gives up on
/// the step channel.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Grace added to a path's outer timeout guard. Paths degrade
/// internally at the deadline proper; the guard only catches stalls.
const PATH_GRACE: Duration = Duration::from_millis(250);

/// FINAL content for a path deadline miss with nothing to show.
const TIMEOUT_MESSAGE: &str = "The query took longer than expected to process. Please try again \
     or try a different query mode.";

/// FINAL content for an unexpected single-path failure.
const PATH_FAILED_MESSAGE: &str =
    "An error occurred while processing your query. Please try again.";

/// FINAL content when the admission gate refuses the request.
const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please wait a moment and try again.";

/// The caller-facing chunk stream.
pub type ResponseStream = ReceiverStream<ResponseChunk>;

/// Routes queries to the speculative and/or agentic path by mode.
pub struct HybridRouter {
    speculative: Arc<SpeculativeProcessor>,
    agentic: Arc<AgenticProcessor>,
    coordinator: Arc<ResponseCoordinator>,
    analyzer: ComplexityAnalyzer,
    rate_limiter: RateLimiter,
    config: EngineConfig,
    query_counter: AtomicU64,
}

impl HybridRouter {
    /// Creates a router over the shared path processors. All
    /// collaborators are explicit; the router owns no hidden globals.
    #[must_use]
    pub fn new(
        speculative: Arc<SpeculativeProcessor>,
        agentic: Arc<AgenticProcessor>,
        coordinator: Arc<ResponseCoordinator>,
        config: EngineConfig,
    ) -> Self {
        let rate_limiter =
            RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60));
        Self {
            speculative,
            agentic,
            coordinator,
            analyzer: ComplexityAnalyzer::new(),
            rate_limiter,
            config,
            query_counter: AtomicU64::new(0),
        }
    }

    /// Processes a query, returning the progressive chunk stream.
    ///
    /// The stream yields zero or more PRELIMINARY/REFINEMENT chunks and
    /// exactly one terminal FINAL chunk. Dropping the stream cancels
    /// the in-flight path tasks.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::RoutingError`] for invalid input (empty query,
    /// out-of-range `top_k` or timeouts); the transport layer maps this
    /// to a 400-class response. A rate-limit breach is in-band: the
    /// call succeeds and the stream carries a single `rate_limited`
    /// FINAL chunk.
    pub fn process_query(&self, request: QueryRequest) -> Result<ResponseStream> {
        request.validate().map_err(crate::error::Error::Routing)?;

        let query_id = self.next_query_id();
        let (mode, mut base_metadata) = self.resolve_mode(&request);

        let client_key = request.client_id.as_deref().unwrap_or("anonymous");
        if !self.rate_limiter.check(client_key) {
            warn!(query_id = %query_id, client = client_key, "rate limit exceeded");
            return Ok(self.rate_limited_stream(query_id, mode, base_metadata));
        }

        base_metadata.insert("mode_used".to_string(), json!(mode.as_str()));

        info!(
            query_id = %query_id,
            mode = mode.as_str(),
            top_k = request.top_k,
            "processing query"
        );

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let emitter = ChunkEmitter {
            tx,
            query_id,
            counter: 0,
            base: base_metadata,
        };

        let ctx = RouterContext {
            speculative: Arc::clone(&self.speculative),
            agentic: Arc::clone(&self.agentic),
            coordinator: Arc::clone(&self.coordinator),
        };
        let spec_deadline = request
            .speculative_timeout
            .map_or(self.config.speculative_deadline, Duration::from_secs_f64);
        let agentic_deadline = request
            .agentic_timeout
            .map_or(self.config.agentic_deadline, Duration::from_secs_f64);

        tokio::spawn(async move {
            drive(ctx, request, mode, spec_deadline, agentic_deadline, emitter).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Resolves AUTO to a concrete mode, returning routing metadata for
    /// the chunk envelopes.
    fn resolve_mode(&self, request: &QueryRequest) -> (QueryMode, Metadata) {
        let mut metadata = Metadata::new();

        if request.mode != QueryMode::Auto {
            return (request.mode, metadata);
        }

        if !self.config.enable_intelligent_routing {
            return (self.config.default_mode, metadata);
        }

        let report = self.analyzer.analyze(&request.query);
        metadata.insert("complexity".to_string(), json!(report.level.as_str()));
        metadata.insert("complexity_score".to_string(), json!(report.composite));
        metadata.insert(
            "routing_confidence".to_string(),
            json!(report.confidence),
        );

        info!(
            complexity = report.level.as_str(),
            score = report.composite,
            mode = report.recommended_mode.as_str(),
            "auto mode resolved"
        );

        (report.recommended_mode, metadata)
    }

    /// One-chunk stream carrying the rate-limited FINAL.
    fn rate_limited_stream(
        &self,
        query_id: String,
        mode: QueryMode,
        mut base: Metadata,
    ) -> ResponseStream {
        base.insert("mode_used".to_string(), json!(mode.as_str()));
        base.insert(
            "error".to_string(),
            json!(FailureKind::RateLimited.as_str()),
        );

        let (tx, rx) = mpsc::channel(1);
        let chunk = ResponseChunk {
            chunk_id: format!("{query_id}_chunk_001"),
            kind: ResponseType::Final,
            path_source: PathSource::Hybrid,
            content: RATE_LIMITED_MESSAGE.to_string(),
            confidence: Some(0.0),
            sources: Vec::new(),
            reasoning_steps: Vec::new(),
            timestamp: Utc::now(),
            metadata: base,
        };
        // Capacity 1 and a fresh channel: this send cannot fail
        let _ = tx.try_send(chunk);

        ReceiverStream::new(rx)
    }

    fn next_query_id(&self) -> String {
        let seq = self.query_counter.fetch_add(1, Ordering::Relaxed);
        let micros = Utc::now().timestamp_micros().unsigned_abs();
        format!("query_{micros:x}{seq:04x}")
    }
}

impl std::fmt::Debug for HybridRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridRouter")
            .field("config", &self.config)
            .finish()
    }
}

/// Shared collaborators moved into the stream driver task.
struct RouterContext {
    speculative: Arc<SpeculativeProcessor>,
    agentic: Arc<AgenticProcessor>,
    coordinator: Arc<ResponseCoordinator>,
}

/// Numbers and delivers chunks; `emit` returns `false` once the
/// consumer has dropped the stream.
struct ChunkEmitter {
    tx: mpsc::Sender<ResponseChunk>,
    query_id: String,
    counter: usize,
    base: Metadata,
}

impl ChunkEmitter {
    #[allow(clippy::too_many_arguments)]
    async fn emit(
        &mut self,
        kind: ResponseType,
        path_source: PathSource,
        content: String,
        confidence: Option<f32>,
        sources: Vec<Source>,
        reasoning_steps: Vec<ReasoningStep>,
        extra: Metadata,
    ) -> bool {
        self.counter += 1;
        let mut metadata = self.base.clone();
        metadata.extend(extra);

        let chunk = ResponseChunk {
            chunk_id: format!("{}_chunk_{:03}", self.query_id, self.counter),
            kind,
            path_source,
            content,
            confidence,
            sources,
            reasoning_steps,
            timestamp: Utc::now(),
            metadata,
        };

        if self.tx.send(chunk).await.is_err() {
            info!(query_id = %self.query_id, "stream consumer gone, cancelling query");
            return false;
        }
        true
    }
}

/// Final answer decoded from the agentic terminal step.
struct AgentOutcome {
    text: String,
    confidence: f32,
    sources: Vec<Source>,
    partial: bool,
}

impl AgentOutcome {
    fn decode(step: &ReasoningStep) -> Self {
        let sources = step
            .metadata
            .get("sources")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        #[allow(clippy::cast_possible_truncation)]
        let confidence = step
            .metadata
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .map_or(0.85, |f| f as f32);
        let partial = step
            .metadata
            .get("partial_results")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        Self {
            text: step.content.clone(),
            confidence,
            sources,
            partial,
        }
    }

    /// A real answer: not a deadline placeholder and not the
    /// no-evidence rendering.
    fn is_usable(&self) -> bool {
        !self.partial
            && !ResponseCoordinator::is_placeholder(&self.text)
            && !(self.sources.is_empty() && self.confidence <= 0.2)
    }
}

/// A speculative result that actually answered, as opposed to the
/// degraded no-documents / total-failure renderings.
fn speculative_usable(response: &SpeculativeResponse) -> bool {
    !(response.sources.is_empty() && response.confidence <= 0.1)
}

/// Drives one query's stream to its FINAL chunk.
async fn drive(
    ctx: RouterContext,
    request: QueryRequest,
    mode: QueryMode,
    spec_deadline: Duration,
    agentic_deadline: Duration,
    mut emitter: ChunkEmitter,
) {
    match mode {
        QueryMode::Fast => drive_fast(&ctx, &request, spec_deadline, &mut emitter).await,
        QueryMode::Deep | QueryMode::WebSearch => {
            drive_deep(&ctx, &request, mode, agentic_deadline, &mut emitter).await;
        }
        QueryMode::Balanced => {
            drive_balanced(&ctx, &request, spec_deadline, agentic_deadline, &mut emitter).await;
        }
        // Resolved before dispatch; unreachable by construction
        QueryMode::Auto => {
            warn!("auto mode reached dispatch, emitting diagnostic");
            let mut meta = Metadata::new();
            meta.insert("error".to_string(), json!(FailureKind::PathFailed.as_str()));
            emitter
                .emit(
                    ResponseType::Final,
                    PathSource::Hybrid,
                    PATH_FAILED_MESSAGE.to_string(),
                    Some(0.0),
                    Vec::new(),
                    Vec::new(),
                    meta,
                )
                .await;
        }
    }
}

/// FAST: speculative path only, one FINAL chunk.
async fn drive_fast(
    ctx: &RouterContext,
    request: &QueryRequest,
    deadline: Duration,
    emitter: &mut ChunkEmitter,
) {
    let work = ctx.speculative.process(
        &request.query,
        request.session_id.as_deref(),
        request.top_k,
        request.enable_cache,
        deadline,
    );

    match tokio::time::timeout(deadline + PATH_GRACE, work).await {
        Ok(response) => {
            let mut meta = speculative_metadata(&response);
            meta.insert("processing_time".to_string(), json!(response.processing_time.as_secs_f64()));
            let sources = ctx.coordinator.dedup_sources(response.sources);
            emitter
                .emit(
                    ResponseType::Final,
                    PathSource::Speculative,
                    response.text,
                    Some(response.confidence),
                    sources,
                    Vec::new(),
                    meta,
                )
                .await;
        }
        Err(_) => {
            warn!(deadline_secs = deadline.as_secs_f64(), "fast mode deadline miss");
            let mut meta = Metadata::new();
            meta.insert("error".to_string(), json!(FailureKind::Timeout.as_str()));
            meta.insert("timeout_seconds".to_string(), json!(deadline.as_secs_f64()));
            emitter
                .emit(
                    ResponseType::Final,
                    PathSource::Speculative,
                    TIMEOUT_MESSAGE.to_string(),
                    Some(0.0),
                    Vec::new(),
                    Vec::new(),
                    meta,
                )
                .await;
        }
    }
}

/// DEEP / WEB_SEARCH: agentic path only; non-terminal steps stream as
/// REFINEMENT, the terminal step becomes FINAL.
async fn drive_deep(
    ctx: &RouterContext,
    request: &QueryRequest,
    mode: QueryMode,
    deadline: Duration,
    emitter: &mut ChunkEmitter,
) {
    let path = if mode == QueryMode::WebSearch {
        PathSource::WebSearch
    } else {
        PathSource::Agentic
    };
    // DEEP also uses the web tool when one is configured; WEB_SEARCH
    // requires it semantically but degrades the same way when absent
    let enable_web = mode == QueryMode::WebSearch || ctx.agentic.has_web_search();

    let mut rx = ctx.agentic.process(
        &request.query,
        request.session_id.as_deref(),
        request.top_k,
        deadline,
        enable_web,
    );

    let drain_deadline = Instant::now() + deadline + DRAIN_GRACE;
    let mut steps: Vec<ReasoningStep> = Vec::new();
    let mut outcome: Option<AgentOutcome> = None;

    loop {
        let step = match tokio::time::timeout_at(drain_deadline.into(), rx.recv()).await {
            Ok(Some(step)) => step,
            Ok(None) => break,
            Err(_) => {
                warn!("agentic step channel stalled past deadline");
                break;
            }
        };

        if step.kind == StepKind::Response {
            outcome = Some(AgentOutcome::decode(&step));
            steps.push(step);
            break;
        }

        let step_meta = Metadata::from_iter([
            ("step_type".to_string(), json!(step.kind.as_str())),
            ("step_id".to_string(), json!(step.step_id)),
        ]);
        let delivered = emitter
            .emit(
                ResponseType::Refinement,
                path,
                step.content.clone(),
                None,
                Vec::new(),
                vec![step.clone()],
                step_meta,
            )
            .await;
        if !delivered {
            return; // dropping rx cancels the trace
        }
        steps.push(step);
    }

    let Some(outcome) = outcome else {
        let mut meta = Metadata::new();
        meta.insert("error".to_string(), json!(FailureKind::PathFailed.as_str()));
        meta.insert("reasoning_step_count".to_string(), json!(steps.len()));
        emitter
            .emit(
                ResponseType::Final,
                path,
                PATH_FAILED_MESSAGE.to_string(),
                Some(0.0),
                Vec::new(),
                steps,
                meta,
            )
            .await;
        return;
    };

    let mut meta = Metadata::new();
    meta.insert("reasoning_step_count".to_string(), json!(steps.len()));
    if outcome.partial {
        meta.insert("timeout".to_string(), json!(true));
        meta.insert("partial_results".to_string(), json!(true));
        meta.insert("error".to_string(), json!(FailureKind::Timeout.as_str()));
    }

    let sources = ctx.coordinator.dedup_sources(outcome.sources);
    emitter
        .emit(
            ResponseType::Final,
            path,
            outcome.text,
            Some(outcome.confidence),
            sources,
            steps,
            meta,
        )
        .await;
}

/// BALANCED: both paths in parallel with progressive refinement.
///
/// The speculative result is awaited first (its deadline is the short
/// one) and emitted as PRELIMINARY; agentic steps buffered in the
/// channel meanwhile stream as REFINEMENT afterwards, so the ordering
/// guarantee (PRELIMINARY before every REFINEMENT) holds without
/// delaying either path's work.
async fn drive_balanced(
    ctx: &RouterContext,
    request: &QueryRequest,
    spec_deadline: Duration,
    agentic_deadline: Duration,
    emitter: &mut ChunkEmitter,
) {
    let mut versions = VersionLog::new();

    // Launch both paths concurrently
    let spec_handle = {
        let speculative = Arc::clone(&ctx.speculative);
        let query = request.query.clone();
        let session_id = request.session_id.clone();
        let top_k = request.top_k;
        let enable_cache = request.enable_cache;
        tokio::spawn(async move {
            tokio::time::timeout(
                spec_deadline + PATH_GRACE,
                speculative.process(&query, session_id.as_deref(), top_k, enable_cache, spec_deadline),
            )
            .await
            .ok()
        })
    };

    let mut agent_rx = ctx.agentic.process(
        &request.query,
        request.session_id.as_deref(),
        request.top_k,
        agentic_deadline,
        false,
    );

    // Speculative leg settles first by construction
    let spec_result: Option<SpeculativeResponse> = match spec_handle.await {
        Ok(result) => {
            if result.is_none() {
                warn!("speculative path deadline miss, continuing agentic-only");
            }
            result
        }
        Err(e) => {
            warn!(error = %e, "speculative task failed, continuing agentic-only");
            None
        }
    };
    // A degraded speculative rendering is not worth a PRELIMINARY
    let spec_result = spec_result.filter(speculative_usable);

    let mut spec_version_id: Option<String> = None;
    if let Some(ref response) = spec_result {
        spec_version_id = Some(versions.record(
            &response.text,
            PathSource::Speculative,
            response.confidence,
            &response.sources,
        ));

        let mut meta = speculative_metadata(response);
        meta.insert("processing_time".to_string(), json!(response.processing_time.as_secs_f64()));
        let delivered = emitter
            .emit(
                ResponseType::Preliminary,
                PathSource::Speculative,
                response.text.clone(),
                Some(response.confidence),
                ctx.coordinator.dedup_sources(response.sources.clone()),
                Vec::new(),
                meta,
            )
            .await;
        if !delivered {
            return;
        }
    }

    // Stream agentic refinements (buffered ones drain immediately)
    let drain_deadline = Instant::now() + agentic_deadline + DRAIN_GRACE;
    let mut steps: Vec<ReasoningStep> = Vec::new();
    let mut agent_outcome: Option<AgentOutcome> = None;

    loop {
        let step = match tokio::time::timeout_at(drain_deadline.into(), agent_rx.recv()).await {
            Ok(Some(step)) => step,
            Ok(None) => break,
            Err(_) => {
                warn!("agentic step channel stalled past deadline");
                break;
            }
        };

        if step.kind == StepKind::Response {
            agent_outcome = Some(AgentOutcome::decode(&step));
            steps.push(step);
            break;
        }

        let step_meta = Metadata::from_iter([
            ("step_type".to_string(), json!(step.kind.as_str())),
            ("step_id".to_string(), json!(step.step_id)),
        ]);
        let delivered = emitter
            .emit(
                ResponseType::Refinement,
                PathSource::Agentic,
                step.content.clone(),
                None,
                Vec::new(),
                vec![step.clone()],
                step_meta,
            )
            .await;
        if !delivered {
            return;
        }
        steps.push(step);
    }

    // Merge and emit FINAL. Unusable answers (placeholders, degraded
    // renderings) are treated as absent so the other path can win.
    let agent_usable = agent_outcome.as_ref().is_some_and(AgentOutcome::is_usable);

    let spec_answer = spec_result.as_ref().map(|r| PathAnswer {
        text: &r.text,
        confidence: r.confidence,
    });
    let agent_answer = agent_outcome
        .as_ref()
        .filter(|a| a.is_usable())
        .map(|a| PathAnswer {
            text: &a.text,
            confidence: a.confidence,
        });

    let both_failed = spec_answer.is_none() && agent_answer.is_none();
    let both_succeeded = spec_result.is_some() && agent_usable;

    let mut merged = ctx.coordinator.merge_responses(spec_answer, agent_answer);

    // Confidence on FINAL never drops below the PRELIMINARY the caller
    // already saw, as long as both paths genuinely succeeded
    if both_succeeded && let Some(ref spec) = spec_result {
        merged.confidence = merged.confidence.max(spec.confidence);
    }

    let spec_sources = spec_result.map(|r| r.sources).unwrap_or_default();
    let agent_sources = if agent_usable {
        agent_outcome.map(|a| a.sources).unwrap_or_default()
    } else {
        Vec::new()
    };
    let final_sources = ctx.coordinator.merge_sources(spec_sources, agent_sources);

    let final_version_id = versions.record(
        &merged.text,
        merged.path_used,
        merged.confidence,
        &final_sources,
    );

    let mut meta = Metadata::new();
    meta.insert("speculative_completed".to_string(), json!(spec_version_id.is_some()));
    meta.insert("agentic_completed".to_string(), json!(agent_usable));
    meta.insert("source_count".to_string(), json!(final_sources.len()));
    meta.insert("version_id".to_string(), json!(final_version_id));

    if let Some(spec_vid) = spec_version_id {
        meta.insert("speculative_version_id".to_string(), json!(spec_vid.clone()));
        if let Some(diff) = versions.diff(&spec_vid, &final_version_id)
            && let Ok(value) = serde_json::to_value(&diff)
        {
            meta.insert("changes".to_string(), value);
        }
    }

    if both_failed {
        meta.insert(
            "error".to_string(),
            json!(FailureKind::BothPathsFailed.as_str()),
        );
        merged.confidence = 0.0;
    }

    emitter
        .emit(
            ResponseType::Final,
            merged.path_used,
            merged.text,
            Some(merged.confidence),
            final_sources,
            steps,
            meta,
        )
        .await;
}

/// Chunk metadata shared by FAST FINAL and BALANCED PRELIMINARY.
fn speculative_metadata(response: &SpeculativeResponse) -> Metadata {
    let mut meta = response.metadata.clone();
    meta.insert("cache_hit".to_string(), json!(response.cache_hit));
    meta
}
