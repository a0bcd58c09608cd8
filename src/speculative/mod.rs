//! Speculative path: fast single-shot retrieval + generation.
//!
//! Produces an initial answer quickly: cache lookup, one bounded
//! retrieval pass, and one short low-temperature LLM call, each with a
//! sub-deadline inside the overall path deadline. Never errors; every
//! failure degrades to a low-confidence response with an error marker
//! in metadata.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use crate::cache::{CacheHit, SpeculativeCache, is_valid_response};
use crate::error::FailureKind;
use crate::llm::{ChatRequest, LlmProvider, system_message, user_message};
use crate::model::{Metadata, Source, SpeculativeResponse};
use crate::retrieval::RetrievalFusion;
use crate::session::{MessageRole, SessionMessage, SessionStore};
use crate::text::truncate;

/// System instruction for the fast path. Kept short to preserve the
/// token budget for context.
const SYSTEM_PROMPT: &str = "You are a fast retrieval assistant. Answer concisely using only \
     the provided context. If the context does not contain the answer, say so briefly.";

/// Rendering when retrieval comes back empty.
const NO_DOCUMENTS_MESSAGE: &str =
    "No relevant documents found. Performing deeper search for more comprehensive results...";

/// Speculative path tuning.
#[derive(Debug, Clone)]
pub struct SpeculativeConfig {
    /// Model used for generation.
    pub model: String,
    /// Output token cap. Small by design: this is the preliminary
    /// answer, not the thorough one.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Sources included in the prompt.
    pub context_docs: usize,
    /// Character cap per prompt source.
    pub context_chars: usize,
    /// Minimum source score to enter the prompt.
    pub min_context_score: f32,
    /// Conversation messages loaded from the session store.
    pub history_messages: usize,
    /// Character cap per history message.
    pub history_chars: usize,
}

impl Default for SpeculativeConfig {
    fn default() -> Self {
        Self {
            model: "gpt-5-mini-2025-08-07".to_string(),
            max_output_tokens: 150,
            temperature: 0.3,
            context_docs: 3,
            context_chars: 300,
            min_context_score: 0.6,
            history_messages: 5,
            history_chars: 150,
        }
    }
}

/// Fast speculative processor.
pub struct SpeculativeProcessor {
    retrieval: Arc<RetrievalFusion>,
    provider: Arc<dyn LlmProvider>,
    sessions: Arc<dyn SessionStore>,
    cache: Arc<SpeculativeCache>,
    config: SpeculativeConfig,
}

impl SpeculativeProcessor {
    /// Creates a processor over the shared backends.
    #[must_use]
    pub fn new(
        retrieval: Arc<RetrievalFusion>,
        provider: Arc<dyn LlmProvider>,
        sessions: Arc<dyn SessionStore>,
        cache: Arc<SpeculativeCache>,
        config: SpeculativeConfig,
    ) -> Self {
        Self {
            retrieval,
            provider,
            sessions,
            cache,
            config,
        }
    }

    /// Processes a query through the speculative path.
    ///
    /// Workflow: cache lookup → retrieval (≤ half the remaining
    /// deadline) → short generation → confidence scoring → session
    /// persistence → cache write-back. Infallible: failures yield a
    /// degraded response with `metadata.error` set.
    pub async fn process(
        &self,
        query: &str,
        session_id: Option<&str>,
        top_k: usize,
        enable_cache: bool,
        deadline: Duration,
    ) -> SpeculativeResponse {
        let start = Instant::now();
        let mut metadata = Metadata::new();

        // Step 1: cache lookup
        if enable_cache
            && let Some(hit) = self.cache.get(query, top_k).await
        {
            let response = Self::annotate_cache_hit(hit);
            self.persist(session_id, query, &response).await;
            return response;
        }

        // Step 2: retrieval, bounded to half the remaining deadline
        let retrieval_deadline = deadline.saturating_sub(start.elapsed()) / 2;
        let outcome = self
            .retrieval
            .retrieve(query, top_k, retrieval_deadline)
            .await;

        metadata.insert(
            "search_method".to_string(),
            json!(outcome.method.as_str()),
        );
        metadata.insert(
            "search_time_ms".to_string(),
            json!(outcome.elapsed.as_millis() as u64),
        );

        // Steps 3-5: generation with conversation context
        let text = if outcome.sources.is_empty() {
            metadata.insert("llm_time_ms".to_string(), json!(0));
            NO_DOCUMENTS_MESSAGE.to_string()
        } else {
            let llm_deadline = deadline.saturating_sub(start.elapsed());
            let (text, llm_elapsed) = self
                .generate(query, session_id, &outcome.sources, llm_deadline, &mut metadata)
                .await;
            metadata.insert(
                "llm_time_ms".to_string(),
                json!(llm_elapsed.as_millis() as u64),
            );
            text
        };

        // Step 6: confidence from retrieval quality
        let confidence = Self::confidence_score(&outcome.sources, false);

        let response = SpeculativeResponse {
            text,
            confidence,
            sources: outcome.sources,
            cache_hit: false,
            processing_time: start.elapsed(),
            metadata,
        };

        // Step 7: session persistence
        self.persist(session_id, query, &response).await;

        // Step 8: cache write-back
        if enable_cache && is_valid_response(&response) {
            self.cache.set(query, top_k, response.clone()).await;
        }

        info!(
            confidence,
            elapsed_ms = response.processing_time.as_millis() as u64,
            "speculative processing complete"
        );

        response
    }

    /// Marks a cache hit and surfaces the match details.
    fn annotate_cache_hit(hit: CacheHit) -> SpeculativeResponse {
        let mut response = hit.response;
        response.metadata.insert(
            "cache_match_type".to_string(),
            json!(hit.match_type.as_str()),
        );
        response
            .metadata
            .insert("cache_similarity".to_string(), json!(hit.similarity));
        response
    }

    /// Runs the short LLM call, falling back to raw document excerpts
    /// on timeout or backend failure.
    async fn generate(
        &self,
        query: &str,
        session_id: Option<&str>,
        sources: &[Source],
        deadline: Duration,
        metadata: &mut Metadata,
    ) -> (String, Duration) {
        let start = Instant::now();

        let history = match session_id {
            Some(sid) => self.conversation_context(sid).await,
            None => String::new(),
        };

        let prompt = self.build_prompt(query, sources, &history);
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![system_message(SYSTEM_PROMPT), user_message(&prompt)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_output_tokens),
        };

        match tokio::time::timeout(deadline, self.provider.chat(&request)).await {
            Ok(Ok(response)) => {
                debug!(
                    chars = response.content.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "fast generation complete"
                );
                (response.content, start.elapsed())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "fast generation failed, using raw document fallback");
                metadata.insert("llm_fallback".to_string(), json!(true));
                metadata.insert(
                    "error".to_string(),
                    json!(FailureKind::LlmUnavailable.as_str()),
                );
                (self.raw_documents_fallback(sources), start.elapsed())
            }
            Err(_) => {
                warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    "fast generation timed out, using raw document fallback"
                );
                metadata.insert("llm_fallback".to_string(), json!(true));
                metadata.insert("error".to_string(), json!(FailureKind::Timeout.as_str()));
                (self.raw_documents_fallback(sources), start.elapsed())
            }
        }
    }

    /// Builds the compact prompt: conversation context, top sources,
    /// then the question.
    fn build_prompt(&self, query: &str, sources: &[Source], history: &str) -> String {
        let context: Vec<String> = sources
            .iter()
            .filter(|s| s.score >= self.config.min_context_score)
            .take(self.config.context_docs)
            .map(|s| truncate(&s.text, self.config.context_chars))
            .collect();

        let context = if context.is_empty() {
            // All sources scored below the bar; give the model the best
            // one rather than nothing
            sources
                .first()
                .map(|s| truncate(&s.text, self.config.context_chars))
                .unwrap_or_default()
        } else {
            context.join("\n\n")
        };

        if history.is_empty() {
            format!("Context:\n{context}\n\nQuestion: {query}")
        } else {
            format!("{history}\n\nContext:\n{context}\n\nQuestion: {query}")
        }
    }

    /// Loads recent conversation context, truncated per message.
    async fn conversation_context(&self, session_id: &str) -> String {
        let messages = match self
            .sessions
            .recent(session_id, self.config.history_messages)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "failed to load conversation context");
                return String::new();
            }
        };

        // `recent` returns newest first; render oldest first
        messages
            .iter()
            .rev()
            .map(|m| {
                format!(
                    "{}: {}",
                    capitalize(m.role.as_str()),
                    truncate(&m.content, self.config.history_chars)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Formats raw retrieved documents when synthesis is unavailable.
    fn raw_documents_fallback(&self, sources: &[Source]) -> String {
        let mut parts = vec![format!(
            "I found {} relevant document(s) for your query. Here are the key excerpts:\n",
            sources.len()
        )];

        for (i, source) in sources.iter().take(self.config.context_docs).enumerate() {
            parts.push(format!(
                "\n{}. From '{}' (relevance: {:.2}):\n{}",
                i + 1,
                source.document_name,
                source.score,
                truncate(&source.text, self.config.context_chars)
            ));
        }

        parts.push(
            "\n\nNote: This is a direct excerpt from the documents. For a synthesized \
             answer, please try again in a moment."
                .to_string(),
        );

        parts.join("\n")
    }

    /// Confidence from average source score and document count:
    /// `clamp(0.7·avg + 0.3·min(n/5, 1), 0, 1)`, with a small boost for
    /// previously validated cache hits.
    #[allow(clippy::cast_precision_loss)]
    fn confidence_score(sources: &[Source], cache_hit: bool) -> f32 {
        if sources.is_empty() {
            return 0.1;
        }

        let avg = sources.iter().map(|s| s.score).sum::<f32>() / sources.len() as f32;
        let count_factor = (sources.len() as f32 / 5.0).min(1.0);

        let mut confidence = 0.7 * avg + 0.3 * count_factor;
        if cache_hit {
            confidence = (confidence * 1.05).min(1.0);
        }

        confidence.clamp(0.0, 1.0)
    }

    /// Appends the `(user, query)` / `(assistant, response)` pair to
    /// the session log with a speculative path marker.
    async fn persist(&self, session_id: Option<&str>, query: &str, response: &SpeculativeResponse) {
        let Some(sid) = session_id else {
            return;
        };

        let mut user_meta = Metadata::new();
        user_meta.insert("path".to_string(), json!("speculative"));

        if let Err(e) = self
            .sessions
            .append(sid, SessionMessage::new(MessageRole::User, query, user_meta))
            .await
        {
            warn!(error = %e, "failed to persist user message");
            return;
        }

        let mut assistant_meta = Metadata::new();
        assistant_meta.insert("path".to_string(), json!("speculative"));
        assistant_meta.insert("confidence".to_string(), json!(response.confidence));
        assistant_meta.insert(
            "processing_time".to_string(),
            json!(response.processing_time.as_secs_f64()),
        );
        assistant_meta.insert("cache_hit".to_string(), json!(response.cache_hit));

        if let Err(e) = self
            .sessions
            .append(
                sid,
                SessionMessage::new(MessageRole::Assistant, &response.text, assistant_meta),
            )
            .await
        {
            warn!(error = %e, "failed to persist assistant message");
        }
    }
}

impl std::fmt::Debug for SpeculativeProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeculativeProcessor")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().collect::<String>() + chars.as_str()
    })
}
