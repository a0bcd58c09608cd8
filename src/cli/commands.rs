//! CLI command implementations.

#![allow(clippy::too_many_lines)]

use serde_json::json;

use super::parser::OutputFormat;
use crate::analyze::ComplexityAnalyzer;

/// Runs the offline complexity analysis command.
pub fn run_analyze(query: &str, format: OutputFormat) -> anyhow::Result<()> {
    let analyzer = ComplexityAnalyzer::new();
    let report = analyzer.analyze(query);

    match format {
        OutputFormat::Json => {
            let value = json!({
                "complexity": report.level.as_str(),
                "recommended_mode": report.recommended_mode.as_str(),
                "confidence": report.confidence,
                "complexity_score": report.composite,
                "scores": {
                    "length": report.length_score,
                    "keywords": report.keyword_score,
                    "structure": report.structure_score,
                    "question_type": report.question_type_score,
                },
                "factors": report.factors,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Complexity:  {}", report.level);
            println!("Mode:        {}", report.recommended_mode);
            println!("Score:       {:.2}", report.composite);
            println!("Confidence:  {:.2}", report.confidence);
            println!();
            println!("{}", report.mode_explanation());
        }
    }

    Ok(())
}

/// Runs a query through the full engine over a JSON corpus file.
#[cfg(feature = "openai")]
pub async fn run_query(
    query: &str,
    corpus_path: &std::path::Path,
    mode: &str,
    top_k: usize,
    session: Option<String>,
    enable_cache: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use tokio_stream::StreamExt;

    use crate::agentic::{AgenticConfig, AgenticProcessor};
    use crate::cache::{CacheConfig, SpeculativeCache};
    use crate::config::EngineConfig;
    use crate::coordinate::ResponseCoordinator;
    use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, HashEmbedder};
    use crate::index::{Document, MemoryLexicalIndex, MemoryVectorIndex};
    use crate::llm::{LlmProvider, OpenAiProvider};
    use crate::model::{QueryMode, QueryRequest, ResponseType, StepKind};
    use crate::retrieval::RetrievalFusion;
    use crate::router::HybridRouter;
    use crate::session::{MemorySessionStore, SessionStore};
    use crate::speculative::{SpeculativeConfig, SpeculativeProcessor};

    let mode = QueryMode::parse(mode)
        .with_context(|| format!("unknown mode: {mode} (expected auto, fast, balanced, deep)"))?;

    // Load the corpus into the in-memory backends
    let raw = std::fs::read_to_string(corpus_path)
        .with_context(|| format!("failed to read corpus file {}", corpus_path.display()))?;
    let documents: Vec<Document> =
        serde_json::from_str(&raw).context("corpus file must be a JSON array of documents")?;
    anyhow::ensure!(!documents.is_empty(), "corpus file contains no documents");

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(DEFAULT_DIMENSIONS));
    let vector = Arc::new(
        MemoryVectorIndex::build(documents.clone(), &embedder)
            .await
            .map_err(|e| anyhow::anyhow!("failed to build vector index: {e}"))?,
    );
    let lexical = Arc::new(MemoryLexicalIndex::build(documents));

    let retrieval = Arc::new(RetrievalFusion::new(
        Arc::clone(&embedder),
        vector,
        Some(lexical),
    ));
    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiProvider::from_env()?);
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

    let config = EngineConfig::from_env()?;
    let cache = Arc::new(SpeculativeCache::with_semantic_index(
        CacheConfig {
            ttl: config.cache_ttl,
            max_entries: config.cache_max_entries,
            near_threshold: config.semantic_similarity_threshold,
            ..CacheConfig::default()
        },
        Arc::clone(&embedder),
    ));

    let speculative = Arc::new(SpeculativeProcessor::new(
        Arc::clone(&retrieval),
        Arc::clone(&provider),
        Arc::clone(&sessions),
        cache,
        SpeculativeConfig::default(),
    ));
    let agentic = Arc::new(AgenticProcessor::new(
        retrieval,
        provider,
        sessions,
        None,
        AgenticConfig::default(),
    ));

    let router = HybridRouter::new(
        speculative,
        agentic,
        Arc::new(ResponseCoordinator::default()),
        config,
    );

    let mut request = QueryRequest::new(query)
        .with_mode(mode)
        .with_top_k(top_k)
        .with_cache(enable_cache);
    if let Some(session) = session {
        request = request.with_session(session);
    }

    let mut stream = router.process_query(request)?;

    while let Some(chunk) = stream.next().await {
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&chunk)?),
            OutputFormat::Text => match chunk.kind {
                ResponseType::Preliminary => {
                    println!("── preliminary ───────────────────────────────");
                    println!("{}\n", chunk.content);
                }
                ResponseType::Refinement => {
                    let step_kind = chunk
                        .reasoning_steps
                        .first()
                        .map_or(StepKind::Thought, |s| s.kind);
                    println!("  [{}] {}", step_kind.as_str(), chunk.content);
                }
                ResponseType::Final => {
                    println!("── final ({}) ────────────────────────────────", chunk.path_source);
                    println!("{}", chunk.content);
                    if let Some(confidence) = chunk.confidence {
                        println!("\nconfidence: {confidence:.2}");
                    }
                    if !chunk.sources.is_empty() {
                        println!("sources:");
                        for source in &chunk.sources {
                            println!("  - {} ({:.2})", source.document_name, source.score);
                        }
                    }
                }
            },
        }
    }

    Ok(())
}

/// Stub when the crate is built without an LLM provider feature.
#[cfg(not(feature = "openai"))]
#[allow(clippy::unused_async)]
pub async fn run_query(
    _query: &str,
    _corpus_path: &std::path::Path,
    _mode: &str,
    _top_k: usize,
    _session: Option<String>,
    _enable_cache: bool,
    _format: OutputFormat,
) -> anyhow::Result<()> {
    anyhow::bail!("this build has no LLM provider; rebuild with `--features openai`")
}
