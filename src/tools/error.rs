//! Error tools: stack resolution, context, root cause, similar clusters

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{page_tool_schema, parse_input, SessionArgs, Tool, ToolContext};
use crate::error::EngineError;
use crate::instrument::{ConsoleEvent, ConsoleKind, NetworkEvent};
use crate::reasoner;

/// Visit the page and snapshot console + network events.
async fn collect(
    ctx: &ToolContext,
    session: &SessionArgs,
) -> Result<(Vec<ConsoleEvent>, Vec<NetworkEvent>), EngineError> {
    let page = ctx
        .engine
        .browser
        .acquire(&session.url, session.options(false))
        .await?;
    let snapshot = {
        let buffer = page.buffer();
        let guard = buffer
            .lock()
            .map_err(|_| EngineError::internal("event buffer poisoned"))?;
        (guard.console_snapshot(), guard.network_snapshot())
    };
    page.close().await;
    Ok(snapshot)
}

fn is_error(event: &ConsoleEvent) -> bool {
    matches!(event.kind, ConsoleKind::Error | ConsoleKind::PageError)
}

// ============================================================================
// error_resolve_stack
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveStackInput {
    #[serde(flatten)]
    session: SessionArgs,
    /// Substring of the error message to select
    fragment: String,
}

pub struct ErrorResolveStackTool;

#[async_trait]
impl Tool for ErrorResolveStackTool {
    fn name(&self) -> &'static str {
        "error_resolve_stack"
    }

    fn title(&self) -> &'static str {
        "Resolve a captured error's stack"
    }

    fn description(&self) -> String {
        "Load a page, pick the newest console error containing the fragment, and resolve its stack to original sources.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({ "fragment": { "type": "string", "description": "Substring of the error message" } }),
            &["fragment"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: ResolveStackInput = parse_input(input)?;
        let (console, _) = collect(&ctx, &input.session).await?;
        let Some(exemplar) = console
            .iter()
            .filter(|e| is_error(e) && e.message.contains(&input.fragment))
            .max_by_key(|e| e.seq)
        else {
            return Ok(json!({ "found": false, "fragment": input.fragment }));
        };
        let resolved = match &exemplar.stack {
            Some(stack) => Some(ctx.engine.source_maps.resolve_stack(stack).await),
            None => None,
        };
        Ok(json!({
            "found": true,
            "message": exemplar.message,
            "kind": exemplar.kind,
            "atMs": exemplar.at_ms,
            "resolvedStack": resolved,
        }))
    }
}

// ============================================================================
// error_get_context
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetContextInput {
    #[serde(flatten)]
    session: SessionArgs,
    fragment: String,
    /// Events on each side of the error to include
    #[serde(default = "default_context_span")]
    span: usize,
}

fn default_context_span() -> usize {
    10
}

pub struct ErrorGetContextTool;

#[async_trait]
impl Tool for ErrorGetContextTool {
    fn name(&self) -> &'static str {
        "error_get_context"
    }

    fn title(&self) -> &'static str {
        "Events around an error"
    }

    fn description(&self) -> String {
        "Load a page, pick the newest console error containing the fragment, and return the console and network events surrounding it in sequence order.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "fragment": { "type": "string" },
                "span": { "type": "integer", "description": "Events on each side (default 10)" }
            }),
            &["fragment"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetContextInput = parse_input(input)?;
        let (console, network) = collect(&ctx, &input.session).await?;
        let Some(exemplar) = console
            .iter()
            .filter(|e| is_error(e) && e.message.contains(&input.fragment))
            .max_by_key(|e| e.seq)
            .cloned()
        else {
            return Ok(json!({ "found": false, "fragment": input.fragment }));
        };

        let low = exemplar.seq.saturating_sub(input.span as u64);
        let high = exemplar.seq.saturating_add(input.span as u64);
        let console_around: Vec<&ConsoleEvent> = console
            .iter()
            .filter(|e| e.seq >= low && e.seq <= high)
            .collect();
        let network_around: Vec<Value> = network
            .iter()
            .filter(|e| e.seq >= low && e.seq <= high)
            .map(|e| {
                json!({
                    "seq": e.seq,
                    "url": e.url,
                    "method": e.method,
                    "status": e.status,
                    "failure": e.failure,
                })
            })
            .collect();

        Ok(json!({
            "found": true,
            "error": exemplar,
            "console": console_around,
            "network": network_around,
        }))
    }
}

// ============================================================================
// error_trace_cause
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceCauseInput {
    #[serde(flatten)]
    session: SessionArgs,
    fragment: String,
}

pub struct ErrorTraceCauseTool;

#[async_trait]
impl Tool for ErrorTraceCauseTool {
    fn name(&self) -> &'static str {
        "error_trace_cause"
    }

    fn title(&self) -> &'static str {
        "Root-cause an error"
    }

    fn description(&self) -> String {
        "Load a page, select the newest console error containing the fragment, and produce a ranked root-cause hypothesis: classification with confidence, resolved stack, related error clusters, correlated network activity, and recommendations.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({ "fragment": { "type": "string", "description": "Substring of the error message" } }),
            &["fragment"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: TraceCauseInput = parse_input(input)?;
        let (console, network) = collect(&ctx, &input.session).await?;
        let report = reasoner::trace_cause(
            &console,
            &network,
            &input.fragment,
            &ctx.engine.source_maps,
        )
        .await;
        Ok(serde_json::to_value(report)?)
    }
}

// ============================================================================
// error_get_similar
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSimilarInput {
    #[serde(flatten)]
    session: SessionArgs,
    fragment: String,
}

pub struct ErrorGetSimilarTool;

#[async_trait]
impl Tool for ErrorGetSimilarTool {
    fn name(&self) -> &'static str {
        "error_get_similar"
    }

    fn title(&self) -> &'static str {
        "Cluster similar errors"
    }

    fn description(&self) -> String {
        "Load a page and group console errors matching the fragment by normalized message pattern (numbers, strings, and hex normalized out), with counts and first/last seen times.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({ "fragment": { "type": "string", "description": "Substring of the error message" } }),
            &["fragment"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetSimilarInput = parse_input(input)?;
        let (console, _) = collect(&ctx, &input.session).await?;

        let Some(exemplar) = console
            .iter()
            .filter(|e| is_error(e) && e.message.contains(&input.fragment))
            .max_by_key(|e| e.seq)
        else {
            return Ok(json!({ "found": false, "fragment": input.fragment, "clusters": [] }));
        };

        let key = reasoner::normalize_pattern(&exemplar.message);
        let clusters = reasoner::cluster_errors(&console);
        let own = clusters.iter().find(|c| c.pattern_key == key).cloned();

        // The fragment's own cluster plus clusters scoring above the
        // relatedness bar, most similar first.
        let mut result: Vec<Value> = Vec::new();
        if let Some(own) = &own {
            result.push(json!({ "cluster": own, "similarity": 1.0 }));
            let mut related: Vec<(f64, &reasoner::ErrorCluster)> = clusters
                .iter()
                .filter(|c| c.pattern_key != own.pattern_key)
                .map(|c| (reasoner::similarity(own, c), c))
                .filter(|(score, _)| *score > 0.3)
                .collect();
            related.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            for (score, cluster) in related {
                result.push(json!({ "cluster": cluster, "similarity": score }));
            }
        }

        Ok(json!({
            "found": true,
            "pattern": key,
            "clusters": result,
        }))
    }
}
