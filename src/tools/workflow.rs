//! Workflow tools: multi-subsystem debugging entry points

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{page_tool_schema, parse_input, SessionArgs, Tool, ToolContext};
use crate::component;
use crate::error::EngineError;
use crate::instrument::ConsoleKind;
use crate::reasoner;

// ============================================================================
// debug_frontend_issue
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugIssueInput {
    #[serde(flatten)]
    session: SessionArgs,
    /// Substring of the error to focus on; defaults to the newest error
    #[serde(default)]
    fragment: Option<String>,
}

pub struct DebugFrontendIssueTool;

#[async_trait]
impl Tool for DebugFrontendIssueTool {
    fn name(&self) -> &'static str {
        "debug_frontend_issue"
    }

    fn title(&self) -> &'static str {
        "Debug a frontend issue end to end"
    }

    fn description(&self) -> String {
        "Load a page, collect console and network evidence, detect the UI framework, and synthesize a root-cause hypothesis for the focused (or newest) error with recommendations. The broadest starting point when you only have a URL and a symptom.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({ "fragment": { "type": "string", "description": "Error-message substring to focus on" } }),
            &[],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: DebugIssueInput = parse_input(input)?;
        let page = ctx
            .engine
            .browser
            .acquire(&input.session.url, input.session.options(false))
            .await?;

        let framework = component::detect(page.page(), None).await.unwrap_or(json!({
            "framework": "unknown"
        }));

        let (console, network) = {
            let buffer = page.buffer();
            let guard = buffer
                .lock()
                .map_err(|_| EngineError::internal("event buffer poisoned"))?;
            (guard.console_snapshot(), guard.network_snapshot())
        };
        page.close().await;

        let error_count = console
            .iter()
            .filter(|e| matches!(e.kind, ConsoleKind::Error | ConsoleKind::PageError))
            .count();
        let failed_requests: Vec<Value> = network
            .iter()
            .filter(|e| e.is_failed())
            .map(|e| {
                json!({
                    "url": e.url,
                    "method": e.method,
                    "status": e.status,
                    "failure": e.failure,
                })
            })
            .collect();

        // Focus on the requested fragment, else the newest error.
        let fragment = input.fragment.clone().or_else(|| {
            console
                .iter()
                .filter(|e| matches!(e.kind, ConsoleKind::Error | ConsoleKind::PageError))
                .max_by_key(|e| e.seq)
                .map(|e| e.message.lines().next().unwrap_or("").to_string())
        });

        let diagnosis = match &fragment {
            Some(fragment) => Some(
                reasoner::trace_cause(&console, &network, fragment, &ctx.engine.source_maps).await,
            ),
            None => None,
        };

        let clusters = reasoner::cluster_errors(&console);

        Ok(json!({
            "url": input.session.url,
            "observedAt": chrono::Utc::now().to_rfc3339(),
            "framework": framework,
            "errorCount": error_count,
            "errorClusters": clusters,
            "failedRequests": failed_requests,
            "diagnosis": diagnosis,
        }))
    }
}

// ============================================================================
// analyze_performance
// ============================================================================

/// Navigation/paint timing snapshot, taken after the settle window
const PERFORMANCE_SCRIPT: &str = r#"
(function () {
  var out = { paint: {} };
  performance.getEntriesByType('paint').forEach(function (p) {
    out.paint[p.name] = Math.round(p.startTime);
  });
  var nav = performance.getEntriesByType('navigation')[0];
  if (nav) {
    out.navigation = {
      ttfbMs: Math.round(nav.responseStart),
      domInteractiveMs: Math.round(nav.domInteractive),
      domContentLoadedMs: Math.round(nav.domContentLoadedEventEnd),
      loadMs: Math.round(nav.loadEventEnd),
      transferSizeBytes: nav.transferSize || 0
    };
  }
  out.resourceCount = performance.getEntriesByType('resource').length;
  return out;
})()
"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzePerformanceInput {
    #[serde(flatten)]
    session: SessionArgs,
    #[serde(default = "default_slowest")]
    slowest: usize,
}

fn default_slowest() -> usize {
    10
}

pub struct AnalyzePerformanceTool;

#[async_trait]
impl Tool for AnalyzePerformanceTool {
    fn name(&self) -> &'static str {
        "analyze_performance"
    }

    fn title(&self) -> &'static str {
        "Analyze page load performance"
    }

    fn description(&self) -> String {
        "Load a page and report navigation/paint timing plus the slowest network requests with their phase breakdowns.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({ "slowest": { "type": "integer", "description": "Slow requests to list (default 10)" } }),
            &[],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: AnalyzePerformanceInput = parse_input(input)?;
        let page = ctx
            .engine
            .browser
            .acquire(&input.session.url, input.session.options(false))
            .await?;

        let timing = page
            .page()
            .evaluate(PERFORMANCE_SCRIPT)
            .await
            .map_err(|e| EngineError::session_terminated(format!("timing evaluation failed: {e}")))?
            .value()
            .cloned()
            .unwrap_or(Value::Null);

        let mut network = {
            let buffer = page.buffer();
            let guard = buffer
                .lock()
                .map_err(|_| EngineError::internal("event buffer poisoned"))?;
            guard.network_snapshot()
        };
        page.close().await;

        network.sort_by(|a, b| {
            let ta = a.timings.as_ref().and_then(|t| t.total).unwrap_or(0.0);
            let tb = b.timings.as_ref().and_then(|t| t.total).unwrap_or(0.0);
            tb.partial_cmp(&ta).unwrap_or(std::cmp::Ordering::Equal)
        });
        let slowest: Vec<Value> = network
            .iter()
            .take(input.slowest)
            .map(|e| {
                json!({
                    "url": e.url,
                    "method": e.method,
                    "status": e.status,
                    "timings": e.timings,
                })
            })
            .collect();

        Ok(json!({
            "url": input.session.url,
            "timing": timing,
            "requestCount": network.len(),
            "slowestRequests": slowest,
        }))
    }
}

// ============================================================================
// inspect_component_state
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectComponentInput {
    #[serde(flatten)]
    session: SessionArgs,
    selector: String,
}

pub struct InspectComponentStateTool;

#[async_trait]
impl Tool for InspectComponentStateTool {
    fn name(&self) -> &'static str {
        "inspect_component_state"
    }

    fn title(&self) -> &'static str {
        "Inspect a component in one pass"
    }

    fn description(&self) -> String {
        "Load a page once and return the selected component's props, state, hooks, and contexts together. Equivalent to the individual component tools but in a single session.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(json!({ "selector": { "type": "string" } }), &["selector"])
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: InspectComponentInput = parse_input(input)?;
        let page = ctx
            .engine
            .browser
            .acquire(&input.session.url, input.session.options(false))
            .await?;

        let props = component::get_props(page.page(), &input.selector, false).await?;
        let state = component::get_state(page.page(), &input.selector, true).await;
        let hooks = component::get_hooks(page.page(), &input.selector, true).await;
        let contexts = component::get_context(page.page(), &input.selector, true).await;
        page.close().await;

        Ok(json!({
            "selector": input.selector,
            "props": props,
            "state": state.unwrap_or(Value::Null),
            "hooks": hooks.unwrap_or(Value::Null),
            "contexts": contexts.unwrap_or(Value::Null),
        }))
    }
}

// ============================================================================
// trace_network_requests
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceNetworkInput {
    #[serde(flatten)]
    session: SessionArgs,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default = "default_trace_limit")]
    limit: usize,
}

fn default_trace_limit() -> usize {
    50
}

pub struct TraceNetworkRequestsTool;

#[async_trait]
impl Tool for TraceNetworkRequestsTool {
    fn name(&self) -> &'static str {
        "trace_network_requests"
    }

    fn title(&self) -> &'static str {
        "Trace a page's network activity"
    }

    fn description(&self) -> String {
        "Load a page and summarize its network activity in order: statuses, failures, timing totals, and which requests carry initiator stacks. Optionally filtered by a URL glob.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "pattern": { "type": "string", "description": "Optional URL glob filter" },
                "limit": { "type": "integer" }
            }),
            &[],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: TraceNetworkInput = parse_input(input)?;

        // Reuse the network tools' capture/filter path.
        let mut forwarded = serde_json::Map::new();
        forwarded.insert("url".to_string(), json!(input.session.url));
        forwarded.insert("limit".to_string(), json!(input.limit));
        if let Some(settle) = input.session.settle_ms {
            forwarded.insert("settleMs".to_string(), json!(settle));
        }
        match &input.pattern {
            Some(pattern) => {
                forwarded.insert("pattern".to_string(), json!(pattern));
                super::network::NetworkGetByUrlTool
                    .run(Value::Object(forwarded), ctx)
                    .await
            }
            None => {
                super::network::NetworkGetRequestsTool
                    .run(Value::Object(forwarded), ctx)
                    .await
            }
        }
    }
}

// ============================================================================
// analyze_bundle_size
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBundleInput {
    #[serde(default = "default_threshold")]
    threshold: u64,
}

fn default_threshold() -> u64 {
    100
}

pub struct AnalyzeBundleSizeTool;

#[async_trait]
impl Tool for AnalyzeBundleSizeTool {
    fn name(&self) -> &'static str {
        "analyze_bundle_size"
    }

    fn title(&self) -> &'static str {
        "Analyze bundle size"
    }

    fn description(&self) -> String {
        "Analyze the production bundle from its build manifest: totals by type, oversized assets, and deterministic recommendations (code splitting, lazy loading, duplication, CSS purge).".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "threshold": { "type": "integer", "description": "Per-asset threshold in KiB (default 100)" }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: AnalyzeBundleInput = parse_input(input)?;
        let manifest = ctx.engine.build.manifest().await?;
        let report = ctx.engine.build.analyze_size(input.threshold).await?;
        Ok(json!({
            "bundler": manifest.r#type,
            "chunkCount": manifest.chunks.len(),
            "moduleCount": manifest.modules.len(),
            "report": report,
        }))
    }
}

// ============================================================================
// resolve_minified_error
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveMinifiedInput {
    /// Full error text including the stack
    stack: String,
}

pub struct ResolveMinifiedErrorTool;

#[async_trait]
impl Tool for ResolveMinifiedErrorTool {
    fn name(&self) -> &'static str {
        "resolve_minified_error"
    }

    fn title(&self) -> &'static str {
        "Resolve a minified error"
    }

    fn description(&self) -> String {
        "Take a production error (message plus stack) and return the stack resolved to original files, lines, and symbol names, with the top resolved frame highlighted.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "stack": { "type": "string", "description": "Error text with its stack trace" }
            },
            "required": ["stack"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: ResolveMinifiedInput = parse_input(input)?;
        let resolved = ctx.engine.source_maps.resolve_stack(&input.stack).await;

        let top = resolved
            .frames
            .iter()
            .find_map(|f| f.location.as_ref().filter(|l| l.resolved));
        let summary = top.map(|l| {
            format!(
                "{}:{}:{}{}",
                l.original_file.as_deref().unwrap_or("<unknown>"),
                l.original_line.unwrap_or(0),
                l.original_column.unwrap_or(0),
                l.original_name
                    .as_deref()
                    .map(|n| format!(" in {n}"))
                    .unwrap_or_default(),
            )
        });

        Ok(json!({
            "topFrame": summary,
            "stack": resolved,
        }))
    }
}
