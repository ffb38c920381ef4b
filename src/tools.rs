//! Tool dispatcher: trait, registry, timeouts, pagination, output caps
//!
//! Tools are stateless singletons; everything per-call arrives through
//! `ToolContext`. The dispatcher validates input first, bounds each call
//! with a wall-clock timeout (dropping the call future releases any page
//! session it holds), and enforces the serialized output budget.

pub mod build;
pub mod component;
pub mod error;
pub mod network;
pub mod source;
pub mod workflow;

#[cfg(test)]
mod integration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::browser::SessionOptions;
use crate::engine::Engine;
use crate::error::EngineError;

/// All context a tool invocation needs
#[derive(Clone)]
pub struct ToolContext {
    pub engine: Arc<Engine>,
}

impl ToolContext {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

/// Trait for the engine's tools. Every tool is read-only, non-destructive,
/// and idempotent per input under fixed page state.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Human-readable title for protocol metadata
    fn title(&self) -> &'static str;

    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Per-tool wall-clock override; None uses the configured default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError>;
}

/// Deserialize tool input, mapping failures to `InvalidArgument` before
/// any session work happens.
pub fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, EngineError> {
    serde_json::from_value(input)
        .map_err(|e| EngineError::invalid_argument(format!("invalid input: {e}")))
}

/// Arguments shared by every tool that drives a live page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArgs {
    pub url: String,
    #[serde(default)]
    pub settle_ms: Option<u64>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub viewport_width: Option<u32>,
    #[serde(default)]
    pub viewport_height: Option<u32>,
    #[serde(default)]
    pub extra_headers: Option<serde_json::Map<String, Value>>,
}

impl SessionArgs {
    pub fn options(&self, coverage: bool) -> SessionOptions {
        SessionOptions {
            viewport: self.viewport_width.zip(self.viewport_height),
            user_agent: self.user_agent.clone(),
            extra_headers: self.extra_headers.clone(),
            coverage,
            settle: self.settle_ms.map(Duration::from_millis),
        }
    }
}

/// Schema fragment for `SessionArgs`, merged into each page tool's schema
pub fn session_properties() -> Value {
    json!({
        "url": { "type": "string", "description": "Page URL to load and observe" },
        "settleMs": { "type": "integer", "description": "Quiet period after load during which events are collected (default from config)" },
        "userAgent": { "type": "string", "description": "Override the browser user agent" },
        "viewportWidth": { "type": "integer", "description": "Viewport width in px" },
        "viewportHeight": { "type": "integer", "description": "Viewport height in px" },
        "extraHeaders": { "type": "object", "description": "Extra HTTP headers sent with every request" }
    })
}

/// Merge extra properties into the shared session schema.
pub fn page_tool_schema(extra: Value, required: &[&str]) -> Value {
    let mut properties = session_properties();
    if let (Some(base), Some(more)) = (properties.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            base.insert(k.clone(), v.clone());
        }
    }
    let mut req: Vec<&str> = vec!["url"];
    req.extend_from_slice(required);
    json!({ "type": "object", "properties": properties, "required": req })
}

/// Offset-cursor pagination over a ranked list. Returns the page, the next
/// cursor (when more remains), and the total count.
pub fn paginate<T>(
    items: Vec<T>,
    limit: usize,
    cursor: Option<&str>,
) -> (Vec<T>, Option<String>, usize) {
    let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
    let total = items.len();
    let page: Vec<T> = items.into_iter().skip(offset).take(limit.max(1)).collect();
    let consumed = offset + page.len();
    let next = (consumed < total).then(|| consumed.to_string());
    (page, next, total)
}

fn serialized_len(value: &Value) -> usize {
    serde_json::to_string(value).map_or(usize::MAX, |s| s.len())
}

/// Enforce the serialized output budget. When the payload exceeds the cap,
/// the largest array field is trimmed from the tail (tools rank their
/// lists most-informative-first) and truncation metadata is attached.
pub fn enforce_output_cap(mut value: Value, cap: usize) -> Value {
    if serialized_len(&value) <= cap {
        return value;
    }

    let target = value.as_object().and_then(|map| {
        map.iter()
            .filter(|(_, v)| v.is_array())
            .max_by_key(|(_, v)| serialized_len(v))
            .map(|(k, _)| k.clone())
    });

    if let Some(key) = target {
        let total = value
            .get(&key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let mut returned = total;
        while returned > 0 && serialized_len(&value) > cap {
            if let Some(arr) = value.get_mut(&key).and_then(Value::as_array_mut) {
                arr.pop();
            }
            returned -= 1;
        }
        if returned < total {
            if let Some(map) = value.as_object_mut() {
                map.insert("truncated".to_string(), json!(true));
                map.insert("totalItems".to_string(), json!(total));
                map.insert("returnedItems".to_string(), json!(returned));
            }
            return value;
        }
    }

    // No array to trim: replace the payload with a bounded preview.
    let text = serde_json::to_string(&value).unwrap_or_default();
    let preview: String = text.chars().take(cap).collect();
    json!({ "truncated": true, "preview": preview })
}

/// Collection of every advertised tool
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn standard() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            // Workflow
            Arc::new(workflow::DebugFrontendIssueTool),
            Arc::new(workflow::AnalyzePerformanceTool),
            Arc::new(workflow::InspectComponentStateTool),
            Arc::new(workflow::TraceNetworkRequestsTool),
            Arc::new(workflow::AnalyzeBundleSizeTool),
            Arc::new(workflow::ResolveMinifiedErrorTool),
            // Component
            Arc::new(component::ComponentTreeTool),
            Arc::new(component::ComponentGetPropsTool),
            Arc::new(component::ComponentGetStateTool),
            Arc::new(component::ComponentFindByNameTool),
            Arc::new(component::ComponentGetSourceTool),
            Arc::new(component::ComponentTrackRendersTool),
            Arc::new(component::ComponentGetContextTool),
            Arc::new(component::ComponentGetHooksTool),
            // Network
            Arc::new(network::NetworkGetRequestsTool),
            Arc::new(network::NetworkGetByUrlTool),
            Arc::new(network::NetworkGetTimingTool),
            Arc::new(network::NetworkTraceInitiatorTool),
            Arc::new(network::NetworkGetHeadersTool),
            Arc::new(network::NetworkGetBodyTool),
            // Source
            Arc::new(source::SourceMapResolveTool),
            Arc::new(source::SourceMapGetContentTool),
            Arc::new(source::SourceTraceStackTool),
            Arc::new(source::SourceFindDefinitionTool),
            Arc::new(source::SourceGetSymbolsTool),
            Arc::new(source::SourceMapBundleTool),
            Arc::new(source::SourceCoverageMapTool),
            // Build
            Arc::new(build::BuildGetManifestTool),
            Arc::new(build::BuildGetChunksTool),
            Arc::new(build::BuildFindModuleTool),
            Arc::new(build::BuildGetDependenciesTool),
            Arc::new(build::BuildAnalyzeSizeTool),
            // Error
            Arc::new(error::ErrorResolveStackTool),
            Arc::new(error::ErrorGetContextTool),
            Arc::new(error::ErrorTraceCauseTool),
            Arc::new(error::ErrorGetSimilarTool),
        ];
        Self { tools }
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute a tool with timeout and output-cap enforcement. A timeout
    /// drops the call future, which releases any held page session via its
    /// drop backstop.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<Value, EngineError> {
        let Some(tool) = self.find(name) else {
            return Err(EngineError::not_found(format!("unknown tool `{name}`")));
        };
        let deadline = tool.timeout().unwrap_or(ctx.engine.config.tool_timeout);
        let cap = ctx.engine.config.output_cap;

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(deadline, tool.run(input, ctx)).await;
        match result {
            Ok(Ok(value)) => {
                tracing::debug!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool ok"
                );
                Ok(enforce_output_cap(value, cap))
            }
            Ok(Err(e)) => {
                tracing::debug!(tool = name, kind = e.kind.as_str(), "tool failed: {e}");
                Err(e)
            }
            Err(_) => Err(EngineError::timeout(format!(
                "{name} exceeded its {deadline:?} deadline"
            ))
            .with_hint("Raise the per-tool timeout or reduce the settle interval.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_advertises_exactly_the_implemented_tools() {
        let registry = ToolRegistry::standard();
        assert_eq!(registry.tools().len(), 36);

        for expected in [
            "debug_frontend_issue",
            "component_tree",
            "network_get_by_url",
            "source_map_resolve",
            "build_analyze_size",
            "error_trace_cause",
        ] {
            assert!(registry.find(expected).is_some(), "missing {expected}");
        }

        // Names are unique.
        let mut names: Vec<&str> = registry.tools().iter().map(|t| t.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn pagination_windows_are_stable() {
        let items: Vec<u32> = (0..200).collect();
        let (page, next, total) = paginate(items.clone(), 50, None);
        assert_eq!(page.len(), 50);
        assert_eq!(page[0], 0);
        assert_eq!(next.as_deref(), Some("50"));
        assert_eq!(total, 200);

        let (page2, next2, _) = paginate(items.clone(), 50, next.as_deref());
        assert_eq!(page2[0], 50);
        assert_eq!(next2.as_deref(), Some("100"));

        let (tail, none, _) = paginate(items, 50, Some("150"));
        assert_eq!(tail.len(), 50);
        assert_eq!(none, None);
    }

    #[test]
    fn output_cap_trims_largest_array_and_keeps_prefix() {
        let value = json!({
            "requests": (0..100).map(|i| json!({"idx": i, "padding": "x".repeat(50)})).collect::<Vec<_>>(),
            "note": "small"
        });
        let capped = enforce_output_cap(value, 2000);
        let text = serde_json::to_string(&capped).unwrap();
        assert!(text.len() <= 2100, "cap overshoot: {}", text.len());
        assert_eq!(capped["truncated"], json!(true));
        assert_eq!(capped["totalItems"], json!(100));
        let returned = capped["returnedItems"].as_u64().unwrap();
        assert!(returned < 100);
        assert_eq!(capped["requests"][0]["idx"], json!(0));
    }

    #[test]
    fn output_under_cap_is_untouched() {
        let value = json!({"a": [1, 2, 3]});
        let capped = enforce_output_cap(value.clone(), 25_000);
        assert_eq!(capped, value);
    }
}
