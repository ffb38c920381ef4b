//! Network tools: live-page request capture and queries

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{page_tool_schema, paginate, parse_input, SessionArgs, Tool, ToolContext};
use crate::error::EngineError;
use crate::instrument::NetworkEvent;

/// Compile a URL pattern: globs with a scheme match the whole URL,
/// path-style globs match the URL path.
fn matcher(pattern: &str) -> Result<(GlobMatcher, bool), EngineError> {
    let full_url = pattern.contains("://");
    let glob = Glob::new(pattern).map_err(|e| {
        EngineError::invalid_argument(format!("invalid url pattern `{pattern}`: {e}"))
    })?;
    Ok((glob.compile_matcher(), full_url))
}

fn url_matches(matcher: &(GlobMatcher, bool), url: &str) -> bool {
    let (glob, full_url) = matcher;
    if *full_url {
        return glob.is_match(url);
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) => glob.is_match(parsed.path()),
        Err(_) => glob.is_match(url),
    }
}

/// Capture the network buffer for one page visit, ordered by start time.
async fn collect(ctx: &ToolContext, session: &SessionArgs) -> Result<Vec<NetworkEvent>, EngineError> {
    let page = ctx
        .engine
        .browser
        .acquire(&session.url, session.options(false))
        .await?;
    let events = {
        let buffer = page.buffer();
        let guard = buffer
            .lock()
            .map_err(|_| EngineError::internal("event buffer poisoned"))?;
        guard.network_snapshot()
    };
    page.close().await;

    let mut events = events;
    events.sort_by(|a, b| {
        a.started_at_ms
            .partial_cmp(&b.started_at_ms)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(events)
}

fn summary(event: &NetworkEvent) -> Value {
    json!({
        "seq": event.seq,
        "url": event.url,
        "method": event.method,
        "resourceType": event.resource_type,
        "status": event.status,
        "failure": event.failure,
        "startedAtMs": event.started_at_ms,
        "endedAtMs": event.ended_at_ms,
        "totalMs": event.timings.as_ref().and_then(|t| t.total),
    })
}

// ============================================================================
// network_get_requests
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetRequestsInput {
    #[serde(flatten)]
    session: SessionArgs,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    cursor: Option<String>,
}

fn default_limit() -> usize {
    50
}

pub struct NetworkGetRequestsTool;

#[async_trait]
impl Tool for NetworkGetRequestsTool {
    fn name(&self) -> &'static str {
        "network_get_requests"
    }

    fn title(&self) -> &'static str {
        "List captured network requests"
    }

    fn description(&self) -> String {
        "Load a page and list every network request observed during the settle window, ordered by start time. Paginated via limit/cursor.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "limit": { "type": "integer", "description": "Requests per page (default 50)" },
                "cursor": { "type": "string", "description": "Cursor from a previous call" }
            }),
            &[],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetRequestsInput = parse_input(input)?;
        let events = collect(&ctx, &input.session).await?;
        let items: Vec<Value> = events.iter().map(summary).collect();
        let (page, next_cursor, total) = paginate(items, input.limit, input.cursor.as_deref());
        Ok(json!({
            "requests": page,
            "total": total,
            "nextCursor": next_cursor,
        }))
    }
}

// ============================================================================
// network_get_by_url
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ByUrlInput {
    #[serde(flatten)]
    session: SessionArgs,
    /// Glob over the URL path, or the full URL when a scheme is present
    pattern: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    cursor: Option<String>,
}

pub struct NetworkGetByUrlTool;

#[async_trait]
impl Tool for NetworkGetByUrlTool {
    fn name(&self) -> &'static str {
        "network_get_by_url"
    }

    fn title(&self) -> &'static str {
        "Find network requests by URL pattern"
    }

    fn description(&self) -> String {
        "Load a page and return the requests whose URL matches a glob pattern (e.g. /api/users/*), ordered by start time.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "pattern": { "type": "string", "description": "Glob matched against the URL path, or the full URL when it contains ://" },
                "limit": { "type": "integer" },
                "cursor": { "type": "string" }
            }),
            &["pattern"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: ByUrlInput = parse_input(input)?;
        let m = matcher(&input.pattern)?;
        let events = collect(&ctx, &input.session).await?;
        let items: Vec<Value> = events
            .iter()
            .filter(|e| url_matches(&m, &e.url))
            .map(summary)
            .collect();
        let (page, next_cursor, total) = paginate(items, input.limit, input.cursor.as_deref());
        Ok(json!({
            "pattern": input.pattern,
            "requests": page,
            "total": total,
            "nextCursor": next_cursor,
        }))
    }
}

// ============================================================================
// network_get_timing
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimingInput {
    #[serde(flatten)]
    session: SessionArgs,
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
}

pub struct NetworkGetTimingTool;

#[async_trait]
impl Tool for NetworkGetTimingTool {
    fn name(&self) -> &'static str {
        "network_get_timing"
    }

    fn title(&self) -> &'static str {
        "Request timing breakdown"
    }

    fn description(&self) -> String {
        "Load a page and return per-request phase timings (dns, connect, ssl, ttfb, download, total), slowest first.".to_string()
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
        let input: TimingInput = parse_input(input)?;
        let m = input.pattern.as_deref().map(matcher).transpose()?;
        let mut events = collect(&ctx, &input.session).await?;
        if let Some(m) = &m {
            events.retain(|e| url_matches(m, &e.url));
        }
        // Slowest first: the most informative prefix under truncation.
        events.sort_by(|a, b| {
            let ta = a.timings.as_ref().and_then(|t| t.total).unwrap_or(0.0);
            let tb = b.timings.as_ref().and_then(|t| t.total).unwrap_or(0.0);
            tb.partial_cmp(&ta).unwrap_or(std::cmp::Ordering::Equal)
        });
        let timings: Vec<Value> = events
            .iter()
            .take(input.limit)
            .map(|e| {
                json!({
                    "url": e.url,
                    "method": e.method,
                    "status": e.status,
                    "timings": e.timings,
                })
            })
            .collect();
        Ok(json!({ "requests": timings, "total": events.len() }))
    }
}

// ============================================================================
// network_trace_initiator
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiatorInput {
    #[serde(flatten)]
    session: SessionArgs,
    pattern: String,
    /// Resolve initiator frames to original sources via source maps
    #[serde(default = "default_true")]
    resolve: bool,
}

fn default_true() -> bool {
    true
}

pub struct NetworkTraceInitiatorTool;

#[async_trait]
impl Tool for NetworkTraceInitiatorTool {
    fn name(&self) -> &'static str {
        "network_trace_initiator"
    }

    fn title(&self) -> &'static str {
        "Trace what code issued a request"
    }

    fn description(&self) -> String {
        "Load a page and return the initiator call stack of requests matching a URL glob. Only fetch/XHR requests carry stacks; parser-initiated resources do not. Frames are resolved to original sources when maps are available.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "pattern": { "type": "string", "description": "URL glob of the requests to trace" },
                "resolve": { "type": "boolean", "description": "Resolve frames through source maps (default true)" }
            }),
            &["pattern"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: InitiatorInput = parse_input(input)?;
        let m = matcher(&input.pattern)?;
        let events = collect(&ctx, &input.session).await?;

        let mut traces = Vec::new();
        for event in events.iter().filter(|e| url_matches(&m, &e.url)).take(20) {
            let mut frames = Vec::new();
            if let Some(stack) = &event.initiator_stack {
                for frame in stack {
                    let resolved = if input.resolve && frame.line > 0 {
                        ctx.engine
                            .source_maps
                            .resolve_position(&frame.url, frame.line, frame.column.max(1))
                            .await
                            .ok()
                            .filter(|loc| loc.resolved)
                    } else {
                        None
                    };
                    frames.push(json!({
                        "function": frame.function,
                        "url": frame.url,
                        "line": frame.line,
                        "column": frame.column,
                        "original": resolved,
                    }));
                }
            }
            traces.push(json!({
                "url": event.url,
                "method": event.method,
                "hasInitiatorStack": event.initiator_stack.is_some(),
                "frames": frames,
            }));
        }
        Ok(json!({ "pattern": input.pattern, "traces": traces }))
    }
}

// ============================================================================
// network_get_headers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadersInput {
    #[serde(flatten)]
    session: SessionArgs,
    pattern: String,
    #[serde(default = "default_headers_limit")]
    limit: usize,
}

fn default_headers_limit() -> usize {
    10
}

pub struct NetworkGetHeadersTool;

#[async_trait]
impl Tool for NetworkGetHeadersTool {
    fn name(&self) -> &'static str {
        "network_get_headers"
    }

    fn title(&self) -> &'static str {
        "Request and response headers"
    }

    fn description(&self) -> String {
        "Load a page and return request/response headers for requests matching a URL glob. Sensitive headers are redacted.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "pattern": { "type": "string" },
                "limit": { "type": "integer", "description": "Matches returned (default 10)" }
            }),
            &["pattern"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: HeadersInput = parse_input(input)?;
        let m = matcher(&input.pattern)?;
        let events = collect(&ctx, &input.session).await?;
        let matches: Vec<Value> = events
            .iter()
            .filter(|e| url_matches(&m, &e.url))
            .take(input.limit)
            .map(|e| {
                json!({
                    "url": e.url,
                    "method": e.method,
                    "status": e.status,
                    "requestHeaders": e.request_headers,
                    "responseHeaders": e.response_headers,
                })
            })
            .collect();
        if matches.is_empty() {
            return Err(EngineError::not_found(format!(
                "no request matched `{}`",
                input.pattern
            )));
        }
        Ok(json!({ "pattern": input.pattern, "requests": matches }))
    }
}

// ============================================================================
// network_get_body
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyInput {
    #[serde(flatten)]
    session: SessionArgs,
    pattern: String,
}

pub struct NetworkGetBodyTool;

#[async_trait]
impl Tool for NetworkGetBodyTool {
    fn name(&self) -> &'static str {
        "network_get_body"
    }

    fn title(&self) -> &'static str {
        "Response body of a request"
    }

    fn description(&self) -> String {
        "Load a page and return the captured response body of the first completed request matching a URL glob. Bodies are capped; oversized bodies carry a truncation marker.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(json!({ "pattern": { "type": "string" } }), &["pattern"])
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: BodyInput = parse_input(input)?;
        let m = matcher(&input.pattern)?;
        let events = collect(&ctx, &input.session).await?;
        let hit = events
            .iter()
            .find(|e| url_matches(&m, &e.url) && e.response_body.is_some())
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "no completed response with a captured body matched `{}`",
                    input.pattern
                ))
                .with_hint("Bodies are captured for text-like resource types after the response finishes; raise settleMs if the request is slow.")
            })?;
        Ok(json!({
            "url": hit.url,
            "method": hit.method,
            "status": hit.status,
            "body": hit.response_body,
        }))
    }
}
