//! Source tools: map resolution, content retrieval, stacks, coverage

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_input, SessionArgs, Tool, ToolContext};
use crate::error::EngineError;
use crate::source_map::coverage::V8Coverage;
use crate::source_map::{language_of, symbols};

// ============================================================================
// source_map_resolve
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveInput {
    /// Generated script URL (the minified bundle)
    url: String,
    /// 1-based line in the generated file
    line: u32,
    /// 1-based column in the generated file
    column: u32,
}

pub struct SourceMapResolveTool;

#[async_trait]
impl Tool for SourceMapResolveTool {
    fn name(&self) -> &'static str {
        "source_map_resolve"
    }

    fn title(&self) -> &'static str {
        "Resolve a minified position"
    }

    fn description(&self) -> String {
        "Resolve a generated (minified) position to its original file, line, column, and symbol name via the bundle's source map. Lines and columns are 1-based.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Generated script URL" },
                "line": { "type": "integer", "description": "1-based generated line" },
                "column": { "type": "integer", "description": "1-based generated column" }
            },
            "required": ["url", "line", "column"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: ResolveInput = parse_input(input)?;
        let location = ctx
            .engine
            .source_maps
            .resolve_position(&input.url, input.line, input.column)
            .await?;
        Ok(serde_json::to_value(location)?)
    }
}

// ============================================================================
// source_map_get_content
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetContentInput {
    /// Bundle URL whose map indexes the file
    url: String,
    /// Original source path as listed in the map (suffix match allowed)
    file: String,
    #[serde(default)]
    start_line: Option<u32>,
    #[serde(default)]
    end_line: Option<u32>,
}

pub struct SourceMapGetContentTool;

#[async_trait]
impl Tool for SourceMapGetContentTool {
    fn name(&self) -> &'static str {
        "source_map_get_content"
    }

    fn title(&self) -> &'static str {
        "Original source content"
    }

    fn description(&self) -> String {
        "Return the original content of a source file indexed by a bundle's map, optionally restricted to a 1-based line range. Content comes from sourcesContent when inline, otherwise a best-effort fetch.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Bundle URL" },
                "file": { "type": "string", "description": "Original source path from the map" },
                "startLine": { "type": "integer", "description": "1-based inclusive start" },
                "endLine": { "type": "integer", "description": "1-based inclusive end" }
            },
            "required": ["url", "file"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetContentInput = parse_input(input)?;
        let map = ctx.engine.source_maps.load(&input.url).await?;
        let source = ctx.engine.source_maps.source_content(&map, &input.file).await?;

        let total_lines = source.text.lines().count();
        let start = input.start_line.unwrap_or(1).max(1) as usize;
        let end = input.end_line.map_or(total_lines, |e| e as usize).min(total_lines);
        let content: String = source
            .text
            .lines()
            .skip(start - 1)
            .take(end.saturating_sub(start - 1))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(json!({
            "file": input.file,
            "language": language_of(&input.file),
            "totalLines": total_lines,
            "startLine": start,
            "endLine": end,
            "inline": source.inline,
            "content": content,
        }))
    }
}

// ============================================================================
// source_trace_stack
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceStackInput {
    /// Raw stack text in V8, SpiderMonkey, or JSC format
    stack: String,
}

pub struct SourceTraceStackTool;

#[async_trait]
impl Tool for SourceTraceStackTool {
    fn name(&self) -> &'static str {
        "source_trace_stack"
    }

    fn title(&self) -> &'static str {
        "Resolve a full stack trace"
    }

    fn description(&self) -> String {
        "Parse a stack trace (V8, SpiderMonkey, or JSC format) and resolve every frame to original sources. Frames whose maps are missing stay unresolved with a reason; the call never fails on a partial stack.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "stack": { "type": "string", "description": "Stack trace text" }
            },
            "required": ["stack"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: TraceStackInput = parse_input(input)?;
        let resolved = ctx.engine.source_maps.resolve_stack(&input.stack).await;
        Ok(serde_json::to_value(resolved)?)
    }
}

// ============================================================================
// source_find_definition
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindDefinitionInput {
    url: String,
    symbol: String,
    #[serde(default)]
    file: Option<String>,
}

pub struct SourceFindDefinitionTool;

#[async_trait]
impl Tool for SourceFindDefinitionTool {
    fn name(&self) -> &'static str {
        "source_find_definition"
    }

    fn title(&self) -> &'static str {
        "Find a symbol definition"
    }

    fn description(&self) -> String {
        "Best-effort lexical scan of a bundle's original sources for a symbol's definition. Returns file, position, the defining line, and sibling exports.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Bundle URL" },
                "symbol": { "type": "string", "description": "Identifier to locate" },
                "file": { "type": "string", "description": "Optional path-suffix filter" }
            },
            "required": ["url", "symbol"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: FindDefinitionInput = parse_input(input)?;
        let definition = symbols::find_definition(
            &ctx.engine.source_maps,
            &input.url,
            &input.symbol,
            input.file.as_deref(),
        )
        .await?;
        Ok(serde_json::to_value(definition)?)
    }
}

// ============================================================================
// source_get_symbols
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSymbolsInput {
    url: String,
    file: String,
}

pub struct SourceGetSymbolsTool;

#[async_trait]
impl Tool for SourceGetSymbolsTool {
    fn name(&self) -> &'static str {
        "source_get_symbols"
    }

    fn title(&self) -> &'static str {
        "List symbols of a source file"
    }

    fn description(&self) -> String {
        "List declaration-level symbols (functions, classes, bindings) of one original source file indexed by a bundle's map, with export flags.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Bundle URL" },
                "file": { "type": "string", "description": "Original source path" }
            },
            "required": ["url", "file"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetSymbolsInput = parse_input(input)?;
        let entries =
            symbols::get_symbols(&ctx.engine.source_maps, &input.url, &input.file).await?;
        Ok(json!({
            "file": input.file,
            "language": language_of(&input.file),
            "symbols": entries,
        }))
    }
}

// ============================================================================
// source_map_bundle
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapBundleInput {
    url: String,
    #[serde(default = "default_samples")]
    samples: usize,
}

fn default_samples() -> usize {
    10
}

pub struct SourceMapBundleTool;

#[async_trait]
impl Tool for SourceMapBundleTool {
    fn name(&self) -> &'static str {
        "source_map_bundle"
    }

    fn title(&self) -> &'static str {
        "Bundle source map overview"
    }

    fn description(&self) -> String {
        "Summarize a bundle's source map: the original sources it indexes (with inline-content flags) and a sample of mappings.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Bundle URL" },
                "samples": { "type": "integer", "description": "Sample mappings to include (default 10)" }
            },
            "required": ["url"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: MapBundleInput = parse_input(input)?;
        let map = ctx.engine.source_maps.load(&input.url).await?;

        let sources: Vec<Value> = map
            .sources()
            .iter()
            .enumerate()
            .map(|(idx, file)| {
                json!({
                    "file": file,
                    "language": language_of(file),
                    "hasInlineContent": map.inline_content(idx as u32).is_some(),
                })
            })
            .collect();

        let sample_mappings: Vec<String> = map
            .tokens()
            .take(input.samples)
            .map(|t| {
                format!(
                    "{}:{} -> {}:{}:{}{}",
                    t.get_dst_line() + 1,
                    t.get_dst_col() + 1,
                    t.get_source().unwrap_or("<none>"),
                    t.get_src_line() + 1,
                    t.get_src_col() + 1,
                    t.get_name().map(|n| format!(" ({n})")).unwrap_or_default(),
                )
            })
            .collect();

        Ok(json!({
            "bundleUrl": map.bundle_url,
            "mapUrl": map.map_url,
            "sourceCount": sources.len(),
            "sources": sources,
            "sampleMappings": sample_mappings,
        }))
    }
}

// ============================================================================
// source_coverage_map
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverageMapInput {
    /// Live mode: load this page with the coverage profiler enabled
    #[serde(default)]
    url: Option<String>,
    /// Offline mode: a V8 precise-coverage object to map instead
    #[serde(default)]
    coverage: Option<V8Coverage>,
    #[serde(default)]
    settle_ms: Option<u64>,
}

pub struct SourceCoverageMapTool;

#[async_trait]
impl Tool for SourceCoverageMapTool {
    fn name(&self) -> &'static str {
        "source_coverage_map"
    }

    fn title(&self) -> &'static str {
        "Map V8 coverage to original sources"
    }

    fn description(&self) -> String {
        "Map V8 precise coverage onto original source lines per file. Pass a coverage object, or a url to collect live coverage from a page visit.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Page to profile (live mode)" },
                "coverage": { "type": "object", "description": "V8 precise-coverage object (offline mode)" },
                "settleMs": { "type": "integer" }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: CoverageMapInput = parse_input(input)?;

        // (script url, covered ranges) pairs from either mode
        let scripts: Vec<(String, Vec<(u32, u32)>)> = if let Some(coverage) = input.coverage {
            coverage
                .result
                .iter()
                .filter(|s| s.url.starts_with("http"))
                .map(|s| (s.url.clone(), s.covered_ranges()))
                .collect()
        } else if let Some(url) = &input.url {
            let session_args = SessionArgs {
                url: url.clone(),
                settle_ms: input.settle_ms,
                user_agent: None,
                viewport_width: None,
                viewport_height: None,
                extra_headers: None,
            };
            let page = ctx
                .engine
                .browser
                .acquire(url, session_args.options(true))
                .await?;
            page.finish_coverage().await?;
            let events = {
                let buffer = page.buffer();
                let guard = buffer
                    .lock()
                    .map_err(|_| EngineError::internal("event buffer poisoned"))?;
                guard.coverage_snapshot()
            };
            page.close().await;
            events
                .into_iter()
                .filter(|e| e.script_url.starts_with("http"))
                .map(|e| (e.script_url, e.ranges_covered))
                .collect()
        } else {
            return Err(EngineError::invalid_argument(
                "pass either `url` (live) or `coverage` (offline)",
            ));
        };

        let mut per_file = Vec::new();
        let mut unmapped = Vec::new();
        for (script_url, ranges) in scripts {
            match ctx.engine.source_maps.map_coverage(&script_url, &ranges).await {
                Ok(mut files) => per_file.append(&mut files),
                Err(e) => unmapped.push(json!({ "scriptUrl": script_url, "reason": e.message })),
            }
        }

        Ok(json!({ "files": per_file, "unmapped": unmapped }))
    }
}
