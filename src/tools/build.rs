//! Build tools: static bundle queries over the artifact index

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{paginate, parse_input, Tool, ToolContext};
use crate::error::EngineError;

// ============================================================================
// build_get_manifest
// ============================================================================

pub struct BuildGetManifestTool;

#[async_trait]
impl Tool for BuildGetManifestTool {
    fn name(&self) -> &'static str {
        "build_get_manifest"
    }

    fn title(&self) -> &'static str {
        "Normalized build manifest"
    }

    fn description(&self) -> String {
        "Return the normalized build manifest (bundler type, chunks, assets, modules) loaded from stats.json or manifest.json under PROJECT_ROOT.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let manifest = ctx.engine.build.manifest().await?;
        Ok(serde_json::to_value(&*manifest)?)
    }
}

// ============================================================================
// build_get_chunks
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunksInput {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    cursor: Option<String>,
}

fn default_limit() -> usize {
    50
}

pub struct BuildGetChunksTool;

#[async_trait]
impl Tool for BuildGetChunksTool {
    fn name(&self) -> &'static str {
        "build_get_chunks"
    }

    fn title(&self) -> &'static str {
        "List bundle chunks"
    }

    fn description(&self) -> String {
        "List the bundle's chunks with files, contained modules, sizes, and entry/initial flags, largest first.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer" },
                "cursor": { "type": "string" }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: ChunksInput = parse_input(input)?;
        let mut chunks = ctx.engine.build.chunks().await?;
        // Largest first: the informative prefix under truncation.
        chunks.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.id.cmp(&b.id)));
        let (page, next_cursor, total) = paginate(chunks, input.limit, input.cursor.as_deref());
        Ok(json!({
            "chunks": page,
            "total": total,
            "nextCursor": next_cursor,
        }))
    }
}

// ============================================================================
// build_find_module
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindModuleInput {
    name: String,
}

pub struct BuildFindModuleTool;

#[async_trait]
impl Tool for BuildFindModuleTool {
    fn name(&self) -> &'static str {
        "build_find_module"
    }

    fn title(&self) -> &'static str {
        "Find a module in the bundle"
    }

    fn description(&self) -> String {
        "Find a module by name (case-insensitive substring, fuzzy fallback; scoped packages respected) and return its chunks and dependencies.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Module name or fragment, e.g. lodash or @scope/pkg" }
            },
            "required": ["name"]
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: FindModuleInput = parse_input(input)?;
        let module = ctx.engine.build.find_module(&input.name).await?;
        Ok(serde_json::to_value(module)?)
    }
}

// ============================================================================
// build_get_dependencies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependenciesInput {
    #[serde(default)]
    module: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    cursor: Option<String>,
}

pub struct BuildGetDependenciesTool;

#[async_trait]
impl Tool for BuildGetDependenciesTool {
    fn name(&self) -> &'static str {
        "build_get_dependencies"
    }

    fn title(&self) -> &'static str {
        "Module dependency frontier"
    }

    fn description(&self) -> String {
        "Dependencies and dependents of one module (fuzzy-matched), or of every module when no name is given.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "module": { "type": "string", "description": "Module name; omit for all modules" },
                "limit": { "type": "integer" },
                "cursor": { "type": "string" }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: DependenciesInput = parse_input(input)?;
        let entries = ctx
            .engine
            .build
            .dependencies(input.module.as_deref())
            .await?;
        let (page, next_cursor, total) = paginate(entries, input.limit, input.cursor.as_deref());
        Ok(json!({
            "modules": page,
            "total": total,
            "nextCursor": next_cursor,
        }))
    }
}

// ============================================================================
// build_analyze_size
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeSizeInput {
    /// Assets larger than this are listed individually (KiB)
    #[serde(default = "default_threshold")]
    threshold: u64,
}

fn default_threshold() -> u64 {
    100
}

pub struct BuildAnalyzeSizeTool;

#[async_trait]
impl Tool for BuildAnalyzeSizeTool {
    fn name(&self) -> &'static str {
        "build_analyze_size"
    }

    fn title(&self) -> &'static str {
        "Bundle size analysis"
    }

    fn description(&self) -> String {
        "Totals by asset type, assets exceeding a size threshold with their share of the bundle, and deterministic size recommendations.".to_string()
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
        let input: AnalyzeSizeInput = parse_input(input)?;
        let report = ctx.engine.build.analyze_size(input.threshold).await?;
        Ok(serde_json::to_value(report)?)
    }
}
