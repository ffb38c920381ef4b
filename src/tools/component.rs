//! Component tools: framework-aware introspection of a live page

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{page_tool_schema, parse_input, SessionArgs, Tool, ToolContext};
use crate::browser::PageSession;
use crate::component;
use crate::error::EngineError;

/// Component tools observe the DOM, not post-load network traffic; a
/// shorter settle keeps them snappy unless overridden.
const COMPONENT_SETTLE_MS: u64 = 2000;

async fn acquire(ctx: &ToolContext, session: &SessionArgs) -> Result<PageSession, EngineError> {
    let mut args = session.clone();
    if args.settle_ms.is_none() {
        args.settle_ms = Some(COMPONENT_SETTLE_MS);
    }
    ctx.engine
        .browser
        .acquire(&args.url, args.options(false))
        .await
}

// ============================================================================
// component_tree
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TreeInput {
    #[serde(flatten)]
    session: SessionArgs,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default = "default_depth")]
    max_depth: u32,
    #[serde(default)]
    include_props: bool,
}

fn default_depth() -> u32 {
    10
}

pub struct ComponentTreeTool;

#[async_trait]
impl Tool for ComponentTreeTool {
    fn name(&self) -> &'static str {
        "component_tree"
    }

    fn title(&self) -> &'static str {
        "Component tree"
    }

    fn description(&self) -> String {
        "Return the framework component tree of a page (React, Vue, Angular, Svelte), depth-bounded, optionally scoped to a selector and carrying props. Falls back to a DOM-heuristic tree when no framework hooks are found.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "selector": { "type": "string", "description": "Scope the tree to this element" },
                "maxDepth": { "type": "integer", "description": "Depth bound (default 10)" },
                "includeProps": { "type": "boolean", "description": "Attach serialized props to each node" }
            }),
            &[],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: TreeInput = parse_input(input)?;
        let page = acquire(&ctx, &input.session).await?;
        let result = component::tree(
            page.page(),
            input.selector.as_deref(),
            input.max_depth,
            input.include_props,
        )
        .await;
        page.close().await;
        result
    }
}

// ============================================================================
// component_find_by_name
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindByNameInput {
    #[serde(flatten)]
    session: SessionArgs,
    name: String,
    #[serde(default)]
    exact: bool,
}

pub struct ComponentFindByNameTool;

#[async_trait]
impl Tool for ComponentFindByNameTool {
    fn name(&self) -> &'static str {
        "component_find_by_name"
    }

    fn title(&self) -> &'static str {
        "Find component instances by name"
    }

    fn description(&self) -> String {
        "Find rendered instances of a component by name, with a selector hint, viewport coordinates, and visibility for each instance.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "name": { "type": "string", "description": "Component name (substring unless exact)" },
                "exact": { "type": "boolean", "description": "Exact-match the name" }
            }),
            &["name"],
        )
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: FindByNameInput = parse_input(input)?;
        let page = acquire(&ctx, &input.session).await?;
        let result = component::find_by_name(page.page(), &input.name, input.exact).await;
        page.close().await;
        result
    }
}

// ============================================================================
// Selector-scoped accessors share one input shape
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectorInput {
    #[serde(flatten)]
    session: SessionArgs,
    selector: String,
    /// Meaning depends on the tool: includeDefaults / includeComputed /
    /// includeEffects / includeProviders
    #[serde(default)]
    include_extras: bool,
}

fn selector_schema(extra_flag: &str, extra_desc: &str) -> Value {
    page_tool_schema(
        json!({
            "selector": { "type": "string", "description": "CSS selector of the component's element" },
            extra_flag: { "type": "boolean", "description": extra_desc }
        }),
        &["selector"],
    )
}

macro_rules! selector_tool {
    ($tool:ident, $name:literal, $title:literal, $desc:literal, $flag:literal, $flag_desc:literal, $op:path) => {
        pub struct $tool;

        #[async_trait]
        impl Tool for $tool {
            fn name(&self) -> &'static str {
                $name
            }

            fn title(&self) -> &'static str {
                $title
            }

            fn description(&self) -> String {
                $desc.to_string()
            }

            fn input_schema(&self) -> Value {
                selector_schema($flag, $flag_desc)
            }

            async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
                // The per-tool flag arrives under its own name.
                let mut input = input;
                if let Some(map) = input.as_object_mut() {
                    if let Some(flag) = map.remove($flag) {
                        map.insert("includeExtras".to_string(), flag);
                    }
                }
                let input: SelectorInput = parse_input(input)?;
                let page = acquire(&ctx, &input.session).await?;
                let result = $op(page.page(), &input.selector, input.include_extras).await;
                page.close().await;
                result
            }
        }
    };
}

selector_tool!(
    ComponentGetPropsTool,
    "component_get_props",
    "Component props",
    "Return the serialized props of the component owning the selected element. Degrades to {supported:false} when no framework hook exposes them.",
    "includeDefaults",
    "Include props that equal their defaults",
    component::get_props
);

selector_tool!(
    ComponentGetStateTool,
    "component_get_state",
    "Component state",
    "Return the component's state: class state or hook states for React, data/setupState for Vue, instance fields for Angular.",
    "includeComputed",
    "Include computed values (Vue)",
    component::get_state
);

selector_tool!(
    ComponentGetHooksTool,
    "component_get_hooks",
    "Component hooks",
    "Enumerate a React function component's hooks with best-effort kinds (state, ref, effect) and serialized values.",
    "includeEffects",
    "Include effect hooks",
    component::get_hooks
);

selector_tool!(
    ComponentGetContextTool,
    "component_get_context",
    "Component context",
    "Return the contexts visible to the component: React context providers up the tree, or Vue provide/inject pairs.",
    "includeProviders",
    "Name the providing component for each context",
    component::get_context
);

// ============================================================================
// component_track_renders
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackRendersInput {
    #[serde(flatten)]
    session: SessionArgs,
    selector: String,
    #[serde(default = "default_duration")]
    duration_ms: u64,
    #[serde(default)]
    capture_reasons: bool,
}

fn default_duration() -> u64 {
    5000
}

pub struct ComponentTrackRendersTool;

#[async_trait]
impl Tool for ComponentTrackRendersTool {
    fn name(&self) -> &'static str {
        "component_track_renders"
    }

    fn title(&self) -> &'static str {
        "Track renders over a window"
    }

    fn description(&self) -> String {
        "Observe the selected element for a duration and count renders: React devtools commit notifications when the hook is present, DOM mutations otherwise. Returns count, events, and average interval.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(
            json!({
                "selector": { "type": "string" },
                "durationMs": { "type": "integer", "description": "Observation window (default 5000)" },
                "captureReasons": { "type": "boolean", "description": "Annotate each event with its trigger" }
            }),
            &["selector"],
        )
    }

    fn timeout(&self) -> Option<std::time::Duration> {
        // Observation window + navigation + settle headroom.
        Some(std::time::Duration::from_secs(60))
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: TrackRendersInput = parse_input(input)?;
        let page = acquire(&ctx, &input.session).await?;
        let result = component::track_renders(
            page.page(),
            &input.selector,
            input.duration_ms,
            input.capture_reasons,
        )
        .await;
        page.close().await;
        result
    }
}

// ============================================================================
// component_get_source
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetSourceInput {
    #[serde(flatten)]
    session: SessionArgs,
    selector: String,
}

pub struct ComponentGetSourceTool;

#[async_trait]
impl Tool for ComponentGetSourceTool {
    fn name(&self) -> &'static str {
        "component_get_source"
    }

    fn title(&self) -> &'static str {
        "Component source location"
    }

    fn description(&self) -> String {
        "Return the source file, line, and column of the component owning the selected element, combining devtools source info with source map resolution when the position is generated.".to_string()
    }

    fn input_schema(&self) -> Value {
        page_tool_schema(json!({ "selector": { "type": "string" } }), &["selector"])
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Result<Value, EngineError> {
        let input: GetSourceInput = parse_input(input)?;
        let page = acquire(&ctx, &input.session).await?;
        let mut result = component::get_source(page.page(), &input.selector).await?;
        page.close().await;

        // Generated positions (a bundle URL rather than an original path)
        // go through the source map cache.
        let generated = result
            .get("generated")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if generated {
            let file = result.get("file").and_then(Value::as_str).map(str::to_string);
            let line = result.get("line").and_then(Value::as_u64);
            let column = result.get("column").and_then(Value::as_u64);
            if let (Some(file), Some(line), Some(column)) = (file, line, column) {
                if let Ok(resolved) = ctx
                    .engine
                    .source_maps
                    .resolve_position(&file, line as u32, column as u32)
                    .await
                {
                    if let Some(map) = result.as_object_mut() {
                        map.insert("original".to_string(), serde_json::to_value(resolved)?);
                    }
                }
            }
        }
        Ok(result)
    }
}
