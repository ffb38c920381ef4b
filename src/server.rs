//! MCP server shell over the tool registry
//!
//! Thin by design: the registry owns validation, timeouts, and output
//! budgets; this layer only advertises tools and frames results. Engine
//! failures stay in-band as structured tool errors so the assistant can
//! read the kind and hint.

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
        ToolAnnotations,
    },
    service::RequestContext,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::tools::{ToolContext, ToolRegistry};

#[derive(Clone)]
pub struct PagescopeServer {
    engine: Arc<Engine>,
    registry: Arc<ToolRegistry>,
}

impl PagescopeServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            registry: Arc::new(ToolRegistry::standard()),
        }
    }

    fn advertised_tools(&self) -> Vec<Tool> {
        self.registry
            .tools()
            .iter()
            .map(|t| {
                let schema = t
                    .input_schema()
                    .as_object()
                    .cloned()
                    .unwrap_or_default();
                let mut tool = Tool::new(t.name(), t.description(), Arc::new(schema));
                // Every engine tool observes a live page or static artifact;
                // none mutates anything.
                tool.annotations = Some(ToolAnnotations {
                    title: Some(t.title().to_string()),
                    read_only_hint: Some(true),
                    destructive_hint: Some(false),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(true),
                });
                tool
            })
            .collect()
    }

    fn failure_payload(error: &EngineError) -> String {
        serde_json::to_string(&json!({
            "kind": error.kind.as_str(),
            "message": error.message,
            "hint": error.hint,
        }))
        .unwrap_or_else(|_| error.message.clone())
    }
}

impl ServerHandler for PagescopeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "pagescope drives a headless browser against a live URL and correlates \
                 runtime evidence with build artifacts.\n\n\
                 Start broad with debug_frontend_issue(url), then narrow: component_* for \
                 framework state, network_* for traffic, source_* for source map and \
                 coverage questions, error_* for captured errors, build_* for static \
                 bundle analysis (needs PROJECT_ROOT with stats.json or manifest.json).\n\n\
                 Page tools accept settleMs to lengthen the post-load observation window. \
                 List results paginate via limit/cursor and report nextCursor."
                    .into(),
            ),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            meta: None,
            next_cursor: None,
            tools: self.advertised_tools(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        async move {
            let name = request.name.to_string();
            let input = request
                .arguments
                .map(Value::Object)
                .unwrap_or_else(|| json!({}));

            if registry.find(&name).is_none() {
                return Err(McpError::invalid_params(
                    format!("unknown tool `{name}`"),
                    None,
                ));
            }

            let ctx = ToolContext::new(engine);
            match registry.execute(&name, input, ctx).await {
                Ok(value) => {
                    let text = serde_json::to_string_pretty(&value)
                        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                    Ok(CallToolResult::success(vec![Content::text(text)]))
                }
                Err(e) => Ok(CallToolResult::error(vec![Content::text(
                    Self::failure_payload(&e),
                )])),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn every_tool_is_advertised_with_read_only_annotations() {
        let server = PagescopeServer::new(Engine::new(Config::default()));
        let tools = server.advertised_tools();
        assert_eq!(tools.len(), 36);
        for tool in &tools {
            let annotations = tool.annotations.as_ref().expect("annotations present");
            assert_eq!(annotations.read_only_hint, Some(true));
            assert_eq!(annotations.destructive_hint, Some(false));
            assert!(!tool.input_schema.is_empty(), "{} has no schema", tool.name);
        }
    }

    #[test]
    fn failure_payload_carries_kind_and_hint() {
        let e = EngineError::not_found("no manifest").with_hint("set PROJECT_ROOT");
        let payload = PagescopeServer::failure_payload(&e);
        assert!(payload.contains("NotFound"));
        assert!(payload.contains("PROJECT_ROOT"));
    }
}
