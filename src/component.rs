//! Framework-aware component introspection
//!
//! All page-side logic lives in string-form scripts (`scripts`) with JSON
//! input/output contracts; the engine never shares object identity with the
//! page. Detection is scoped to the selector's element so mixed-framework
//! pages resolve per call.

pub mod scripts;

use chromiumoxide::Page;
use serde_json::Value;

use crate::error::EngineError;

/// Evaluate one of the introspection scripts and return its JSON result.
async fn eval(page: &Page, script: String) -> Result<Value, EngineError> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| EngineError::session_terminated(format!("in-page evaluation failed: {e}")))?;
    Ok(result.value().cloned().unwrap_or(Value::Null))
}

/// Map a script result onto the common error taxonomy: scripts report
/// missing selectors and absent devtools hooks in-band.
fn check(selector: Option<&str>, value: Value) -> Result<Value, EngineError> {
    if value
        .get("found")
        .and_then(Value::as_bool)
        .is_some_and(|found| !found)
    {
        let queried = selector.unwrap_or("<document>");
        return Err(
            EngineError::not_found(format!("no element matches selector `{queried}`"))
                .with_hint("Verify the selector against the live DOM, e.g. with component_tree."),
        );
    }
    Ok(value)
}

pub async fn detect(page: &Page, selector: Option<&str>) -> Result<Value, EngineError> {
    let value = eval(page, scripts::detect(selector)).await?;
    check(selector, value)
}

pub async fn tree(
    page: &Page,
    selector: Option<&str>,
    max_depth: u32,
    include_props: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::tree(selector, max_depth, include_props)).await?;
    check(selector, value)
}

pub async fn find_by_name(page: &Page, name: &str, exact: bool) -> Result<Value, EngineError> {
    eval(page, scripts::find_by_name(name, exact)).await
}

pub async fn get_props(
    page: &Page,
    selector: &str,
    include_defaults: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::get_props(selector, include_defaults)).await?;
    check(Some(selector), value)
}

pub async fn get_state(
    page: &Page,
    selector: &str,
    include_computed: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::get_state(selector, include_computed)).await?;
    check(Some(selector), value)
}

pub async fn get_hooks(
    page: &Page,
    selector: &str,
    include_effects: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::get_hooks(selector, include_effects)).await?;
    check(Some(selector), value)
}

pub async fn get_context(
    page: &Page,
    selector: &str,
    include_providers: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::get_context(selector, include_providers)).await?;
    check(Some(selector), value)
}

pub async fn track_renders(
    page: &Page,
    selector: &str,
    duration_ms: u64,
    capture_reasons: bool,
) -> Result<Value, EngineError> {
    let value = eval(page, scripts::track_renders(selector, duration_ms, capture_reasons)).await?;
    check(Some(selector), value)
}

pub async fn get_source(page: &Page, selector: &str) -> Result<Value, EngineError> {
    let value = eval(page, scripts::get_source(selector)).await?;
    check(Some(selector), value)
}
