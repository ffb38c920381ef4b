//! Source map discovery, parsing, and cached position resolution

pub mod cache;
pub mod coverage;
pub mod stack;
pub mod symbols;

pub use cache::SourceMapCache;
pub use stack::parse_stack;

use serde::Serialize;

/// A generated position resolved (or not) to its original source
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub generated_url: String,
    pub generated_line: u32,
    pub generated_column: u32,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_column: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_snippet: Option<String>,
}

impl ResolvedLocation {
    pub fn unresolved(url: &str, line: u32, column: u32, reason: impl Into<String>) -> Self {
        Self {
            generated_url: url.to_string(),
            generated_line: line,
            generated_column: column,
            resolved: false,
            reason: Some(reason.into()),
            original_file: None,
            original_line: None,
            original_column: None,
            original_name: None,
            source_snippet: None,
        }
    }
}

/// Guess a display language from a source path extension
pub fn language_of(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "vue" => "vue",
        "svelte" => "svelte",
        "css" => "css",
        "scss" | "sass" => "scss",
        "json" => "json",
        "html" => "html",
        _ => "plaintext",
    }
}
