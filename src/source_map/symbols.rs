//! Best-effort lexical scans over indexed original sources

use regex::Regex;
use serde::Serialize;

use super::cache::SourceMapCache;
use crate::error::EngineError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Definition {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub snippet: String,
    pub sibling_exports: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    pub name: String,
    pub kind: String,
    pub line: u32,
    pub exported: bool,
}

fn definition_patterns(symbol: &str) -> Vec<(Regex, &'static str)> {
    let sym = regex::escape(symbol);
    let sources = [
        (
            format!(r"(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*{sym}\b"),
            "function",
        ),
        (format!(r"(?:export\s+)?class\s+{sym}\b"), "class"),
        (
            format!(r"(?:export\s+)?(?:const|let|var)\s+{sym}\b"),
            "binding",
        ),
        (format!(r"\b{sym}\s*=\s*(?:async\s*)?\("), "assignment"),
    ];
    sources
        .into_iter()
        .filter_map(|(pattern, kind)| Regex::new(&pattern).ok().map(|re| (re, kind)))
        .collect()
}

fn exports_of(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    let decl = Regex::new(
        r"export\s+(?:default\s+)?(?:async\s+)?(?:function\s*\*?|class|const|let|var)\s+(\w+)",
    )
    .unwrap();
    for caps in decl.captures_iter(content) {
        names.push(caps[1].to_string());
    }
    let list = Regex::new(r"export\s*\{([^}]*)\}").unwrap();
    for caps in list.captures_iter(content) {
        for part in caps[1].split(',') {
            // `orig as alias` exports the alias
            let name = part.split_whitespace().last().unwrap_or("").trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names.dedup();
    names
}

/// Scan a file's lines for the first definition-looking match.
fn scan_content(content: &str, symbol: &str) -> Option<(u32, u32, String)> {
    let patterns = definition_patterns(symbol);
    for (idx, line) in content.lines().enumerate() {
        for (re, _kind) in &patterns {
            if let Some(m) = re.find(line) {
                let line1 = u32::try_from(idx + 1).unwrap_or(u32::MAX);
                let column1 = u32::try_from(m.start() + 1).unwrap_or(u32::MAX);
                let snippet = line.trim_end().chars().take(200).collect();
                return Some((line1, column1, snippet));
            }
        }
    }
    None
}

/// Locate a symbol's definition across a bundle's indexed sources.
///
/// Lexical, not semantic: the first declaration-shaped match wins, with
/// `file_filter` (path suffix) narrowing the search when given.
pub async fn find_definition(
    cache: &SourceMapCache,
    bundle_url: &str,
    symbol: &str,
    file_filter: Option<&str>,
) -> Result<Definition, EngineError> {
    let map = cache.load(bundle_url).await?;
    for file in map.sources() {
        if let Some(filter) = file_filter {
            if !file.ends_with(filter) {
                continue;
            }
        }
        let Ok(source) = cache.source_content(&map, &file).await else {
            continue;
        };
        if let Some((line, column, snippet)) = scan_content(&source.text, symbol) {
            return Ok(Definition {
                sibling_exports: exports_of(&source.text),
                file,
                line,
                column,
                snippet,
            });
        }
    }
    Err(EngineError::not_found(format!(
        "no definition of `{symbol}` found in the bundle's sources"
    ))
    .with_hint("The scan is lexical; check the symbol spelling or pass a file filter."))
}

/// List declaration-level symbols for one indexed source file.
pub async fn get_symbols(
    cache: &SourceMapCache,
    bundle_url: &str,
    file: &str,
) -> Result<Vec<SymbolEntry>, EngineError> {
    let map = cache.load(bundle_url).await?;
    let source = cache.source_content(&map, file).await?;
    let exported = exports_of(&source.text);

    let decl = Regex::new(
        r"^\s*(?:export\s+)?(?:default\s+)?(?:(async\s+)?function\s*\*?|class|const|let|var)\s+(\w+)",
    )
    .unwrap();
    let mut symbols = Vec::new();
    for (idx, line) in source.text.lines().enumerate() {
        if let Some(caps) = decl.captures(line) {
            let name = caps[2].to_string();
            let kind = if line.contains("class") {
                "class"
            } else if line.contains("function") {
                "function"
            } else {
                "binding"
            };
            symbols.push(SymbolEntry {
                exported: exported.contains(&name),
                name,
                kind: kind.to_string(),
                line: u32::try_from(idx + 1).unwrap_or(u32::MAX),
            });
        }
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r"import { api } from './api';

export function doThing(x) {
  return x + 1;
}

const helper = (y) => y * 2;

export class Widget {
}

export { helper as double };
";

    #[test]
    fn finds_function_definition() {
        let (line, column, snippet) = scan_content(SAMPLE, "doThing").unwrap();
        assert_eq!(line, 3);
        assert_eq!(column, 1);
        assert!(snippet.contains("export function doThing"));
    }

    #[test]
    fn finds_arrow_binding() {
        let (line, _, _) = scan_content(SAMPLE, "helper").unwrap();
        assert_eq!(line, 7);
    }

    #[test]
    fn missing_symbol_is_none() {
        assert!(scan_content(SAMPLE, "nonexistent").is_none());
    }

    #[test]
    fn exports_include_aliases() {
        let exports = exports_of(SAMPLE);
        assert!(exports.contains(&"doThing".to_string()));
        assert!(exports.contains(&"Widget".to_string()));
        assert!(exports.contains(&"double".to_string()));
        assert!(!exports.contains(&"helper".to_string()));
    }
}
