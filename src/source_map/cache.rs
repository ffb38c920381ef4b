//! Parsed-map LRU cache and position resolution

use base64::Engine as _;
use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use super::stack::parse_stack;
use super::ResolvedLocation;
use crate::error::EngineError;

/// Parsed maps kept in memory
const MAP_CAP: usize = 50;
/// Memoized individual position resolutions (amortizes hot stacks)
const RESOLUTION_CAP: usize = 1024;
/// Fetched original-source files (when sourcesContent is absent)
const FETCH_CAP: usize = 64;

const SNIPPET_MAX: usize = 200;

static MAP_HINT: &str = "Enable source maps by setting devtool:'source-map' and ensure .map files are served with the bundle.";

fn trailer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Both //# and //@ trailer forms.
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*//[#@][ \t]*sourceMappingURL[ \t]*=[ \t]*(\S+)[ \t]*$").unwrap()
    })
}

/// One parsed source map, immutable once cached
pub struct CachedMap {
    pub bundle_url: String,
    pub map_url: String,
    map: sourcemap::SourceMap,
}

impl CachedMap {
    pub fn sources(&self) -> Vec<String> {
        self.map.sources().map(str::to_string).collect()
    }

    /// Index of a source by exact name or unique path-suffix match
    pub fn source_index(&self, file: &str) -> Option<u32> {
        let count = self.map.get_source_count();
        for idx in 0..count {
            if self.map.get_source(idx) == Some(file) {
                return Some(idx);
            }
        }
        let mut found = None;
        for idx in 0..count {
            if let Some(name) = self.map.get_source(idx) {
                if name.ends_with(file) {
                    if found.is_some() {
                        return None; // ambiguous suffix
                    }
                    found = Some(idx);
                }
            }
        }
        found
    }

    pub fn source_name(&self, idx: u32) -> Option<&str> {
        self.map.get_source(idx)
    }

    /// Inline content from sourcesContent, when the map carries it
    pub fn inline_content(&self, idx: u32) -> Option<&str> {
        self.map.get_source_contents(idx)
    }

    pub fn lookup(&self, line0: u32, col0: u32) -> Option<sourcemap::Token<'_>> {
        self.map.lookup_token(line0, col0)
    }

    pub fn tokens(&self) -> sourcemap::TokenIter<'_> {
        self.map.tokens()
    }
}

/// An original source fetched over HTTP because the map had no inline copy
pub struct FetchedSource {
    pub text: String,
    pub inline: bool,
}

type ResolutionKey = (String, u32, u32);

/// Process-wide cache turning generated positions into original ones
pub struct SourceMapCache {
    http: reqwest::Client,
    maps: StdMutex<LruCache<String, Arc<CachedMap>>>,
    resolutions: StdMutex<LruCache<ResolutionKey, ResolvedLocation>>,
    fetched: StdMutex<LruCache<String, Arc<FetchedSource>>>,
}

/// One frame of a resolved stack
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ResolvedLocation>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStack {
    pub frames: Vec<ResolvedFrame>,
    pub resolved_count: usize,
    pub total_count: usize,
}

impl SourceMapCache {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            maps: StdMutex::new(LruCache::new(NonZeroUsize::new(MAP_CAP).unwrap())),
            resolutions: StdMutex::new(LruCache::new(
                NonZeroUsize::new(RESOLUTION_CAP).unwrap(),
            )),
            fetched: StdMutex::new(LruCache::new(NonZeroUsize::new(FETCH_CAP).unwrap())),
        }
    }

    pub(crate) async fn fetch_text(&self, url: &str) -> Result<String, EngineError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::upstream_http(format!("fetching {url} failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::upstream_http(format!(
                "fetching {url} returned {status}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| EngineError::upstream_http(format!("reading {url} failed: {e}")))
    }

    fn resolve_relative(base: &str, rel: &str) -> Result<String, EngineError> {
        let base = reqwest::Url::parse(base)
            .map_err(|e| EngineError::invalid_argument(format!("invalid url {base}: {e}")))?;
        let joined = base
            .join(rel)
            .map_err(|e| EngineError::invalid_argument(format!("invalid map url {rel}: {e}")))?;
        Ok(joined.to_string())
    }

    fn decode_data_url(data_url: &str) -> Result<Vec<u8>, EngineError> {
        let payload = data_url
            .split_once(',')
            .map(|(_, p)| p)
            .ok_or_else(|| EngineError::source_map_unavailable("malformed data: source map url"))?;
        if data_url.contains(";base64") {
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| {
                    EngineError::source_map_unavailable(format!("bad base64 source map: {e}"))
                })
        } else {
            Ok(payload.as_bytes().to_vec())
        }
    }

    /// Load (or get the cached) parsed map for a bundle URL.
    ///
    /// Discovery prefers the `sourceMappingURL` trailer, resolved relative
    /// to the script URL; absent that, `<url>.map` is attempted.
    /// Concurrent fills of the same key may race and produce identical
    /// entries; the cache keeps whichever lands last.
    pub async fn load(&self, bundle_url: &str) -> Result<Arc<CachedMap>, EngineError> {
        if let Ok(mut maps) = self.maps.lock() {
            if let Some(cached) = maps.get(bundle_url) {
                return Ok(cached.clone());
            }
        }

        let bundle_text = self.fetch_text(bundle_url).await?;
        let trailer = trailer_re()
            .captures_iter(&bundle_text)
            .last()
            .map(|c| c[1].to_string());

        let (map_url, raw_map) = match trailer {
            Some(rel) if rel.starts_with("data:") => {
                let bytes = Self::decode_data_url(&rel)?;
                ("<inline>".to_string(), bytes)
            }
            Some(rel) => {
                let map_url = Self::resolve_relative(bundle_url, &rel)?;
                let text = self
                    .fetch_text(&map_url)
                    .await
                    .map_err(|e| e.with_hint(MAP_HINT))?;
                (map_url, text.into_bytes())
            }
            None => {
                let map_url = format!("{bundle_url}.map");
                let text = self.fetch_text(&map_url).await.map_err(|_| {
                    EngineError::source_map_unavailable(format!(
                        "no sourceMappingURL trailer in {bundle_url} and {map_url} is not served"
                    ))
                    .with_hint(MAP_HINT)
                })?;
                (map_url, text.into_bytes())
            }
        };

        let map = sourcemap::SourceMap::from_slice(&raw_map).map_err(|e| {
            EngineError::source_map_unavailable(format!("malformed source map for {bundle_url}: {e}"))
                .with_hint(MAP_HINT)
        })?;

        let cached = Arc::new(CachedMap {
            bundle_url: bundle_url.to_string(),
            map_url,
            map,
        });
        if let Ok(mut maps) = self.maps.lock() {
            maps.put(bundle_url.to_string(), cached.clone());
        }
        tracing::debug!(bundle = %bundle_url, "source map cached");
        Ok(cached)
    }

    /// Original content for one source of a map: inline `sourcesContent`
    /// when present, otherwise a best-effort HTTP fetch flagged
    /// `inline: false`.
    pub async fn source_content(
        &self,
        map: &CachedMap,
        file: &str,
    ) -> Result<Arc<FetchedSource>, EngineError> {
        let idx = map.source_index(file).ok_or_else(|| {
            EngineError::not_found(format!("source {file} is not listed in the map"))
        })?;
        if let Some(inline) = map.inline_content(idx) {
            return Ok(Arc::new(FetchedSource {
                text: inline.to_string(),
                inline: true,
            }));
        }

        let name = map
            .source_name(idx)
            .ok_or_else(|| EngineError::internal("source index out of range"))?
            .to_string();
        let base = if map.map_url == "<inline>" {
            map.bundle_url.clone()
        } else {
            map.map_url.clone()
        };
        let abs = Self::resolve_relative(&base, &name)?;

        if let Ok(mut fetched) = self.fetched.lock() {
            if let Some(hit) = fetched.get(&abs) {
                return Ok(hit.clone());
            }
        }
        let text = self
            .fetch_text(&abs)
            .await
            .map_err(|e| e.with_hint("The map has no sourcesContent and the original file is not served alongside it."))?;
        let entry = Arc::new(FetchedSource {
            text,
            inline: false,
        });
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.put(abs, entry.clone());
        }
        Ok(entry)
    }

    fn snippet_at(content: &str, line1: u32) -> Option<String> {
        let line = content.lines().nth(line1.checked_sub(1)? as usize)?;
        Some(line.chars().take(SNIPPET_MAX).collect())
    }

    /// Resolve one generated position (1-based line and column).
    pub async fn resolve_position(
        &self,
        url: &str,
        line: u32,
        column: u32,
    ) -> Result<ResolvedLocation, EngineError> {
        if line == 0 || column == 0 {
            return Err(EngineError::invalid_argument(
                "line and column are 1-based and must be positive",
            ));
        }
        let key = (url.to_string(), line, column);
        if let Ok(mut memo) = self.resolutions.lock() {
            if let Some(hit) = memo.get(&key) {
                return Ok(hit.clone());
            }
        }

        let map = self.load(url).await?;
        let location = match map.lookup(line - 1, column - 1) {
            Some(token) => {
                let original_file = token.get_source().map(str::to_string);
                let original_line = token.get_src_line() + 1;
                let original_column = token.get_src_col() + 1;
                let original_name = token.get_name().map(str::to_string);
                let snippet = match &original_file {
                    Some(file) => self
                        .source_content(&map, file)
                        .await
                        .ok()
                        .and_then(|src| Self::snippet_at(&src.text, original_line)),
                    None => None,
                };
                ResolvedLocation {
                    generated_url: url.to_string(),
                    generated_line: line,
                    generated_column: column,
                    resolved: original_file.is_some(),
                    reason: original_file
                        .is_none()
                        .then(|| "mapping has no source entry".to_string()),
                    original_file,
                    original_line: Some(original_line),
                    original_column: Some(original_column),
                    original_name,
                    source_snippet: snippet,
                }
            }
            None => ResolvedLocation::unresolved(url, line, column, "no mapping at position"),
        };

        if let Ok(mut memo) = self.resolutions.lock() {
            memo.put(key, location.clone());
        }
        Ok(location)
    }

    /// Resolve every positioned frame of a stack string. A frame whose map
    /// is missing or malformed becomes an unresolved frame with a reason;
    /// it never fails the call.
    pub async fn resolve_stack(&self, stack: &str) -> ResolvedStack {
        let mut frames = Vec::new();
        let mut resolved_count = 0;
        let mut total_count = 0;

        for raw in parse_stack(stack) {
            let location = match (&raw.url, raw.line, raw.column) {
                (Some(url), Some(line), Some(column)) => {
                    total_count += 1;
                    let loc = match self.resolve_position(url, line, column).await {
                        Ok(loc) => loc,
                        Err(e) => ResolvedLocation::unresolved(url, line, column, e.message),
                    };
                    if loc.resolved {
                        resolved_count += 1;
                    }
                    Some(loc)
                }
                _ => None,
            };
            frames.push(ResolvedFrame {
                function: raw.function,
                raw: raw.raw,
                location,
            });
        }

        ResolvedStack {
            frames,
            resolved_count,
            total_count,
        }
    }
}
