//! Mapping V8 precise coverage onto original source lines

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::cache::SourceMapCache;
use crate::error::EngineError;

/// V8 precise-coverage object shape (`Profiler.takePreciseCoverage`)
#[derive(Debug, Clone, Deserialize)]
pub struct V8Coverage {
    pub result: Vec<ScriptCoverage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    #[serde(default)]
    pub script_id: Option<String>,
    pub url: String,
    pub functions: Vec<FunctionCoverage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub is_block_coverage: bool,
    pub ranges: Vec<CoverageRange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    pub start_offset: u32,
    pub end_offset: u32,
    pub count: u32,
}

impl ScriptCoverage {
    /// Covered byte ranges, merged from all function ranges with count > 0
    pub fn covered_ranges(&self) -> Vec<(u32, u32)> {
        let mut ranges: Vec<(u32, u32)> = self
            .functions
            .iter()
            .flat_map(|f| f.ranges.iter())
            .filter(|r| r.count > 0)
            .map(|r| (r.start_offset, r.end_offset))
            .collect();
        ranges.sort_unstable();
        ranges
    }
}

/// Per-original-file line coverage
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCoverage {
    pub file: String,
    pub covered_lines: Vec<u32>,
    pub uncovered_lines: Vec<u32>,
    pub percent: f64,
}

/// Byte span of each line in the generated text
fn line_spans(text: &str) -> Vec<(u32, u32)> {
    let mut spans = Vec::new();
    let mut offset = 0u32;
    for line in text.split('\n') {
        let len = u32::try_from(line.len()).unwrap_or(u32::MAX);
        spans.push((offset, offset + len));
        offset = offset.saturating_add(len + 1);
    }
    spans
}

fn intersects(ranges: &[(u32, u32)], start: u32, end: u32) -> bool {
    // `ranges` is sorted by start offset.
    let idx = ranges.partition_point(|&(_, e)| e <= start);
    ranges.get(idx).is_some_and(|&(s, _)| s < end)
}

impl SourceMapCache {
    /// Project covered byte ranges of one generated script onto the
    /// original files its source map names.
    pub async fn map_coverage(
        &self,
        script_url: &str,
        covered: &[(u32, u32)],
    ) -> Result<Vec<FileCoverage>, EngineError> {
        let map = self.load(script_url).await?;
        let generated = self.fetch_text(script_url).await?;
        let spans = line_spans(&generated);

        let line_covered: Vec<bool> = spans
            .iter()
            .map(|&(start, end)| intersects(covered, start, end))
            .collect();

        // (file, original line) → any generated line carrying it was covered
        let mut lines: BTreeMap<String, BTreeMap<u32, bool>> = BTreeMap::new();
        for token in map.tokens() {
            let Some(file) = token.get_source() else {
                continue;
            };
            let dst_line = token.get_dst_line() as usize;
            let covered_here = line_covered.get(dst_line).copied().unwrap_or(false);
            let entry = lines
                .entry(file.to_string())
                .or_default()
                .entry(token.get_src_line() + 1)
                .or_insert(false);
            *entry |= covered_here;
        }

        let mut result = Vec::new();
        for (file, line_map) in lines {
            let covered_lines: Vec<u32> = line_map
                .iter()
                .filter_map(|(line, hit)| hit.then_some(*line))
                .collect();
            let uncovered_lines: Vec<u32> = line_map
                .iter()
                .filter_map(|(line, hit)| (!hit).then_some(*line))
                .collect();
            let total = covered_lines.len() + uncovered_lines.len();
            let percent = if total == 0 {
                0.0
            } else {
                (covered_lines.len() as f64 / total as f64) * 100.0
            };
            result.push(FileCoverage {
                file,
                covered_lines,
                uncovered_lines,
                percent: (percent * 10.0).round() / 10.0,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v8_shape_deserializes() {
        let raw = serde_json::json!({
            "result": [{
                "scriptId": "42",
                "url": "https://app.example/main.min.js",
                "functions": [{
                    "functionName": "doThing",
                    "isBlockCoverage": true,
                    "ranges": [
                        {"startOffset": 0, "endOffset": 120, "count": 1},
                        {"startOffset": 40, "endOffset": 60, "count": 0}
                    ]
                }]
            }]
        });
        let parsed: V8Coverage = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.result.len(), 1);
        assert_eq!(parsed.result[0].covered_ranges(), vec![(0, 120)]);
    }

    #[test]
    fn line_spans_cover_whole_text() {
        let spans = line_spans("ab\ncdef\n\ng");
        assert_eq!(spans, vec![(0, 2), (3, 7), (8, 8), (9, 10)]);
    }

    #[test]
    fn intersection_respects_sorted_ranges() {
        let ranges = vec![(0, 5), (10, 20)];
        assert!(intersects(&ranges, 3, 8));
        assert!(!intersects(&ranges, 5, 10));
        assert!(intersects(&ranges, 15, 16));
        assert!(!intersects(&ranges, 20, 30));
    }
}
