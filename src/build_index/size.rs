//! Bundle size analysis and deterministic recommendations

use serde::Serialize;
use std::collections::HashMap;

use super::BuildManifest;

const KIB: u64 = 1024;
/// Rule thresholds, in KiB
const TOTAL_JS_LIMIT_KB: u64 = 500;
const INITIAL_CHUNK_LIMIT_KB: u64 = 200;
const CSS_LIMIT_KB: u64 = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeTotals {
    pub js_kb: u64,
    pub css_kb: u64,
    pub other_kb: u64,
    pub total_kb: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeAsset {
    pub name: String,
    pub size_kb: u64,
    /// Share of the total bundle, in percent
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeReport {
    pub threshold_kb: u64,
    pub totals: SizeTotals,
    /// Assets exceeding the threshold, largest first
    pub large_assets: Vec<LargeAsset>,
    pub recommendations: Vec<String>,
}

fn kind_of(name: &str) -> &'static str {
    let base = name.split('?').next().unwrap_or(name);
    if base.ends_with(".js") || base.ends_with(".mjs") || base.ends_with(".cjs") {
        "js"
    } else if base.ends_with(".css") {
        "css"
    } else {
        "other"
    }
}

/// Pure function of the manifest and the threshold; recommendations come
/// out in fixed rule order.
pub fn analyze(manifest: &BuildManifest, threshold_kb: u64) -> SizeReport {
    let mut js = 0u64;
    let mut css = 0u64;
    let mut other = 0u64;
    for asset in &manifest.assets {
        match kind_of(&asset.name) {
            "js" => js += asset.size,
            "css" => css += asset.size,
            _ => other += asset.size,
        }
    }
    let total = js + css + other;

    let mut large_assets: Vec<LargeAsset> = manifest
        .assets
        .iter()
        .filter(|a| a.size > threshold_kb * KIB)
        .map(|a| LargeAsset {
            name: a.name.clone(),
            size_kb: a.size / KIB,
            percent: if total == 0 {
                0.0
            } else {
                ((a.size as f64 / total as f64) * 1000.0).round() / 10.0
            },
        })
        .collect();
    large_assets.sort_by(|a, b| b.size_kb.cmp(&a.size_kb).then(a.name.cmp(&b.name)));

    let mut recommendations = Vec::new();

    // Rule 1: total JS weight
    if js > TOTAL_JS_LIMIT_KB * KIB {
        recommendations.push(format!(
            "Total JavaScript is {} KB (> {TOTAL_JS_LIMIT_KB} KB); introduce code splitting to defer non-critical bundles.",
            js / KIB
        ));
    }

    // Rule 2: oversized initial chunks
    let mut heavy_initial: Vec<&str> = manifest
        .chunks
        .iter()
        .filter(|c| c.initial && c.size > INITIAL_CHUNK_LIMIT_KB * KIB)
        .map(|c| c.id.as_str())
        .collect();
    heavy_initial.sort_unstable();
    if !heavy_initial.is_empty() {
        recommendations.push(format!(
            "Initial chunk(s) {} exceed {INITIAL_CHUNK_LIMIT_KB} KB; use route-level lazy loading to shrink the critical path.",
            heavy_initial.join(", ")
        ));
    }

    // Rule 3: modules bundled into several chunks
    let mut chunk_count: HashMap<&str, usize> = HashMap::new();
    for chunk in &manifest.chunks {
        for module in &chunk.modules {
            *chunk_count.entry(module.as_str()).or_default() += 1;
        }
    }
    let mut duplicated: Vec<&str> = chunk_count
        .iter()
        .filter(|(_, count)| **count >= 2)
        .map(|(name, _)| *name)
        .collect();
    duplicated.sort_unstable();
    if !duplicated.is_empty() {
        recommendations.push(format!(
            "Module(s) {} appear in two or more chunks; extract them into a shared chunk to avoid duplication.",
            duplicated.join(", ")
        ));
    }

    // Rule 4: CSS weight
    if css > CSS_LIMIT_KB * KIB {
        recommendations.push(format!(
            "CSS totals {} KB (> {CSS_LIMIT_KB} KB); purge unused CSS from the production build.",
            css / KIB
        ));
    }

    SizeReport {
        threshold_kb,
        totals: SizeTotals {
            js_kb: js / KIB,
            css_kb: css / KIB,
            other_kb: other / KIB,
            total_kb: total / KIB,
        },
        large_assets,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_index::{Asset, BundlerType, Chunk};

    fn manifest(assets: Vec<Asset>, chunks: Vec<Chunk>) -> BuildManifest {
        BuildManifest {
            r#type: BundlerType::Webpack,
            version: None,
            chunks,
            assets,
            modules: Vec::new(),
        }
    }

    fn chunk(id: &str, size_kb: u64, initial: bool, modules: &[&str]) -> Chunk {
        Chunk {
            id: id.to_string(),
            files: Vec::new(),
            modules: modules.iter().map(|m| (*m).to_string()).collect(),
            size: size_kb * KIB,
            entry: initial,
            initial,
        }
    }

    #[test]
    fn heavy_js_and_initial_chunk_trigger_first_two_rules() {
        let m = manifest(
            vec![
                Asset {
                    name: "main.js".into(),
                    size: 250 * KIB,
                },
                Asset {
                    name: "vendor.js".into(),
                    size: 450 * KIB,
                },
            ],
            vec![
                chunk("main", 250, true, &["./src/index.js"]),
                chunk("vendor", 450, false, &["./node_modules/lodash/lodash.js"]),
            ],
        );
        let report = analyze(&m, 100);
        assert_eq!(report.totals.js_kb, 700);
        assert!(report.recommendations[0].contains("code splitting"));
        assert!(report.recommendations[1].contains("route-level lazy loading"));
        assert_eq!(report.recommendations.len(), 2);
        assert_eq!(report.large_assets[0].name, "vendor.js");
    }

    #[test]
    fn duplicated_modules_are_flagged() {
        let m = manifest(
            Vec::new(),
            vec![
                chunk("a", 10, false, &["./src/shared.js"]),
                chunk("b", 10, false, &["./src/shared.js"]),
            ],
        );
        let report = analyze(&m, 100);
        assert_eq!(report.recommendations.len(), 1);
        assert!(report.recommendations[0].contains("./src/shared.js"));
        assert!(report.recommendations[0].contains("shared chunk"));
    }

    #[test]
    fn css_rule_fires_last() {
        let m = manifest(
            vec![
                Asset {
                    name: "app.js".into(),
                    size: 600 * KIB,
                },
                Asset {
                    name: "styles.css".into(),
                    size: 60 * KIB,
                },
            ],
            Vec::new(),
        );
        let report = analyze(&m, 1000);
        assert_eq!(report.recommendations.len(), 2);
        assert!(report.recommendations[0].contains("code splitting"));
        assert!(report.recommendations[1].contains("purge unused CSS"));
        assert!(report.large_assets.is_empty());
    }

    #[test]
    fn quiet_bundle_has_no_recommendations() {
        let m = manifest(
            vec![Asset {
                name: "tiny.js".into(),
                size: 10 * KIB,
            }],
            vec![chunk("main", 10, true, &["./src/index.js"])],
        );
        let report = analyze(&m, 100);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn percent_is_share_of_total() {
        let m = manifest(
            vec![
                Asset {
                    name: "a.js".into(),
                    size: 300 * KIB,
                },
                Asset {
                    name: "b.js".into(),
                    size: 100 * KIB,
                },
            ],
            Vec::new(),
        );
        let report = analyze(&m, 50);
        let a = report.large_assets.iter().find(|x| x.name == "a.js").unwrap();
        assert!((a.percent - 75.0).abs() < 0.01);
    }
}
