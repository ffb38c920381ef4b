//! webpack `stats.json` normalization

use serde::Deserialize;
use std::collections::HashMap;

use super::{Asset, BuildManifest, BundlerType, Chunk, Module};
use crate::error::EngineError;

#[derive(Debug, Deserialize)]
struct RawStats {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    chunks: Vec<RawChunk>,
    #[serde(default)]
    modules: Vec<RawModule>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Debug, Deserialize)]
struct RawChunk {
    /// Numeric or string id depending on webpack config
    id: serde_json::Value,
    #[serde(default)]
    files: Vec<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    entry: bool,
    #[serde(default)]
    initial: bool,
    #[serde(default)]
    modules: Option<Vec<RawChunkModule>>,
}

#[derive(Debug, Deserialize)]
struct RawChunkModule {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawModule {
    #[serde(default)]
    id: Option<serde_json::Value>,
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    chunks: Vec<serde_json::Value>,
    #[serde(default)]
    reasons: Vec<RawReason>,
}

/// `reasons` list the modules that import this one
#[derive(Debug, Deserialize)]
struct RawReason {
    #[serde(default, rename = "moduleName")]
    module_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAsset {
    name: String,
    #[serde(default)]
    size: u64,
}

fn id_to_string(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn parse(raw: &str) -> Result<BuildManifest, EngineError> {
    let stats: RawStats = serde_json::from_str(raw)
        .map_err(|e| EngineError::internal(format!("malformed stats.json: {e}")))?;

    // stats lists importers per module; invert that to get dependencies.
    let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();
    for module in &stats.modules {
        for reason in &module.reasons {
            if let Some(importer) = &reason.module_name {
                dependencies
                    .entry(importer.clone())
                    .or_default()
                    .push(module.name.clone());
            }
        }
    }

    let modules: Vec<Module> = stats
        .modules
        .iter()
        .map(|m| {
            let mut deps = dependencies.get(&m.name).cloned().unwrap_or_default();
            deps.sort();
            deps.dedup();
            Module {
                id: m
                    .id
                    .as_ref()
                    .map_or_else(|| m.name.clone(), id_to_string),
                name: m.name.clone(),
                size: m.size,
                chunks: m.chunks.iter().map(id_to_string).collect(),
                dependencies: deps,
            }
        })
        .collect();

    let chunks: Vec<Chunk> = stats
        .chunks
        .iter()
        .map(|c| {
            let chunk_id = id_to_string(&c.id);
            let module_names = c.modules.as_ref().map_or_else(
                || {
                    modules
                        .iter()
                        .filter(|m| m.chunks.contains(&chunk_id))
                        .map(|m| m.name.clone())
                        .collect()
                },
                |ms| ms.iter().map(|m| m.name.clone()).collect(),
            );
            Chunk {
                id: chunk_id,
                files: c.files.clone(),
                modules: module_names,
                size: c.size,
                entry: c.entry,
                initial: c.initial,
            }
        })
        .collect();

    Ok(BuildManifest {
        r#type: BundlerType::Webpack,
        version: stats.version,
        chunks,
        assets: stats
            .assets
            .iter()
            .map(|a| Asset {
                name: a.name.clone(),
                size: a.size,
            })
            .collect(),
        modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = r#"{
        "version": "5.90.0",
        "chunks": [
            {"id": 0, "files": ["main.js"], "size": 250000, "entry": true, "initial": true},
            {"id": 1, "files": ["vendor.js"], "size": 450000, "entry": false, "initial": false}
        ],
        "modules": [
            {"id": 10, "name": "./src/index.js", "size": 1200, "chunks": [0], "reasons": []},
            {"id": 11, "name": "./src/util.js", "size": 800, "chunks": [0],
             "reasons": [{"moduleName": "./src/index.js"}]},
            {"id": 12, "name": "./node_modules/lodash/lodash.js", "size": 70000, "chunks": [1],
             "reasons": [{"moduleName": "./src/index.js"}, {"moduleName": "./src/util.js"}]}
        ],
        "assets": [
            {"name": "main.js", "size": 250000},
            {"name": "vendor.js", "size": 450000}
        ]
    }"#;

    #[test]
    fn normalizes_chunks_and_assets() {
        let manifest = parse(STATS).unwrap();
        assert_eq!(manifest.r#type, BundlerType::Webpack);
        assert_eq!(manifest.chunks.len(), 2);
        assert!(manifest.chunks[0].entry);
        assert_eq!(manifest.chunks[0].id, "0");
        assert_eq!(manifest.assets[1].size, 450_000);
    }

    #[test]
    fn reasons_invert_into_dependencies() {
        let manifest = parse(STATS).unwrap();
        let index = manifest
            .modules
            .iter()
            .find(|m| m.name == "./src/index.js")
            .unwrap();
        assert_eq!(
            index.dependencies,
            vec![
                "./node_modules/lodash/lodash.js".to_string(),
                "./src/util.js".to_string()
            ]
        );
    }

    #[test]
    fn chunk_modules_fall_back_to_module_chunk_ids() {
        let manifest = parse(STATS).unwrap();
        assert!(manifest.chunks[0]
            .modules
            .contains(&"./src/index.js".to_string()));
        assert_eq!(
            manifest.chunks[1].modules,
            vec!["./node_modules/lodash/lodash.js".to_string()]
        );
    }

    #[test]
    fn malformed_json_is_internal_error() {
        assert!(parse("{not json").is_err());
    }
}
