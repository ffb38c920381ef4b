//! vite `manifest.json` normalization
//!
//! The manifest is keyed by source path and carries no sizes; emitted file
//! sizes are taken from the output directory next to the manifest when it
//! is available on disk.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::{Asset, BuildManifest, BundlerType, Chunk, Module};
use crate::error::EngineError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    file: String,
    #[serde(default)]
    is_entry: bool,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    css: Vec<String>,
    #[serde(default)]
    assets: Vec<String>,
}

/// `manifest.json` sits in `<outDir>/.vite/` since vite 5, or directly in
/// `<outDir>`; emitted paths are relative to `<outDir>`.
fn out_dir(manifest_path: &Path) -> Option<&Path> {
    let dir = manifest_path.parent()?;
    if dir.file_name().is_some_and(|n| n == ".vite") {
        dir.parent()
    } else {
        Some(dir)
    }
}

fn file_size(out: Option<&Path>, rel: &str) -> u64 {
    out.map(|dir| dir.join(rel))
        .and_then(|p| std::fs::metadata(p).ok())
        .map_or(0, |m| m.len())
}

pub fn parse(raw: &str, manifest_path: &Path) -> Result<BuildManifest, EngineError> {
    let entries: HashMap<String, RawEntry> = serde_json::from_str(raw)
        .map_err(|e| EngineError::internal(format!("malformed manifest.json: {e}")))?;
    let out = out_dir(manifest_path);

    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort();

    let mut chunks = Vec::new();
    let mut modules = Vec::new();
    let mut assets = Vec::new();

    for key in keys {
        let entry = &entries[key];
        let size = file_size(out, &entry.file);

        let mut files = vec![entry.file.clone()];
        files.extend(entry.css.iter().cloned());
        files.extend(entry.assets.iter().cloned());

        chunks.push(Chunk {
            id: key.clone(),
            files,
            modules: vec![key.clone()],
            size,
            entry: entry.is_entry,
            initial: entry.is_entry,
        });

        modules.push(Module {
            id: key.clone(),
            name: key.clone(),
            size,
            chunks: vec![key.clone()],
            dependencies: entry.imports.clone(),
        });

        assets.push(Asset {
            name: entry.file.clone(),
            size,
        });
        for extra in entry.css.iter().chain(entry.assets.iter()) {
            assets.push(Asset {
                name: extra.clone(),
                size: file_size(out, extra),
            });
        }
    }

    Ok(BuildManifest {
        r#type: BundlerType::Vite,
        version: None,
        chunks,
        assets,
        modules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const MANIFEST: &str = r#"{
        "src/main.ts": {
            "file": "assets/main-Bx7a.js",
            "isEntry": true,
            "imports": ["_shared-C4dQ.js"],
            "css": ["assets/main-D9f2.css"]
        },
        "_shared-C4dQ.js": {
            "file": "assets/shared-C4dQ.js"
        }
    }"#;

    #[test]
    fn normalizes_entries() {
        let manifest = parse(MANIFEST, &PathBuf::from("/proj/dist/.vite/manifest.json")).unwrap();
        assert_eq!(manifest.r#type, BundlerType::Vite);
        assert_eq!(manifest.chunks.len(), 2);

        let main = manifest
            .chunks
            .iter()
            .find(|c| c.id == "src/main.ts")
            .unwrap();
        assert!(main.entry);
        assert!(main.files.contains(&"assets/main-D9f2.css".to_string()));

        let module = manifest
            .modules
            .iter()
            .find(|m| m.name == "src/main.ts")
            .unwrap();
        assert_eq!(module.dependencies, vec!["_shared-C4dQ.js".to_string()]);
    }

    #[test]
    fn vite_dir_resolves_to_out_dir() {
        assert_eq!(
            out_dir(&PathBuf::from("/proj/dist/.vite/manifest.json")),
            Some(Path::new("/proj/dist"))
        );
        assert_eq!(
            out_dir(&PathBuf::from("/proj/dist/manifest.json")),
            Some(Path::new("/proj/dist"))
        );
    }

    #[test]
    fn missing_files_size_zero() {
        let manifest = parse(MANIFEST, &PathBuf::from("/nonexistent/manifest.json")).unwrap();
        assert!(manifest.assets.iter().all(|a| a.size == 0));
    }
}
