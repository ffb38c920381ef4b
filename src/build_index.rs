//! Build artifact index: static bundle queries over webpack stats or vite
//! manifests
//!
//! The manifest is loaded once per process and is immutable afterwards;
//! every query works off the normalized `BuildManifest`.

pub mod size;
pub mod vite;
pub mod webpack;

use nucleo_matcher::pattern::{CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config as MatcherConfig, Matcher};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::EngineError;

/// Bundler that produced the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BundlerType {
    Webpack,
    Vite,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub id: String,
    pub files: Vec<String>,
    pub modules: Vec<String>,
    pub size: u64,
    pub entry: bool,
    pub initial: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub chunks: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub name: String,
    pub size: u64,
}

/// Normalized view over either bundler's artifact
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildManifest {
    pub r#type: BundlerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub chunks: Vec<Chunk>,
    pub assets: Vec<Asset>,
    pub modules: Vec<Module>,
}

/// A module plus its reverse-dependency frontier
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDependencies {
    pub name: String,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub chunks: Vec<String>,
}

/// Loads the manifest on first use and answers static bundle queries
pub struct BuildArtifactIndex {
    config: Arc<Config>,
    manifest: OnceCell<Arc<BuildManifest>>,
}

/// Filenames probed under the project root (and common output dirs)
const WEBPACK_STATS: &str = "stats.json";
const VITE_MANIFEST: &str = "manifest.json";
const PROBE_DIRS: &[&str] = &["", "dist", "build", "out", ".vite", "dist/.vite"];

fn probe(root: &Path, filename: &str) -> Option<PathBuf> {
    PROBE_DIRS
        .iter()
        .map(|dir| {
            if dir.is_empty() {
                root.join(filename)
            } else {
                root.join(dir).join(filename)
            }
        })
        .find(|p| p.is_file())
}

impl BuildArtifactIndex {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            manifest: OnceCell::new(),
        }
    }

    async fn load(&self) -> Result<Arc<BuildManifest>, EngineError> {
        self.manifest
            .get_or_try_init(|| async {
                let root = self.config.project_root.clone();
                let stats = probe(&root, WEBPACK_STATS);
                let vite = probe(&root, VITE_MANIFEST);

                let choice = match (&stats, &vite, self.config.bundler_override.as_deref()) {
                    (Some(_), Some(_), Some("vite")) | (None, Some(_), _) => {
                        vite.clone().map(|p| (BundlerType::Vite, p))
                    }
                    (Some(_), _, _) => stats.clone().map(|p| (BundlerType::Webpack, p)),
                    _ => None,
                };

                let Some((bundler, path)) = choice else {
                    return Err(EngineError::not_found(format!(
                        "no {WEBPACK_STATS} or {VITE_MANIFEST} found under {}",
                        root.display()
                    ))
                    .with_hint(
                        "Set PROJECT_ROOT to the directory holding your build output, \
                         or emit stats.json / manifest.json from your bundler.",
                    ));
                };

                tracing::info!(path = %path.display(), ?bundler, "Loading build manifest");
                let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    EngineError::internal(format!("reading {} failed: {e}", path.display()))
                })?;
                let manifest = match bundler {
                    BundlerType::Webpack => webpack::parse(&raw)?,
                    BundlerType::Vite => vite::parse(&raw, &path)?,
                };
                Ok(Arc::new(manifest))
            })
            .await
            .map(Arc::clone)
    }

    pub async fn manifest(&self) -> Result<Arc<BuildManifest>, EngineError> {
        self.load().await
    }

    pub async fn chunks(&self) -> Result<Vec<Chunk>, EngineError> {
        Ok(self.load().await?.chunks.clone())
    }

    /// Fuzzy module lookup: exact match, then case-insensitive substring,
    /// then fuzzy ranking over all module names.
    pub async fn find_module(&self, name: &str) -> Result<Module, EngineError> {
        let manifest = self.load().await?;
        let needle = name.to_lowercase();

        if let Some(module) = manifest.modules.iter().find(|m| m.name == name) {
            return Ok(module.clone());
        }

        let mut substring: Vec<&Module> = manifest
            .modules
            .iter()
            .filter(|m| m.name.to_lowercase().contains(&needle))
            .collect();
        if !substring.is_empty() {
            // Shortest containing name is the most specific match.
            substring.sort_by_key(|m| m.name.len());
            return Ok(substring[0].clone());
        }

        let mut matcher = Matcher::new(MatcherConfig::DEFAULT);
        let pattern = Pattern::parse(name, CaseMatching::Ignore, Normalization::Smart);
        let names: Vec<&str> = manifest.modules.iter().map(|m| m.name.as_str()).collect();
        let ranked = pattern.match_list(names, &mut matcher);
        if let Some((best, _score)) = ranked.first() {
            if let Some(module) = manifest.modules.iter().find(|m| m.name == **best) {
                return Ok(module.clone());
            }
        }

        Err(EngineError::not_found(format!(
            "no module matching `{name}` in the {} manifest",
            match manifest.r#type {
                BundlerType::Webpack => "webpack",
                BundlerType::Vite => "vite",
            }
        ))
        .with_hint("Module names are matched case-insensitively; try a shorter fragment."))
    }

    /// Dependency frontier for one module (or every module when `name` is
    /// None), including reverse dependents.
    pub async fn dependencies(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<ModuleDependencies>, EngineError> {
        let manifest = self.load().await?;

        let dependents_of = |target: &str| -> Vec<String> {
            manifest
                .modules
                .iter()
                .filter(|m| m.dependencies.iter().any(|d| d == target))
                .map(|m| m.name.clone())
                .collect()
        };

        match name {
            Some(n) => {
                let module = self.find_module(n).await?;
                Ok(vec![ModuleDependencies {
                    dependents: dependents_of(&module.name),
                    name: module.name,
                    dependencies: module.dependencies,
                    chunks: module.chunks,
                }])
            }
            None => Ok(manifest
                .modules
                .iter()
                .map(|m| ModuleDependencies {
                    name: m.name.clone(),
                    dependencies: m.dependencies.clone(),
                    dependents: dependents_of(&m.name),
                    chunks: m.chunks.clone(),
                })
                .collect()),
        }
    }

    pub async fn analyze_size(&self, threshold_kb: u64) -> Result<size::SizeReport, EngineError> {
        let manifest = self.load().await?;
        Ok(size::analyze(&manifest, threshold_kb))
    }
}
