//! Engine context: the shared subsystems injected into every tool call
//!
//! Caches are scoped to the engine's lifetime rather than living as module
//! globals, so tests can build isolated engines.

use std::sync::Arc;

use crate::browser::BrowserPool;
use crate::build_index::BuildArtifactIndex;
use crate::config::Config;
use crate::source_map::SourceMapCache;

pub struct Engine {
    pub config: Arc<Config>,
    pub browser: BrowserPool,
    pub source_maps: SourceMapCache,
    pub build: BuildArtifactIndex,
}

impl Engine {
    pub fn new(config: Config) -> Arc<Self> {
        let config = Arc::new(config);
        let http = reqwest::Client::builder()
            .user_agent(concat!("pagescope/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            browser: BrowserPool::new(config.clone()),
            source_maps: SourceMapCache::new(http),
            build: BuildArtifactIndex::new(config.clone()),
            config,
        })
    }
}
