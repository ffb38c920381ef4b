//! pagescope - frontend debugging intelligence over MCP
//!
//! Drives a headless browser against live URLs, correlates runtime
//! evidence with build artifacts, and answers structured questions about
//! components, network traffic, bundles, errors, and source locations.

mod browser;
mod build_index;
mod component;
mod config;
mod engine;
mod error;
mod instrument;
mod reasoner;
mod server;
mod source_map;
mod tools;

use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use engine::Engine;
use server::PagescopeServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging goes to stderr: stdout carries MCP frames and must stay
    // free of non-protocol bytes.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagescope=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        project_root = %config.project_root.display(),
        max_sessions = config.max_sessions,
        headless = config.headless,
        "Starting pagescope"
    );

    let engine = Engine::new(config);
    let server = PagescopeServer::new(engine);

    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
