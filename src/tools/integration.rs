//! End-to-end tests for the tool surface
//!
//! Source and build tools run against a local HTTP fixture and temp
//! directories; they need no browser. Page-driving tests are gated on a
//! Chromium binary being present on PATH.

use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::{Tool, ToolContext};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::ErrorKind;

/// Minified bundle with a trailer pointing at its map
const BUNDLE_JS: &str = "var pad=1;function t(){return doThing()}\n//# sourceMappingURL=main.min.js.map";

/// Original source served through sourcesContent; line 12 holds doThing.
const ORIGINAL_TS: &str = "// src/a.ts\n\
line2\nline3\nline4\nline5\nline6\nline7\nline8\nline9\nline10\nline11\n\
export function doThing() {\n  return 42;\n}\n";

/// v3 map placing generated (1,1000) at src/a.ts:12:4, name doThing.
/// Segment two is [999, 0, 11, 3, 0] in VLQ.
fn map_json() -> String {
    json!({
        "version": 3,
        "file": "main.min.js",
        "sources": ["src/a.ts"],
        "sourcesContent": [ORIGINAL_TS],
        "names": ["doThing"],
        "mappings": "AAAA,u+BAWGA"
    })
    .to_string()
}

/// Route-aware HTTP test server speaking just enough HTTP/1.1
struct TestServer {
    addr: std::net::SocketAddr,
    shutdown: tokio::sync::oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(routes: Vec<(&'static str, &'static str, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Vec<(&'static str, &'static str, String)>> = Arc::new(routes);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accept = listener.accept() => {
                        if let Ok((mut socket, _)) = accept {
                            let routes = routes.clone();
                            tokio::spawn(async move {
                                let mut buf = [0u8; 2048];
                                let n = socket.read(&mut buf).await.unwrap_or(0);
                                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                                let path = request
                                    .split_whitespace()
                                    .nth(1)
                                    .unwrap_or("/")
                                    .to_string();

                                let found = routes.iter().find(|(p, _, _)| *p == path);
                                let response = match found {
                                    Some((_, content_type, body)) => format!(
                                        "HTTP/1.1 200 OK\r\n\
                                         Content-Type: {}\r\n\
                                         Content-Length: {}\r\n\
                                         Access-Control-Allow-Origin: *\r\n\
                                         Connection: close\r\n\
                                         \r\n\
                                         {}",
                                        content_type,
                                        body.len(),
                                        body
                                    ),
                                    None =>
                                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                            .to_string(),
                                };
                                let _ = socket.write_all(response.as_bytes()).await;
                            });
                        }
                    }
                }
            }
        });

        Self {
            addr,
            shutdown: shutdown_tx,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

fn test_engine() -> Arc<Engine> {
    Engine::new(Config::default())
}

fn test_engine_with_root(root: &std::path::Path) -> Arc<Engine> {
    Engine::new(Config {
        project_root: root.to_path_buf(),
        ..Config::default()
    })
}

async fn map_fixture() -> TestServer {
    TestServer::start(vec![
        ("/main.min.js", "application/javascript", BUNDLE_JS.to_string()),
        ("/main.min.js.map", "application/json", map_json()),
    ])
    .await
}

fn chrome_available() -> bool {
    let candidates = [
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "headless_shell",
    ];
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths)
            .any(|dir| candidates.iter().any(|c| dir.join(c).is_file()))
    })
}

macro_rules! require_chrome {
    () => {
        if !chrome_available() {
            eprintln!("Skipping test: Chrome/Chromium not on PATH");
            return;
        }
    };
}

// ============================================================================
// Source tools (HTTP fixture only)
// ============================================================================

#[tokio::test]
async fn resolve_minified_position_to_original() {
    let server = map_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let tool = super::source::SourceMapResolveTool;
    let result = tool
        .run(
            json!({ "url": server.url("/main.min.js"), "line": 1, "column": 1000 }),
            ctx,
        )
        .await
        .unwrap();

    assert_eq!(result["resolved"], json!(true));
    assert_eq!(result["originalFile"], json!("src/a.ts"));
    assert_eq!(result["originalLine"], json!(12));
    assert_eq!(result["originalColumn"], json!(4));
    assert_eq!(result["originalName"], json!("doThing"));
    assert!(result["sourceSnippet"]
        .as_str()
        .unwrap()
        .contains("doThing"));

    server.shutdown().await;
}

#[tokio::test]
async fn resolution_round_trips_through_get_content() {
    let server = map_fixture().await;
    let engine = test_engine();

    let resolved = super::source::SourceMapResolveTool
        .run(
            json!({ "url": server.url("/main.min.js"), "line": 1, "column": 1000 }),
            ToolContext::new(engine.clone()),
        )
        .await
        .unwrap();
    let line = resolved["originalLine"].as_u64().unwrap();

    let content = super::source::SourceMapGetContentTool
        .run(
            json!({
                "url": server.url("/main.min.js"),
                "file": "src/a.ts",
                "startLine": line,
                "endLine": line
            }),
            ToolContext::new(engine),
        )
        .await
        .unwrap();

    assert_eq!(content["startLine"], json!(line));
    assert_eq!(
        content["content"].as_str().unwrap(),
        resolved["sourceSnippet"].as_str().unwrap()
    );

    server.shutdown().await;
}

#[tokio::test]
async fn stack_resolution_survives_missing_maps() {
    let server = map_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let stack = format!(
        "TypeError: x is not a function\n    at t ({}:1:1000)\n    at nope (http://127.0.0.1:1/gone.js:1:5)",
        server.url("/main.min.js")
    );
    let result = super::source::SourceTraceStackTool
        .run(json!({ "stack": stack }), ctx)
        .await
        .unwrap();

    assert_eq!(result["totalCount"], json!(2));
    assert_eq!(result["resolvedCount"], json!(1));
    let frames = result["frames"].as_array().unwrap();
    // Message line passes through without a location.
    assert!(frames[0]["location"].is_null());
    assert_eq!(frames[1]["location"]["originalFile"], json!("src/a.ts"));
    assert_eq!(frames[2]["location"]["resolved"], json!(false));

    server.shutdown().await;
}

#[tokio::test]
async fn bundle_overview_lists_sources_and_samples() {
    let server = map_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let result = super::source::SourceMapBundleTool
        .run(json!({ "url": server.url("/main.min.js") }), ctx)
        .await
        .unwrap();

    assert_eq!(result["sourceCount"], json!(1));
    assert_eq!(result["sources"][0]["file"], json!("src/a.ts"));
    assert_eq!(result["sources"][0]["hasInlineContent"], json!(true));
    assert!(!result["sampleMappings"].as_array().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn definition_scan_finds_symbol_and_exports() {
    let server = map_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let result = super::source::SourceFindDefinitionTool
        .run(
            json!({ "url": server.url("/main.min.js"), "symbol": "doThing" }),
            ctx,
        )
        .await
        .unwrap();

    assert_eq!(result["file"], json!("src/a.ts"));
    assert_eq!(result["line"], json!(12));
    assert!(result["siblingExports"]
        .as_array()
        .unwrap()
        .contains(&json!("doThing")));

    server.shutdown().await;
}

#[tokio::test]
async fn missing_map_yields_source_map_unavailable() {
    let server = TestServer::start(vec![(
        "/bare.js",
        "application/javascript",
        "var x=1;".to_string(),
    )])
    .await;
    let ctx = ToolContext::new(test_engine());

    let err = super::source::SourceMapResolveTool
        .run(json!({ "url": server.url("/bare.js"), "line": 1, "column": 1 }), ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::SourceMapUnavailable);
    assert!(err.hint.is_some());

    server.shutdown().await;
}

#[tokio::test]
async fn offline_coverage_maps_to_original_lines() {
    let server = map_fixture().await;
    let ctx = ToolContext::new(test_engine());

    // Cover the whole first generated line.
    let coverage = json!({
        "result": [{
            "scriptId": "1",
            "url": server.url("/main.min.js"),
            "functions": [{
                "functionName": "",
                "isBlockCoverage": true,
                "ranges": [{ "startOffset": 0, "endOffset": 40, "count": 1 }]
            }]
        }]
    });
    let result = super::source::SourceCoverageMapTool
        .run(json!({ "coverage": coverage }), ctx)
        .await
        .unwrap();

    let files = result["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["file"], json!("src/a.ts"));
    assert!(!files[0]["coveredLines"].as_array().unwrap().is_empty());

    server.shutdown().await;
}

// ============================================================================
// Build tools (temp project root)
// ============================================================================

fn write_stats(dir: &std::path::Path) {
    let stats = json!({
        "version": "5.90.0",
        "chunks": [
            {"id": "main", "files": ["main.js"], "size": 250 * 1024, "entry": true, "initial": true},
            {"id": "vendor", "files": ["vendor.js"], "size": 450 * 1024, "entry": false, "initial": false}
        ],
        "modules": [
            {"id": 1, "name": "./src/index.js", "size": 1200, "chunks": ["main"], "reasons": []},
            {"id": 2, "name": "./node_modules/lodash/lodash.js", "size": 70000, "chunks": ["vendor"],
             "reasons": [{"moduleName": "./src/index.js"}]}
        ],
        "assets": [
            {"name": "main.js", "size": 250 * 1024},
            {"name": "vendor.js", "size": 450 * 1024}
        ]
    });
    std::fs::write(dir.join("stats.json"), stats.to_string()).unwrap();
}

#[tokio::test]
async fn bundle_analysis_reports_expected_recommendations() {
    let dir = tempfile::tempdir().unwrap();
    write_stats(dir.path());
    let ctx = ToolContext::new(test_engine_with_root(dir.path()));

    let result = super::build::BuildAnalyzeSizeTool
        .run(json!({ "threshold": 100 }), ctx)
        .await
        .unwrap();

    assert_eq!(result["totals"]["jsKb"], json!(700));
    let recommendations: Vec<String> = result["recommendations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap().to_string())
        .collect();
    assert!(recommendations.iter().any(|r| r.contains("code splitting")));
    assert!(recommendations
        .iter()
        .any(|r| r.contains("route-level lazy loading")));
    assert!(!recommendations.iter().any(|r| r.contains("duplication")));
}

#[tokio::test]
async fn find_module_round_trips_through_dependencies() {
    let dir = tempfile::tempdir().unwrap();
    write_stats(dir.path());
    let engine = test_engine_with_root(dir.path());

    let module = super::build::BuildFindModuleTool
        .run(json!({ "name": "lodash" }), ToolContext::new(engine.clone()))
        .await
        .unwrap();
    let name = module["name"].as_str().unwrap().to_string();
    assert!(name.contains("lodash"));

    let deps = super::build::BuildGetDependenciesTool
        .run(json!({ "module": name.clone() }), ToolContext::new(engine))
        .await
        .unwrap();
    assert_eq!(deps["modules"][0]["name"], json!(name));
    assert!(deps["modules"][0]["dependents"]
        .as_array()
        .unwrap()
        .contains(&json!("./src/index.js")));
}

#[tokio::test]
async fn missing_manifest_is_not_found_with_hint() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = ToolContext::new(test_engine_with_root(dir.path()));

    let err = super::build::BuildGetManifestTool
        .run(json!({}), ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.hint.as_deref().unwrap().contains("PROJECT_ROOT"));
}

// ============================================================================
// Page-driving tools (need a browser)
// ============================================================================

/// Page that fires three XHRs and logs clustered errors
const APP_HTML: &str = r#"<!DOCTYPE html>
<html>
<head><title>Fixture App</title></head>
<body>
<div id="app">ready</div>
<script>
  fetch('/api/users/1');
  fetch('/api/users/2');
  fetch('/api/orders/1');
  console.error('User ID 12345 not found');
  console.error('User ID 67890 not found');
  console.error('User ID 11111 not found');
  console.error('Disk full');
</script>
</body>
</html>"#;

async fn app_fixture() -> TestServer {
    TestServer::start(vec![
        ("/", "text/html", APP_HTML.to_string()),
        ("/api/users/1", "application/json", "{\"id\":1}".to_string()),
        ("/api/users/2", "application/json", "{\"id\":2}".to_string()),
        ("/api/orders/1", "application/json", "{\"id\":1}".to_string()),
    ])
    .await
}

#[tokio::test]
async fn network_requests_filter_by_url_pattern() {
    require_chrome!();
    let server = app_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let result = super::network::NetworkGetByUrlTool
        .run(
            json!({ "url": server.url("/"), "pattern": "/api/users/*", "settleMs": 2000 }),
            ctx,
        )
        .await
        .unwrap();

    let requests = result["requests"].as_array().unwrap();
    assert_eq!(requests.len(), 2, "expected both user XHRs: {result}");
    // Ordered by start time.
    assert!(requests[0]["url"].as_str().unwrap().ends_with("/api/users/1"));
    assert!(requests[1]["url"].as_str().unwrap().ends_with("/api/users/2"));

    server.shutdown().await;
}

#[tokio::test]
async fn similar_errors_cluster_by_pattern() {
    require_chrome!();
    let server = app_fixture().await;
    let ctx = ToolContext::new(test_engine());

    let result = super::error::ErrorGetSimilarTool
        .run(
            json!({ "url": server.url("/"), "fragment": "User ID 12345 not found", "settleMs": 2000 }),
            ctx,
        )
        .await
        .unwrap();

    assert_eq!(result["found"], json!(true));
    assert_eq!(result["pattern"], json!("User ID N not found"));
    let clusters = result["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 1, "Disk full must not cluster in: {result}");
    assert_eq!(clusters[0]["cluster"]["count"], json!(3));

    server.shutdown().await;
}

#[tokio::test]
async fn trace_cause_classifies_network_failure() {
    require_chrome!();
    // /api/x is not routed: the fetch fails and logs an error.
    let server = TestServer::start(vec![(
        "/",
        "text/html",
        r#"<!DOCTYPE html><html><body><script>
            fetch('http://127.0.0.1:9/api/x').catch(function (e) {
              console.error('TypeError: Failed to fetch');
            });
        </script></body></html>"#
            .to_string(),
    )])
    .await;
    let ctx = ToolContext::new(test_engine());

    let result = super::error::ErrorTraceCauseTool
        .run(
            json!({ "url": server.url("/"), "fragment": "Failed to fetch", "settleMs": 2500 }),
            ctx,
        )
        .await
        .unwrap();

    assert_eq!(result["found"], json!(true));
    assert_eq!(result["classification"], json!("network"));
    assert_eq!(result["confidence"], json!("high"));
    assert_eq!(result["relatedErrors"], json!([]));
    let recommendations = result["recommendations"].as_array().unwrap();
    assert!(recommendations.iter().any(|r| {
        let r = r.as_str().unwrap();
        r.contains("connectivity") || r.contains("CORS") || r.contains("endpoint")
    }));

    server.shutdown().await;
}

#[tokio::test]
async fn component_tree_degrades_to_dom_heuristics() {
    require_chrome!();
    let server = TestServer::start(vec![(
        "/",
        "text/html",
        r#"<!DOCTYPE html><html><body>
            <div id="root"><header><nav>x</nav></header><main><p>y</p></main></div>
        </body></html>"#
            .to_string(),
    )])
    .await;
    let ctx = ToolContext::new(test_engine());

    let result = super::component::ComponentTreeTool
        .run(json!({ "url": server.url("/"), "selector": "#root" }), ctx)
        .await
        .unwrap();

    assert_eq!(result["framework"], json!("unknown"));
    assert_eq!(result["supported"], json!(false));
    let tree = result["tree"].as_array().unwrap();
    assert_eq!(tree[0]["name"], json!("div#root"));
    assert!(!tree[0]["children"].as_array().unwrap().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn selector_miss_is_not_found_with_echo() {
    require_chrome!();
    let server = TestServer::start(vec![(
        "/",
        "text/html",
        "<html><body><div>nothing here</div></body></html>".to_string(),
    )])
    .await;
    let ctx = ToolContext::new(test_engine());

    let err = super::component::ComponentGetPropsTool
        .run(
            json!({ "url": server.url("/"), "selector": "#missing" }),
            ctx,
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.message.contains("#missing"));

    server.shutdown().await;
}
