//! Error reasoning: normalization, clustering, classification, correlation
//!
//! Everything here is deterministic: identical buffers and fragments
//! produce identical output. The only suspension point is stack resolution
//! through the source map cache.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::instrument::{ConsoleEvent, ConsoleKind, NetworkEvent};
use crate::source_map::cache::{ResolvedStack, SourceMapCache};
use crate::source_map::parse_stack;

/// Correlation window around the exemplar error
const CORRELATION_WINDOW_MS: f64 = 2000.0;
/// Score a cluster must exceed to count as related; a bare error-kind
/// match alone does not clear it
const RELATED_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    TypeError,
    ReferenceError,
    Network,
    Rendering,
    Generic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCluster {
    pub pattern_key: String,
    pub count: usize,
    pub first_seen_ms: f64,
    pub last_seen_ms: f64,
    pub exemplar_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemplar_stack: Option<String>,
    /// Sequence numbers of the clustered events
    pub correlated_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCluster {
    #[serde(flatten)]
    pub cluster: ErrorCluster,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedRequest {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Offset from the exemplar error, negative = before it
    pub delta_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseReport {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ErrorClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exemplar: Option<ConsoleEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_stack: Option<ResolvedStack>,
    pub related_errors: Vec<RelatedCluster>,
    pub correlated_requests: Vec<CorrelatedRequest>,
    pub recommendations: Vec<String>,
}

fn re_quoted() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).unwrap())
}

fn re_hex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap())
}

fn re_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").unwrap())
}

/// Derive the cluster pattern key: dynamic values normalized out.
pub fn normalize_pattern(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("");
    let s = re_quoted().replace_all(first_line, "'S'");
    let s = re_hex().replace_all(&s, "0xH");
    let s = re_number().replace_all(&s, "N");
    s.trim().to_string()
}

/// Rule-table classification of an error message.
pub fn classify(message: &str) -> (ErrorClass, Confidence) {
    static RULES: OnceLock<Vec<(Regex, ErrorClass, Confidence)>> = OnceLock::new();
    let rules = RULES.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?i)is not a function|undefined|null").unwrap(),
                ErrorClass::TypeError,
                Confidence::High,
            ),
            (
                Regex::new(r"(?i)is not defined").unwrap(),
                ErrorClass::ReferenceError,
                Confidence::High,
            ),
            (
                Regex::new(r"(?i)fetch|network|xhr|cors").unwrap(),
                ErrorClass::Network,
                Confidence::High,
            ),
            (
                Regex::new(r"(?i)render|component").unwrap(),
                ErrorClass::Rendering,
                Confidence::Medium,
            ),
        ]
    });
    for (re, class, confidence) in rules {
        if re.is_match(message) {
            return (*class, *confidence);
        }
    }
    (ErrorClass::Generic, Confidence::Low)
}

fn is_error_event(event: &ConsoleEvent) -> bool {
    matches!(event.kind, ConsoleKind::Error | ConsoleKind::PageError)
}

/// Group console errors by normalized pattern key, ordered by first
/// appearance.
pub fn cluster_errors(events: &[ConsoleEvent]) -> Vec<ErrorCluster> {
    let mut order: Vec<String> = Vec::new();
    let mut clusters: BTreeMap<String, ErrorCluster> = BTreeMap::new();

    for event in events.iter().filter(|e| is_error_event(e)) {
        let key = normalize_pattern(&event.message);
        let entry = clusters.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            ErrorCluster {
                pattern_key: key,
                count: 0,
                first_seen_ms: event.at_ms,
                last_seen_ms: event.at_ms,
                exemplar_message: event.message.clone(),
                exemplar_stack: event.stack.clone(),
                correlated_ids: Vec::new(),
            }
        });
        entry.count += 1;
        entry.first_seen_ms = entry.first_seen_ms.min(event.at_ms);
        entry.last_seen_ms = entry.last_seen_ms.max(event.at_ms);
        // Newest occurrence becomes the exemplar.
        entry.exemplar_message = event.message.clone();
        if event.stack.is_some() {
            entry.exemplar_stack = event.stack.clone();
        }
        entry.correlated_ids.push(event.seq);
    }

    order
        .into_iter()
        .filter_map(|key| clusters.remove(&key))
        .collect()
}

fn stack_positions(stack: Option<&str>) -> Vec<(String, u32, u32)> {
    stack
        .map(|s| {
            parse_stack(s)
                .into_iter()
                .filter_map(|f| match (f.url, f.line, f.column) {
                    (Some(url), Some(line), Some(column)) => Some((url, line, column)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Similarity in [0, 1]: error-kind match (0.3), word overlap of the
/// normalized messages (up to 0.5), shared stack frames (up to 0.2).
pub fn similarity(a: &ErrorCluster, b: &ErrorCluster) -> f64 {
    let mut score = 0.0;

    let (class_a, _) = classify(&a.exemplar_message);
    let (class_b, _) = classify(&b.exemplar_message);
    if class_a == class_b {
        score += 0.3;
    }

    let words_a: Vec<&str> = a.pattern_key.split_whitespace().collect();
    let words_b: Vec<&str> = b.pattern_key.split_whitespace().collect();
    if !words_a.is_empty() && !words_b.is_empty() {
        let shared = words_a.iter().filter(|w| words_b.contains(w)).count();
        let union = words_a.len() + words_b.len() - shared;
        if union > 0 {
            score += 0.5 * (shared as f64 / union as f64);
        }
    }

    let frames_a = stack_positions(a.exemplar_stack.as_deref());
    let frames_b = stack_positions(b.exemplar_stack.as_deref());
    if !frames_a.is_empty() && !frames_b.is_empty() {
        let shared = frames_a.iter().filter(|f| frames_b.contains(f)).count();
        let denom = frames_a.len().max(frames_b.len());
        score += 0.2 * (shared as f64 / denom as f64);
    }

    (score * 1000.0).round() / 1000.0
}

/// Network events within the correlation window, failed requests first,
/// then nearest in time.
pub fn correlate_network(events: &[NetworkEvent], error_at_ms: f64) -> Vec<CorrelatedRequest> {
    let mut hits: Vec<CorrelatedRequest> = events
        .iter()
        .filter(|e| {
            let reference = e.ended_at_ms.unwrap_or(e.started_at_ms);
            (reference - error_at_ms).abs() <= CORRELATION_WINDOW_MS
        })
        .map(|e| CorrelatedRequest {
            url: e.url.clone(),
            method: e.method.clone(),
            status: e.status,
            failure: e.failure.clone(),
            delta_ms: e.ended_at_ms.unwrap_or(e.started_at_ms) - error_at_ms,
        })
        .collect();
    hits.sort_by(|a, b| {
        let failed_a = a.failure.is_some() || a.status.is_some_and(|s| s >= 400);
        let failed_b = b.failure.is_some() || b.status.is_some_and(|s| s >= 400);
        failed_b
            .cmp(&failed_a)
            .then_with(|| a.delta_ms.abs().partial_cmp(&b.delta_ms.abs()).unwrap_or(std::cmp::Ordering::Equal))
    });
    hits
}

/// Rule base mapping classification and correlation onto action strings.
pub fn recommendations(
    class: ErrorClass,
    correlated: &[CorrelatedRequest],
) -> Vec<String> {
    let mut out = Vec::new();
    match class {
        ErrorClass::TypeError => {
            out.push("Guard the failing access with optional chaining or an explicit null check.".to_string());
            out.push("Trace where the value is produced; it is undefined or null at the call site.".to_string());
            out.push("If the value comes from an async source, verify the component handles the loading state.".to_string());
        }
        ErrorClass::ReferenceError => {
            out.push("The identifier is not in scope; check for a missing import or a typo.".to_string());
            out.push("If the symbol comes from a script tag, verify the script loads before its first use.".to_string());
        }
        ErrorClass::Network => {
            out.push("Check connectivity to the endpoint and that the API is reachable from the page's origin.".to_string());
            out.push("Inspect the response CORS headers; a missing Access-Control-Allow-Origin fails fetches silently.".to_string());
            out.push("Verify the endpoint path and method; 4xx statuses usually mean the route or payload is wrong.".to_string());
            if let Some(failed) = correlated.iter().find(|r| r.failure.is_some() || r.status.is_some_and(|s| s >= 400)) {
                out.push(format!(
                    "Start with {} {} ({}); it failed within the correlation window.",
                    failed.method,
                    failed.url,
                    failed
                        .failure
                        .clone()
                        .or_else(|| failed.status.map(|s| format!("HTTP {s}")))
                        .unwrap_or_else(|| "failed".to_string())
                ));
            }
        }
        ErrorClass::Rendering => {
            out.push("Inspect the component's props and state at the failure point with the component tools.".to_string());
            out.push("Check for renders driven by unstable references (new objects/arrays every render).".to_string());
        }
        ErrorClass::Generic => {
            out.push("Resolve the stack to original sources and read the surrounding code.".to_string());
            out.push("Correlate the timestamp with network and console activity around the failure.".to_string());
        }
    }
    out.truncate(5);
    out
}

fn root_cause_text(class: ErrorClass, exemplar: &ConsoleEvent, correlated: &[CorrelatedRequest]) -> String {
    match class {
        ErrorClass::Network => {
            if let Some(req) = correlated.first().filter(|r| r.failure.is_some() || r.status.is_some_and(|s| s >= 400)) {
                format!(
                    "Network failure: {} {} {} {:.0} ms {} the error",
                    req.method,
                    req.url,
                    req.failure.clone().or_else(|| req.status.map(|s| format!("returned HTTP {s}"))).unwrap_or_else(|| "failed".to_string()),
                    req.delta_ms.abs(),
                    if req.delta_ms <= 0.0 { "before" } else { "after" },
                )
            } else {
                format!("Network-related error: {}", exemplar.message.lines().next().unwrap_or(""))
            }
        }
        ErrorClass::TypeError => format!(
            "Type error: a value used at the failure point is undefined/null or not callable ({})",
            normalize_pattern(&exemplar.message)
        ),
        ErrorClass::ReferenceError => format!(
            "Reference error: an identifier is missing from scope ({})",
            normalize_pattern(&exemplar.message)
        ),
        ErrorClass::Rendering => format!(
            "Rendering error in a component: {}",
            normalize_pattern(&exemplar.message)
        ),
        ErrorClass::Generic => format!(
            "Unclassified error: {}",
            normalize_pattern(&exemplar.message)
        ),
    }
}

/// Full root-cause procedure over a buffer snapshot.
pub async fn trace_cause(
    console: &[ConsoleEvent],
    network: &[NetworkEvent],
    fragment: &str,
    source_maps: &SourceMapCache,
) -> RootCauseReport {
    let Some(exemplar) = console
        .iter()
        .filter(|e| is_error_event(e) && e.message.contains(fragment))
        .max_by_key(|e| e.seq)
        .cloned()
    else {
        return RootCauseReport {
            found: false,
            root_cause: None,
            classification: None,
            confidence: None,
            exemplar: None,
            resolved_stack: None,
            related_errors: Vec::new(),
            correlated_requests: Vec::new(),
            recommendations: Vec::new(),
        };
    };

    let resolved_stack = match &exemplar.stack {
        Some(stack) => Some(source_maps.resolve_stack(stack).await),
        None => None,
    };

    let (class, confidence) = classify(&exemplar.message);

    let clusters = cluster_errors(console);
    let exemplar_key = normalize_pattern(&exemplar.message);
    let own = clusters.iter().find(|c| c.pattern_key == exemplar_key).cloned();

    let related_errors: Vec<RelatedCluster> = match &own {
        Some(own) => clusters
            .iter()
            .filter(|c| c.pattern_key != own.pattern_key)
            .map(|c| RelatedCluster {
                cluster: c.clone(),
                similarity: similarity(own, c),
            })
            .filter(|r| r.similarity > RELATED_THRESHOLD)
            .collect(),
        None => Vec::new(),
    };

    let correlated_requests = if class == ErrorClass::Network {
        correlate_network(network, exemplar.at_ms)
    } else {
        Vec::new()
    };

    let recommendations = recommendations(class, &correlated_requests);
    let root_cause = root_cause_text(class, &exemplar, &correlated_requests);

    RootCauseReport {
        found: true,
        root_cause: Some(root_cause),
        classification: Some(class),
        confidence: Some(confidence),
        exemplar: Some(exemplar),
        resolved_stack,
        related_errors,
        correlated_requests,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(seq: u64, kind: ConsoleKind, message: &str, at_ms: f64) -> ConsoleEvent {
        ConsoleEvent {
            seq,
            kind,
            message: message.to_string(),
            at_ms,
            stack: None,
        }
    }

    #[test]
    fn pattern_normalization_rules() {
        assert_eq!(
            normalize_pattern("User ID 12345 not found"),
            "User ID N not found"
        );
        assert_eq!(
            normalize_pattern("cannot read 'name' of undefined"),
            "cannot read 'S' of undefined"
        );
        assert_eq!(
            normalize_pattern("bad handle 0x1A2F at slot 3"),
            "bad handle 0xH at slot N"
        );
        // Stack lines after the message do not leak into the key.
        assert_eq!(
            normalize_pattern("boom\n    at f (https://x/y.js:1:2)"),
            "boom"
        );
    }

    #[test]
    fn classification_rule_order() {
        assert_eq!(
            classify("TypeError: x is not a function"),
            (ErrorClass::TypeError, Confidence::High)
        );
        assert_eq!(
            classify("foo is not defined"),
            (ErrorClass::ReferenceError, Confidence::High)
        );
        assert_eq!(
            classify("TypeError: Failed to fetch"),
            (ErrorClass::Network, Confidence::High)
        );
        assert_eq!(
            classify("Too many re-renders"),
            (ErrorClass::Rendering, Confidence::Medium)
        );
        assert_eq!(
            classify("disk full"),
            (ErrorClass::Generic, Confidence::Low)
        );
    }

    #[test]
    fn clustering_groups_by_pattern() {
        let events = vec![
            console(0, ConsoleKind::Error, "User ID 12345 not found", 10.0),
            console(1, ConsoleKind::Error, "User ID 67890 not found", 20.0),
            console(2, ConsoleKind::Error, "User ID 11111 not found", 30.0),
            console(3, ConsoleKind::Error, "Disk full", 40.0),
            console(4, ConsoleKind::Log, "User ID 99999 not found", 50.0),
        ];
        let clusters = cluster_errors(&events);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].pattern_key, "User ID N not found");
        assert_eq!(clusters[0].count, 3);
        assert_eq!(clusters[0].first_seen_ms, 10.0);
        assert_eq!(clusters[0].last_seen_ms, 30.0);
        assert_eq!(clusters[0].exemplar_message, "User ID 11111 not found");
        assert_eq!(clusters[0].correlated_ids, vec![0, 1, 2]);
        assert_eq!(clusters[1].pattern_key, "Disk full");
    }

    #[test]
    fn similarity_is_symmetric_and_bounded() {
        let clusters = cluster_errors(&[
            console(0, ConsoleKind::Error, "User ID 1 not found", 0.0),
            console(1, ConsoleKind::Error, "Order ID 2 not found", 0.0),
        ]);
        let ab = similarity(&clusters[0], &clusters[1]);
        let ba = similarity(&clusters[1], &clusters[0]);
        assert!((ab - ba).abs() < f64::EPSILON);
        assert!((0.0..=1.0).contains(&ab));
        // Same class (generic) + most words shared: clearly related.
        assert!(ab >= RELATED_THRESHOLD);
    }

    #[test]
    fn unrelated_clusters_score_low() {
        let clusters = cluster_errors(&[
            console(0, ConsoleKind::Error, "User ID 1 not found", 0.0),
            console(1, ConsoleKind::Error, "Failed to fetch", 0.0),
        ]);
        assert!(similarity(&clusters[0], &clusters[1]) < RELATED_THRESHOLD);
    }

    fn network(id: &str, status: Option<u16>, failure: Option<&str>, ended: f64) -> NetworkEvent {
        NetworkEvent {
            seq: 0,
            id: id.to_string(),
            url: format!("https://api.example/{id}"),
            method: "GET".to_string(),
            resource_type: Some("fetch".to_string()),
            status,
            failure: failure.map(str::to_string),
            request_headers: serde_json::Map::new(),
            response_headers: None,
            request_body: None,
            response_body: None,
            initiator_stack: None,
            started_at_ms: ended - 10.0,
            ended_at_ms: Some(ended),
            timings: None,
        }
    }

    #[test]
    fn network_correlation_prefers_failures_in_window() {
        let events = vec![
            network("ok", Some(200), None, 990.0),
            network("failed", None, Some("net::ERR_FAILED"), 950.0),
            network("far", Some(500), None, 5000.0),
        ];
        let hits = correlate_network(&events, 1000.0);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://api.example/failed");
        assert!((hits[0].delta_ms - -50.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn trace_cause_classifies_fetch_failure() {
        let smc = SourceMapCache::new(reqwest::Client::new());
        let console_events = vec![console(
            0,
            ConsoleKind::Error,
            "TypeError: Failed to fetch",
            1000.0,
        )];
        let network_events = vec![network("x", None, Some("net::ERR_CONNECTION_REFUSED"), 950.0)];

        let report = trace_cause(&console_events, &network_events, "Failed to fetch", &smc).await;
        assert!(report.found);
        assert_eq!(report.classification, Some(ErrorClass::Network));
        assert_eq!(report.confidence, Some(Confidence::High));
        assert!(report.related_errors.is_empty());
        assert_eq!(report.correlated_requests.len(), 1);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("CORS") || r.contains("connectivity") || r.contains("endpoint")));
        assert!(report.root_cause.unwrap().contains("Network failure"));
    }

    #[tokio::test]
    async fn trace_cause_without_match_reports_not_found() {
        let smc = SourceMapCache::new(reqwest::Client::new());
        let report = trace_cause(&[], &[], "anything", &smc).await;
        assert!(!report.found);
        assert!(report.recommendations.is_empty());
    }

    #[tokio::test]
    async fn trace_cause_is_deterministic() {
        let smc = SourceMapCache::new(reqwest::Client::new());
        let console_events = vec![
            console(0, ConsoleKind::Error, "User ID 1 not found", 100.0),
            console(1, ConsoleKind::Error, "Order ID 9 not found", 200.0),
        ];
        let a = trace_cause(&console_events, &[], "User ID", &smc).await;
        let b = trace_cause(&console_events, &[], "User ID", &smc).await;
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}
