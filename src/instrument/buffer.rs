//! Bounded, totally ordered event buffer owned by a page session

use serde::Serialize;
use std::collections::VecDeque;

/// Default per-kind capacities
pub const CONSOLE_CAP: usize = 1000;
pub const NETWORK_CAP: usize = 500;
pub const COVERAGE_CAP: usize = 200;

/// Console event kinds surfaced to tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
    Log,
    Warn,
    Error,
    /// Uncaught exception or unhandled promise rejection
    PageError,
}

impl ConsoleKind {
    /// Map a CDP console API type onto the four surfaced kinds
    pub fn from_api_type(t: &str) -> Self {
        match t {
            "warning" | "warn" => Self::Warn,
            "error" | "assert" => Self::Error,
            _ => Self::Log,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEvent {
    pub seq: u64,
    pub kind: ConsoleKind,
    pub message: String,
    /// Milliseconds since session start
    pub at_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// One captured stack frame in plain form (1-based line and column)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainFrame {
    pub function: String,
    pub url: String,
    pub line: u32,
    pub column: u32,
}

/// Phase timing breakdown for a completed request, all in milliseconds
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkTimings {
    pub dns: Option<f64>,
    pub connect: Option<f64>,
    pub ssl: Option<f64>,
    pub ttfb: Option<f64>,
    pub download: Option<f64>,
    pub total: Option<f64>,
}

/// A captured response body, possibly truncated at the configured cap
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyCapture {
    pub data: String,
    pub truncated: bool,
    pub total_bytes: usize,
    pub base64: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub seq: u64,
    pub id: String,
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Error text when the request failed at the network level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    pub request_headers: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<BodyCapture>,
    /// Present for fetch/XHR; parser-initiated resources have no stack
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initiator_stack: Option<Vec<PlainFrame>>,
    pub started_at_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<NetworkTimings>,
}

impl NetworkEvent {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some() || self.status.is_some_and(|s| s >= 400)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageEvent {
    pub seq: u64,
    pub script_url: String,
    /// Covered byte ranges (start, end) in the generated script
    pub ranges_covered: Vec<(u32, u32)>,
    pub at_ms: f64,
}

/// Ordered, bounded event store. Append-only during a session; capacity is
/// bounded per kind with oldest-first eviction.
#[derive(Debug, Default)]
pub struct EventBuffer {
    next_seq: u64,
    console: VecDeque<ConsoleEvent>,
    network: VecDeque<NetworkEvent>,
    coverage: VecDeque<CoverageEvent>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn push_console(&mut self, mut event: ConsoleEvent) {
        event.seq = self.bump();
        if self.console.len() >= CONSOLE_CAP {
            self.console.pop_front();
        }
        self.console.push_back(event);
    }

    /// Append a network event, returning its sequence number so the
    /// collector can complete it when the response arrives.
    pub fn push_network(&mut self, mut event: NetworkEvent) -> u64 {
        let seq = self.bump();
        event.seq = seq;
        if self.network.len() >= NETWORK_CAP {
            self.network.pop_front();
        }
        self.network.push_back(event);
        seq
    }

    /// Update a pending network event in place. Returns false when the
    /// event was already evicted.
    pub fn update_network(&mut self, id: &str, f: impl FnOnce(&mut NetworkEvent)) -> bool {
        // Recent events live at the back; scan from there.
        for event in self.network.iter_mut().rev() {
            if event.id == id {
                f(event);
                return true;
            }
        }
        false
    }

    pub fn push_coverage(&mut self, mut event: CoverageEvent) {
        event.seq = self.bump();
        if self.coverage.len() >= COVERAGE_CAP {
            self.coverage.pop_front();
        }
        self.coverage.push_back(event);
    }

    pub fn console(&self) -> impl Iterator<Item = &ConsoleEvent> {
        self.console.iter()
    }

    pub fn network(&self) -> impl Iterator<Item = &NetworkEvent> {
        self.network.iter()
    }

    pub fn coverage(&self) -> impl Iterator<Item = &CoverageEvent> {
        self.coverage.iter()
    }

    pub fn console_snapshot(&self) -> Vec<ConsoleEvent> {
        self.console.iter().cloned().collect()
    }

    pub fn network_snapshot(&self) -> Vec<NetworkEvent> {
        self.network.iter().cloned().collect()
    }

    pub fn coverage_snapshot(&self) -> Vec<CoverageEvent> {
        self.coverage.iter().cloned().collect()
    }

    pub fn console_len(&self) -> usize {
        self.console.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn console_event(message: &str) -> ConsoleEvent {
        ConsoleEvent {
            seq: 0,
            kind: ConsoleKind::Log,
            message: message.to_string(),
            at_ms: 0.0,
            stack: None,
        }
    }

    fn network_event(id: &str) -> NetworkEvent {
        NetworkEvent {
            seq: 0,
            id: id.to_string(),
            url: format!("https://example.com/{id}"),
            method: "GET".to_string(),
            resource_type: None,
            status: None,
            failure: None,
            request_headers: serde_json::Map::new(),
            response_headers: None,
            request_body: None,
            response_body: None,
            initiator_stack: None,
            started_at_ms: 0.0,
            ended_at_ms: None,
            timings: None,
        }
    }

    #[test]
    fn sequence_is_monotonic_across_kinds() {
        let mut buf = EventBuffer::new();
        buf.push_console(console_event("a"));
        buf.push_network(network_event("r1"));
        buf.push_console(console_event("b"));

        let seqs: Vec<u64> = buf
            .console()
            .map(|e| e.seq)
            .chain(buf.network().map(|e| e.seq))
            .collect();
        assert_eq!(seqs, vec![0, 2, 1]);
    }

    #[test]
    fn update_finds_pending_request() {
        let mut buf = EventBuffer::new();
        buf.push_network(network_event("r1"));
        buf.push_network(network_event("r2"));

        assert!(buf.update_network("r1", |e| e.status = Some(200)));
        assert!(!buf.update_network("missing", |e| e.status = Some(200)));

        let first = buf.network().next().unwrap();
        assert_eq!(first.status, Some(200));
    }

    #[test]
    fn console_kind_mapping() {
        assert_eq!(ConsoleKind::from_api_type("warning"), ConsoleKind::Warn);
        assert_eq!(ConsoleKind::from_api_type("error"), ConsoleKind::Error);
        assert_eq!(ConsoleKind::from_api_type("debug"), ConsoleKind::Log);
    }

    proptest! {
        #[test]
        fn eviction_keeps_most_recent(n in 1usize..3000) {
            let mut buf = EventBuffer::new();
            for i in 0..n {
                buf.push_console(console_event(&format!("m{i}")));
            }
            let len = buf.console_len();
            prop_assert_eq!(len, n.min(CONSOLE_CAP));

            let seqs: Vec<u64> = buf.console().map(|e| e.seq).collect();
            // Retained events are the most recent, in ascending seq order.
            prop_assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            prop_assert_eq!(*seqs.last().unwrap(), n as u64 - 1);
            prop_assert_eq!(seqs[0], (n - len) as u64);
        }
    }
}
