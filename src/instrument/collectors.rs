//! CDP event collectors feeding the session's event buffer
//!
//! All collectors attach before navigation. Each runs as a spawned task
//! draining a CDP event stream; the tasks are aborted when the session is
//! released.

use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFailed, EventLoadingFinished,
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::cdp::js_protocol::profiler::{
    EnableParams as ProfilerEnableParams, StartPreciseCoverageParams, StopPreciseCoverageParams,
    TakePreciseCoverageParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    EventConsoleApiCalled, EventExceptionThrown, StackTrace,
};
use chromiumoxide::Page;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::task::JoinHandle;

use super::buffer::{
    BodyCapture, ConsoleEvent, ConsoleKind, CoverageEvent, EventBuffer, NetworkEvent,
    NetworkTimings, PlainFrame,
};
use super::redact::capture_headers;
use crate::error::EngineError;

/// Resource types whose bodies are worth capturing
const BODY_TYPES: &[&str] = &["xhr", "fetch", "document", "script", "stylesheet", "other"];

/// Render a CDP stack trace as V8-style text (1-based positions) so the
/// same stack parser handles live and reported stacks.
fn stack_to_text(stack: &StackTrace) -> String {
    stack
        .call_frames
        .iter()
        .map(|f| {
            let name = if f.function_name.is_empty() {
                "<anonymous>"
            } else {
                &f.function_name
            };
            format!(
                "    at {} ({}:{}:{})",
                name,
                f.url,
                f.line_number + 1,
                f.column_number + 1
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn stack_to_frames(stack: &StackTrace) -> Vec<PlainFrame> {
    stack
        .call_frames
        .iter()
        .map(|f| PlainFrame {
            function: f.function_name.clone(),
            url: f.url.clone(),
            line: u32::try_from(f.line_number + 1).unwrap_or(0),
            column: u32::try_from(f.column_number + 1).unwrap_or(0),
        })
        .collect()
}

/// Phase breakdown from CDP resource timing. Absent phases are -1 in the
/// wire format and become None here.
fn compute_timings(
    timing: &serde_json::Value,
    started_at_ms: f64,
    ended_at_ms: f64,
) -> NetworkTimings {
    let get = |key: &str| -> Option<f64> {
        timing.get(key).and_then(serde_json::Value::as_f64).filter(|v| *v >= 0.0)
    };
    let span = |start: Option<f64>, end: Option<f64>| -> Option<f64> {
        match (start, end) {
            (Some(s), Some(e)) if e >= s => Some(e - s),
            _ => None,
        }
    };

    let receive_headers_end = get("receiveHeadersEnd");
    NetworkTimings {
        dns: span(get("dnsStart"), get("dnsEnd")),
        connect: span(get("connectStart"), get("connectEnd")),
        ssl: span(get("sslStart"), get("sslEnd")),
        ttfb: span(get("sendEnd"), receive_headers_end),
        download: receive_headers_end
            .map(|rhe| (ended_at_ms - started_at_ms - rhe).max(0.0)),
        total: Some((ended_at_ms - started_at_ms).max(0.0)),
    }
}

/// Attached collector set for one page session
pub struct Collectors {
    buffer: Arc<StdMutex<EventBuffer>>,
    tasks: Vec<JoinHandle<()>>,
    epoch: Instant,
    coverage: bool,
}

impl Collectors {
    /// Attach console, network, and (optionally) coverage collectors to a
    /// page that has not yet navigated.
    pub async fn attach(
        page: &Page,
        redact: Arc<Vec<String>>,
        body_cap: usize,
        coverage: bool,
    ) -> Result<Self, EngineError> {
        let buffer = Arc::new(StdMutex::new(EventBuffer::new()));
        // CDP delivers resource timing on responseReceived but the end
        // timestamp only on loadingFinished; pending timings wait here.
        let raw_timings: Arc<StdMutex<HashMap<String, serde_json::Value>>> =
            Arc::new(StdMutex::new(HashMap::new()));
        let epoch = Instant::now();
        let mut tasks = Vec::new();

        page.execute(NetworkEnableParams::default()).await?;

        // Console API calls
        {
            let mut events = page.event_listener::<EventConsoleApiCalled>().await?;
            let buffer = buffer.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let kind = ConsoleKind::from_api_type(
                        format!("{:?}", event.r#type).to_lowercase().as_str(),
                    );
                    let message = event
                        .args
                        .iter()
                        .map(|arg| {
                            if let Some(value) = &arg.value {
                                match value {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                }
                            } else if let Some(desc) = &arg.description {
                                desc.clone()
                            } else if let Some(unser) = &arg.unserializable_value {
                                unser.inner().clone()
                            } else {
                                String::from("[unknown]")
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(" ");
                    let stack = event.stack_trace.as_ref().map(stack_to_text);
                    let at_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push_console(ConsoleEvent {
                            seq: 0,
                            kind,
                            message,
                            at_ms,
                            stack,
                        });
                    }
                }
            }));
        }

        // Uncaught exceptions and unhandled rejections
        {
            let mut events = page.event_listener::<EventExceptionThrown>().await?;
            let buffer = buffer.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let details = &event.exception_details;
                    let message = details
                        .exception
                        .as_ref()
                        .and_then(|e| e.description.clone())
                        .unwrap_or_else(|| details.text.clone());
                    let stack = details.stack_trace.as_ref().map(stack_to_text);
                    let at_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push_console(ConsoleEvent {
                            seq: 0,
                            kind: ConsoleKind::PageError,
                            message,
                            at_ms,
                            stack,
                        });
                    }
                }
            }));
        }

        // Request lifecycle: requestWillBeSent opens the record
        {
            let mut events = page.event_listener::<EventRequestWillBeSent>().await?;
            let buffer = buffer.clone();
            let redact = redact.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let headers_value =
                        serde_json::to_value(&event.request.headers).unwrap_or_default();
                    let initiator_stack = event
                        .initiator
                        .stack
                        .as_ref()
                        .map(stack_to_frames)
                        .filter(|frames| !frames.is_empty());
                    let at_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push_network(NetworkEvent {
                            seq: 0,
                            id: event.request_id.inner().clone(),
                            url: event.request.url.clone(),
                            method: event.request.method.clone(),
                            resource_type: event
                                .r#type
                                .as_ref()
                                .map(|t| format!("{t:?}").to_lowercase()),
                            status: None,
                            failure: None,
                            request_headers: capture_headers(&headers_value, &redact),
                            response_headers: None,
                            request_body: event.request.post_data.clone(),
                            response_body: None,
                            initiator_stack,
                            started_at_ms: at_ms,
                            ended_at_ms: None,
                            timings: None,
                        });
                    }
                }
            }));
        }

        // responseReceived fills status, headers, and raw timing
        {
            let mut events = page.event_listener::<EventResponseReceived>().await?;
            let buffer = buffer.clone();
            let redact = redact.clone();
            let raw_timings = raw_timings.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let status = u16::try_from(event.response.status).ok();
                    let headers_value =
                        serde_json::to_value(&event.response.headers).unwrap_or_default();
                    let timing = event
                        .response
                        .timing
                        .as_ref()
                        .and_then(|t| serde_json::to_value(t).ok());
                    let id = event.request_id.inner().clone();
                    if let Some(t) = timing {
                        if let Ok(mut pending) = raw_timings.lock() {
                            pending.insert(id.clone(), t);
                        }
                    }
                    if let Ok(mut buf) = buffer.lock() {
                        buf.update_network(&id, |net| {
                            net.status = status;
                            net.response_headers =
                                Some(capture_headers(&headers_value, &redact));
                        });
                    }
                }
            }));
        }

        // loadingFinished completes the record and captures the body
        {
            let mut events = page.event_listener::<EventLoadingFinished>().await?;
            let buffer = buffer.clone();
            let raw_timings = raw_timings.clone();
            let page = page.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let id = event.request_id.inner().clone();
                    let at_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    let raw = raw_timings
                        .lock()
                        .ok()
                        .and_then(|mut pending| pending.remove(&id));

                    let should_capture = {
                        let Ok(mut buf) = buffer.lock() else { continue };
                        let mut capture = false;
                        buf.update_network(&id, |net| {
                            net.ended_at_ms = Some(at_ms);
                            if let Some(raw) = &raw {
                                net.timings =
                                    Some(compute_timings(raw, net.started_at_ms, at_ms));
                            } else {
                                net.timings = Some(NetworkTimings {
                                    total: Some((at_ms - net.started_at_ms).max(0.0)),
                                    ..NetworkTimings::default()
                                });
                            }
                            capture = net
                                .resource_type
                                .as_deref()
                                .is_none_or(|t| BODY_TYPES.contains(&t));
                        });
                        capture
                    };

                    if should_capture {
                        let body = page
                            .execute(GetResponseBodyParams::new(event.request_id.clone()))
                            .await
                            .ok();
                        if let Some(body) = body {
                            let total_bytes = body.body.len();
                            let truncated = total_bytes > body_cap;
                            let data = if truncated {
                                let mut d: String =
                                    body.body.chars().take(body_cap).collect();
                                d.push_str("\n…[truncated]");
                                d
                            } else {
                                body.body.clone()
                            };
                            if let Ok(mut buf) = buffer.lock() {
                                buf.update_network(&id, |net| {
                                    net.response_body = Some(BodyCapture {
                                        data: data.clone(),
                                        truncated,
                                        total_bytes,
                                        base64: body.base64_encoded,
                                    });
                                });
                            }
                        }
                    }
                }
            }));
        }

        // loadingFailed marks network-level failures
        {
            let mut events = page.event_listener::<EventLoadingFailed>().await?;
            let buffer = buffer.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    let id = event.request_id.inner().clone();
                    let at_ms = epoch.elapsed().as_secs_f64() * 1000.0;
                    if let Ok(mut buf) = buffer.lock() {
                        buf.update_network(&id, |net| {
                            net.failure = Some(event.error_text.clone());
                            net.ended_at_ms = Some(at_ms);
                            net.timings = Some(NetworkTimings {
                                total: Some((at_ms - net.started_at_ms).max(0.0)),
                                ..NetworkTimings::default()
                            });
                        });
                    }
                }
            }));
        }

        if coverage {
            page.execute(ProfilerEnableParams::default()).await?;
            let mut precise = StartPreciseCoverageParams::default();
            precise.call_count = Some(false);
            precise.detailed = Some(true);
            page.execute(precise).await?;
        }

        Ok(Self {
            buffer,
            tasks,
            epoch,
            coverage,
        })
    }

    pub fn buffer(&self) -> Arc<StdMutex<EventBuffer>> {
        self.buffer.clone()
    }

    /// Collect precise coverage into the buffer and disable the profiler.
    pub async fn finish_coverage(&self, page: &Page) -> Result<(), EngineError> {
        if !self.coverage {
            return Ok(());
        }
        let result = page
            .execute(TakePreciseCoverageParams::default())
            .await?;
        let at_ms = self.epoch.elapsed().as_secs_f64() * 1000.0;
        if let Ok(mut buf) = self.buffer.lock() {
            for script in &result.result.result {
                let mut ranges: Vec<(u32, u32)> = Vec::new();
                for function in &script.functions {
                    for range in &function.ranges {
                        if range.count > 0 {
                            ranges.push((
                                u32::try_from(range.start_offset).unwrap_or(0),
                                u32::try_from(range.end_offset).unwrap_or(0),
                            ));
                        }
                    }
                }
                if script.url.is_empty() {
                    continue;
                }
                ranges.sort_unstable();
                buf.push_coverage(CoverageEvent {
                    seq: 0,
                    script_url: script.url.clone(),
                    ranges_covered: ranges,
                    at_ms,
                });
            }
        }
        page.execute(StopPreciseCoverageParams::default()).await?;
        Ok(())
    }

    /// Stop the collector tasks. Buffered events stay readable.
    pub fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Collectors {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timing_phases_from_cdp_shape() {
        let timing = json!({
            "dnsStart": 1.0, "dnsEnd": 5.0,
            "connectStart": 5.0, "connectEnd": 20.0,
            "sslStart": 10.0, "sslEnd": 20.0,
            "sendEnd": 22.0, "receiveHeadersEnd": 52.0,
        });
        let t = compute_timings(&timing, 100.0, 180.0);
        assert_eq!(t.dns, Some(4.0));
        assert_eq!(t.connect, Some(15.0));
        assert_eq!(t.ssl, Some(10.0));
        assert_eq!(t.ttfb, Some(30.0));
        assert_eq!(t.download, Some(28.0));
        assert_eq!(t.total, Some(80.0));
    }

    #[test]
    fn absent_phases_are_none() {
        let timing = json!({
            "dnsStart": -1.0, "dnsEnd": -1.0,
            "sendEnd": 2.0, "receiveHeadersEnd": 10.0,
        });
        let t = compute_timings(&timing, 0.0, 30.0);
        assert_eq!(t.dns, None);
        assert_eq!(t.connect, None);
        assert_eq!(t.ttfb, Some(8.0));
        assert_eq!(t.total, Some(30.0));
    }
}
