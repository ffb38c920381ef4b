//! A scoped, instrumented page acquisition

use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::SetExtraHttpHeadersParams;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::Page;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;

use super::pool::BrowserHandle;
use crate::error::EngineError;
use crate::instrument::{Collectors, EventBuffer};

/// Client-supplied options for a page session
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub viewport: Option<(u32, u32)>,
    pub user_agent: Option<String>,
    /// Extra HTTP headers sent with every request (credential context)
    pub extra_headers: Option<serde_json::Map<String, serde_json::Value>>,
    /// Enable the precise-coverage collector for this session
    pub coverage: bool,
    /// Per-call settle override
    pub settle: Option<Duration>,
}

struct SessionInner {
    page: Page,
    collectors: Collectors,
    handle: Arc<BrowserHandle>,
    context_id: Option<BrowserContextId>,
    permit: OwnedSemaphorePermit,
}

impl SessionInner {
    async fn shutdown(mut self) {
        self.collectors.detach();
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("page close failed: {e}");
        }
        if let Some(context_id) = self.context_id.take() {
            let params = DisposeBrowserContextParams::new(context_id);
            if let Err(e) = self.handle.browser.execute(params).await {
                tracing::debug!("context dispose failed: {e}");
            }
        }
        drop(self.permit);
    }
}

/// An acquired page plus its event buffer. Closing is guaranteed: callers
/// should `close()` explicitly; `Drop` spawns the same cleanup as a
/// backstop so a timed-out or panicked call still releases its slot.
pub struct PageSession {
    inner: Option<SessionInner>,
    buffer: Arc<StdMutex<EventBuffer>>,
}

impl PageSession {
    pub(crate) fn new(
        page: Page,
        collectors: Collectors,
        handle: Arc<BrowserHandle>,
        context_id: Option<BrowserContextId>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        let buffer = collectors.buffer();
        Self {
            inner: Some(SessionInner {
                page,
                collectors,
                handle,
                context_id,
                permit,
            }),
            buffer,
        }
    }

    fn inner(&self) -> &SessionInner {
        self.inner.as_ref().expect("session used after close")
    }

    pub fn page(&self) -> &Page {
        &self.inner().page
    }

    pub fn buffer(&self) -> Arc<StdMutex<EventBuffer>> {
        self.buffer.clone()
    }

    pub(crate) async fn apply_options(&self, opts: &SessionOptions) -> Result<(), EngineError> {
        let page = self.page();
        if let Some(agent) = &opts.user_agent {
            page.set_user_agent(agent.as_str()).await?;
        }
        if let Some((width, height)) = opts.viewport {
            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(width),
                i64::from(height),
                1.0,
                false,
            ))
            .await?;
        }
        if let Some(headers) = &opts.extra_headers {
            let headers: chromiumoxide::cdp::browser_protocol::network::Headers =
                serde_json::from_value(serde_json::Value::Object(headers.clone()))?;
            page.execute(SetExtraHttpHeadersParams::new(headers)).await?;
        }
        Ok(())
    }

    /// Navigate and wait for `load`, bounded by the navigation timeout.
    pub(crate) async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        let page = self.page();
        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| {
                EngineError::timeout(format!("navigation to {url} did not complete"))
                    .with_hint("Raise PAGESCOPE_NAV_TIMEOUT_MS for slow pages.")
            })?
            .map_err(|e| {
                EngineError::upstream_http(format!("navigation to {url} failed: {e}"))
                    .with_hint("Check that the URL is reachable from the server.")
            })?;
        // Best effort: goto resolves on frame navigation; give the load
        // event a chance to fire before the settle window starts.
        let _ = tokio::time::timeout(timeout, page.wait_for_navigation()).await;
        Ok(())
    }

    /// Collect precise coverage into the buffer (coverage sessions only).
    pub async fn finish_coverage(&self) -> Result<(), EngineError> {
        let inner = self.inner();
        inner.collectors.finish_coverage(&inner.page).await
    }

    /// Release the page, its context, and the pool slot.
    pub async fn close(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.shutdown().await;
        }
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(inner.shutdown());
            }
        }
    }
}
