//! Bounded pool of page sessions over a shared browser process

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

use super::page::{PageSession, SessionOptions};
use crate::config::{BrowserKind, Config};
use crate::error::EngineError;
use crate::instrument::Collectors;

/// Default viewport dimensions
const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

/// A launched browser process plus its CDP handler task
pub(crate) struct BrowserHandle {
    pub browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    async fn launch(config: &Config) -> Result<Self, EngineError> {
        if config.browser != BrowserKind::Chromium {
            return Err(EngineError::invalid_argument(format!(
                "BROWSER={:?} is not launchable by this server",
                config.browser
            ))
            .with_hint("Only Chromium-family browsers are supported; set BROWSER=chromium."));
        }

        let user_data_dir = std::env::temp_dir().join(format!("pagescope-{}", uuid::Uuid::new_v4()));

        let mut builder = BrowserConfig::builder();
        if config.headless {
            builder = builder.new_headless_mode();
        } else {
            builder = builder.with_head();
        }
        let browser_config = builder
            .no_sandbox() // Required for running as root / in containers
            .arg("--disable-gpu") // No GPU in server environment
            .arg("--disable-software-rasterizer")
            .user_data_dir(&user_data_dir)
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: DEFAULT_VIEWPORT_WIDTH,
                height: DEFAULT_VIEWPORT_HEIGHT,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .build()
            .map_err(EngineError::session_terminated)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| EngineError::session_terminated(format!("failed to launch browser: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("CDP handler error: {e}");
                }
            }
        });

        tracing::info!("Browser launched");
        Ok(Self {
            browser,
            handler_task,
        })
    }
}

impl Drop for BrowserHandle {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// Owns the browser process and bounds concurrent page sessions
pub struct BrowserPool {
    config: Arc<Config>,
    slots: Arc<Semaphore>,
    browser: Mutex<Option<Arc<BrowserHandle>>>,
}

impl BrowserPool {
    pub fn new(config: Arc<Config>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_sessions.max(1)));
        Self {
            config,
            slots,
            browser: Mutex::new(None),
        }
    }

    /// Verify the browser process responds, relaunching it if it crashed.
    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.ensure_browser().await.map(|_| ())
    }

    async fn ensure_browser(&self) -> Result<Arc<BrowserHandle>, EngineError> {
        let mut guard = self.browser.lock().await;
        if let Some(handle) = guard.as_ref() {
            if handle.browser.version().await.is_ok() {
                return Ok(handle.clone());
            }
            tracing::warn!("Browser unresponsive, relaunching");
            *guard = None;
        }
        let handle = Arc::new(BrowserHandle::launch(&self.config).await?);
        *guard = Some(handle.clone());
        Ok(handle)
    }

    /// Acquire an instrumented page session at `url`.
    ///
    /// Waits for a pool slot (bounded by the queue timeout), health-checks
    /// the browser, creates an isolated context, attaches collectors before
    /// navigation, navigates, then waits the settle interval so collectors
    /// observe post-load activity.
    pub async fn acquire(
        &self,
        url: &str,
        opts: SessionOptions,
    ) -> Result<PageSession, EngineError> {
        let permit = tokio::time::timeout(
            self.config.queue_timeout,
            self.slots.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            EngineError::resource_exhausted(format!(
                "all {} page sessions are busy",
                self.config.max_sessions
            ))
            .with_hint("Retry shortly or raise PAGESCOPE_MAX_SESSIONS.")
        })?
        .map_err(|_| EngineError::internal("session pool closed"))?;

        let handle = self.ensure_browser().await?;

        // Isolated context per session so tools cannot observe each other.
        let context_id = handle
            .browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(EngineError::internal)?;
        let page = handle
            .browser
            .new_page(target)
            .await
            .map_err(|e| EngineError::session_terminated(format!("failed to open page: {e}")))?;

        let collectors = Collectors::attach(
            &page,
            Arc::new(self.config.redact_headers.clone()),
            self.config.body_cap,
            opts.coverage,
        )
        .await?;

        let session = PageSession::new(page, collectors, handle, Some(context_id), permit);

        session.apply_options(&opts).await?;

        let nav = self.config.navigation_timeout;
        session.navigate(url, nav).await?;

        let settle = opts.settle.unwrap_or(self.config.settle);
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        Ok(session)
    }
}
