//! Chrome DevTools Protocol adapter implementation

use crate::lifecycle::{LoadWatcher, LOAD, NETWORK_IDLE};
use crate::{
    CaptureOptions, Engine, EngineConfig, Error, ImageFormat, Launcher, RequestAction,
    RequestInfo, ResourceType, Result, Viewport,
};
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::types::Bounds;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Launches one headless Chromium per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct CdpLauncher;

impl CdpLauncher {
    pub fn new() -> Self {
        CdpLauncher
    }
}

impl Launcher for CdpLauncher {
    type Engine = CdpEngine;

    fn launch(&self, config: &EngineConfig) -> Result<CdpEngine> {
        CdpEngine::new(config.clone())
    }
}

/// CDP-based browser session (uses the `headless_chrome` crate)
///
/// Owns a headless Chromium process and a single tab. The process is killed
/// when the session is closed or dropped.
pub struct CdpEngine {
    browser: Option<Browser>,
    tab: Arc<Tab>,
    config: EngineConfig,
    watcher: Arc<LoadWatcher>,
}

impl CdpEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut args = config.args.clone();
        args.push(format!(
            "--force-device-scale-factor={}",
            config.viewport.device_scale_factor
        ));
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .path(config.executable.clone())
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.idle_timeout_ms))
            .args(os_args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(config.idle_timeout_ms));

        // The main frame of a page target shares the target's id.
        let main_frame = tab.get_target_id().clone();
        let watcher = Arc::new(LoadWatcher::new());
        let events = watcher.clone();
        tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::PageLifecycleEvent(lifecycle) = event {
                if lifecycle.params.frame_id == main_frame {
                    events.record(&lifecycle.params.name);
                }
            }
        }))
        .map_err(|e| Error::InitializationError(format!("Failed to watch lifecycle events: {}", e)))?;

        tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })?;

        debug!(
            "Browser ready ({}x{} @{}x)",
            config.viewport.width, config.viewport.height, config.viewport.device_scale_factor
        );

        Ok(Self {
            browser: Some(browser),
            tab,
            config,
            watcher,
        })
    }

    /// Grow the window to the document's scroll size so the viewport covers
    /// the whole page, horizontal overflow included.
    fn expand_to_content(&self) -> Result<()> {
        let eval = self
            .tab
            .evaluate(MEASURE_CONTENT, false)
            .map_err(|e| Error::RenderError(format!("Failed to measure page: {}", e)))?;

        let content = eval
            .value
            .as_ref()
            .and_then(|v| v.as_str())
            .and_then(|raw| serde_json::from_str::<(f64, f64)>(raw).ok());

        if let Some((width, height)) = full_page_bounds(self.config.viewport, content) {
            debug!("Expanding viewport to {}x{} for full-page capture", width, height);
            self.tab
                .set_bounds(Bounds::Normal {
                    left: None,
                    top: None,
                    width: Some(width),
                    height: Some(height),
                })
                .map_err(|e| Error::RenderError(format!("Failed to resize viewport: {}", e)))?;
        }
        Ok(())
    }
}

/// Scroll size of the document as a JSON `[width, height]` pair.
const MEASURE_CONTENT: &str = "(() => { \
    const d = document.documentElement, b = document.body; \
    return JSON.stringify([ \
        Math.max(d.scrollWidth, b ? b.scrollWidth : 0), \
        Math.max(d.scrollHeight, b ? b.scrollHeight : 0) \
    ]); })()";

/// Window size covering `content`, or `None` when the viewport already does.
fn full_page_bounds(viewport: Viewport, content: Option<(f64, f64)>) -> Option<(f64, f64)> {
    let (content_width, content_height) = content?;
    let (view_width, view_height) = (f64::from(viewport.width), f64::from(viewport.height));
    let width = content_width.ceil().max(view_width);
    let height = content_height.ceil().max(view_height);
    if width > view_width || height > view_height {
        Some((width, height))
    } else {
        None
    }
}

fn resource_type_of(raw: &Network::ResourceType) -> ResourceType {
    serde_json::to_value(raw)
        .ok()
        .and_then(|v| v.as_str().map(ResourceType::from_cdp_name))
        .unwrap_or(ResourceType::Other)
}

fn error_reason_of(reason: &str) -> Network::ErrorReason {
    serde_json::from_value(serde_json::Value::String(reason.to_string()))
        .unwrap_or(Network::ErrorReason::Failed)
}

impl Engine for CdpEngine {
    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static,
    {
        // Enable fetch domain so we can intercept requests
        self.tab.enable_fetch(None, Some(false))?;

        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport, _session_id, event: RequestPausedEvent| {
                let params = &event.params;
                let info = RequestInfo {
                    request_id: params.request_id.clone(),
                    url: params.request.url.clone(),
                    method: params.request.method.clone(),
                    resource_type: resource_type_of(&params.resource_Type),
                };

                match cb(&info) {
                    RequestAction::Continue => RequestPausedDecision::Continue(None),
                    RequestAction::Fail { error_reason } => {
                        debug!("Blocking {:?} request {}", info.resource_type, info.url);
                        RequestPausedDecision::Fail(FailRequest {
                            request_id: params.request_id.clone(),
                            error_reason: error_reason_of(&error_reason),
                        })
                    }
                }
            },
        );

        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| Error::InitializationError(format!("Failed to enable request interception: {}", e)))?;
        Ok(())
    }

    fn set_content(&mut self, html: &str, timeout: Duration) -> Result<()> {
        let literal = serde_json::to_string(html)
            .map_err(|e| Error::LoadError(format!("Failed to encode document: {}", e)))?;
        let script = format!(
            "document.open(); document.write({}); document.close();",
            literal
        );

        self.watcher.reset();
        self.tab
            .evaluate(&script, false)
            .map_err(|e| Error::LoadError(format!("Failed to write document: {}", e)))?;

        self.watcher.wait_for(&[LOAD, NETWORK_IDLE], timeout)
    }

    fn wait(&mut self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        let script = format!(
            "new Promise(resolve => setTimeout(resolve, {}))",
            delay.as_millis()
        );
        self.tab
            .evaluate(&script, true)
            .map_err(|e| Error::ScriptError(format!("Settle delay failed: {}", e)))?;
        Ok(())
    }

    fn capture_screenshot(&mut self, options: &CaptureOptions) -> Result<Vec<u8>> {
        let format = match options.format {
            ImageFormat::Webp => Page::CaptureScreenshotFormatOption::Webp,
        };

        if options.full_page {
            self.expand_to_content()?;
        }

        let data = self
            .tab
            .capture_screenshot(format, Some(options.quality), None, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))?;

        Ok(data)
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the browser kills the child process.
        match self.browser.take() {
            Some(browser) => {
                drop(browser);
                debug!("Browser process terminated");
            }
            None => warn!("Browser session closed twice"),
        }
        Ok(())
    }
}
