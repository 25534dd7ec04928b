//! htmlshot
//!
//! A single HTTP endpoint that accepts an HTML document and answers with a
//! WebP screenshot rendered by a headless Chromium.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives Chromium through the Chrome DevTools Protocol
//! - **Scoped sessions**: one browser process per request, always terminated
//! - **Remote executable** (default): fetch a pinned Chromium build at cold start
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use htmlshot::handler::{HandlerConfig, ScreenshotHandler};
//! use htmlshot::http::HttpRequest;
//!
//! let handler = ScreenshotHandler::new(htmlshot::new_launcher(), HandlerConfig::default());
//! let request = HttpRequest::new("POST", "/screenshot?width=640")
//!     .with_header("Content-Type", "text/html")
//!     .with_body("<h1>Hello</h1>");
//! let response = handler.handle(&request);
//! assert_eq!(response.status, 200);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "cdp"))]
//! # fn main() {}
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

#[cfg(feature = "cdp")]
pub mod cdp;

pub mod async_api;
pub mod config;
pub mod executable;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod request;
pub mod server;

pub use async_api::ScreenshotService;
pub use executable::ExecutableSource;
pub use handler::{HandlerConfig, ScreenshotHandler};
pub use request::RenderRequest;

/// Launch configuration for one browser session
///
/// A fresh value is built for every request: the viewport width comes from
/// the request, everything else from the service configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Browser executable; `None` lets the backend locate an installed Chrome
    pub executable: Option<PathBuf>,
    /// Viewport dimensions and pixel density
    pub viewport: Viewport,
    /// Extra command line arguments passed to the browser process
    pub args: Vec<String>,
    /// Whether to keep the Chromium sandbox enabled
    pub sandbox: bool,
    /// How long the browser connection may stay idle before it is dropped
    pub idle_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable: None,
            viewport: Viewport::default(),
            args: default_browser_args(),
            sandbox: false,
            idle_timeout_ms: 60_000,
        }
    }
}

/// Arguments suited to running Chromium in a container or serverless sandbox.
pub fn default_browser_args() -> Vec<String> {
    [
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--disable-extensions",
        "--disable-background-networking",
        "--disable-sync",
        "--hide-scrollbars",
        "--mute-audio",
        "--no-first-run",
        "--no-zygote",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    /// Device pixel ratio; 2.0 renders at retina density
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 900,
            device_scale_factor: 2.0,
        }
    }
}

/// Classification tag the browser attaches to each outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    TextTrack,
    Xhr,
    Fetch,
    Prefetch,
    EventSource,
    WebSocket,
    Manifest,
    SignedExchange,
    Ping,
    CspViolationReport,
    Preflight,
    Other,
}

impl ResourceType {
    /// Parse a DevTools resource type name (`"Media"`, `"WebSocket"`, ...).
    /// Unknown names map to [`ResourceType::Other`].
    pub fn from_cdp_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "image" => ResourceType::Image,
            "media" => ResourceType::Media,
            "font" => ResourceType::Font,
            "script" => ResourceType::Script,
            "texttrack" => ResourceType::TextTrack,
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            "prefetch" => ResourceType::Prefetch,
            "eventsource" => ResourceType::EventSource,
            "websocket" => ResourceType::WebSocket,
            "manifest" => ResourceType::Manifest,
            "signedexchange" => ResourceType::SignedExchange,
            "ping" => ResourceType::Ping,
            "cspviolationreport" => ResourceType::CspViolationReport,
            "preflight" => ResourceType::Preflight,
            _ => ResourceType::Other,
        }
    }

    /// Resource types that never contribute to a still image.
    pub fn is_non_visual(self) -> bool {
        matches!(
            self,
            ResourceType::Media | ResourceType::WebSocket | ResourceType::Manifest
        )
    }
}

/// Information about an outgoing network request
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Unique request identifier (backend-specific)
    pub request_id: String,
    /// Request URL
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Resource type reported by the browser
    pub resource_type: ResourceType,
}

/// Action to take when a request is observed by `on_request` handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestAction {
    /// Let the request proceed normally
    Continue,

    /// Abort the request with a DevTools network error reason (`"Failed"`,
    /// `"Aborted"`, `"BlockedByClient"`, ...)
    Fail { error_reason: String },
}

/// Request filter registered on a session.
pub type OnRequestHandler = Arc<dyn Fn(&RequestInfo) -> RequestAction + Send + Sync>;

/// Encoding of a captured screenshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Webp,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Parameters of a single capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    pub format: ImageFormat,
    /// Encoder quality in [1, 100]
    pub quality: u32,
    /// Capture the whole scrollable page instead of the viewport only
    pub full_page: bool,
}

/// Core trait for a browser session
///
/// An `Engine` owns one browser process with one page. It is created by a
/// [`Launcher`] at the start of a request and must be closed before the
/// request completes.
pub trait Engine {
    /// Register a callback consulted for every outgoing request of the page.
    /// Enables request interception on the backend.
    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static;

    /// Replace the page document with `html` and block until the `load`
    /// event fired and the network went quiet, or `timeout` elapsed
    /// ([`Error::Timeout`]).
    fn set_content(&mut self, html: &str, timeout: Duration) -> Result<()>;

    /// Let the page run for `delay` (timer evaluated inside the page).
    fn wait(&mut self, delay: Duration) -> Result<()>;

    /// Capture the current page.
    fn capture_screenshot(&mut self, options: &CaptureOptions) -> Result<Vec<u8>>;

    /// Terminate the browser process. Called exactly once per session.
    fn close(&mut self) -> Result<()>;
}

/// Creates browser sessions.
pub trait Launcher: Send + Sync {
    type Engine: Engine;

    /// Start a browser process configured by `config` and open its page.
    fn launch(&self, config: &EngineConfig) -> Result<Self::Engine>;
}

impl<L: Launcher + ?Sized> Launcher for Arc<L> {
    type Engine = L::Engine;

    fn launch(&self, config: &EngineConfig) -> Result<Self::Engine> {
        (**self).launch(config)
    }
}

/// Create the default launcher (CDP backend).
#[cfg(feature = "cdp")]
pub fn new_launcher() -> cdp::CdpLauncher {
    cdp::CdpLauncher::new()
}
