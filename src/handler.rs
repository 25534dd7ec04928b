//! The screenshot request handler
//!
//! `ScreenshotHandler::handle` turns one HTTP request into one response:
//! method gating, HTML extraction and validation, option parsing, then a
//! render on a browser session that is released before the handler returns.

use crate::http::{HttpRequest, HttpResponse};
use crate::request::RenderRequest;
use crate::{
    default_browser_args, Engine, EngineConfig, ImageFormat, Launcher, RequestAction, RequestInfo,
    Result, Viewport,
};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Rendering and routing settings shared by every request.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Path served by the handler
    pub route: String,
    /// Browser executable; `None` lets the backend find one
    pub executable: Option<PathBuf>,
    /// Fixed viewport height in CSS pixels
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    /// Upper bound for load + network quiescence
    pub navigation_timeout_ms: u64,
    /// Extra time granted after the page settled, for late image decode/paint
    pub settle_delay_ms: u64,
    pub browser_args: Vec<String>,
    /// Idle timeout of the DevTools connection
    pub idle_timeout_ms: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            route: "/screenshot".to_string(),
            executable: None,
            viewport_height: 900,
            device_scale_factor: 2.0,
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 500,
            browser_args: default_browser_args(),
            idle_timeout_ms: 60_000,
        }
    }
}

impl HandlerConfig {
    /// Launch configuration for a session rendering at `width` pixels.
    pub fn engine_config(&self, width: u32) -> EngineConfig {
        EngineConfig {
            executable: self.executable.clone(),
            viewport: Viewport {
                width,
                height: self.viewport_height,
                device_scale_factor: self.device_scale_factor,
            },
            args: self.browser_args.clone(),
            sandbox: false,
            idle_timeout_ms: self.idle_timeout_ms,
        }
    }

    fn matches_route(&self, path: &str) -> bool {
        let trimmed = path.trim_end_matches('/');
        let route = self.route.trim_end_matches('/');
        trimmed == route
    }
}

/// Aborts requests that cannot affect a still image (media, websockets,
/// manifests); everything else proceeds.
pub fn block_non_visual(info: &RequestInfo) -> RequestAction {
    if info.resource_type.is_non_visual() {
        RequestAction::Fail {
            error_reason: "Failed".to_string(),
        }
    } else {
        RequestAction::Continue
    }
}

/// Scoped ownership of one browser session.
///
/// `Engine::close` runs exactly once: on [`SessionGuard::release`], or on
/// drop if the guard is abandoned (early return, panic).
pub struct SessionGuard<E: Engine> {
    engine: E,
    released: bool,
}

impl<E: Engine> SessionGuard<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            released: false,
        }
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Terminate the session and report the outcome.
    pub fn release(mut self) -> Result<()> {
        self.close_once()
    }

    fn close_once(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.engine.close()
    }
}

impl<E: Engine> Drop for SessionGuard<E> {
    fn drop(&mut self) {
        if let Err(e) = self.close_once() {
            warn!("Failed to close browser session: {}", e);
        }
    }
}

/// Stateless screenshot handler parameterized by its browser launcher.
pub struct ScreenshotHandler<L> {
    launcher: L,
    config: HandlerConfig,
}

impl<L: Launcher> ScreenshotHandler<L> {
    pub fn new(launcher: L, config: HandlerConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Handle one request. Never fails: errors become JSON responses.
    pub fn handle(&self, req: &HttpRequest) -> HttpResponse {
        let started = Instant::now();
        let response = match self.try_handle(req) {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    warn!("Page did not settle for {} {}: {}", req.method, req.path, e);
                } else if e.status_code() >= 500 {
                    error!("Screenshot error: {}", e);
                } else {
                    debug!("Rejected {} {}: {}", req.method, req.path, e);
                }
                HttpResponse::from_error(&e)
            }
        };
        info!(
            "{} {} -> {} ({} bytes, {}ms)",
            req.method,
            req.path,
            response.status,
            response.body.len(),
            started.elapsed().as_millis()
        );
        response
    }

    fn try_handle(&self, req: &HttpRequest) -> Result<HttpResponse> {
        if !self.config.matches_route(&req.path) {
            return Err(crate::Error::NotFound);
        }

        match req.method.as_str() {
            "OPTIONS" => return Ok(HttpResponse::empty(200)),
            "POST" => {}
            _ => return Err(crate::Error::MethodNotAllowed),
        }

        let render = RenderRequest::from_http(req)?;
        let image = self.render(&render)?;
        Ok(HttpResponse::image(image, ImageFormat::Webp))
    }

    /// Render `request` on a fresh browser session.
    ///
    /// The session is released before this returns, whatever the outcome.
    pub fn render(&self, request: &RenderRequest) -> Result<Vec<u8>> {
        info!(
            "Rendering {} bytes of HTML (width {}, quality {}, full_page {})",
            request.html.len(),
            request.viewport_width,
            request.quality,
            request.full_page
        );

        let engine = self
            .launcher
            .launch(&self.config.engine_config(request.viewport_width))?;
        let mut session = SessionGuard::new(engine);

        let rendered = self.drive(session.engine_mut(), request);
        let released = session.release();

        match (rendered, released) {
            (Ok(image), Ok(())) => Ok(image),
            (Ok(image), Err(e)) => {
                warn!("Browser session did not close cleanly: {}", e);
                Ok(image)
            }
            (Err(e), Err(close_err)) => {
                warn!("Browser session did not close cleanly: {}", close_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    fn drive(&self, engine: &mut L::Engine, request: &RenderRequest) -> Result<Vec<u8>> {
        engine.on_request(block_non_visual)?;

        debug!("Loading content");
        engine.set_content(
            &request.html,
            Duration::from_millis(self.config.navigation_timeout_ms),
        )?;

        debug!("Page settled; waiting {}ms before capture", self.config.settle_delay_ms);
        engine.wait(Duration::from_millis(self.config.settle_delay_ms))?;

        let image = engine.capture_screenshot(&request.capture_options())?;
        debug!("Captured {} bytes", image.len());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureOptions, Error, ResourceType};
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingEngine {
        closes: Rc<Cell<u32>>,
        fail_close: bool,
    }

    impl Engine for CountingEngine {
        fn on_request<F>(&mut self, _cb: F) -> Result<()>
        where
            F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static,
        {
            Ok(())
        }

        fn set_content(&mut self, _html: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        fn wait(&mut self, _delay: Duration) -> Result<()> {
            Ok(())
        }

        fn capture_screenshot(&mut self, _options: &CaptureOptions) -> Result<Vec<u8>> {
            Ok(vec![1])
        }

        fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            if self.fail_close {
                Err(Error::Other("already gone".into()))
            } else {
                Ok(())
            }
        }
    }

    fn counting(fail_close: bool) -> (CountingEngine, Rc<Cell<u32>>) {
        let closes = Rc::new(Cell::new(0));
        (
            CountingEngine {
                closes: closes.clone(),
                fail_close,
            },
            closes,
        )
    }

    #[test]
    fn guard_release_closes_once() {
        let (engine, closes) = counting(false);
        let guard = SessionGuard::new(engine);
        guard.release().unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn guard_drop_closes_once() {
        let (engine, closes) = counting(true);
        {
            let _guard = SessionGuard::new(engine);
        }
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn guard_closes_on_panic() {
        let (engine, closes) = counting(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = SessionGuard::new(engine);
            panic!("render blew up");
        }));
        assert!(result.is_err());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn filter_blocks_only_non_visual_types() {
        let info = |t| RequestInfo {
            request_id: "1".into(),
            url: "https://example.com/x".into(),
            method: "GET".into(),
            resource_type: t,
        };
        for t in [ResourceType::Media, ResourceType::WebSocket, ResourceType::Manifest] {
            assert!(matches!(block_non_visual(&info(t)), RequestAction::Fail { .. }));
        }
        for t in [
            ResourceType::Document,
            ResourceType::Stylesheet,
            ResourceType::Image,
            ResourceType::Font,
            ResourceType::Script,
        ] {
            assert_eq!(block_non_visual(&info(t)), RequestAction::Continue);
        }
    }

    #[test]
    fn engine_config_uses_request_width() {
        let cfg = HandlerConfig::default().engine_config(1024);
        assert_eq!(cfg.viewport.width, 1024);
        assert_eq!(cfg.viewport.height, 900);
        assert_eq!(cfg.viewport.device_scale_factor, 2.0);
    }

    #[test]
    fn route_matching_ignores_trailing_slash() {
        let cfg = HandlerConfig::default();
        assert!(cfg.matches_route("/screenshot"));
        assert!(cfg.matches_route("/screenshot/"));
        assert!(!cfg.matches_route("/screenshots"));
        assert!(!cfg.matches_route("/"));
    }
}
