//! Service configuration from command line flags and environment variables

use crate::executable::ExecutableSource;
use crate::handler::HandlerConfig;
use crate::{default_browser_args, Error, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_ROUTE: &str = "/screenshot";
const DEFAULT_VIEWPORT_HEIGHT: u32 = 900;
const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 2.0;
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DURATION_SECS: u64 = 60;
const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Render HTML documents to WebP screenshots over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "htmlshot", version, about)]
pub struct ServiceConfig {
    /// Address to listen on
    #[arg(long, env = "HTMLSHOT_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Path of the screenshot endpoint
    #[arg(long, env = "HTMLSHOT_ROUTE", default_value = DEFAULT_ROUTE)]
    pub route: String,

    /// Use the browser executable at this path
    #[arg(long, env = "CHROME_PATH", conflicts_with = "chrome_pack_url")]
    pub chrome_path: Option<PathBuf>,

    /// Download a pinned browser build from this URL at startup
    #[arg(long, env = "CHROMIUM_PACK_URL")]
    pub chrome_pack_url: Option<String>,

    /// Where downloaded browser builds are cached
    #[arg(long, env = "HTMLSHOT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Viewport height in CSS pixels
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_HEIGHT)]
    pub viewport_height: u32,

    /// Device pixel ratio used for rendering
    #[arg(long, default_value_t = DEFAULT_DEVICE_SCALE_FACTOR)]
    pub device_scale_factor: f64,

    /// Timeout for load and network quiescence, in milliseconds
    #[arg(long, env = "HTMLSHOT_NAVIGATION_TIMEOUT_MS", default_value_t = DEFAULT_NAVIGATION_TIMEOUT_MS)]
    pub navigation_timeout_ms: u64,

    /// Extra delay after the page settled, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SETTLE_DELAY_MS)]
    pub settle_delay_ms: u64,

    /// Execution budget of a whole request, in seconds
    #[arg(long, env = "HTMLSHOT_MAX_DURATION_SECS", default_value_t = DEFAULT_MAX_DURATION_SECS)]
    pub max_duration_secs: u64,

    /// Largest accepted request body, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub max_body_bytes: usize,

    /// Runtime worker threads (defaults to the number of CPUs)
    #[arg(long, env = "HTMLSHOT_WORKERS")]
    pub workers: Option<usize>,

    /// Extra argument passed to the browser (repeatable)
    #[arg(long = "browser-arg", allow_hyphen_values = true)]
    pub browser_args: Vec<String>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,
}

/// Built-in defaults. Unlike parsing, this never reads the environment.
impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            route: DEFAULT_ROUTE.to_string(),
            chrome_path: None,
            chrome_pack_url: None,
            cache_dir: None,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            device_scale_factor: DEFAULT_DEVICE_SCALE_FACTOR,
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            workers: None,
            browser_args: Vec::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ServiceConfig {
    /// Reject settings that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if !self.route.starts_with('/') {
            return Err(Error::ConfigError(format!(
                "route must start with '/': {}",
                self.route
            )));
        }
        if self.viewport_height == 0 {
            return Err(Error::ConfigError("viewport height must be positive".into()));
        }
        if !self.device_scale_factor.is_finite() || self.device_scale_factor <= 0.0 {
            return Err(Error::ConfigError(
                "device scale factor must be positive".into(),
            ));
        }
        if self.navigation_timeout_ms >= self.max_duration().as_millis() as u64 {
            return Err(Error::ConfigError(format!(
                "navigation timeout ({}ms) must stay below the execution budget ({}s)",
                self.navigation_timeout_ms, self.max_duration_secs
            )));
        }
        if self.workers == Some(0) {
            return Err(Error::ConfigError("workers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn executable_source(&self) -> ExecutableSource {
        if let Some(url) = &self.chrome_pack_url {
            return ExecutableSource::Remote {
                url: url.clone(),
                cache_dir: self
                    .cache_dir
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("htmlshot-browser")),
            };
        }
        match &self.chrome_path {
            Some(path) => ExecutableSource::Local(path.clone()),
            None => ExecutableSource::Auto,
        }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn worker_threads(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    /// Handler settings, given the resolved browser executable.
    pub fn handler_config(&self, executable: Option<PathBuf>) -> HandlerConfig {
        let mut browser_args = default_browser_args();
        browser_args.extend(self.browser_args.iter().cloned());

        HandlerConfig {
            route: self.route.clone(),
            executable,
            viewport_height: self.viewport_height,
            device_scale_factor: self.device_scale_factor,
            navigation_timeout_ms: self.navigation_timeout_ms,
            settle_delay_ms: self.settle_delay_ms,
            browser_args,
            // Keep the DevTools connection alive for the whole request budget.
            idle_timeout_ms: self.max_duration_secs * 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = ServiceConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.route, "/screenshot");
        assert_eq!(cfg.navigation_timeout_ms, 30_000);
        assert_eq!(cfg.max_duration(), Duration::from_secs(60));
        assert!(cfg.worker_threads() >= 1);
    }

    #[test]
    fn default_listen_matches_flag_default() {
        assert_eq!(
            ServiceConfig::default().listen,
            DEFAULT_LISTEN.parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn navigation_timeout_must_fit_budget() {
        let cfg = ServiceConfig::parse_from([
            "htmlshot",
            "--navigation-timeout-ms",
            "10000",
            "--max-duration-secs",
            "10",
        ]);
        assert!(matches!(cfg.validate(), Err(Error::ConfigError(_))));
    }

    #[test]
    fn pack_url_selects_remote_source() {
        let cfg = ServiceConfig::parse_from([
            "htmlshot",
            "--chrome-pack-url",
            "https://example.com/chromium-v131",
            "--cache-dir",
            "/var/cache/htmlshot",
        ]);
        assert_eq!(
            cfg.executable_source(),
            ExecutableSource::Remote {
                url: "https://example.com/chromium-v131".into(),
                cache_dir: PathBuf::from("/var/cache/htmlshot"),
            }
        );
    }

    #[test]
    fn chrome_path_selects_local_source() {
        let cfg = ServiceConfig::parse_from(["htmlshot", "--chrome-path", "/opt/chrome/chrome"]);
        assert_eq!(
            cfg.executable_source(),
            ExecutableSource::Local(PathBuf::from("/opt/chrome/chrome"))
        );
    }

    #[test]
    fn path_and_url_conflict() {
        let res = ServiceConfig::try_parse_from([
            "htmlshot",
            "--chrome-path",
            "/opt/chrome",
            "--chrome-pack-url",
            "https://example.com/c",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn handler_config_appends_browser_args() {
        let cfg = ServiceConfig::parse_from([
            "htmlshot",
            "--browser-arg",
            "--lang=de-DE",
            "--viewport-height",
            "700",
        ]);
        let handler = cfg.handler_config(None);
        assert_eq!(handler.viewport_height, 700);
        assert_eq!(handler.idle_timeout_ms, 60_000);
        assert!(handler.browser_args.iter().any(|a| a == "--lang=de-DE"));
        assert!(handler.browser_args.iter().any(|a| a == "--hide-scrollbars"));
    }
}
