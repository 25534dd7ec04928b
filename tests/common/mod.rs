//! Recording browser backend shared by the integration tests.

#![allow(dead_code)]

use htmlshot::lifecycle::{LoadWatcher, INIT, LOAD, NETWORK_IDLE};
use htmlshot::{
    CaptureOptions, Engine, EngineConfig, Error, Launcher, OnRequestHandler, RequestAction,
    RequestInfo, Result,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Smallest byte sequence that still looks like a WebP container.
pub const FAKE_WEBP: &[u8] = b"RIFF\x1a\0\0\0WEBPVP8L\x0d\0\0\0\x2f\0\0\0\x10\x07\x10\x11\x11\x88\x88\xfe\x07\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Succeed,
    /// The page never reports network quiescence
    NeverSettle,
    FailLaunch,
    FailCapture,
}

/// Everything the handler asked of the browser.
#[derive(Default)]
pub struct Calls {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub configs: Mutex<Vec<EngineConfig>>,
    pub contents: Mutex<Vec<String>>,
    pub timeouts: Mutex<Vec<Duration>>,
    pub waits: Mutex<Vec<Duration>>,
    pub captures: Mutex<Vec<CaptureOptions>>,
    pub filter: Mutex<Option<OnRequestHandler>>,
}

impl Calls {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_capture(&self) -> CaptureOptions {
        *self
            .captures
            .lock()
            .unwrap()
            .last()
            .expect("no capture recorded")
    }

    pub fn last_config(&self) -> EngineConfig {
        self.configs
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no launch recorded")
    }

    /// Run the registered request filter against a request of `resource_type`.
    pub fn filter_decision(&self, resource_type: &str) -> RequestAction {
        let filter = self.filter.lock().unwrap();
        let filter = filter.as_ref().expect("no request filter registered");
        filter(&RequestInfo {
            request_id: "42".into(),
            url: "https://cdn.example.com/asset".into(),
            method: "GET".into(),
            resource_type: htmlshot::ResourceType::from_cdp_name(resource_type),
        })
    }
}

pub struct MockLauncher {
    pub calls: Arc<Calls>,
    behavior: Behavior,
}

impl MockLauncher {
    pub fn new(behavior: Behavior) -> (Self, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        (
            Self {
                calls: calls.clone(),
                behavior,
            },
            calls,
        )
    }
}

impl Launcher for MockLauncher {
    type Engine = MockEngine;

    fn launch(&self, config: &EngineConfig) -> Result<MockEngine> {
        self.calls.launches.fetch_add(1, Ordering::SeqCst);
        self.calls.configs.lock().unwrap().push(config.clone());
        if self.behavior == Behavior::FailLaunch {
            return Err(Error::InitializationError(
                "Failed to launch browser: no such file".into(),
            ));
        }
        Ok(MockEngine {
            calls: self.calls.clone(),
            behavior: self.behavior,
            watcher: LoadWatcher::new(),
        })
    }
}

pub struct MockEngine {
    calls: Arc<Calls>,
    behavior: Behavior,
    watcher: LoadWatcher,
}

impl Engine for MockEngine {
    fn on_request<F>(&mut self, cb: F) -> Result<()>
    where
        F: Fn(&RequestInfo) -> RequestAction + Send + Sync + 'static,
    {
        *self.calls.filter.lock().unwrap() = Some(Arc::new(cb));
        Ok(())
    }

    fn set_content(&mut self, html: &str, timeout: Duration) -> Result<()> {
        self.calls.contents.lock().unwrap().push(html.to_string());
        self.calls.timeouts.lock().unwrap().push(timeout);

        self.watcher.reset();
        // Late replay of the blank page, then the written document.
        self.watcher.record(LOAD);
        self.watcher.record(NETWORK_IDLE);
        self.watcher.record(INIT);
        self.watcher.record(LOAD);
        if self.behavior != Behavior::NeverSettle {
            self.watcher.record(NETWORK_IDLE);
        }
        self.watcher.wait_for(&[LOAD, NETWORK_IDLE], timeout)
    }

    fn wait(&mut self, delay: Duration) -> Result<()> {
        self.calls.waits.lock().unwrap().push(delay);
        Ok(())
    }

    fn capture_screenshot(&mut self, options: &CaptureOptions) -> Result<Vec<u8>> {
        self.calls.captures.lock().unwrap().push(*options);
        if self.behavior == Behavior::FailCapture {
            return Err(Error::RenderError("Screenshot failed: target crashed".into()));
        }
        Ok(FAKE_WEBP.to_vec())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
