//! Page lifecycle tracking used to decide when a page has settled.
//!
//! The browser reports lifecycle milestones (`init`, `DOMContentLoaded`,
//! `load`, `networkAlmostIdle`, `networkIdle`, ...) as events on a
//! background thread. `LoadWatcher` records them and lets the request thread
//! block until the milestones it needs have all been observed.

use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Lifecycle event emitted once the `load` event fired.
pub const LOAD: &str = "load";
/// Lifecycle event emitted after 500ms without any open network connection.
pub const NETWORK_IDLE: &str = "networkIdle";
/// Lifecycle event starting a new document; clears earlier milestones.
pub const INIT: &str = "init";

/// Milestones of the current document.
///
/// Nothing counts until the document's `init` arrives: enabling lifecycle
/// events replays the previous document's milestones, and those can reach
/// the event thread after [`LoadWatcher::reset`].
#[derive(Default)]
pub struct LoadWatcher {
    seen: Mutex<HashSet<String>>,
    changed: Condvar,
}

impl LoadWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every milestone and wait for a fresh `init`.
    pub fn reset(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }

    /// Record a lifecycle event reported by the browser.
    pub fn record(&self, name: &str) {
        let Ok(mut seen) = self.seen.lock() else {
            return;
        };
        if name == INIT {
            seen.clear();
        } else if !seen.contains(INIT) {
            // Left over from the document before the last reset.
            return;
        }
        seen.insert(name.to_string());
        self.changed.notify_all();
    }

    pub fn has_seen(&self, name: &str) -> bool {
        self.seen
            .lock()
            .map(|seen| seen.contains(name))
            .unwrap_or(false)
    }

    /// Block until every name in `milestones` has been recorded since the
    /// last reset, or fail with [`Error::Timeout`] after `timeout`.
    pub fn wait_for(&self, milestones: &[&str], timeout: Duration) -> Result<()> {
        let seen = self
            .seen
            .lock()
            .map_err(|e| Error::Other(format!("Lifecycle state poisoned: {}", e)))?;

        let (_seen, result) = self
            .changed
            .wait_timeout_while(seen, timeout, |seen| {
                !milestones.iter().all(|m| seen.contains(*m))
            })
            .map_err(|e| Error::Other(format!("Lifecycle state poisoned: {}", e)))?;

        if result.timed_out() {
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }
        Ok(())
    }
}
