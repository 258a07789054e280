//! Side-effect ports injected into the client.
//!
//! # Design
//! The original page scripts reached for ambient globals: the `fetch`
//! primitive, `localStorage`, `window.location`, a loading-overlay node and
//! a toast helper. Here each of those is an explicit trait object carried in
//! a [`ClientContext`], so the client's decisions (retry, redirect, clear
//! session) can be asserted in tests without a browser, and the caches'
//! lifecycles are tied to the client instance instead of the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

/// Executes HTTP round-trips. The only I/O seam in the crate.
///
/// Implementations must return non-2xx responses as data, not as errors;
/// `Err` is reserved for transport-level failures where no response was
/// observed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// String key/value persistence, the browser-storage equivalent.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// The navigation effect. Injected so the session-expiry decision can be
/// tested without actually leaving the page.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Global busy overlay shown while a call is in flight.
pub trait BusyIndicator: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

/// User-visible toast notifications for failures the client handles itself.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Everything the client needs to touch the outside world.
#[derive(Clone)]
pub struct ClientContext {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<dyn SessionStore>,
    pub navigator: Arc<dyn Navigator>,
    pub busy: Arc<dyn BusyIndicator>,
    pub notifier: Arc<dyn Notifier>,
}

/// Shows the busy indicator for exactly the guard's lifetime.
///
/// Dropping on every exit path (success, error, early return) is what
/// guarantees the overlay never sticks.
pub(crate) struct BusyGuard {
    busy: Arc<dyn BusyIndicator>,
}

impl BusyGuard {
    pub(crate) fn begin(busy: Arc<dyn BusyIndicator>) -> Self {
        busy.show();
        Self { busy }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.hide();
    }
}

/// In-memory [`SessionStore`] backing tests and desktop embeddings.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.values.lock().unwrap().remove(key);
    }
}
