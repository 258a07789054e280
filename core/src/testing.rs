//! Scripted port implementations shared by the unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::ports::{BusyIndicator, Navigator, Notifier, Transport};

/// Transport that replays scripted responses in order and records every
/// request it was asked to execute.
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, ApiError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        })
    }

    pub fn script(&self, response: Result<HttpResponse, ApiError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Hold the next request until the returned handle is notified, so a
    /// test can line up concurrent callers behind one in-flight round-trip
    /// before letting it resolve. One-shot: later requests are not gated.
    pub fn hold_next_response(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        // First poll returns Pending so concurrent callers all reach the
        // cache before any response lands; keeps coalescing tests
        // deterministic.
        tokio::task::yield_now().await;
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            // notify_one stores a permit, so an early release cannot be
            // missed.
            gate.notified().await;
        }
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("MockTransport: no scripted response left"))
    }
}

pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![(
            "content-type".to_string(),
            "application/json".to_string(),
        )],
        body: body.to_string().into_bytes(),
    }
}

pub fn response_with(status: u16, content_type: &str, body: &[u8]) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), content_type.to_string())],
        body: body.to_vec(),
    }
}

/// Response with no content-type header at all (204-style).
pub fn empty_response(status: u16) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: Vec::new(),
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    destinations: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn destinations(&self) -> Vec<String> {
        self.destinations.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.destinations.lock().unwrap().push(path.to_string());
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Busy indicator that records the show/hide sequence and the current
/// nesting depth, so tests can assert the overlay is balanced and never
/// left visible.
#[derive(Default)]
pub struct RecordingBusy {
    shown: Mutex<u32>,
    hidden: Mutex<u32>,
}

impl RecordingBusy {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shown(&self) -> u32 {
        *self.shown.lock().unwrap()
    }

    pub fn hidden(&self) -> u32 {
        *self.hidden.lock().unwrap()
    }

    pub fn is_balanced(&self) -> bool {
        self.shown() == self.hidden()
    }
}

impl BusyIndicator for RecordingBusy {
    fn show(&self) {
        *self.shown.lock().unwrap() += 1;
    }
    fn hide(&self) {
        *self.hidden.lock().unwrap() += 1;
    }
}
