//! Core API layer of the institutional portal front end.
//!
//! # Overview
//! Everything the portal's page controllers need to talk to the backend
//! goes through [`ApiClient::call`]: URL resolution under the `/api`
//! prefix, CSRF protection for mutating verbs with a single automatic
//! retry after a rejection, session-expiry handling (logout + redirect),
//! a busy overlay that is guaranteed to be released, and a consistent
//! error shape for toasts and field-level feedback.
//!
//! # Design
//! - No ambient globals: transport, storage, navigation, busy overlay and
//!   notifications are traits carried in a [`ClientContext`], so every
//!   decision the client makes is observable in tests.
//! - The CSRF token cache and the session gate both coalesce concurrent
//!   triggers into one shared in-flight operation.
//! - The crate performs no I/O itself and pins no runtime; the injected
//!   [`Transport`] does the round-trips. Integration tests drive it with a
//!   reqwest transport against the in-process mock server.

pub mod client;
pub mod csrf;
pub mod error;
pub mod http;
pub mod ports;
pub mod retry;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{
    ApiClient, API_BASE_PATH, CSRF_HEADER, CSRF_TOKEN_ENDPOINT, LOGIN_ENDPOINT, LOGIN_PAGE,
    VERIFY_SESSION_ENDPOINT,
};
pub use csrf::CsrfCache;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse, Payload};
pub use ports::{
    BusyIndicator, ClientContext, MemoryStore, Navigator, Notifier, SessionStore, Transport,
};
pub use retry::RetryPolicy;
pub use session::SessionGate;
pub use types::Usuario;
