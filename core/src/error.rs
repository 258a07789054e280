//! Error taxonomy for the portal API client.
//!
//! # Design
//! `SessionExpired` and `NotAuthenticated` get dedicated variants because
//! they are the two conditions that carry a navigation side effect; callers
//! must be able to distinguish them from ordinary HTTP failures. Everything
//! else the server rejects lands in `Http` with the numeric status, the best
//! available message, and the parsed error payload (when there is one) so
//! form controllers can render field-level feedback.
//!
//! Display strings are pt-BR where the user sees them as toasts.

use serde::Deserialize;
use thiserror::Error;

use crate::http::HttpResponse;

/// Errors surfaced by [`ApiClient::call`](crate::client::ApiClient::call).
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The transport failed before a response was observed (offline, DNS,
    /// connection reset). Propagated unchanged from the transport.
    #[error("falha de rede: {0}")]
    Network(String),

    /// The server answered 401 outside the login endpoint. Local session
    /// state has been cleared and a redirect to the login page issued
    /// before this error is returned.
    #[error("Sessão expirada")]
    SessionExpired,

    /// No local user record exists; the session gate redirected to login.
    #[error("Usuário não autenticado")]
    NotAuthenticated,

    /// The CSRF token endpoint itself failed. A notification has already
    /// been raised for the user.
    #[error("falha ao obter token de segurança: {0}")]
    CsrfFetch(String),

    /// Any other non-2xx response, carrying whatever the server said.
    #[error("{message}")]
    Http {
        status: u16,
        message: String,
        payload: Option<serde_json::Value>,
    },

    /// The request payload could not be serialized to JSON.
    #[error("falha ao serializar requisição: {0}")]
    Serialization(String),

    /// A JSON-typed success body could not be parsed.
    #[error("falha ao interpretar resposta: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// The HTTP status associated with this error, when one was observed.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }
}

/// Best-effort shape of the backend's error bodies.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    erro: Option<String>,
    message: Option<String>,
}

/// Build the `Http` error for a non-2xx response.
///
/// Message priority: server `erro` field, then `message` field, then the
/// HTTP canonical reason phrase. Non-JSON and malformed bodies are
/// tolerated and fall through to the status text.
pub fn from_response(response: &HttpResponse) -> ApiError {
    from_parts(response.status, &response.body)
}

/// Same as [`from_response`], taking the raw parts. Exposed for vector tests.
pub fn from_parts(status: u16, body: &[u8]) -> ApiError {
    let payload: Option<serde_json::Value> = serde_json::from_slice(body).ok();
    let message = payload
        .as_ref()
        .and_then(|value| {
            let parsed: Option<ErrorBody> = serde_json::from_value(value.clone()).ok();
            parsed.and_then(|b| b.erro.or(b.message))
        })
        .unwrap_or_else(|| status_text(status));
    ApiError::Http {
        status,
        message,
        payload,
    }
}

/// Canonical reason phrase for a status code, falling back to `HTTP <n>`.
fn status_text(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}
