//! HTTP transport types described as plain data.
//!
//! # Design
//! The client builds `HttpRequest` values and interprets `HttpResponse`
//! values; the actual round-trip is executed by an injected
//! [`Transport`](crate::ports::Transport) implementation. Keeping these
//! types as plain data (no library-specific request/response handles)
//! keeps the client deterministic and lets tests script responses without
//! any network.
//!
//! All fields use owned types (`String`, `Vec`) so values can move freely
//! across task boundaries.

/// HTTP verb for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Whether this verb is understood to change server-side state and
    /// therefore must carry the anti-forgery token.
    pub fn is_mutating(self) -> bool {
        !matches!(self, HttpMethod::Get)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Request payload supplied by the caller.
///
/// JSON payloads are serialized by the client with an `application/json`
/// content type; raw payloads (file uploads, pre-encoded forms) are sent
/// byte-for-byte with the content type the caller declares.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Raw { content_type: String, bytes: Vec<u8> },
}

/// An HTTP request described as plain data, ready for a transport to execute.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Fully-resolved URL (base + API prefix + normalized endpoint).
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Serialized body, if any. The matching `content-type` header is
    /// already present in `headers`.
    pub body: Option<Vec<u8>>,
    /// Session cookies must accompany the request. Always set by the
    /// client; transports that carry cookies implicitly may ignore it.
    pub with_credentials: bool,
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup returning the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the declared content type is JSON. Bodies of successful
    /// responses are only parsed when this holds.
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|v| v.to_ascii_lowercase().contains("application/json"))
    }
}
