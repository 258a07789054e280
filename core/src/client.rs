//! The single choke point for browser-to-server calls.
//!
//! # Design
//! `ApiClient` owns the CSRF cache and the session gate and carries the
//! injected ports in a [`ClientContext`]. One public operation does the
//! work: [`ApiClient::call`] resolves the URL, attaches the anti-forgery
//! token to mutating verbs, wraps the round-trip (including any retry) in
//! a busy-indicator guard, recovers exactly once from a CSRF rejection,
//! and turns a 401 into a logout-and-redirect before failing the call.
//!
//! There is no timeout or cancellation path: a dispatched request runs to
//! completion or failure.

use serde::de::DeserializeOwned;

use crate::csrf::CsrfCache;
use crate::error::{self, ApiError};
use crate::http::{HttpMethod, HttpRequest, Payload};
use crate::ports::{BusyGuard, ClientContext};
use crate::retry::RetryPolicy;
use crate::session::SessionGate;
use crate::types;

/// Prefix for every backend call.
pub const API_BASE_PATH: &str = "/api";
/// Endpoint serving the anti-forgery token.
pub const CSRF_TOKEN_ENDPOINT: &str = "/csrf-token";
/// Endpoint the session gate verifies against.
pub const VERIFY_SESSION_ENDPOINT: &str = "/auth/verificar";
/// The one endpoint where a 401 means "wrong credentials", not "expired".
pub const LOGIN_ENDPOINT: &str = "/login";
/// Where expired sessions are sent.
pub const LOGIN_PAGE: &str = "/admin/login.html";
/// Header carrying the token on mutating requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

pub struct ApiClient {
    base_url: String,
    ctx: ClientContext,
    csrf: CsrfCache,
    session: SessionGate,
    retry: RetryPolicy,
}

impl ApiClient {
    /// `base_url` is empty for same-origin use; tests point it at the mock
    /// server. A trailing slash is tolerated.
    pub fn new(base_url: &str, ctx: ClientContext) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        let csrf = CsrfCache::new(
            ctx.transport.clone(),
            ctx.notifier.clone(),
            format!("{base}{API_BASE_PATH}{CSRF_TOKEN_ENDPOINT}"),
        );
        let session = SessionGate::new(
            ctx.clone(),
            format!("{base}{API_BASE_PATH}{VERIFY_SESSION_ENDPOINT}"),
        );
        Self {
            base_url: base,
            ctx,
            csrf,
            session,
            retry: RetryPolicy::csrf_rejection(),
        }
    }

    /// Full URL for an endpoint fragment; the leading slash is normalized
    /// so `usuarios` and `/usuarios` resolve identically.
    pub fn resolve_endpoint(&self, endpoint: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url,
            API_BASE_PATH,
            normalize(endpoint)
        )
    }

    /// Dispatch a call to the backend.
    ///
    /// Returns the parsed JSON body for JSON-typed successes and `None`
    /// otherwise (CSV exports, 204s). All failure modes are documented on
    /// [`ApiError`].
    pub async fn call(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<Payload>,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let url = self.resolve_endpoint(endpoint);
        let normalized = normalize(endpoint);

        // Overlay spans the token fetch, the dispatch and any retry, and
        // is released on every exit path.
        let _busy = BusyGuard::begin(self.ctx.busy.clone());

        let encoded = encode_body(body.as_ref())?;
        let mut token = if method.is_mutating() {
            Some(self.csrf.token().await?)
        } else {
            None
        };

        let mut attempt: u32 = 0;
        loop {
            let request = build_request(&url, method, encoded.as_ref(), token.as_deref());
            let response = self.ctx.transport.execute(request).await?;

            if response.status == 401 && normalized != LOGIN_ENDPOINT {
                tracing::warn!("sessão expirada em {normalized}, redirecionando para login");
                self.expire_session();
                return Err(ApiError::SessionExpired);
            }

            if method.is_mutating() && self.retry.should_retry(response.status, attempt) {
                tracing::debug!(
                    status = response.status,
                    "token CSRF rejeitado, renovando e repetindo"
                );
                attempt += 1;
                token = Some(self.csrf.refresh().await?);
                continue;
            }

            if !response.is_success() {
                return Err(error::from_response(&response));
            }

            if response.is_json() && !response.body.is_empty() {
                let value = serde_json::from_slice(&response.body)
                    .map_err(|e| ApiError::Deserialization(e.to_string()))?;
                return Ok(Some(value));
            }
            return Ok(None);
        }
    }

    /// [`call`](ApiClient::call) plus deserialization into a concrete type.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<Payload>,
    ) -> Result<T, ApiError> {
        let value = self
            .call(endpoint, method, body)
            .await?
            .ok_or_else(|| ApiError::Deserialization("resposta sem corpo JSON".to_string()))?;
        serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub async fn get(&self, endpoint: &str) -> Result<Option<serde_json::Value>, ApiError> {
        self.call(endpoint, HttpMethod::Get, None).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        self.call(endpoint, HttpMethod::Post, Some(Payload::Json(body)))
            .await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        self.call(endpoint, HttpMethod::Put, Some(Payload::Json(body)))
            .await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Option<serde_json::Value>, ApiError> {
        self.call(endpoint, HttpMethod::Delete, None).await
    }

    /// Gate a page behind a valid session. See [`SessionGate`].
    pub async fn ensure_authenticated(&self) -> Result<(), ApiError> {
        self.session.ensure_authenticated().await
    }

    /// Clear local session state and return to the login page.
    pub fn logout(&self) {
        types::clear_session(self.ctx.store.as_ref());
        self.session.invalidate();
        self.ctx.navigator.navigate(LOGIN_PAGE);
    }

    fn expire_session(&self) {
        types::clear_session(self.ctx.store.as_ref());
        self.session.invalidate();
        self.ctx.navigator.navigate(LOGIN_PAGE);
    }
}

fn normalize(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

/// Serialize the payload once, up front, so a retry resends identical bytes.
fn encode_body(body: Option<&Payload>) -> Result<Option<(String, Vec<u8>)>, ApiError> {
    match body {
        None => Ok(None),
        Some(Payload::Json(value)) => {
            let bytes = serde_json::to_vec(value)
                .map_err(|e| ApiError::Serialization(e.to_string()))?;
            Ok(Some(("application/json".to_string(), bytes)))
        }
        Some(Payload::Raw {
            content_type,
            bytes,
        }) => Ok(Some((content_type.clone(), bytes.clone()))),
    }
}

fn build_request(
    url: &str,
    method: HttpMethod,
    encoded: Option<&(String, Vec<u8>)>,
    token: Option<&str>,
) -> HttpRequest {
    let mut headers = Vec::new();
    if let Some((content_type, _)) = encoded {
        headers.push(("content-type".to_string(), content_type.clone()));
    }
    if let Some(token) = token {
        headers.push((CSRF_HEADER.to_string(), token.to_string()));
    }
    HttpRequest {
        method,
        url: url.to_string(),
        headers,
        body: encoded.map(|(_, bytes)| bytes.clone()),
        with_credentials: true,
    }
}
