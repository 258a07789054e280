//! CSRF token cache with a coalesced fetch.
//!
//! # Design
//! The cache is a three-state machine — `Absent`, `Fetching`, `Cached` —
//! behind a `std::sync::Mutex` that is only ever held for the state
//! transition, never across an await. Coalescing comes from storing the
//! in-flight fetch as a [`Shared`] future: every caller that arrives while
//! the fetch is outstanding clones and awaits the same future, so N
//! concurrent requesters cost exactly one round-trip and all observe the
//! same token or the same rejection.
//!
//! A failed fetch puts the state back to `Absent` (the next requester
//! re-triggers it) and raises one user-visible notification.

use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use crate::error::{self, ApiError};
use crate::http::{HttpMethod, HttpRequest};
use crate::ports::{Notifier, Transport};

type TokenFuture = Shared<BoxFuture<'static, Result<String, String>>>;

enum TokenState {
    Absent,
    Fetching(TokenFuture),
    Cached(String),
}

/// Shape of the token endpoint's response.
#[derive(Debug, Deserialize)]
struct CsrfTokenResponse {
    csrf_token: String,
}

/// Process-lifetime cache for the anti-forgery token.
pub struct CsrfCache {
    state: Arc<Mutex<TokenState>>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    token_url: String,
}

impl CsrfCache {
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        token_url: String,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TokenState::Absent)),
            transport,
            notifier,
            token_url,
        }
    }

    /// The currently cached token, if the cache is warm.
    pub fn cached(&self) -> Option<String> {
        match &*self.state.lock().unwrap() {
            TokenState::Cached(token) => Some(token.clone()),
            _ => None,
        }
    }

    /// Return the cached token, joining or starting a fetch as needed.
    /// Performs no I/O when the cache is warm.
    pub async fn token(&self) -> Result<String, ApiError> {
        let fut = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                TokenState::Cached(token) => return Ok(token.clone()),
                TokenState::Fetching(fut) => fut.clone(),
                TokenState::Absent => {
                    let fut = self.start_fetch();
                    *state = TokenState::Fetching(fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(ApiError::CsrfFetch)
    }

    /// Discard any cached token and fetch a fresh one. Called after a CSRF
    /// rejection. A refresh that races an in-flight fetch joins it instead
    /// of issuing a second request.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let fut = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                TokenState::Fetching(fut) => fut.clone(),
                _ => {
                    let fut = self.start_fetch();
                    *state = TokenState::Fetching(fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(ApiError::CsrfFetch)
    }

    /// Build the shared fetch future. The future itself performs the final
    /// state transition, so it happens exactly once no matter how many
    /// callers are waiting.
    fn start_fetch(&self) -> TokenFuture {
        let state = self.state.clone();
        let transport = self.transport.clone();
        let notifier = self.notifier.clone();
        let url = self.token_url.clone();
        async move {
            let result = fetch_token(transport, &url).await;
            let mut state = state.lock().unwrap();
            match result {
                Ok(token) => {
                    *state = TokenState::Cached(token.clone());
                    Ok(token)
                }
                Err(err) => {
                    *state = TokenState::Absent;
                    tracing::warn!("falha ao buscar token CSRF: {err}");
                    notifier.notify("Não foi possível obter o token de segurança");
                    Err(err.to_string())
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn fetch_token(transport: Arc<dyn Transport>, url: &str) -> Result<String, ApiError> {
    let request = HttpRequest {
        method: HttpMethod::Get,
        url: url.to_string(),
        headers: Vec::new(),
        body: None,
        with_credentials: true,
    };
    let response = transport.execute(request).await?;
    if !response.is_success() {
        return Err(error::from_response(&response));
    }
    let body: CsrfTokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::Deserialization(e.to_string()))?;
    Ok(body.csrf_token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_response, MockTransport, RecordingNotifier};
    use serde_json::json;

    fn cache(transport: &Arc<MockTransport>, notifier: &Arc<RecordingNotifier>) -> CsrfCache {
        CsrfCache::new(
            transport.clone(),
            notifier.clone(),
            "http://localhost/api/csrf-token".to_string(),
        )
    }

    #[tokio::test]
    async fn fetches_once_then_serves_from_cache() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-1"}))));
        let cache = cache(&transport, &notifier);

        assert_eq!(cache.token().await.unwrap(), "tok-1");
        assert_eq!(cache.token().await.unwrap(), "tok-1");
        assert_eq!(transport.calls(), 1, "warm cache must not touch the network");
        assert_eq!(cache.cached().as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-1"}))));
        let cache = cache(&transport, &notifier);

        let (a, b, c, d, e) = tokio::join!(
            cache.token(),
            cache.token(),
            cache.token(),
            cache.token(),
            cache.token()
        );
        for result in [a, b, c, d, e] {
            assert_eq!(result.unwrap(), "tok-1");
        }
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn failure_reaches_all_waiters_and_resets_state() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(500, json!({"erro": "indisponível"}))));
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-2"}))));
        let cache = cache(&transport, &notifier);

        // Hold the fetch open until all three callers are waiting on it,
        // so every one of them observes the same rejection.
        let release = transport.hold_next_response();
        let (a, b, c, ()) = tokio::join!(cache.token(), cache.token(), cache.token(), async {
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            release.notify_one();
        });
        for result in [a, b, c] {
            assert!(matches!(result.unwrap_err(), ApiError::CsrfFetch(_)));
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(notifier.messages().len(), 1, "one toast per failed fetch");

        // State returned to Absent: the next need re-triggers the fetch.
        assert_eq!(cache.token().await.unwrap(), "tok-2");
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_discards_cached_token() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-1"}))));
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-2"}))));
        let cache = cache(&transport, &notifier);

        assert_eq!(cache.token().await.unwrap(), "tok-1");
        assert_eq!(cache.refresh().await.unwrap(), "tok-2");
        assert_eq!(cache.cached().as_deref(), Some("tok-2"));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_joins_in_flight_fetch() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(200, json!({"csrf_token": "tok-1"}))));
        let cache = cache(&transport, &notifier);

        let (a, b) = tokio::join!(cache.token(), cache.refresh());
        assert_eq!(a.unwrap(), "tok-1");
        assert_eq!(b.unwrap(), "tok-1");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_token_body_is_a_fetch_failure() {
        let transport = MockTransport::new();
        let notifier = RecordingNotifier::new();
        transport.script(Ok(json_response(200, json!({"token": "wrong-field"}))));
        let cache = cache(&transport, &notifier);

        let err = cache.token().await.unwrap_err();
        assert!(matches!(err, ApiError::CsrfFetch(_)));
        assert!(cache.cached().is_none());
    }
}
