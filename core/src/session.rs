//! Authentication gate with a memoized server-side check.
//!
//! The gate answers one question — "is this session still good?" — at most
//! once per page lifetime. The verification round-trip is coalesced the
//! same way as the CSRF fetch: concurrent callers join a single shared
//! future. A missing local user record short-circuits to the login page
//! without touching the network; a failed verification logs the user out
//! (local state cleared) before redirecting.

use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::client::LOGIN_PAGE;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest};
use crate::ports::ClientContext;
use crate::types;

type VerifyFuture = Shared<BoxFuture<'static, Result<(), String>>>;

enum GateState {
    Unchecked,
    Verifying(VerifyFuture),
    Verified,
}

pub struct SessionGate {
    state: Arc<Mutex<GateState>>,
    ctx: ClientContext,
    verify_url: String,
}

impl SessionGate {
    pub fn new(ctx: ClientContext, verify_url: String) -> Self {
        Self {
            state: Arc::new(Mutex::new(GateState::Unchecked)),
            ctx,
            verify_url,
        }
    }

    /// Check that the current session is usable, verifying it server-side
    /// exactly once. Subsequent calls are free until [`invalidate`] runs.
    ///
    /// [`invalidate`]: SessionGate::invalidate
    pub async fn ensure_authenticated(&self) -> Result<(), ApiError> {
        if types::load_usuario(self.ctx.store.as_ref()).is_none() {
            self.ctx.navigator.navigate(LOGIN_PAGE);
            return Err(ApiError::NotAuthenticated);
        }
        let fut = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                GateState::Verified => return Ok(()),
                GateState::Verifying(fut) => fut.clone(),
                GateState::Unchecked => {
                    let fut = self.start_verify();
                    *state = GateState::Verifying(fut.clone());
                    fut
                }
            }
        };
        fut.await.map_err(|_| ApiError::SessionExpired)
    }

    /// Forget the memoized answer. Called on logout and on any 401.
    pub fn invalidate(&self) {
        *self.state.lock().unwrap() = GateState::Unchecked;
    }

    fn start_verify(&self) -> VerifyFuture {
        let state = self.state.clone();
        let ctx = self.ctx.clone();
        let url = self.verify_url.clone();
        async move {
            let request = HttpRequest {
                method: HttpMethod::Get,
                url,
                headers: Vec::new(),
                body: None,
                with_credentials: true,
            };
            let ok = match ctx.transport.execute(request).await {
                Ok(response) => response.is_success(),
                Err(err) => {
                    tracing::warn!("verificação de sessão falhou no transporte: {err}");
                    false
                }
            };
            let mut state = state.lock().unwrap();
            if ok {
                *state = GateState::Verified;
                Ok(())
            } else {
                // Session is no longer good: log out locally and send the
                // user back to the login page.
                *state = GateState::Unchecked;
                types::clear_session(ctx.store.as_ref());
                ctx.navigator.navigate(LOGIN_PAGE);
                Err("sessão inválida".to_string())
            }
        }
        .boxed()
        .shared()
    }
}
