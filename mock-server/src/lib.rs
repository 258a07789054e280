//! Mock portal backend used by the core crate's integration tests.
//!
//! Reproduces the contract the client depends on: a `/api` prefix, a CSRF
//! token endpoint, cookie-based sessions with a login endpoint, a small
//! `usuarios` CRUD resource gated behind both, a raw upload endpoint and a
//! CSV report. The shared [`ServerState`] handle exposes counters and
//! failure-injection knobs so tests can assert coalescing and drive the
//! rejection/retry paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use uuid::Uuid;

/// Fixed password accepted by `/api/login`.
pub const SENHA_VALIDA: &str = "123456";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Usuario {
    pub id: i64,
    pub nome: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_root: bool,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub senha: String,
}

#[derive(Deserialize)]
pub struct CreateUsuario {
    pub nome: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct UpdateUsuario {
    pub nome: Option<String>,
    pub email: Option<String>,
}

pub struct ServerState {
    csrf_token: Mutex<Option<String>>,
    csrf_fetches: AtomicU32,
    csrf_failures: AtomicU32,
    reject_queue: Mutex<VecDeque<u16>>,
    mutating_attempts: AtomicU32,
    sessions: Mutex<HashSet<String>>,
    usuarios: Mutex<HashMap<i64, Usuario>>,
    next_id: AtomicI64,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    pub fn new() -> SharedState {
        Arc::new(Self {
            csrf_token: Mutex::new(None),
            csrf_fetches: AtomicU32::new(0),
            csrf_failures: AtomicU32::new(0),
            reject_queue: Mutex::new(VecDeque::new()),
            mutating_attempts: AtomicU32::new(0),
            sessions: Mutex::new(HashSet::new()),
            usuarios: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        })
    }

    /// How many times `/api/csrf-token` was hit.
    pub fn csrf_fetch_count(&self) -> u32 {
        self.csrf_fetches.load(Ordering::SeqCst)
    }

    /// How many mutating requests reached the CSRF gate.
    pub fn mutating_attempt_count(&self) -> u32 {
        self.mutating_attempts.load(Ordering::SeqCst)
    }

    /// Make the next `n` token fetches answer 500.
    pub fn fail_next_csrf_fetches(&self, n: u32) {
        self.csrf_failures.store(n, Ordering::SeqCst);
    }

    /// Force the given statuses, in order, on the next mutating attempts
    /// regardless of the token presented.
    pub fn reject_next_mutations(&self, statuses: &[u16]) {
        self.reject_queue.lock().unwrap().extend(statuses);
    }

    fn issue_token(&self) -> String {
        let token = Uuid::new_v4().to_string();
        *self.csrf_token.lock().unwrap() = Some(token.clone());
        token
    }

    fn token_matches(&self, presented: Option<&str>) -> bool {
        match (presented, self.csrf_token.lock().unwrap().as_deref()) {
            (Some(p), Some(current)) => p == current,
            _ => false,
        }
    }

    fn open_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.lock().unwrap().insert(id.clone());
        id
    }

    fn has_session(&self, headers: &HeaderMap) -> bool {
        let Some(cookies) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        cookies.split(';').any(|cookie| {
            cookie
                .trim()
                .strip_prefix("sessao=")
                .map(|id| self.sessions.lock().unwrap().contains(id))
                .unwrap_or(false)
        })
    }
}

pub fn app(state: SharedState) -> Router {
    Router::new()
        .route("/api/csrf-token", get(csrf_token))
        .route("/api/login", post(login))
        .route("/api/auth/verificar", get(verificar))
        .route("/api/usuarios", get(list_usuarios).post(create_usuario))
        .route(
            "/api/usuarios/{id}",
            get(get_usuario).put(update_usuario).delete(delete_usuario),
        )
        .route("/api/upload", post(upload))
        .route("/api/relatorio", get(relatorio))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: SharedState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn csrf_token(State(state): State<SharedState>) -> Response {
    state.csrf_fetches.fetch_add(1, Ordering::SeqCst);
    let failures = state.csrf_failures.load(Ordering::SeqCst);
    if failures > 0 {
        state.csrf_failures.store(failures - 1, Ordering::SeqCst);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"erro": "Serviço indisponível"})),
        )
            .into_response();
    }
    let token = state.issue_token();
    Json(json!({ "csrf_token": token })).into_response()
}

async fn login(State(state): State<SharedState>, Json(input): Json<LoginInput>) -> Response {
    if input.senha != SENHA_VALIDA {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"erro": "Credenciais inválidas"})),
        )
            .into_response();
    }
    let session = state.open_session();
    let usuario = Usuario {
        id: 1,
        nome: "Administrador".to_string(),
        email: input.email,
        is_admin: true,
        is_root: false,
    };
    (
        [(
            header::SET_COOKIE,
            format!("sessao={session}; Path=/; HttpOnly"),
        )],
        Json(usuario),
    )
        .into_response()
}

async fn verificar(State(state): State<SharedState>, headers: HeaderMap) -> StatusCode {
    if state.has_session(&headers) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::UNAUTHORIZED
    }
}

/// Session cookie check shared by the protected routes.
fn require_session(state: &ServerState, headers: &HeaderMap) -> Result<(), Response> {
    if state.has_session(headers) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"erro": "Sessão inválida"})),
        )
            .into_response())
    }
}

/// CSRF gate for mutating verbs: counts the attempt, applies any injected
/// rejection, then validates the presented token against the current one.
fn require_csrf(state: &ServerState, headers: &HeaderMap) -> Result<(), Response> {
    state.mutating_attempts.fetch_add(1, Ordering::SeqCst);
    if let Some(status) = state.reject_queue.lock().unwrap().pop_front() {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
        return Err((status, Json(json!({"erro": "Token CSRF inválido"}))).into_response());
    }
    let presented = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok());
    if state.token_matches(presented) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(json!({"erro": "Token CSRF inválido"})),
        )
            .into_response())
    }
}

async fn list_usuarios(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    let usuarios: Vec<Usuario> = state.usuarios.lock().unwrap().values().cloned().collect();
    Json(usuarios).into_response()
}

async fn create_usuario(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(input): Json<CreateUsuario>,
) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    if let Err(denied) = require_csrf(&state, &headers) {
        return denied;
    }
    let usuario = Usuario {
        id: state.next_id.fetch_add(1, Ordering::SeqCst),
        nome: input.nome,
        email: input.email,
        is_admin: false,
        is_root: false,
    };
    state
        .usuarios
        .lock()
        .unwrap()
        .insert(usuario.id, usuario.clone());
    (StatusCode::CREATED, Json(usuario)).into_response()
}

async fn get_usuario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    match state.usuarios.lock().unwrap().get(&id).cloned() {
        Some(usuario) => Json(usuario).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"erro": "Usuário não encontrado"})),
        )
            .into_response(),
    }
}

async fn update_usuario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(input): Json<UpdateUsuario>,
) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    if let Err(denied) = require_csrf(&state, &headers) {
        return denied;
    }
    let mut usuarios = state.usuarios.lock().unwrap();
    let Some(usuario) = usuarios.get_mut(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"erro": "Usuário não encontrado"})),
        )
            .into_response();
    };
    if let Some(nome) = input.nome {
        usuario.nome = nome;
    }
    if let Some(email) = input.email {
        usuario.email = email;
    }
    Json(usuario.clone()).into_response()
}

async fn delete_usuario(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    if let Err(denied) = require_csrf(&state, &headers) {
        return denied;
    }
    match state.usuarios.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"erro": "Usuário não encontrado"})),
        )
            .into_response(),
    }
}

async fn upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(denied) = require_session(&state, &headers) {
        return denied;
    }
    if let Err(denied) = require_csrf(&state, &headers) {
        return denied;
    }
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"erro": "Arquivo vazio"})),
        )
            .into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn relatorio() -> Response {
    (
        [(header::CONTENT_TYPE, "text/csv")],
        "sala;ocupacao\nLab A;12\nLab B;7\n",
    )
        .into_response()
}
