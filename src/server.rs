//!
//! kanbanflow HTTP/WS server
//! -------------------------
//! Axum router, shared state and handlers for the identity and ticket APIs,
//! plus the real-time endpoint that pushes ticket changes to open clients.
//!
//! Responsibilities:
//! - Login, registration, logout and token refresh under `/iam/v1`.
//! - Owner-scoped ticket CRUD under `/kanban/v1`; every mutation is broadcast.
//! - Access/refresh gates in front of protected routes.
//! - Request logging, security headers and the shared rate limiter.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::error::{AppError, INTERNAL_MESSAGE};
use crate::identity::{
    authenticate, require_access, require_refresh, Clock, Flavor, Identity, IdentityStore, LoginRequest, Me,
    MemoryIdentityStore, SessionContext, SystemClock, TokenPair, TokenService, UserResponse,
};
use crate::tickets::{MemoryTicketStore, TicketDraft, TicketResponse, TicketStore};

pub mod events;
pub mod hub;
pub mod limiter;
pub mod middleware;
pub mod ws;

use events::DomainEvent;
use hub::BroadcastHub;
use limiter::RateLimiter;

/// Shared server state injected into all handlers. Every component is built
/// once at startup and handed out by reference.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub tokens: Arc<TokenService>,
    pub identities: Arc<dyn IdentityStore>,
    pub tickets: Arc<dyn TicketStore>,
    pub hub: Arc<BroadcastHub>,
    pub limiter: Arc<RateLimiter>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        identities: Arc<dyn IdentityStore>,
        tickets: Arc<dyn TicketStore>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let secrets = config.secrets.derive().context("While deriving token secrets")?;
        let tokens = TokenService::new(&secrets, config.ttls, Arc::clone(&identities), Arc::clone(&clock));
        Ok(Self {
            limiter: Arc::new(RateLimiter::new(config.rate_limit)),
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            identities,
            tickets,
            hub: Arc::new(BroadcastHub::new()),
            clock,
        })
    }
}

pub fn router(state: AppState) -> Router {
    let access = from_fn_with_state(Arc::clone(&state.tokens), require_access);
    let refresh = from_fn_with_state(Arc::clone(&state.tokens), require_refresh);

    let iam_protected = Router::new()
        .route("/users/me", get(me))
        .route("/logout", post(logout))
        .route_layer(access.clone());
    let iam_refresh = Router::new()
        .route("/token/refresh", post(refresh_tokens))
        .route_layer(refresh);
    let iam = Router::new()
        .route("/login", post(login))
        .route("/users", post(register))
        .merge(iam_protected)
        .merge(iam_refresh);

    let kanban = Router::new()
        .route("/tickets", post(create_ticket).get(list_tickets))
        .route("/tickets/{ticket_id}", get(get_ticket).put(update_ticket).delete(delete_ticket))
        .route_layer(access);

    Router::new()
        .route("/healthz", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/ws", get(ws::ws_handler))
        .nest("/iam/v1", iam)
        .nest("/kanban/v1", kanban)
        .layer(from_fn_with_state(Arc::clone(&state.limiter), middleware::rate_limit))
        .layer(from_fn(middleware::security_headers))
        .layer(from_fn(middleware::request_log))
        .with_state(state)
}

fn log_startup_config(config: &ServerConfig) {
    info!(
        target: "startup",
        "kanbanflow config: bind={}:{}, allowed_origin={}, secret_scheme={}, access_ttl={}s, refresh_ttl={}s, rate_limit={}/{}s, ws_queue={}, secure_cookies={}",
        config.bind_addr,
        config.http_port,
        config.allowed_origin,
        config.secrets.label(),
        config.ttls.access.num_seconds(),
        config.ttls.refresh.num_seconds(),
        config.rate_limit.burst,
        config.rate_limit.refill_per_sec,
        config.ws_queue_capacity,
        config.secure_cookies,
    );
}

/// Start the server with in-memory stores bound to the configured address.
pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    log_startup_config(&config);
    let addr = format!("{}:{}", config.bind_addr, config.http_port);
    let state = AppState::new(
        config,
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryTicketStore::new()),
        Arc::new(SystemClock),
    )?;
    let listener = TcpListener::bind(&addr).await.with_context(|| format!("While binding {addr}"))?;
    serve(listener, state).await
}

/// Serve on an already bound listener (tests bind `127.0.0.1:0`).
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    info!(target: "startup", "Starting server on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Environment entry point.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env()?).await
}

fn token_cookie(flavor: Flavor, value: &str, max_age_secs: i64, secure: bool) -> Result<HeaderValue, AppError> {
    let mut cookie = format!("{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}", flavor.cookie_name(), value, max_age_secs);
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| {
        error!(target: "auth", "cookie header rejected: {e}");
        AppError::internal("cookie_error", INTERNAL_MESSAGE)
    })
}

fn pair_cookies(state: &AppState, pair: &TokenPair) -> Result<HeaderMap, AppError> {
    let mut headers = HeaderMap::new();
    for (flavor, value) in [(Flavor::Access, &pair.access_token), (Flavor::Refresh, &pair.refresh_token)] {
        let max_age = state.tokens.ttl(flavor).num_seconds();
        headers.append(header::SET_COOKIE, token_cookie(flavor, value, max_age, state.config.secure_cookies)?);
    }
    Ok(headers)
}

fn issued(state: &AppState, status: StatusCode, identity: &Identity) -> Result<Response, AppError> {
    let pair = state.tokens.issue_pair(identity)?;
    let cookies = pair_cookies(state, &pair)?;
    let body = json!({
        "status": "success",
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    });
    Ok((status, cookies, Json(body)).into_response())
}

fn join_error(e: tokio::task::JoinError) -> AppError {
    error!("blocking task failed: {e}");
    AppError::internal("internal_error", INTERNAL_MESSAGE)
}

/// Store calls may block on I/O; keep them off the async workers.
async fn blocking<T, E, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(join_error)?.map_err(Into::into)
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> Result<Response, AppError> {
    let store = Arc::clone(&state.identities);
    let identity = blocking(move || authenticate(store.as_ref(), &payload)).await?;
    info!(target: "auth", user = %identity.id, "login");
    issued(&state, StatusCode::OK, &identity)
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

async fn register(State(state): State<AppState>, Json(payload): Json<RegisterPayload>) -> Result<Response, AppError> {
    let email = payload.email.trim().to_string();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::user("invalid_email", "a valid email is required"));
    }
    if payload.password.is_empty() {
        return Err(AppError::user("invalid_password", "password is required"));
    }
    let password = payload.password;
    let hash = blocking(move || crate::security::hash_password(&password)).await?;
    let identity = Identity::new(payload.first_name.trim(), payload.last_name.trim(), &email, hash, state.clock.now());
    let store = Arc::clone(&state.identities);
    let created = blocking(move || store.insert(identity)).await?;
    info!(target: "auth", user = %created.id, "registered");
    Ok((StatusCode::CREATED, Json(UserResponse::from(&created))).into_response())
}

async fn me(Me(identity): Me) -> Json<UserResponse> {
    Json(UserResponse::from(&identity))
}

/// Clears the session and both cookies. Issued tokens stay valid until they
/// expire.
async fn logout(State(state): State<AppState>, mut req: Request) -> Result<Response, AppError> {
    if let Some(identity) = req.extensions_mut().get_mut::<SessionContext>().and_then(SessionContext::take) {
        info!(target: "auth", user = %identity.id, "logout");
    }
    let mut headers = HeaderMap::new();
    for flavor in [Flavor::Access, Flavor::Refresh] {
        headers.append(header::SET_COOKIE, token_cookie(flavor, "", 0, state.config.secure_cookies)?);
    }
    Ok((StatusCode::OK, headers, Json(json!({"message": "logout success"}))).into_response())
}

async fn refresh_tokens(State(state): State<AppState>, Me(identity): Me) -> Result<Response, AppError> {
    debug!(target: "auth", user = %identity.id, "token refresh");
    issued(&state, StatusCode::CREATED, &identity)
}

fn announce(state: &AppState, event: DomainEvent) {
    let report = state.hub.publish(&event);
    debug!(target: "realtime", event = ?event.event, delivered = report.delivered, dropped = report.dropped, "broadcast");
}

async fn create_ticket(State(state): State<AppState>, Me(me): Me, Json(draft): Json<TicketDraft>) -> Result<Response, AppError> {
    let (store, now) = (Arc::clone(&state.tickets), state.clock.now());
    let ticket = blocking(move || store.create(&me.id, draft, now)).await?;
    let view = TicketResponse::from(&ticket);
    announce(&state, DomainEvent::created(view.clone()));
    Ok((StatusCode::CREATED, Json(view)).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct TicketFilter {
    title: Option<String>,
}

async fn list_tickets(
    State(state): State<AppState>,
    Me(me): Me,
    Query(filter): Query<TicketFilter>,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    let store = Arc::clone(&state.tickets);
    let rows = blocking(move || store.list(&me.id, filter.title.as_deref())).await?;
    Ok(Json(rows.iter().map(TicketResponse::from).collect()))
}

async fn get_ticket(State(state): State<AppState>, Me(me): Me, Path(ticket_id): Path<String>) -> Result<Json<TicketResponse>, AppError> {
    let store = Arc::clone(&state.tickets);
    let ticket = blocking(move || store.get(&me.id, &ticket_id)).await?;
    Ok(Json(TicketResponse::from(&ticket)))
}

async fn update_ticket(
    State(state): State<AppState>,
    Me(me): Me,
    Path(ticket_id): Path<String>,
    Json(draft): Json<TicketDraft>,
) -> Result<Json<TicketResponse>, AppError> {
    let (store, now) = (Arc::clone(&state.tickets), state.clock.now());
    let ticket = blocking(move || store.update(&me.id, &ticket_id, draft, now)).await?;
    let view = TicketResponse::from(&ticket);
    announce(&state, DomainEvent::updated(view.clone()));
    Ok(Json(view))
}

async fn delete_ticket(State(state): State<AppState>, Me(me): Me, Path(ticket_id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let (store, now) = (Arc::clone(&state.tickets), state.clock.now());
    blocking(move || store.delete(&me.id, &ticket_id, now)).await?;
    announce(&state, DomainEvent::deleted());
    Ok(Json(json!({"message": "success"})))
}
