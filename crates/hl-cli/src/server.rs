//! HTTP API over the engine.
//!
//! One process-wide store behind an async mutex; every request builds a
//! fresh `Engine` under the lock, so no engine state outlives a request.
//! Store errors map onto status codes by kind.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use hl_core::{
    ActivityKind, BehaviorWindow, ChangeType, Clock, CompletionEvent, EngineConfig,
    ExpertiseRecord, ExpertiseSort, HabitProfile, HistoryFilter, LevelHistoryEntry,
    LevelSuggestion, OverallLevelRecord, SuggestionStatus, parse_iso8601,
};
use hl_store::engine::parse_limit;
use hl_store::{AwardOutcome, DecayReport, DomainDetail, Engine, ErrorKind, Store, StoreError};

use crate::retry::{Backoff, retry_async};

// --- Errors ---

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    BadRequest(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

impl From<hl_core::ValidationError> for ApiError {
    fn from(e: hl_core::ValidationError) -> Self {
        ApiError::Store(StoreError::Validation(e))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Store(e) => match e.kind() {
                ErrorKind::Validation => "VALIDATION_ERROR",
                ErrorKind::NotFound => "NOT_FOUND",
                ErrorKind::Conflict => "CONFLICT",
                ErrorKind::Internal => "INTERNAL_ERROR",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Store(e) => e.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// --- State ---

#[derive(Clone)]
pub struct AppState {
    store: Arc<Mutex<Store>>,
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
}

impl AppState {
    pub fn new(store: Store, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let backoff = Backoff::from_config(&config.retry);
        Self {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            clock,
            backoff,
        }
    }

    /// Run one engine operation under the store lock, retrying conflicts
    /// and busy errors with backoff. The lock is released between attempts.
    async fn with_engine<T, F>(&self, op: F) -> ApiResult<T>
    where
        T: Send,
        F: Fn(&Engine<'_>) -> hl_store::Result<T> + Send + Sync,
    {
        let op = &op;
        let state = self;
        let result = retry_async(&self.backoff, move || async move {
            let store = state.store.lock().await;
            let engine = Engine::new(&store, &state.config, state.clock.as_ref());
            op(&engine)
        })
        .await;
        result.map_err(ApiError::from)
    }
}

// --- Router ---

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/owners/{owner}/level", get(get_level))
        .route("/owners/{owner}/expertise", get(list_expertise))
        .route("/owners/{owner}/expertise/{domain_code}", get(domain_detail))
        .route("/owners/{owner}/history", get(history))
        .route("/owners/{owner}/completions", post(award_completion))
        .route("/owners/{owner}/behavior", post(record_behavior))
        .route("/owners/{owner}/habits/{habit_id}", put(upsert_habit))
        .route("/owners/{owner}/suggestions", get(list_suggestions))
        .route("/owners/{owner}/suggestions/detect", post(detect_suggestions))
        .route("/suggestions/{id}/accept", post(accept_suggestion))
        .route("/suggestions/{id}/dismiss", post(dismiss_suggestion))
        .route("/decay", post(run_decay))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn run(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

// --- Request types ---

#[derive(Debug, Default, Deserialize)]
pub struct ExpertiseQuery {
    pub sort: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub change_type: Option<String>,
    pub domain_code: Option<String>,
    pub limit: Option<String>,
}

impl HistoryQuery {
    fn into_filter(self) -> ApiResult<HistoryFilter> {
        Ok(HistoryFilter {
            from: self.from.as_deref().map(parse_iso8601).transpose()?,
            to: self.to.as_deref().map(parse_iso8601).transpose()?,
            change_type: self
                .change_type
                .as_deref()
                .map(str::parse::<ChangeType>)
                .transpose()?,
            domain_code: self.domain_code,
            limit: parse_limit(self.limit.as_deref())?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    pub habit_id: String,
    #[serde(default)]
    pub domain_codes: Option<Vec<String>>,
    #[serde(default)]
    pub difficulty_level: Option<f64>,
    #[serde(default)]
    pub streak_days: f64,
    #[serde(default)]
    pub kind: ActivityKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HabitRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain_codes: Vec<String>,
    #[serde(default)]
    pub difficulty_level: Option<u8>,
    pub sessions_per_week: u32,
    pub minutes_per_session: u32,
    pub completion_rate_30d: f64,
}

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid suggestion id: {raw:?}")))
}

// --- Handlers ---

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_level(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<OverallLevelRecord>> {
    state
        .with_engine(|engine| engine.overall_level(&owner))
        .await
        .map(Json)
}

pub async fn list_expertise(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<ExpertiseQuery>,
) -> ApiResult<Json<Vec<ExpertiseRecord>>> {
    let sort = query
        .sort
        .as_deref()
        .map(str::parse::<ExpertiseSort>)
        .transpose()?
        .unwrap_or_default();
    let limit = parse_limit(query.limit.as_deref())?;
    state
        .with_engine(|engine| engine.list_expertise(&owner, sort, limit))
        .await
        .map(Json)
}

pub async fn domain_detail(
    State(state): State<AppState>,
    Path((owner, domain_code)): Path<(String, String)>,
) -> ApiResult<Json<DomainDetail>> {
    state
        .with_engine(|engine| engine.domain_detail(&owner, &domain_code))
        .await
        .map(Json)
}

pub async fn history(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<LevelHistoryEntry>>> {
    let filter = query.into_filter()?;
    state
        .with_engine(|engine| engine.history(&owner, &filter))
        .await
        .map(Json)
}

pub async fn award_completion(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(req): Json<CompletionRequest>,
) -> ApiResult<(StatusCode, Json<AwardOutcome>)> {
    let event = CompletionEvent {
        owner,
        habit_id: req.habit_id,
        domain_codes: req.domain_codes,
        difficulty_level: req.difficulty_level,
        streak_days: req.streak_days,
        kind: req.kind,
    };
    let outcome = state
        .with_engine(|engine| engine.award_completion(&event))
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn record_behavior(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(window): Json<BehaviorWindow>,
) -> ApiResult<Json<OverallLevelRecord>> {
    state
        .with_engine(|engine| engine.record_behavior(&owner, &window))
        .await
        .map(Json)
}

pub async fn upsert_habit(
    State(state): State<AppState>,
    Path((owner, habit_id)): Path<(String, String)>,
    Json(req): Json<HabitRequest>,
) -> ApiResult<Json<HabitProfile>> {
    let habit = HabitProfile {
        owner,
        name: if req.name.is_empty() { habit_id.clone() } else { req.name },
        habit_id,
        domain_codes: req.domain_codes,
        difficulty_level: req.difficulty_level,
        sessions_per_week: req.sessions_per_week,
        minutes_per_session: req.minutes_per_session,
        completion_rate_30d: req.completion_rate_30d,
    };
    state
        .with_engine(|engine| engine.upsert_habit(&habit))
        .await
        .map(Json)
}

pub async fn detect_suggestions(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<LevelSuggestion>>> {
    state
        .with_engine(|engine| engine.detect_suggestions(&owner))
        .await
        .map(Json)
}

pub async fn list_suggestions(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<LevelSuggestion>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<SuggestionStatus>)
        .transpose()?;
    state
        .with_engine(|engine| engine.list_suggestions(&owner, status))
        .await
        .map(Json)
}

pub async fn accept_suggestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LevelSuggestion>> {
    let id = parse_id(&id)?;
    state
        .with_engine(|engine| engine.accept_suggestion(id))
        .await
        .map(Json)
}

pub async fn dismiss_suggestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<LevelSuggestion>> {
    let id = parse_id(&id)?;
    state
        .with_engine(|engine| engine.dismiss_suggestion(id))
        .await
        .map(Json)
}

pub async fn run_decay(State(state): State<AppState>) -> ApiResult<Json<DecayReport>> {
    state
        .with_engine(|engine| engine.run_decay_pass())
        .await
        .map(Json)
}
