use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::config::NewsConfig;
use crate::entry::{parse_batch, Entry};
use crate::injector::NewsInjector;
use crate::store;

#[derive(Clone)]
pub struct AppState {
    injector: Arc<Mutex<NewsInjector>>,
}

impl AppState {
    pub fn new(injector: NewsInjector) -> Self {
        Self {
            injector: Arc::new(Mutex::new(injector)),
        }
    }

    /// Store backend and feed picked from config.
    pub fn from_config(cfg: &NewsConfig) -> Result<Self> {
        let injector = NewsInjector::new(store::from_config(cfg), cfg)?;
        Ok(Self::new(injector))
    }

    fn lock(&self) -> Result<MutexGuard<'_, NewsInjector>, ApiError> {
        self.injector
            .lock()
            .map_err(|_| ApiError::internal("injector lock poisoned"))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/news",
            get(list_items).post(add_items).delete(clear_items),
        )
        .route("/api/news/update", post(update_items))
        .route("/api/news/load", post(load_items))
        .route("/api/news/{pk}", delete(dismiss_item))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::warn!(target: "news", error = %format!("{e:#}"), "request failed");
        Self::internal(format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, ApiError> {
    let inj = state.lock()?;
    Ok(Json(inj.items().to_vec()))
}

// Malformed bodies are dropped the same way add_items drops them.
async fn add_items(State(state): State<AppState>, body: String) -> Result<Response, ApiError> {
    let mut inj = state.lock()?;
    inj.add_items(&body);
    let out = json!({ "items": inj.items().len() });
    Ok((StatusCode::ACCEPTED, Json(out)).into_response())
}

async fn update_items(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, ApiError> {
    let mut inj = state.lock()?;
    inj.update()?;
    Ok(Json(inj.items().to_vec()))
}

async fn load_items(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let records = parse_batch(&body).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    let mut inj = state.lock()?;
    inj.update()?;
    let loaded = inj.load_records(records)?;
    Ok(Json(json!({ "loaded": loaded, "items": inj.items().len() })))
}

async fn clear_items(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.lock()?.clear()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn dismiss_item(
    State(state): State<AppState>,
    Path(pk): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if state.lock()?.dismiss(pk)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
