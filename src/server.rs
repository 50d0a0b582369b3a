use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::grading::Calculator;
use crate::models::{CalculationResult, Entry, EntryInput};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub calculator: Arc<Calculator>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(pool: SqlitePool, calculator: Calculator) -> Self {
        Self {
            pool,
            calculator: Arc::new(calculator),
            shutdown: Arc::new(Notify::new()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse<T> {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> MessageResponse<T> {
    fn with_data(message: &'static str, data: T) -> Self {
        Self {
            message,
            data: Some(data),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/shutdown", post(shutdown))
        .route("/exam/save", post(save_entry))
        .route("/exam/list", get(list_entries))
        .route("/exam/all", get(list_entries))
        .route("/exam/calculate/{id}", get(calculate_entry))
        .route(
            "/exam/{id}",
            get(get_entry).put(update_entry).delete(delete_entry),
        )
        .layer(middleware::from_fn(allow_cross_origin))
        .with_state(state)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "backend listening");
    serve_listener(listener, state).await
}

pub async fn serve_listener(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let stop = state.shutdown.clone();
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(stop))
    .await
    .context("server error")?;

    info!("backend stopped");
    Ok(())
}

async fn shutdown_signal(requested: Arc<Notify>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl-c");
                requested.notified().await;
            }
            info!("interrupt received, shutting down");
        }
        _ = requested.notified() => {
            info!("shutdown requested over http");
        }
    }
}

async fn allow_cross_origin(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Final Assessment Hub backend" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Result<Json<Value>, ApiError> {
    if !peer.ip().is_loopback() {
        warn!(%peer, "rejected shutdown request from remote peer");
        return Err(ApiError::Forbidden);
    }

    state.shutdown.notify_one();
    Ok(Json(json!({ "message": "Backend shutting down" })))
}

async fn save_entry(
    State(state): State<AppState>,
    Json(input): Json<EntryInput>,
) -> Result<Json<MessageResponse<Entry>>, ApiError> {
    input.validate()?;
    let entry = db::insert_entry(&state.pool, &input).await?;
    Ok(Json(MessageResponse::with_data(
        "Numbers saved successfully!",
        entry,
    )))
}

async fn list_entries(State(state): State<AppState>) -> Result<Json<Vec<Entry>>, ApiError> {
    Ok(Json(db::list_entries(&state.pool).await?))
}

async fn get_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Entry>, ApiError> {
    let id = parse_id(&id)?;
    db::fetch_entry(&state.pool, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<EntryInput>,
) -> Result<Json<MessageResponse<Entry>>, ApiError> {
    let id = parse_id(&id)?;
    input.validate()?;
    let entry = db::update_entry(&state.pool, id, &input)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(MessageResponse::with_data(
        "Entry updated successfully",
        entry,
    )))
}

async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse<()>>, ApiError> {
    let id = parse_id(&id)?;
    if !db::delete_entry(&state.pool, id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(MessageResponse {
        message: "Entry deleted successfully",
        data: None,
    }))
}

async fn calculate_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse<CalculationResult>>, ApiError> {
    let id = parse_id(&id)?;
    let entry = db::fetch_entry(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let result = state.calculator.calculate(&entry).map_err(|err| {
        warn!(entry_id = %id, error = %err, "calculation refused");
        err
    })?;

    Ok(Json(MessageResponse::with_data(
        "Entry calculated successfully",
        result,
    )))
}
