//! HTTP routes: liveness, raw file read-through, audit and the command webhook.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::debug;

use super::error::{WebError, WebResult};
use crate::commands::{AdminCommand, CommandResult};
use crate::dispatcher::DispatcherHandle;
use crate::store::{RecordStore, StoreAudit, StoreError};

/// Shared state for every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub dispatcher: DispatcherHandle,
    pub prefix: Arc<str>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<RecordStore>, dispatcher: DispatcherHandle, prefix: &str) -> Self {
        Self {
            store,
            dispatcher,
            prefix: Arc::from(prefix),
        }
    }
}

/// Body of a webhook call.
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    /// Raw command text, e.g. `/ban alice`.
    pub text: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/keys", get(raw_keys))
        .route("/users", get(raw_users))
        .route("/audit", get(audit))
        .route("/webhook", post(webhook))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn raw_keys(State(state): State<AppState>) -> WebResult<Response> {
    let bytes = with_store(&state, RecordStore::raw_keys).await?;
    plain_text(bytes, "Key file does not exist")
}

async fn raw_users(State(state): State<AppState>) -> WebResult<Response> {
    let bytes = with_store(&state, RecordStore::raw_users).await?;
    plain_text(bytes, "User file does not exist")
}

async fn audit(State(state): State<AppState>) -> WebResult<Json<StoreAudit>> {
    let report = with_store(&state, RecordStore::audit).await?;
    Ok(Json(report))
}

async fn webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> WebResult<Json<CommandResult>> {
    let command = AdminCommand::parse(&request.text, &state.prefix)
        .ok_or_else(|| WebError::BadRequest(format!("Not a command: '{}'", request.text.trim())))?;

    debug!("Webhook command: {}", command);
    let result = state.dispatcher.submit(command).await?;
    Ok(Json(result))
}

/// Runs a store read on the blocking pool.
async fn with_store<T, F>(state: &AppState, op: F) -> WebResult<T>
where
    T: Send + 'static,
    F: FnOnce(&RecordStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&state.store);
    tokio::task::spawn_blocking(move || op(&store))
        .await
        .map_err(|e| WebError::Internal(e.to_string()))?
        .map_err(WebError::from)
}

fn plain_text(bytes: Option<Vec<u8>>, missing: &str) -> WebResult<Response> {
    let bytes = bytes.ok_or_else(|| WebError::NotFound(missing.to_owned()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], bytes).into_response())
}
