// SPDX-License-Identifier: MIT

//! HTTP surface over the validator, the import pipeline and the condition
//! evaluator

mod error;

pub use error::ApiError;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::automation::condition::evaluate_str;
use crate::automation::variables::VariableContext;
use crate::cacao::ingest::Deserializer;
use crate::cacao::schema::{validate, Level, ValidationReport};
use crate::cacao::store::PlaybookStore;
use crate::error::PlaybookError;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PlaybookStore>,
    /// Deadline applied to every import transaction
    pub save_timeout: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn PlaybookStore>, save_timeout: Duration) -> Self {
        Self {
            store,
            save_timeout,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/playbooks", get(list_playbooks))
        .route("/api/playbooks/validate", post(validate_playbook))
        .route(
            "/api/playbooks/{name}",
            get(get_playbook).put(import_playbook).delete(delete_playbook),
        )
        .route("/api/conditions/evaluate", post(evaluate_condition))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(port: u16, state: AppState) -> Result<(), PlaybookError> {
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    log::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn validate_playbook(Json(document): Json<Value>) -> Json<ValidationReport> {
    Json(validate(&document))
}

async fn list_playbooks(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let playbooks = state.store.list().await?;
    Ok(Json(json!(playbooks)))
}

async fn get_playbook(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.store.load(&name).await? {
        Some(stored) => Ok(Json(json!(stored))),
        None => Err(ApiError::NotFound(format!("Playbook '{}' not found", name))),
    }
}

/// Validate, flatten and store a document under `name`, replacing any
/// earlier import of the same name
async fn import_playbook(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(document): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut deserializer = Deserializer::new(document, name.clone());
    let report = deserializer.validate();
    deserializer.deserialize()?;
    deserializer
        .save_with_deadline(state.store.as_ref(), state.save_timeout)
        .await?;

    let warnings: Vec<_> = report.at_level(Level::Warning).collect();
    Ok(Json(json!({
        "name": name,
        "objects": deserializer.records().len(),
        "relations": deserializer.relations().len(),
        "warnings": warnings,
    })))
}

async fn delete_playbook(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.remove(&name).await? {
        log::info!("Removed playbook '{}'", name);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Playbook '{}' not found", name)))
    }
}

#[derive(Debug, Deserialize)]
struct EvaluateRequest {
    condition: String,
    /// Variable definitions in playbook_variables form
    #[serde(default)]
    variables: Map<String, Value>,
}

async fn evaluate_condition(Json(request): Json<EvaluateRequest>) -> Result<Json<Value>, ApiError> {
    let context = VariableContext::from_definitions(&request.variables).map_err(PlaybookError::from)?;
    let result = evaluate_str(&request.condition, &context)?;
    Ok(Json(json!({ "result": result })))
}
