//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, Json, response::{IntoResponse, Response}};
use tracing::{info, instrument, warn};

use crate::batch::BatchRequest;
use crate::error::{AppError, AppResult};
use crate::protocol::*;
use crate::state::AppState;
use crate::logic::*;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state))]
pub async fn http_llm_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let status = state.llm.check_connection().await;
  info!(target: "b2first_backend", connected = status.connected, model_available = status.model_available, "HTTP llm status served");
  Json(status)
}

#[instrument(level = "info", skip(state))]
pub async fn http_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(catalog(&state))
}

#[instrument(level = "info", skip(state))]
pub async fn http_suggest_topics(
  State(state): State<Arc<AppState>>,
  Query(q): Query<SuggestQuery>,
) -> impl IntoResponse {
  Json(SuggestOut { topics: suggest_topics(&state, q.count) })
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.request.topic, text_type = %body.request.text_type, save = body.save))]
pub async fn http_generate_task(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Response {
  if body.request.topic.trim().is_empty() {
    return AppError::BadRequest("topic must not be empty".into()).into_response();
  }
  match generate_task(&state, &body.request, body.save, &|_| {}).await {
    Ok(out) => {
      info!(target: "generator", task_id = %out.task.id, saved = ?out.saved_path, "HTTP task generated");
      Json(out).into_response()
    }
    Err((failure, out)) => {
      let status = AppError::Generation(failure).status_code();
      warn!(target: "generator", stage = %out.stage, %status, "HTTP task generation failed");
      (status, Json(out)).into_response()
    }
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_tasks(State(state): State<Arc<AppState>>) -> AppResult<Json<LibraryOut>> {
  Ok(Json(library(&state)?))
}

#[instrument(level = "info", skip(state), fields(path = %q.path))]
pub async fn http_get_task_file(
  State(state): State<Arc<AppState>>,
  Query(q): Query<FileQuery>,
) -> AppResult<Json<TaskFileOut>> {
  Ok(Json(task_file(&state, &q.path)?))
}

#[instrument(level = "info", skip(state), fields(path = %q.path))]
pub async fn http_get_annotations(
  State(state): State<Arc<AppState>>,
  Query(q): Query<FileQuery>,
) -> AppResult<Json<AnnotationsOut>> {
  Ok(Json(load_annotations(&state, &q.path)?))
}

#[instrument(level = "info", skip(state, body), fields(path = %body.path, target_key = %body.target, status = ?body.status))]
pub async fn http_post_annotation(
  State(state): State<Arc<AppState>>,
  Json(body): Json<AnnotationIn>,
) -> AppResult<Json<AnnotationOut>> {
  let out = save_annotation(&state, body)?;
  info!(target: "review", path = %out.path, target_key = %out.target, "HTTP annotation saved");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_list_batches(State(state): State<Arc<AppState>>) -> AppResult<Json<BatchesOut>> {
  let batches = state.store.list_batches()?;
  let running = batch_running(&state).await;
  Ok(Json(BatchesOut { batches, running }))
}

/// Start a batch without progress streaming; poll `GET /api/v1/batches` for the result.
#[instrument(level = "info", skip(state, body), fields(topics = body.topics.len(), text_types = body.text_types.len()))]
pub async fn http_start_batch(
  State(state): State<Arc<AppState>>,
  Json(body): Json<BatchRequest>,
) -> AppResult<Json<BatchStartedOut>> {
  Ok(Json(start_batch(&state, body, None).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_cancel_batch(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(BatchCancelOut { cancelling: cancel_batch(&state).await })
}
