//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Generating a single task (optionally saving it)
//!   - Starting and cancelling the background batch
//!   - Library listing, task loading and review annotations
//!   - Catalogue and topic suggestions

use std::sync::atomic::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, instrument, warn};

use crate::annotations;
use crate::batch::{run_batch, BatchEvent, BatchRequest};
use crate::config::{MAX_TOKENS_RANGE, TEMPERATURE_RANGE};
use crate::domain::{SkillType, TextType};
use crate::error::{AppError, AppResult, FailureKind, GenerationFailure};
use crate::generator::{GenerationOutcome, GenerationRequest, GeneratorState, StageExchange, StateObserver};
use crate::protocol::*;
use crate::state::AppState;
use crate::validator;

const DEFAULT_SUGGESTIONS: usize = 5;
const MAX_SUGGESTIONS: usize = 20;

pub fn catalog(state: &AppState) -> CatalogOut {
  let cfg = &state.config;
  CatalogOut {
    text_types: TextType::ALL
      .iter()
      .map(|t| TextTypeOut { key: *t, label: t.label(), style: cfg.style_for(*t) })
      .collect(),
    skill_types: SkillType::ROTATION.iter().map(|s| s.key()).collect(),
    topic_sets: cfg.topic_sets(),
    defaults: DefaultsOut {
      model: state.llm.model().to_string(),
      temperature: cfg.llm.temperature,
      max_tokens: cfg.llm.max_tokens,
      temperature_range: TEMPERATURE_RANGE,
      max_tokens_range: MAX_TOKENS_RANGE,
    },
  }
}

/// Random sample of distinct topics across every topic set.
pub fn suggest_topics(state: &AppState, count: Option<usize>) -> Vec<String> {
  let count = count.unwrap_or(DEFAULT_SUGGESTIONS).clamp(1, MAX_SUGGESTIONS);
  let mut all: Vec<String> = state.config.topic_sets().into_values().flatten().collect();
  all.sort();
  all.dedup();
  let mut rng = rand::thread_rng();
  all.choose_multiple(&mut rng, count).cloned().collect()
}

fn failure_out(failure: &GenerationFailure, states: Vec<GeneratorState>, exchanges: Vec<StageExchange>) -> GenerationFailedOut {
  let violations = match &failure.kind {
    FailureKind::Validation(v) => v.violations.clone(),
    _ => Vec::new(),
  };
  GenerationFailedOut {
    stage: failure.stage,
    error: failure.to_string(),
    attempts: failure.attempts,
    violations,
    raw_output: failure.last_raw_output.clone(),
    states,
    exchanges,
  }
}

/// Run one generation; `Err` carries failure details ready for the client.
#[instrument(level = "info", skip(state, req, observer), fields(topic = %req.topic, text_type = %req.text_type))]
pub async fn generate_task(
  state: &AppState,
  req: &GenerationRequest,
  save: bool,
  observer: &StateObserver,
) -> Result<GenerateOut, (GenerationFailure, GenerationFailedOut)> {
  let GenerationOutcome { result, states, exchanges } = state.generator.generate_observed(req, observer).await;
  match result {
    Ok(task) => {
      let saved_path = if save {
        match state.store.save(&task) {
          Ok(path) => Some(relative_to_root(state, &path)),
          Err(e) => {
            error!(target: "b2first_backend", error = %e, "Generated task could not be saved");
            None
          }
        }
      } else {
        None
      };
      let validation = validator::validate(&task);
      Ok(GenerateOut { task, validation, saved_path, states, exchanges })
    }
    Err(failure) => {
      let out = failure_out(&failure, states, exchanges);
      Err((failure, out))
    }
  }
}

fn relative_to_root(state: &AppState, path: &std::path::Path) -> String {
  path
    .strip_prefix(state.store.root())
    .unwrap_or(path)
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

/// Validate a batch request and run it in the background, streaming events to `events`.
#[instrument(level = "info", skip(state, req, events), fields(topics = req.topics.len(), text_types = req.text_types.len()))]
pub async fn start_batch(state: &AppState, req: BatchRequest, events: Option<UnboundedSender<BatchEvent>>) -> AppResult<BatchStartedOut> {
  let topics: Vec<String> = req.topics.iter().map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
  if topics.is_empty() {
    return Err(AppError::BadRequest("at least one topic is required".into()));
  }
  if req.text_types.is_empty() {
    return Err(AppError::BadRequest("at least one text type is required".into()));
  }
  let req = BatchRequest { topics, ..req };
  let total = req.total();

  let cancel = state
    .begin_batch(total)
    .await
    .ok_or_else(|| AppError::BadRequest("a batch is already running".into()))?;

  let state = state.clone();
  let worker_state = state.clone();
  let worker = tokio::spawn(async move {
    run_batch(&worker_state.generator, &worker_state.store, &req, &cancel, events.as_ref()).await
  });
  // The slot is released from a separate task so a panicking run cannot keep it.
  tokio::spawn(async move {
    match worker.await {
      Ok(Ok(summary)) => info!(target: "batch", folder = %summary.folder, succeeded = summary.succeeded, failed = summary.failed, "Background batch done"),
      Ok(Err(e)) => error!(target: "batch", error = %e, "Background batch aborted"),
      Err(e) => error!(target: "batch", error = %e, "Background batch task died"),
    }
    state.end_batch().await;
  });

  Ok(BatchStartedOut { started: true, total })
}

/// Ask the running batch to stop before its next combination.
pub async fn cancel_batch(state: &AppState) -> bool {
  match state.batch.read().await.as_ref() {
    Some(running) => {
      running.cancel.store(true, Ordering::SeqCst);
      warn!(target: "batch", total = running.total, "Batch cancellation requested");
      true
    }
    None => false,
  }
}

pub async fn batch_running(state: &AppState) -> bool {
  state.batch.read().await.is_some()
}

pub fn library(state: &AppState) -> AppResult<LibraryOut> {
  let tasks = state.store.list_tasks()?;
  let stats = state.store.statistics()?;
  Ok(LibraryOut { tasks, stats })
}

pub fn task_file(state: &AppState, path: &str) -> AppResult<TaskFileOut> {
  let full = state.store.resolve(path)?;
  let task = state.store.load_task(path)?;
  let annotations = annotations::load_annotations(&full)?;
  let validation = validator::validate(&task);
  Ok(TaskFileOut { path: path.to_string(), task, validation, annotations })
}

pub fn load_annotations(state: &AppState, path: &str) -> AppResult<AnnotationsOut> {
  let full = state.store.resolve(path)?;
  let annotations = annotations::load_annotations(&full)?;
  Ok(AnnotationsOut { path: path.to_string(), annotations })
}

#[instrument(level = "info", skip(state, body), fields(path = %body.path, target_key = %body.target))]
pub fn save_annotation(state: &AppState, body: AnnotationIn) -> AppResult<AnnotationOut> {
  let full = state.store.resolve(&body.path)?;
  let annotation = annotations::save_annotation(&full, &body.target, body.status, &body.reviewer, &body.notes)?;
  Ok(AnnotationOut { path: body.path, target: body.target, annotation })
}

/// Channel bridging batch events into a connection's outbound message queue.
pub fn forward_batch_events(out: UnboundedSender<ServerWsMessage>) -> UnboundedSender<BatchEvent> {
  let (tx, mut rx) = mpsc::unbounded_channel::<BatchEvent>();
  tokio::spawn(async move {
    while let Some(event) = rx.recv().await {
      if out.send(ServerWsMessage::Batch { event }).is_err() {
        break;
      }
    }
  });
  tx
}

/// Observer that streams generator states to a connection.
pub fn stage_observer(out: UnboundedSender<ServerWsMessage>) -> Arc<StateObserver> {
  Arc::new(move |state: GeneratorState| {
    let _ = out.send(ServerWsMessage::Stage { state });
  })
}
