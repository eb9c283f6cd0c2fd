//! Error taxonomy for the generation pipeline, the file store and the review
//! store, plus the HTTP-facing `AppError`.

use std::fmt;
use std::path::PathBuf;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

use crate::json_repair::RepairStrategy;
use crate::validator::Violation;

/// Failures talking to the LLM endpoint.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
  #[error("LLM endpoint unreachable: {0}")]
  Connection(String),

  #[error("LLM request timed out: {0}")]
  Timeout(String),

  #[error("Model unavailable: {0}")]
  ModelUnavailable(String),

  #[error("LLM HTTP {status}: {message}")]
  Http { status: u16, message: String },

  #[error("Could not decode LLM response: {0}")]
  Decode(String),
}

impl LlmError {
  /// Only timeouts are worth repeating within the same stage; everything else
  /// means a prerequisite is missing.
  pub fn is_retryable(&self) -> bool {
    matches!(self, LlmError::Timeout(_))
  }
}

impl From<reqwest::Error> for LlmError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      LlmError::Timeout(err.to_string())
    } else if err.is_connect() {
      LlmError::Connection(err.to_string())
    } else if err.is_decode() {
      LlmError::Decode(err.to_string())
    } else if let Some(status) = err.status() {
      LlmError::Http { status: status.as_u16(), message: err.to_string() }
    } else {
      LlmError::Connection(err.to_string())
    }
  }
}

/// Model output that no repair strategy could turn into JSON.
#[derive(Debug, Clone, Error, Serialize)]
#[error("unparsable model output at line {line}, column {column}: {message} (tried {})", strategy_list(.attempted))]
pub struct ParseFailure {
  pub raw: String,
  pub attempted: Vec<RepairStrategy>,
  pub message: String,
  pub line: usize,
  pub column: usize,
}

fn strategy_list(s: &[RepairStrategy]) -> String {
  if s.is_empty() {
    return "nothing".into();
  }
  s.iter().map(|x| x.name()).collect::<Vec<_>>().join(", ")
}

/// A decoded task that breaks one or more B2 rules.
#[derive(Debug, Clone, Error, Serialize)]
#[error("task failed validation: {}", violation_list(.violations))]
pub struct ValidationFailure {
  pub violations: Vec<Violation>,
}

fn violation_list(v: &[Violation]) -> String {
  v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join("; ")
}

/// Pipeline position a generation run stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
  Title,
  Text,
  Questions,
  Validation,
  /// Generated, but the batch folder could not take the file.
  Save,
}

impl fmt::Display for FailedStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      FailedStage::Title => "title",
      FailedStage::Text => "text",
      FailedStage::Questions => "questions",
      FailedStage::Validation => "validation",
      FailedStage::Save => "save",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, Error)]
pub enum FailureKind {
  #[error(transparent)]
  Parse(ParseFailure),

  #[error(transparent)]
  Connection(LlmError),

  #[error(transparent)]
  Validation(ValidationFailure),
}

/// Terminal failure of one generation run; carries what is needed for the failure log.
#[derive(Debug, Clone, Error)]
#[error("generation failed at {stage} after {attempts} attempt(s): {kind}")]
pub struct GenerationFailure {
  pub stage: FailedStage,
  pub kind: FailureKind,
  pub attempts: u32,
  pub last_raw_output: Option<String>,
}

/// File-system failures of the task store.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("I/O error on {path}: {source}")]
  Io { path: PathBuf, #[source] source: std::io::Error },

  #[error("Invalid task JSON in {path}: {source}")]
  Json { path: PathBuf, #[source] source: serde_json::Error },

  #[error("Not found: {0}")]
  NotFound(PathBuf),

  #[error("Path escapes the task directory: {0}")]
  InvalidPath(String),
}

impl StoreError {
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    StoreError::Io { path: path.into(), source }
  }

  pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
    StoreError::Json { path: path.into(), source }
  }
}

/// Failures of the QA annotation store.
#[derive(Debug, Error)]
pub enum AnnotationError {
  #[error("A reviewer name is required to mark {target} as {status}")]
  MissingReviewer { target: String, status: String },

  #[error("Unknown review target: {0}")]
  UnknownTarget(String),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Error surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
  #[error("Bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Annotation(#[from] AnnotationError),

  #[error(transparent)]
  Generation(#[from] GenerationFailure),

  #[error(transparent)]
  Llm(#[from] LlmError),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  pub code: u16,
}

impl AppError {
  pub fn status_code(&self) -> StatusCode {
    match self {
      AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
      AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
      AppError::Store(StoreError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
      AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Annotation(AnnotationError::MissingReviewer { .. }) => StatusCode::BAD_REQUEST,
      AppError::Annotation(AnnotationError::UnknownTarget(_)) => StatusCode::BAD_REQUEST,
      AppError::Annotation(AnnotationError::Store(StoreError::NotFound(_))) => StatusCode::NOT_FOUND,
      AppError::Annotation(AnnotationError::Store(StoreError::InvalidPath(_))) => StatusCode::BAD_REQUEST,
      AppError::Annotation(AnnotationError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Generation(g) => match g.kind {
        FailureKind::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
      },
      AppError::Llm(_) => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let status = self.status_code();
    let body = ErrorResponse { error: self.to_string(), code: status.as_u16() };
    (status, Json(body)).into_response()
  }
}

pub type AppResult<T> = Result<T, AppError>;
