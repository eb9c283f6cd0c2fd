//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::batch::{BatchEvent, BatchRequest};
use crate::domain::{Annotation, AnnotationStatus, Task, TextType};
use crate::error::FailedStage;
use crate::generator::{GenerationRequest, GeneratorState, StageExchange};
use crate::storage::{BatchEntry, LibraryStats, TaskEntry};
use crate::validator::{ValidationReport, Violation};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    GenerateTask {
        #[serde(flatten)]
        request: GenerationRequest,
        #[serde(default)]
        save: bool,
    },
    StartBatch {
        #[serde(flatten)]
        request: BatchRequest,
    },
    CancelBatch,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    /// Generator entered a new state.
    Stage {
        state: GeneratorState,
    },
    TaskGenerated {
        #[serde(flatten)]
        result: GenerateOut,
    },
    GenerationFailed {
        #[serde(flatten)]
        failure: GenerationFailedOut,
    },
    Batch {
        #[serde(flatten)]
        event: BatchEvent,
    },
    BatchCancelling,
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct TextTypeOut {
    pub key: TextType,
    pub label: &'static str,
    pub style: String,
}

#[derive(Serialize)]
pub struct DefaultsOut {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub temperature_range: (f32, f32),
    pub max_tokens_range: (u32, u32),
}

#[derive(Serialize)]
pub struct CatalogOut {
    pub text_types: Vec<TextTypeOut>,
    pub skill_types: Vec<&'static str>,
    pub topic_sets: BTreeMap<String, Vec<String>>,
    pub defaults: DefaultsOut,
}

#[derive(Debug, Deserialize)]
pub struct SuggestQuery {
    pub count: Option<usize>,
}
#[derive(Serialize)]
pub struct SuggestOut {
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    #[serde(flatten)]
    pub request: GenerationRequest,
    #[serde(default)]
    pub save: bool,
}

#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub task: Task,
    pub validation: ValidationReport,
    /// Relative to the output directory; present when the task was saved.
    pub saved_path: Option<String>,
    pub states: Vec<GeneratorState>,
    pub exchanges: Vec<StageExchange>,
}

/// Failure details for the UI, including what the model last said.
#[derive(Debug, Serialize)]
pub struct GenerationFailedOut {
    pub stage: FailedStage,
    pub error: String,
    pub attempts: u32,
    pub violations: Vec<Violation>,
    pub raw_output: Option<String>,
    pub states: Vec<GeneratorState>,
    pub exchanges: Vec<StageExchange>,
}

#[derive(Serialize)]
pub struct LibraryOut {
    pub tasks: Vec<TaskEntry>,
    pub stats: LibraryStats,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
}

#[derive(Serialize)]
pub struct TaskFileOut {
    pub path: String,
    pub task: Task,
    pub validation: ValidationReport,
    pub annotations: BTreeMap<String, Annotation>,
}

#[derive(Serialize)]
pub struct AnnotationsOut {
    pub path: String,
    pub annotations: BTreeMap<String, Annotation>,
}

#[derive(Debug, Deserialize)]
pub struct AnnotationIn {
    pub path: String,
    pub target: String,
    pub status: AnnotationStatus,
    #[serde(default)]
    pub reviewer: String,
    #[serde(default)]
    pub notes: String,
}
#[derive(Serialize)]
pub struct AnnotationOut {
    pub path: String,
    pub target: String,
    pub annotation: Annotation,
}

#[derive(Serialize)]
pub struct BatchesOut {
    pub batches: Vec<BatchEntry>,
    pub running: bool,
}

#[derive(Serialize)]
pub struct BatchStartedOut {
    pub started: bool,
    pub total: usize,
}

#[derive(Serialize)]
pub struct BatchCancelOut {
    pub cancelling: bool,
}
