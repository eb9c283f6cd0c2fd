//! LLM access. `LlmClient` is the seam the generator depends on; `OllamaClient`
//! talks to a local Ollama server over its chat API.
//!
//! Calls are instrumented and log model names, latencies and response sizes
//! (not contents).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::LlmSettings;
use crate::error::LlmError;

/// One prompt exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
  pub system: String,
  pub user: String,
  pub temperature: f32,
  pub max_tokens: u32,
  /// Ask the server to constrain output to JSON.
  pub json_mode: bool,
}

/// Reachability snapshot reported by `/api/v1/llm/status`.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ConnectionStatus {
  pub connected: bool,
  pub host: String,
  pub model: String,
  pub model_available: bool,
  pub models: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
  /// Raw completion text for one request.
  async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError>;

  /// Model names installed on the server.
  async fn list_models(&self) -> Result<Vec<String>, LlmError>;

  fn host(&self) -> &str;

  fn model(&self) -> &str;

  async fn check_connection(&self) -> ConnectionStatus {
    match self.list_models().await {
      Ok(models) => {
        let wanted = self.model();
        let model_available = models.iter().any(|m| model_matches(m, wanted));
        ConnectionStatus {
          connected: true,
          host: self.host().to_string(),
          model: wanted.to_string(),
          model_available,
          models,
          error: None,
        }
      }
      Err(e) => ConnectionStatus {
        connected: false,
        host: self.host().to_string(),
        model: self.model().to_string(),
        model_available: false,
        models: Vec::new(),
        error: Some(e.to_string()),
      },
    }
  }
}

/// Ollama lists `llama3.1:8b`; a bare `mistral` means `mistral:latest`.
fn model_matches(listed: &str, wanted: &str) -> bool {
  listed == wanted || (!wanted.contains(':') && listed == format!("{wanted}:latest"))
}

#[derive(Clone)]
pub struct OllamaClient {
  client: reqwest::Client,
  host: String,
  model: String,
}

impl OllamaClient {
  pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
      .timeout(Duration::from_secs(settings.timeout_secs))
      .build()
      .map_err(|e| LlmError::Connection(e.to_string()))?;
    Ok(Self {
      client,
      host: settings.host.trim_end_matches('/').to_string(),
      model: settings.model.clone(),
    })
  }

  async fn error_from_response(&self, res: reqwest::Response) -> LlmError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let message = extract_ollama_error(&body).unwrap_or(body);
    if status == reqwest::StatusCode::NOT_FOUND {
      LlmError::ModelUnavailable(format!("{}: {}", self.model, message))
    } else {
      LlmError::Http { status: status.as_u16(), message }
    }
  }
}

#[async_trait]
impl LlmClient for OllamaClient {
  #[instrument(level = "info", skip(self, req), fields(model = %self.model, json_mode = req.json_mode))]
  async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
    let url = format!("{}/api/chat", self.host);
    let body = ChatRequest {
      model: &self.model,
      messages: vec![
        ChatMessage { role: "system", content: &req.system },
        ChatMessage { role: "user", content: &req.user },
      ],
      stream: false,
      format: req.json_mode.then_some("json"),
      options: ChatOptions { temperature: req.temperature, num_predict: req.max_tokens },
    };

    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "b2first-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&body)
      .send()
      .await?;

    if !res.status().is_success() {
      let err = self.error_from_response(res).await;
      warn!(elapsed = ?start.elapsed(), error = %err, "Ollama chat call failed");
      return Err(err);
    }

    let parsed: ChatResponse = res.json().await?;
    let content = parsed.message.map(|m| m.content).unwrap_or_default();
    info!(elapsed = ?start.elapsed(), chars = content.len(), eval_count = ?parsed.eval_count, "Ollama response received");
    Ok(content)
  }

  #[instrument(level = "debug", skip(self))]
  async fn list_models(&self) -> Result<Vec<String>, LlmError> {
    let url = format!("{}/api/tags", self.host);
    let res = self.client.get(&url).header(USER_AGENT, "b2first-backend/0.1").send().await?;
    if !res.status().is_success() {
      let status = res.status();
      let message = res.text().await.unwrap_or_default();
      return Err(LlmError::Http { status: status.as_u16(), message });
    }
    let tags: TagsResponse = res.json().await?;
    let names: Vec<String> = tags.models.into_iter().filter_map(|m| m.name.or(m.model)).collect();
    debug!(count = names.len(), "Ollama models listed");
    Ok(names)
  }

  fn host(&self) -> &str {
    &self.host
  }

  fn model(&self) -> &str {
    &self.model
  }
}

// --- Ollama DTOs ---

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  format: Option<&'static str>,
  options: ChatOptions,
}
#[derive(Serialize)]
struct ChatMessage<'a> { role: &'static str, content: &'a str }
#[derive(Serialize)]
struct ChatOptions { temperature: f32, num_predict: u32 }

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)] message: Option<ChatResponseMessage>,
  #[serde(default)] eval_count: Option<u64>,
}
#[derive(Deserialize)]
struct ChatResponseMessage { #[serde(default)] content: String }

#[derive(Deserialize)]
struct TagsResponse { #[serde(default)] models: Vec<TagEntry> }
#[derive(Deserialize)]
struct TagEntry {
  #[serde(default)] name: Option<String>,
  #[serde(default)] model: Option<String>,
}

/// Ollama reports failures as `{"error": "..."}`.
fn extract_ollama_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error)
}
