//! Sequential batch generation over topics x text types.
//!
//! Combinations run one after another in topic-major order. The cancel flag is
//! checked before each combination, never during an LLM call. A failed
//! combination is logged into the batch folder and the run moves on, even
//! when the folder refuses a write.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, instrument, warn};

use crate::domain::TextType;
use crate::error::{FailedStage, StoreError};
use crate::generator::{GenerationRequest, TaskGenerator};
use crate::storage::{BatchHandle, BatchSummary, FailureRecord, TaskStore};

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
  pub topics: Vec<String>,
  pub text_types: Vec<TextType>,
  #[serde(default)]
  pub custom_instructions: String,
  #[serde(default)]
  pub temperature: Option<f32>,
  #[serde(default)]
  pub max_tokens: Option<u32>,
}

impl BatchRequest {
  pub fn total(&self) -> usize {
    self.topics.len() * self.text_types.len()
  }
}

/// Progress notifications streamed to the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
  Started { folder: String, total: usize },
  ItemStarted { index: usize, total: usize, topic: String, text_type: TextType },
  ItemSucceeded { index: usize, total: usize, topic: String, text_type: TextType, title: String, file: String },
  ItemFailed { index: usize, total: usize, topic: String, text_type: TextType, stage: FailedStage, error: String },
  Finished { summary: BatchSummary },
}

fn emit(events: Option<&UnboundedSender<BatchEvent>>, ev: BatchEvent) {
  if let Some(tx) = events {
    let _ = tx.send(ev);
  }
}

/// Run every combination and finalize the batch folder, cancelled or not.
#[instrument(level = "info", target = "batch", skip_all, fields(topics = req.topics.len(), text_types = req.text_types.len()))]
pub async fn run_batch(
  generator: &TaskGenerator,
  store: &TaskStore,
  req: &BatchRequest,
  cancel: &AtomicBool,
  events: Option<&UnboundedSender<BatchEvent>>,
) -> Result<BatchSummary, StoreError> {
  let params = generator.params_for(req.temperature, req.max_tokens, &req.custom_instructions);
  let handle = store.create_batch(&req.topics, &req.text_types, params)?;
  run_in_batch(generator, store, handle, req, cancel, events).await
}

/// Fill an already created batch folder. Write errors fail only their combination.
pub(crate) async fn run_in_batch(
  generator: &TaskGenerator,
  store: &TaskStore,
  mut handle: BatchHandle,
  req: &BatchRequest,
  cancel: &AtomicBool,
  events: Option<&UnboundedSender<BatchEvent>>,
) -> Result<BatchSummary, StoreError> {
  let total = req.total();
  emit(events, BatchEvent::Started { folder: handle.name.clone(), total });

  let combos: Vec<(&String, TextType)> =
    req.topics.iter().flat_map(|topic| req.text_types.iter().map(move |t| (topic, *t))).collect();
  let mut cancelled = false;
  for (i, (topic, text_type)) in combos.into_iter().enumerate() {
    if cancel.load(Ordering::SeqCst) {
      info!(target: "batch", completed = i, total, "Batch cancelled");
      cancelled = true;
      break;
    }
    let index = i + 1;
    emit(events, BatchEvent::ItemStarted { index, total, topic: topic.clone(), text_type });

    let gen_req = GenerationRequest {
      topic: topic.clone(),
      text_type,
      custom_instructions: req.custom_instructions.clone(),
      temperature: req.temperature,
      max_tokens: req.max_tokens,
    };
    let outcome = generator.generate(&gen_req).await;
    match outcome.result {
      Ok(task) => match store.append_task(&mut handle, &task) {
        Ok(path) => {
          let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
          info!(target: "batch", index, total, %topic, %text_type, %file, "Batch item succeeded");
          emit(events, BatchEvent::ItemSucceeded { index, total, topic: topic.clone(), text_type, title: task.title, file });
        }
        Err(e) => {
          error!(target: "batch", index, total, %topic, %text_type, error = %e, "Generated task could not be written");
          handle.record_unwritten(topic, text_type, FailedStage::Save);
          emit(events, BatchEvent::ItemFailed {
            index,
            total,
            topic: topic.clone(),
            text_type,
            stage: FailedStage::Save,
            error: e.to_string(),
          });
        }
      },
      Err(failure) => {
        let record = FailureRecord::from_failure(topic, text_type, &failure);
        if let Err(e) = store.append_failure(&mut handle, &record) {
          error!(target: "batch", index, total, %topic, %text_type, error = %e, "Failure log could not be written");
          handle.record_unwritten(topic, text_type, record.stage);
        }
        warn!(target: "batch", index, total, %topic, %text_type, error = %failure, "Batch item failed");
        emit(events, BatchEvent::ItemFailed {
          index,
          total,
          topic: topic.clone(),
          text_type,
          stage: failure.stage,
          error: record.error,
        });
      }
    }
  }

  let summary = store.finalize(handle, cancelled)?;
  emit(events, BatchEvent::Finished { summary: summary.clone() });
  Ok(summary)
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::sync::Arc;

  use super::*;
  use crate::config::AppConfig;
  use crate::error::LlmError;
  use crate::generator::tests::{questions_json, text_json, title_json, ScriptedClient};
  use crate::storage::{BatchRecord, SUMMARY_FILE};

  fn request() -> BatchRequest {
    BatchRequest {
      topics: vec!["urban gardening".into(), "remote work".into()],
      text_types: vec![TextType::BlogPost, TextType::MagazineArticle],
      custom_instructions: String::new(),
      temperature: None,
      max_tokens: None,
    }
  }

  fn ok_task() -> Vec<Result<String, LlmError>> {
    vec![Ok(title_json()), Ok(text_json(520)), Ok(questions_json(6))]
  }

  #[tokio::test]
  async fn one_unparsable_combination_yields_three_and_one() {
    let mut script = ok_task();
    script.extend(vec![Ok::<String, LlmError>("I cannot help with that.".to_string()); 3]);
    script.extend(ok_task());
    script.extend(ok_task());
    let client = Arc::new(ScriptedClient::new(script));
    let generator = TaskGenerator::new(client.clone(), Arc::new(AppConfig::default()));
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let summary = run_batch(&generator, &store, &request(), &AtomicBool::new(false), Some(&tx)).await.unwrap();

    assert_eq!((summary.attempted, summary.succeeded, summary.failed), (4, 3, 1));
    assert!(!summary.cancelled);
    assert_eq!(client.calls(), 12);

    let batch_dir = dir.path().join(&summary.folder);
    assert!(summary.folder.ends_with("_2topics_2types"));
    let failed = summary
      .records
      .iter()
      .find_map(|r| match r {
        BatchRecord::Failed { index, text_type, stage, file, .. } => Some((*index, *text_type, *stage, file.clone())),
        _ => None,
      })
      .unwrap();
    assert_eq!((failed.0, failed.1, failed.2), (2, TextType::MagazineArticle, FailedStage::Title));
    let log = fs::read_to_string(batch_dir.join(&failed.3)).unwrap();
    assert!(log.contains("I cannot help with that."));
    assert!(batch_dir.join("task_04_remote_work_magazine_article.json").is_file());
    assert!(fs::read_to_string(batch_dir.join(SUMMARY_FILE)).unwrap().contains("Failed: 1"));

    drop(tx);
    let mut kinds = Vec::new();
    while let Some(ev) = rx.recv().await {
      kinds.push(serde_json::to_value(&ev).unwrap()["event"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds.first().map(String::as_str), Some("started"));
    assert_eq!(kinds.last().map(String::as_str), Some("finished"));
    assert_eq!(kinds.iter().filter(|k| *k == "item_failed").count(), 1);
    assert_eq!(kinds.iter().filter(|k| *k == "item_succeeded").count(), 3);
  }

  #[tokio::test]
  async fn write_errors_fail_one_combination_only() {
    let mut script = Vec::new();
    for _ in 0..4 {
      script.extend(ok_task());
    }
    let client = Arc::new(ScriptedClient::new(script));
    let generator = TaskGenerator::new(client.clone(), Arc::new(AppConfig::default()));
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let req = request();
    let params = generator.params_for(None, None, "");
    let handle = store.create_batch(&req.topics, &req.text_types, params).unwrap();
    let batch_dir = handle.dir.clone();
    // A directory squatting on the first task's name makes that write fail.
    fs::create_dir(batch_dir.join("task_01_urban_gardening_blog_post.json")).unwrap();

    let summary = run_in_batch(&generator, &store, handle, &req, &AtomicBool::new(false), None).await.unwrap();

    assert_eq!((summary.attempted, summary.succeeded, summary.failed), (4, 3, 1));
    assert_eq!(client.calls(), 12);
    assert!(matches!(
      &summary.records[0],
      BatchRecord::Failed { index: 1, stage: FailedStage::Save, file, .. } if file.is_empty()
    ));
    assert!(batch_dir.join("task_04_remote_work_magazine_article.json").is_file());
    let text = fs::read_to_string(batch_dir.join(SUMMARY_FILE)).unwrap();
    assert!(text.contains("Status: completed"));
    assert!(text.contains("[failed] (not written) (urban gardening / blog post, stage: save)"));
  }

  #[tokio::test]
  async fn cancelled_batch_is_still_finalized() {
    let client = Arc::new(ScriptedClient::new(Vec::new()));
    let generator = TaskGenerator::new(client.clone(), Arc::new(AppConfig::default()));
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());

    let summary = run_batch(&generator, &store, &request(), &AtomicBool::new(true), None).await.unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.attempted, 0);
    assert_eq!(client.calls(), 0);
    let text = fs::read_to_string(dir.path().join(&summary.folder).join(SUMMARY_FILE)).unwrap();
    assert!(text.contains("Status: cancelled"));
  }
}
