//! QA review annotations stored in each task file's `qa_annotations` block.
//!
//! Rewrites decode the file into an order-preserving JSON tree, replace one
//! entry of `qa_annotations` and re-encode with the same pretty writer the
//! store uses, so the other fields keep their bytes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::domain::{Annotation, AnnotationStatus, ReviewTarget, Task};
use crate::error::{AnnotationError, StoreError};
use crate::storage::{to_json_pretty, write_atomic};

const BLOCK: &str = "qa_annotations";

fn read_value(path: &Path) -> Result<(Value, Task), StoreError> {
  let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
  let value: Value = serde_json::from_str(&raw).map_err(|e| StoreError::json(path, e))?;
  let task: Task = serde_json::from_value(value.clone()).map_err(|e| StoreError::json(path, e))?;
  Ok((value, task))
}

/// Annotations for every review target of the task, pending where none is stored.
/// Never writes.
pub fn load_annotations(path: &Path) -> Result<BTreeMap<String, Annotation>, AnnotationError> {
  let (_, task) = read_value(path)?;
  Ok(
    ReviewTarget::all_for(&task)
      .into_iter()
      .map(|t| {
        let key = t.key();
        let annotation = task.qa_annotations.get(&key).cloned().unwrap_or_default();
        (key, annotation)
      })
      .collect(),
  )
}

/// Record a review decision for one target and persist it.
///
/// A non-pending status needs a reviewer; without one nothing is written.
#[instrument(level = "info", target = "review", skip(path, notes), fields(path = %path.display()))]
pub fn save_annotation(
  path: &Path,
  target: &str,
  status: AnnotationStatus,
  reviewer: &str,
  notes: &str,
) -> Result<Annotation, AnnotationError> {
  let reviewer = reviewer.trim();
  if status != AnnotationStatus::Pending && reviewer.is_empty() {
    return Err(AnnotationError::MissingReviewer {
      target: target.to_string(),
      status: format!("{status:?}").to_lowercase(),
    });
  }

  let (mut value, task) = read_value(path)?;
  let target: ReviewTarget = target.parse().map_err(|_| AnnotationError::UnknownTarget(target.to_string()))?;
  if !ReviewTarget::all_for(&task).contains(&target) {
    return Err(AnnotationError::UnknownTarget(target.key()));
  }

  let annotation = Annotation {
    status,
    reviewer: reviewer.to_string(),
    notes: notes.trim().to_string(),
    timestamp: Some(Utc::now()),
  };
  let encoded = serde_json::to_value(&annotation).map_err(|e| StoreError::json(path, e))?;

  let root = value
    .as_object_mut()
    .ok_or_else(|| StoreError::InvalidPath(format!("{} is not a JSON object", path.display())))?;
  let block = root.entry(BLOCK).or_insert_with(|| Value::Object(Map::new()));
  if !block.is_object() {
    *block = Value::Object(Map::new());
  }
  if let Value::Object(entries) = block {
    entries.insert(target.key(), encoded);
  }

  let json = to_json_pretty(&value).map_err(|e| StoreError::json(path, e))?;
  write_atomic(path, json.as_bytes())?;
  info!(target: "review", target_key = %target, ?status, %reviewer, "Annotation saved");
  Ok(annotation)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::storage::TaskStore;
  use crate::validator::tests::task_with;

  fn saved_task(dir: &Path) -> std::path::PathBuf {
    TaskStore::new(dir).save(&task_with(450, 5)).unwrap()
  }

  #[test]
  fn empty_reviewer_never_touches_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    let before = fs::read(&path).unwrap();

    for reviewer in ["", "   "] {
      let err = save_annotation(&path, "overall_task", AnnotationStatus::Approved, reviewer, "looks good").unwrap_err();
      assert!(matches!(err, AnnotationError::MissingReviewer { .. }));
    }
    let err = save_annotation(&path, "question_31", AnnotationStatus::Rejected, "", "").unwrap_err();
    assert!(matches!(err, AnnotationError::MissingReviewer { .. }));

    assert_eq!(fs::read(&path).unwrap(), before);
  }

  #[test]
  fn pending_can_be_saved_anonymously() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    let a = save_annotation(&path, "title", AnnotationStatus::Pending, "", "revisit").unwrap();
    assert_eq!(a.status, AnnotationStatus::Pending);
    assert_eq!(load_annotations(&path).unwrap()["title"].notes, "revisit");
  }

  #[test]
  fn other_fields_keep_their_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    let before = fs::read_to_string(&path).unwrap();
    let cut = before.find("\"qa_annotations\"").unwrap();

    save_annotation(&path, "question_33", AnnotationStatus::Rejected, "Ana", "two correct answers").unwrap();
    let after = fs::read_to_string(&path).unwrap();
    assert_eq!(&after[..cut], &before[..cut]);

    let v: Value = serde_json::from_str(&after).unwrap();
    let stored = &v["qa_annotations"]["question_33"];
    assert_eq!(stored["status"], "rejected");
    assert_eq!(stored["reviewer"], "Ana");
    let ts = stored["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok(), "{ts}");
  }

  #[test]
  fn later_saves_replace_only_their_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    save_annotation(&path, "text", AnnotationStatus::Approved, "Ana", "").unwrap();
    save_annotation(&path, "overall_task", AnnotationStatus::Approved, "Ben", "").unwrap();
    save_annotation(&path, "text", AnnotationStatus::Rejected, "Ben", "too easy").unwrap();

    let all = load_annotations(&path).unwrap();
    assert_eq!(all["text"].status, AnnotationStatus::Rejected);
    assert_eq!(all["overall_task"].reviewer, "Ben");
    assert_eq!(all["question_31"].status, AnnotationStatus::Pending);
  }

  #[test]
  fn loading_fills_defaults_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    let before = fs::read(&path).unwrap();

    let all = load_annotations(&path).unwrap();
    assert_eq!(all.len(), 3 + 5);
    assert!(all.values().all(|a| a.status == AnnotationStatus::Pending && a.timestamp.is_none()));
    assert!(all.contains_key("question_35"));
    assert_eq!(fs::read(&path).unwrap(), before);
  }

  #[test]
  fn unknown_targets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = saved_task(dir.path());
    let before = fs::read(&path).unwrap();
    for target in ["question_99", "summary"] {
      let err = save_annotation(&path, target, AnnotationStatus::Approved, "Ana", "").unwrap_err();
      assert!(matches!(err, AnnotationError::UnknownTarget(_)), "{target}");
    }
    assert_eq!(fs::read(&path).unwrap(), before);
  }
}
