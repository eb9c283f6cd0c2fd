//! Task files on disk: single tasks, batch folders with failure logs and a
//! plain-text summary, plus the read side used by the library and review UI.
//!
//! Layout under the output directory:
//!
//! ```text
//! reading_part5_task_01.json
//! batch_20250101_120000_2topics_2types/
//!   task_01_urban_gardening_blog_post.json
//!   failed_task_02_20250101_120130.txt
//!   BATCH_SUMMARY.txt
//! ```
//!
//! Every write goes to a temporary sibling first and is then renamed over the
//! target.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{AnnotationStatus, GenerationParams, Task, TextType};
use crate::error::{FailedStage, GenerationFailure, StoreError};
use crate::util::slugify;

pub const SUMMARY_FILE: &str = "BATCH_SUMMARY.txt";
const SINGLE_PREFIX: &str = "reading_part5_task_";
const BATCH_PREFIX: &str = "batch_";

/// Pretty JSON with a trailing newline; the one format every task file uses.
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
  let mut s = serde_json::to_string_pretty(value)?;
  s.push('\n');
  Ok(s)
}

/// Write `contents` to a temporary sibling, then rename it over `path`.
/// Each call gets its own temporary name, so concurrent writers never share one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
  let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
  fs::write(&tmp, contents).map_err(|e| StoreError::io(&tmp, e))?;
  fs::rename(&tmp, path).map_err(|e| {
    let _ = fs::remove_file(&tmp);
    StoreError::io(path, e)
  })
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
  let json = to_json_pretty(value).map_err(|e| StoreError::json(path, e))?;
  write_atomic(path, json.as_bytes())
}

/// What a batch records about one failed combination.
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
  pub topic: String,
  pub text_type: TextType,
  pub stage: FailedStage,
  pub error: String,
  pub attempts: u32,
  pub raw_output: Option<String>,
}

impl FailureRecord {
  pub fn from_failure(topic: &str, text_type: TextType, failure: &GenerationFailure) -> Self {
    Self {
      topic: topic.to_string(),
      text_type,
      stage: failure.stage,
      error: failure.kind.to_string(),
      attempts: failure.attempts,
      raw_output: failure.last_raw_output.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchRecord {
  Succeeded { index: u32, topic: String, text_type: TextType, file: String },
  Failed { index: u32, topic: String, text_type: TextType, stage: FailedStage, file: String },
}

/// An open batch folder. Owned by one batch run.
#[derive(Debug)]
pub struct BatchHandle {
  pub name: String,
  pub dir: PathBuf,
  pub topics: Vec<String>,
  pub text_types: Vec<TextType>,
  pub params: GenerationParams,
  pub started_at: DateTime<Local>,
  pub records: Vec<BatchRecord>,
}

impl BatchHandle {
  fn next_index(&self) -> u32 {
    self.records.len() as u32 + 1
  }

  /// Count a combination as failed when none of its files could be written.
  pub fn record_unwritten(&mut self, topic: &str, text_type: TextType, stage: FailedStage) {
    let index = self.next_index();
    self.records.push(BatchRecord::Failed { index, topic: topic.to_string(), text_type, stage, file: String::new() });
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
  pub folder: String,
  pub attempted: usize,
  pub succeeded: usize,
  pub failed: usize,
  pub success_rate: f64,
  pub cancelled: bool,
  pub records: Vec<BatchRecord>,
}

/// Library row for one task file.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEntry {
  /// Relative to the output directory, `/`-separated.
  pub path: String,
  pub batch: Option<String>,
  pub title: String,
  pub topic: String,
  pub text_type: TextType,
  pub word_count: usize,
  pub question_count: usize,
  pub status: AnnotationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
  pub name: String,
  pub task_files: Vec<String>,
  pub failure_logs: usize,
  pub finalized: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LibraryStats {
  pub total_tasks: usize,
  pub total_words: usize,
  pub average_words: usize,
  pub total_questions: usize,
  pub batches: usize,
  pub approved: usize,
  pub rejected: usize,
  pub pending: usize,
}

#[derive(Debug, Clone)]
pub struct TaskStore {
  root: PathBuf,
}

impl TaskStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn ensure_root(&self) -> Result<(), StoreError> {
    fs::create_dir_all(&self.root).map_err(|e| StoreError::io(&self.root, e))
  }

  /// Resolve a `/`-separated path relative to the output directory.
  /// Absolute paths and `..` are rejected; the file must exist.
  pub fn resolve(&self, rel: &str) -> Result<PathBuf, StoreError> {
    let rel_path = Path::new(rel.trim());
    if rel.trim().is_empty() || !rel_path.components().all(|c| matches!(c, Component::Normal(_))) {
      return Err(StoreError::InvalidPath(rel.to_string()));
    }
    let full = self.root.join(rel_path);
    if !full.is_file() {
      return Err(StoreError::NotFound(PathBuf::from(rel)));
    }
    Ok(full)
  }

  fn relative(&self, path: &Path) -> String {
    path
      .strip_prefix(&self.root)
      .unwrap_or(path)
      .components()
      .map(|c| c.as_os_str().to_string_lossy().into_owned())
      .collect::<Vec<_>>()
      .join("/")
  }

  /// Save one task outside any batch as `reading_part5_task_{NN}.json`.
  /// The number is claimed with an exclusive create before the contents land.
  pub fn save(&self, task: &Task) -> Result<PathBuf, StoreError> {
    self.ensure_root()?;
    let mut next = self.highest_single_index()? + 1;
    let path = loop {
      let path = self.root.join(format!("{SINGLE_PREFIX}{next:02}.json"));
      match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(_) => break path,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => next += 1,
        Err(e) => return Err(StoreError::io(&path, e)),
      }
    };
    if let Err(e) = write_json_atomic(&path, task) {
      let _ = fs::remove_file(&path);
      return Err(e);
    }
    info!(target: "b2first_backend", path = %path.display(), task_id = %task.id, "Task saved");
    Ok(path)
  }

  fn highest_single_index(&self) -> Result<u32, StoreError> {
    let entries = fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
    Ok(
      entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
          let name = e.file_name().to_string_lossy().into_owned();
          name.strip_prefix(SINGLE_PREFIX)?.strip_suffix(".json")?.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0),
    )
  }

  pub fn create_batch(
    &self,
    topics: &[String],
    text_types: &[TextType],
    params: GenerationParams,
  ) -> Result<BatchHandle, StoreError> {
    self.create_batch_at(Local::now(), topics, text_types, params)
  }

  /// Directory creation is the collision check: an existing name gets `_2`, `_3`, ...
  pub(crate) fn create_batch_at(
    &self,
    now: DateTime<Local>,
    topics: &[String],
    text_types: &[TextType],
    params: GenerationParams,
  ) -> Result<BatchHandle, StoreError> {
    self.ensure_root()?;
    let base = format!(
      "{BATCH_PREFIX}{}_{}topics_{}types",
      now.format("%Y%m%d_%H%M%S"),
      topics.len(),
      text_types.len()
    );
    let mut name = base.clone();
    let mut n = 1;
    let dir = loop {
      let dir = self.root.join(&name);
      match fs::create_dir(&dir) {
        Ok(()) => break dir,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
          n += 1;
          name = format!("{base}_{n}");
        }
        Err(e) => return Err(StoreError::io(&dir, e)),
      }
    };
    info!(target: "batch", folder = %name, topics = topics.len(), text_types = text_types.len(), "Batch folder created");
    Ok(BatchHandle {
      name,
      dir,
      topics: topics.to_vec(),
      text_types: text_types.to_vec(),
      params,
      started_at: now,
      records: Vec::new(),
    })
  }

  pub fn append_task(&self, handle: &mut BatchHandle, task: &Task) -> Result<PathBuf, StoreError> {
    let index = handle.next_index();
    let file = format!("task_{index:02}_{}_{}.json", slugify(&task.topic, 40), task.text_type.key());
    let path = handle.dir.join(&file);
    write_json_atomic(&path, task)?;
    debug!(target: "batch", folder = %handle.name, %file, "Batch task written");
    handle.records.push(BatchRecord::Succeeded { index, topic: task.topic.clone(), text_type: task.text_type, file });
    Ok(path)
  }

  pub fn append_failure(&self, handle: &mut BatchHandle, record: &FailureRecord) -> Result<PathBuf, StoreError> {
    let index = handle.next_index();
    let now = Local::now();
    let file = format!("failed_task_{index:02}_{}.txt", now.format("%Y%m%d_%H%M%S"));
    let path = handle.dir.join(&file);

    let mut body = String::new();
    let _ = writeln!(body, "Failed generation #{index}");
    let _ = writeln!(body, "Time: {}", now.to_rfc3339());
    let _ = writeln!(body, "Topic: {}", record.topic);
    let _ = writeln!(body, "Text type: {}", record.text_type.label());
    let _ = writeln!(body, "Stage reached: {}", record.stage);
    let _ = writeln!(body, "Attempts: {}", record.attempts);
    let _ = writeln!(body, "Error: {}", record.error);
    let _ = writeln!(body);
    let _ = writeln!(body, "--- Raw model output ---");
    let _ = writeln!(body, "{}", record.raw_output.as_deref().unwrap_or("(no output received)"));
    write_atomic(&path, body.as_bytes())?;

    warn!(target: "batch", folder = %handle.name, %file, stage = %record.stage, "Batch failure logged");
    handle.records.push(BatchRecord::Failed {
      index,
      topic: record.topic.clone(),
      text_type: record.text_type,
      stage: record.stage,
      file,
    });
    Ok(path)
  }

  /// Write `BATCH_SUMMARY.txt` and close the batch.
  pub fn finalize(&self, handle: BatchHandle, cancelled: bool) -> Result<BatchSummary, StoreError> {
    let succeeded = handle.records.iter().filter(|r| matches!(r, BatchRecord::Succeeded { .. })).count();
    let attempted = handle.records.len();
    let failed = attempted - succeeded;
    let success_rate = if attempted == 0 { 0.0 } else { succeeded as f64 * 100.0 / attempted as f64 };

    let text = render_summary(&handle, attempted, succeeded, failed, success_rate, cancelled);
    write_atomic(&handle.dir.join(SUMMARY_FILE), text.as_bytes())?;
    info!(target: "batch", folder = %handle.name, attempted, succeeded, failed, cancelled, "Batch finalized");

    Ok(BatchSummary { folder: handle.name, attempted, succeeded, failed, success_rate, cancelled, records: handle.records })
  }

  pub fn load_task(&self, rel: &str) -> Result<Task, StoreError> {
    let path = self.resolve(rel)?;
    read_task(&path)
  }

  /// Every task file in the output directory and one level of batch folders.
  pub fn list_tasks(&self) -> Result<Vec<TaskEntry>, StoreError> {
    let mut out = Vec::new();
    if !self.root.is_dir() {
      return Ok(out);
    }
    for path in json_files(&self.root)? {
      self.push_entry(&mut out, &path, None);
    }
    for dir in self.batch_dirs()? {
      let batch = dir.file_name().map(|n| n.to_string_lossy().into_owned());
      for path in json_files(&dir)? {
        self.push_entry(&mut out, &path, batch.clone());
      }
    }
    Ok(out)
  }

  fn push_entry(&self, out: &mut Vec<TaskEntry>, path: &Path, batch: Option<String>) {
    match read_task(path) {
      Ok(task) => out.push(TaskEntry {
        path: self.relative(path),
        batch,
        word_count: task.word_count(),
        question_count: task.questions.len(),
        status: task.overall_status(),
        title: task.title,
        topic: task.topic,
        text_type: task.text_type,
      }),
      Err(e) => warn!(target: "b2first_backend", path = %path.display(), error = %e, "Skipping unreadable task file"),
    }
  }

  pub fn list_batches(&self) -> Result<Vec<BatchEntry>, StoreError> {
    let mut out = Vec::new();
    if !self.root.is_dir() {
      return Ok(out);
    }
    for dir in self.batch_dirs()? {
      let names = file_names(&dir)?;
      out.push(BatchEntry {
        name: dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        task_files: names.iter().filter(|n| n.ends_with(".json")).cloned().collect(),
        failure_logs: names.iter().filter(|n| n.starts_with("failed_task_")).count(),
        finalized: names.iter().any(|n| n == SUMMARY_FILE),
      });
    }
    Ok(out)
  }

  pub fn statistics(&self) -> Result<LibraryStats, StoreError> {
    let tasks = self.list_tasks()?;
    let mut stats = LibraryStats { batches: self.list_batches()?.len(), ..LibraryStats::default() };
    for t in &tasks {
      stats.total_tasks += 1;
      stats.total_words += t.word_count;
      stats.total_questions += t.question_count;
      match t.status {
        AnnotationStatus::Approved => stats.approved += 1,
        AnnotationStatus::Rejected => stats.rejected += 1,
        AnnotationStatus::Pending => stats.pending += 1,
      }
    }
    if stats.total_tasks > 0 {
      stats.average_words = stats.total_words / stats.total_tasks;
    }
    Ok(stats)
  }

  fn batch_dirs(&self) -> Result<Vec<PathBuf>, StoreError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(&self.root)
      .map_err(|e| StoreError::io(&self.root, e))?
      .filter_map(|e| e.ok())
      .map(|e| e.path())
      .filter(|p| p.is_dir())
      .filter(|p| p.file_name().map_or(false, |n| n.to_string_lossy().starts_with(BATCH_PREFIX)))
      .collect();
    dirs.sort();
    Ok(dirs)
  }
}

pub fn read_task(path: &Path) -> Result<Task, StoreError> {
  let raw = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
  serde_json::from_str(&raw).map_err(|e| StoreError::json(path, e))
}

fn file_names(dir: &Path) -> Result<Vec<String>, StoreError> {
  let mut names: Vec<String> = fs::read_dir(dir)
    .map_err(|e| StoreError::io(dir, e))?
    .filter_map(|e| e.ok())
    .filter(|e| e.path().is_file())
    .map(|e| e.file_name().to_string_lossy().into_owned())
    .filter(|n| !n.starts_with('.'))
    .collect();
  names.sort();
  Ok(names)
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
  Ok(file_names(dir)?.into_iter().filter(|n| n.ends_with(".json")).map(|n| dir.join(n)).collect())
}

fn render_summary(
  handle: &BatchHandle,
  attempted: usize,
  succeeded: usize,
  failed: usize,
  success_rate: f64,
  cancelled: bool,
) -> String {
  let mut s = String::new();
  let _ = writeln!(s, "B2 First Reading Part 5 - Batch Summary");
  let _ = writeln!(s, "=======================================");
  let _ = writeln!(s, "Folder: {}", handle.name);
  let _ = writeln!(s, "Started: {}", handle.started_at.format("%Y-%m-%d %H:%M:%S"));
  let _ = writeln!(s, "Finished: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
  let _ = writeln!(s, "Status: {}", if cancelled { "cancelled" } else { "completed" });
  let _ = writeln!(s);
  let _ = writeln!(s, "Generation parameters");
  let _ = writeln!(s, "  Model: {}", handle.params.model);
  let _ = writeln!(s, "  Temperature: {:.2}", handle.params.temperature);
  let _ = writeln!(s, "  Max tokens: {}", handle.params.max_tokens);
  let custom = handle.params.custom_instructions.trim();
  let _ = writeln!(s, "  Custom instructions: {}", if custom.is_empty() { "(none)" } else { custom });
  let _ = writeln!(s);
  let _ = writeln!(s, "Topics ({}):", handle.topics.len());
  for t in &handle.topics {
    let _ = writeln!(s, "  - {t}");
  }
  let _ = writeln!(s, "Text types ({}):", handle.text_types.len());
  for t in &handle.text_types {
    let _ = writeln!(s, "  - {}", t.label());
  }
  let _ = writeln!(s);
  let _ = writeln!(s, "Results");
  let _ = writeln!(s, "  Attempted: {attempted}");
  let _ = writeln!(s, "  Succeeded: {succeeded}");
  let _ = writeln!(s, "  Failed: {failed}");
  let _ = writeln!(s, "  Success rate: {success_rate:.1}%");
  let _ = writeln!(s);
  let _ = writeln!(s, "Files");
  for r in &handle.records {
    match r {
      BatchRecord::Succeeded { file, .. } => {
        let _ = writeln!(s, "  [ok] {file}");
      }
      BatchRecord::Failed { file, topic, text_type, stage, .. } => {
        let file = if file.is_empty() { "(not written)" } else { file.as_str() };
        let _ = writeln!(s, "  [failed] {file} ({topic} / {}, stage: {stage})", text_type.label());
      }
    }
  }
  s
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::domain::{Annotation, ReviewTarget};
  use crate::validator::tests::task_with;

  fn params() -> GenerationParams {
    task_with(10, 0).generation_params
  }

  #[test]
  fn single_tasks_get_increasing_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let a = store.save(&task_with(450, 5)).unwrap();
    let b = store.save(&task_with(450, 5)).unwrap();
    assert_eq!(a.file_name().unwrap(), "reading_part5_task_01.json");
    assert_eq!(b.file_name().unwrap(), "reading_part5_task_02.json");

    fs::write(dir.path().join("reading_part5_task_09.json"), "{}").unwrap();
    let c = store.save(&task_with(450, 5)).unwrap();
    assert_eq!(c.file_name().unwrap(), "reading_part5_task_10.json");
  }

  #[test]
  fn concurrent_saves_never_share_a_number() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let paths: Vec<PathBuf> = std::thread::scope(|scope| {
      let handles: Vec<_> = (0..16).map(|_| scope.spawn(|| store.save(&task_with(450, 5)).unwrap())).collect();
      handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let mut names: Vec<String> = paths.iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 16);
    assert_eq!(store.list_tasks().unwrap().len(), 16);
  }

  #[test]
  fn concurrent_atomic_writes_each_land_whole() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.json");
    let bodies: Vec<String> = (0..12).map(|i| format!("{{\"writer\": {i}, \"pad\": \"{}\"}}\n", "x".repeat(4096))).collect();
    std::thread::scope(|scope| {
      for body in &bodies {
        let path = &path;
        scope.spawn(move || write_atomic(path, body.as_bytes()).unwrap());
      }
    });
    let on_disk = fs::read_to_string(&path).unwrap();
    assert!(bodies.contains(&on_disk));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
  }

  #[test]
  fn saved_file_is_pretty_json_without_temp_leftovers() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let path = store.save(&task_with(450, 5)).unwrap();
    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.starts_with("{\n  \"title\""));
    assert!(raw.ends_with("}\n"));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
  }

  #[test]
  fn same_second_batches_get_suffixes() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let now = Local.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
    let topics = vec!["a".to_string(), "b".to_string()];
    let types = [TextType::BlogPost];
    let first = store.create_batch_at(now, &topics, &types, params()).unwrap();
    let second = store.create_batch_at(now, &topics, &types, params()).unwrap();
    let third = store.create_batch_at(now, &topics, &types, params()).unwrap();
    assert_eq!(first.name, "batch_20250314_092653_2topics_1types");
    assert_eq!(second.name, "batch_20250314_092653_2topics_1types_2");
    assert_eq!(third.name, "batch_20250314_092653_2topics_1types_3");
  }

  #[test]
  fn batch_records_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let mut handle = store
      .create_batch(&["urban gardening".into()], &[TextType::BlogPost, TextType::NovelExtract], params())
      .unwrap();

    let mut task = task_with(450, 5);
    task.topic = "urban gardening".into();
    task.text_type = TextType::BlogPost;
    let ok = store.append_task(&mut handle, &task).unwrap();
    assert_eq!(ok.file_name().unwrap(), "task_01_urban_gardening_blog_post.json");

    let record = FailureRecord {
      topic: "urban gardening".into(),
      text_type: TextType::NovelExtract,
      stage: FailedStage::Questions,
      error: "unparsable".into(),
      attempts: 3,
      raw_output: Some("{{{ nope".into()),
    };
    let failed = store.append_failure(&mut handle, &record).unwrap();
    let name = failed.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("failed_task_02_") && name.ends_with(".txt"), "{name}");
    let log = fs::read_to_string(&failed).unwrap();
    assert!(log.contains("Stage reached: questions"));
    assert!(log.contains("{{{ nope"));

    let batch_dir = handle.dir.clone();
    let summary = store.finalize(handle, false).unwrap();
    assert_eq!((summary.attempted, summary.succeeded, summary.failed), (2, 1, 1));
    assert_eq!(summary.success_rate, 50.0);
    let text = fs::read_to_string(batch_dir.join(SUMMARY_FILE)).unwrap();
    assert!(text.contains("Succeeded: 1"));
    assert!(text.contains("[ok] task_01_urban_gardening_blog_post.json"));
    assert!(text.contains("Status: completed"));
  }

  #[test]
  fn resolve_rejects_escaping_paths() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    assert!(matches!(store.resolve("../etc/passwd"), Err(StoreError::InvalidPath(_))));
    assert!(matches!(store.resolve("/etc/passwd"), Err(StoreError::InvalidPath(_))));
    assert!(matches!(store.resolve(""), Err(StoreError::InvalidPath(_))));
    assert!(matches!(store.resolve("missing.json"), Err(StoreError::NotFound(_))));
  }

  #[test]
  fn library_listing_and_statistics() {
    let dir = tempfile::tempdir().unwrap();
    let store = TaskStore::new(dir.path());
    let mut approved = task_with(500, 6);
    approved.qa_annotations.insert(
      ReviewTarget::OverallTask.key(),
      Annotation { status: AnnotationStatus::Approved, reviewer: "kim".into(), ..Annotation::default() },
    );
    store.save(&approved).unwrap();
    store.save(&task_with(400, 5)).unwrap();
    let mut handle = store.create_batch(&["x".into()], &[TextType::BlogPost], params()).unwrap();
    store.append_task(&mut handle, &task_with(600, 5)).unwrap();
    store.finalize(handle, false).unwrap();
    fs::write(dir.path().join("notes.json"), "not a task").unwrap();

    let tasks = store.list_tasks().unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].path, "reading_part5_task_01.json");
    assert!(tasks[2].path.starts_with("batch_") && tasks[2].batch.is_some());

    let stats = store.statistics().unwrap();
    assert_eq!(stats.total_tasks, 3);
    assert_eq!(stats.total_words, 1500);
    assert_eq!(stats.average_words, 500);
    assert_eq!(stats.total_questions, 16);
    assert_eq!((stats.approved, stats.pending, stats.rejected), (1, 2, 0));
    assert_eq!(stats.batches, 1);

    let batches = store.list_batches().unwrap();
    assert!(batches[0].finalized);
    assert_eq!(batches[0].task_files.len(), 1);

    let loaded = store.load_task(&tasks[2].path).unwrap();
    assert_eq!(loaded.word_count(), 600);
  }
}
