//! Multi-stage task generation: title, then text, then questions, then validation.
//!
//! Each stage prompts the model, recovers JSON from the reply and extracts the
//! stage's fragment, retrying the same prompt a bounded number of times. The
//! fragment is carried into the next stage's prompt. Every attempt and every
//! state entered is recorded so callers can log the full exchange.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{clamp_max_tokens, clamp_temperature, AppConfig};
use crate::domain::{GenerationParams, Question, SkillType, Task, TextType, FIRST_QUESTION_NUMBER, OPTION_KEYS};
use crate::error::{FailedStage, FailureKind, GenerationFailure, LlmError, ParseFailure, ValidationFailure};
use crate::json_repair::{parse_recovering, RepairStrategy};
use crate::llm::{CompletionRequest, LlmClient};
use crate::seeds::skill_guidance;
use crate::util::{fill_template, trunc_for_log};
use crate::validator::{self, MAX_QUESTIONS, MAX_WORDS, MIN_WORDS};

/// Word range asked of the model; narrower than the validator's so near misses still pass.
const TARGET_WORDS: (usize, usize) = (550, 750);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorState {
  Idle,
  TitleRequested,
  TextRequested,
  QuestionsRequested,
  Validating,
  Succeeded,
  Failed,
}

/// Prompting stage an exchange belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Title,
  Text,
  Questions,
}

impl Stage {
  fn field(&self) -> &'static str {
    match self {
      Stage::Title => "title",
      Stage::Text => "text",
      Stage::Questions => "questions",
    }
  }
}

impl From<Stage> for FailedStage {
  fn from(s: Stage) -> Self {
    match s {
      Stage::Title => FailedStage::Title,
      Stage::Text => FailedStage::Text,
      Stage::Questions => FailedStage::Questions,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
  pub topic: String,
  #[serde(default)]
  pub text_type: TextType,
  #[serde(default)]
  pub custom_instructions: String,
  /// Per-request sampling overrides, clamped like the configured values.
  #[serde(default)]
  pub temperature: Option<f32>,
  #[serde(default)]
  pub max_tokens: Option<u32>,
}

impl GenerationRequest {
  pub fn new(topic: impl Into<String>, text_type: TextType) -> Self {
    Self { topic: topic.into(), text_type, custom_instructions: String::new(), temperature: None, max_tokens: None }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExchangeOutcome {
  Parsed { repairs: Vec<RepairStrategy> },
  MissingField { field: String },
  ParseFailed { message: String },
  LlmFailed { message: String },
}

/// One prompt/response round trip.
#[derive(Debug, Clone, Serialize)]
pub struct StageExchange {
  pub stage: Stage,
  pub attempt: u32,
  pub prompt: String,
  pub raw_output: Option<String>,
  pub outcome: ExchangeOutcome,
}

/// Result of one generation run plus its full transcript.
#[derive(Debug)]
pub struct GenerationOutcome {
  pub result: Result<Task, GenerationFailure>,
  pub states: Vec<GeneratorState>,
  pub exchanges: Vec<StageExchange>,
}

impl GenerationOutcome {
  pub fn calls_for(&self, stage: Stage) -> usize {
    self.exchanges.iter().filter(|e| e.stage == stage).count()
  }
}

pub type StateObserver = dyn Fn(GeneratorState) + Send + Sync;

struct Run<'a> {
  states: Vec<GeneratorState>,
  exchanges: Vec<StageExchange>,
  observer: &'a StateObserver,
}

impl<'a> Run<'a> {
  fn enter(&mut self, state: GeneratorState) {
    debug!(target: "generator", ?state, "State entered");
    self.states.push(state);
    (self.observer)(state);
  }
}

#[derive(Clone)]
pub struct TaskGenerator {
  llm: Arc<dyn LlmClient>,
  config: Arc<AppConfig>,
}

impl TaskGenerator {
  pub fn new(llm: Arc<dyn LlmClient>, config: Arc<AppConfig>) -> Self {
    Self { llm, config }
  }

  pub fn model(&self) -> &str {
    self.llm.model()
  }

  /// Effective parameters for a request: configured defaults, overridden and clamped.
  pub fn params_for(&self, temperature: Option<f32>, max_tokens: Option<u32>, custom_instructions: &str) -> GenerationParams {
    GenerationParams {
      model: self.llm.model().to_string(),
      temperature: clamp_temperature(temperature.unwrap_or(self.config.llm.temperature)),
      max_tokens: clamp_max_tokens(max_tokens.unwrap_or(self.config.llm.max_tokens)),
      custom_instructions: custom_instructions.to_string(),
    }
  }

  pub async fn generate(&self, req: &GenerationRequest) -> GenerationOutcome {
    self.generate_observed(req, &|_| {}).await
  }

  /// Like `generate`, reporting every state transition to `observer` as it happens.
  #[instrument(level = "info", target = "generator", skip(self, req, observer), fields(topic = %req.topic, text_type = %req.text_type))]
  pub async fn generate_observed(&self, req: &GenerationRequest, observer: &StateObserver) -> GenerationOutcome {
    let mut run = Run { states: Vec::new(), exchanges: Vec::new(), observer };
    run.enter(GeneratorState::Idle);
    let result = self.run_stages(req, &mut run).await;
    match &result {
      Ok(task) => {
        info!(target: "generator", task_id = %task.id, words = task.word_count(), questions = task.questions.len(), "Task generated");
        run.enter(GeneratorState::Succeeded);
      }
      Err(failure) => {
        warn!(target: "generator", error = %failure, "Task generation failed");
        run.enter(GeneratorState::Failed);
      }
    }
    GenerationOutcome { result, states: run.states, exchanges: run.exchanges }
  }

  async fn run_stages(&self, req: &GenerationRequest, run: &mut Run<'_>) -> Result<Task, GenerationFailure> {
    let prompts = &self.config.prompts;
    let params = self.params_for(req.temperature, req.max_tokens, &req.custom_instructions);
    let (temperature, max_tokens) = (params.temperature, params.max_tokens);
    let label = req.text_type.label();

    run.enter(GeneratorState::TitleRequested);
    let user = fill_template(&prompts.title_user_template, &[("text_type", label), ("topic", &req.topic)]);
    let title = self.run_stage(Stage::Title, user, temperature, max_tokens, run, extract_title).await?;

    run.enter(GeneratorState::TextRequested);
    let custom = if req.custom_instructions.trim().is_empty() {
      String::new()
    } else {
      format!("Additional instructions: {}", req.custom_instructions.trim())
    };
    let style = self.config.style_for(req.text_type);
    let user = fill_template(
      &prompts.text_user_template,
      &[
        ("text_type", label),
        ("style", &style),
        ("min_words", &TARGET_WORDS.0.to_string()),
        ("max_words", &TARGET_WORDS.1.to_string()),
        ("custom_instructions", &custom),
        ("topic", &req.topic),
        ("title", &title),
      ],
    );
    let text = self.run_stage(Stage::Text, user, temperature, max_tokens, run, extract_text).await?;

    run.enter(GeneratorState::QuestionsRequested);
    let skills = SkillType::ROTATION
      .iter()
      .map(|s| format!("- {}: {}", s.key(), skill_guidance(*s)))
      .collect::<Vec<_>>()
      .join("\n");
    let user = fill_template(
      &prompts.questions_user_template,
      &[
        ("question_count", &MAX_QUESTIONS.to_string()),
        ("first_number", &FIRST_QUESTION_NUMBER.to_string()),
        ("skills", &skills),
        ("title", &title),
        ("text", &text),
      ],
    );
    let questions = self.run_stage(Stage::Questions, user, temperature, max_tokens, run, extract_questions).await?;

    run.enter(GeneratorState::Validating);
    let task = Task {
      title,
      text,
      questions,
      text_type: req.text_type,
      topic: req.topic.clone(),
      generation_params: params,
      id: Uuid::new_v4().to_string(),
      created_at: Some(Utc::now()),
      qa_annotations: BTreeMap::new(),
    };

    let report = validator::validate(&task);
    if !report.valid {
      debug!(target: "generator", words = report.word_count, min = MIN_WORDS, max = MAX_WORDS, "Validation rejected task");
      return Err(GenerationFailure {
        stage: FailedStage::Validation,
        kind: FailureKind::Validation(ValidationFailure { violations: report.violations }),
        attempts: 1,
        last_raw_output: run.exchanges.last().and_then(|e| e.raw_output.clone()),
      });
    }
    Ok(task)
  }

  /// Prompt for one stage until its fragment is extracted or attempts run out.
  async fn run_stage<T>(
    &self,
    stage: Stage,
    user: String,
    temperature: f32,
    max_tokens: u32,
    run: &mut Run<'_>,
    extract: fn(&Value) -> Option<T>,
  ) -> Result<T, GenerationFailure> {
    let req = CompletionRequest {
      system: self.config.prompts.system.clone(),
      user,
      temperature,
      max_tokens,
      json_mode: self.config.llm.json_mode,
    };
    let max_attempts = self.config.llm.max_stage_attempts.max(1);
    let mut last_kind: Option<FailureKind> = None;
    let mut last_raw: Option<String> = None;

    for attempt in 1..=max_attempts {
      let raw = match self.llm.complete(&req).await {
        Ok(raw) => raw,
        Err(e) => {
          run.exchanges.push(StageExchange {
            stage,
            attempt,
            prompt: req.user.clone(),
            raw_output: None,
            outcome: ExchangeOutcome::LlmFailed { message: e.to_string() },
          });
          if e.is_retryable() {
            warn!(target: "generator", ?stage, attempt, error = %e, "LLM call timed out; retrying stage");
            last_kind = Some(FailureKind::Connection(e));
            continue;
          }
          return Err(GenerationFailure { stage: stage.into(), kind: FailureKind::Connection(e), attempts: attempt, last_raw_output: last_raw });
        }
      };

      let outcome = match parse_recovering(&raw) {
        Ok(recovered) => match extract(&recovered.value) {
          Some(fragment) => {
            if recovered.was_repaired() {
              debug!(target: "generator", ?stage, repairs = ?recovered.applied, "Model output needed repair");
            }
            run.exchanges.push(StageExchange {
              stage,
              attempt,
              prompt: req.user.clone(),
              raw_output: Some(raw),
              outcome: ExchangeOutcome::Parsed { repairs: recovered.applied },
            });
            return Ok(fragment);
          }
          None => {
            last_kind = Some(FailureKind::Parse(ParseFailure {
              raw: raw.clone(),
              attempted: recovered.applied,
              message: format!("decoded JSON has no usable `{}`", stage.field()),
              line: 0,
              column: 0,
            }));
            ExchangeOutcome::MissingField { field: stage.field().to_string() }
          }
        },
        Err(failure) => {
          let message = failure.to_string();
          last_kind = Some(FailureKind::Parse(failure));
          ExchangeOutcome::ParseFailed { message }
        }
      };

      warn!(target: "generator", ?stage, attempt, max_attempts, preview = %trunc_for_log(&raw, 200), "Unusable model output");
      run.exchanges.push(StageExchange { stage, attempt, prompt: req.user.clone(), raw_output: Some(raw.clone()), outcome });
      last_raw = Some(raw);
    }

    let kind = last_kind.unwrap_or_else(|| FailureKind::Connection(LlmError::Connection("no attempt was made".into())));
    Err(GenerationFailure { stage: stage.into(), kind, attempts: max_attempts, last_raw_output: last_raw })
  }
}

// --- Fragment extraction ---

fn non_empty(s: &str) -> Option<String> {
  let t = s.trim();
  if t.is_empty() { None } else { Some(t.to_string()) }
}

fn extract_title(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => non_empty(s),
    Value::Object(m) => m.get("title").and_then(Value::as_str).and_then(non_empty),
    _ => None,
  }
}

fn extract_text(v: &Value) -> Option<String> {
  match v {
    Value::String(s) => non_empty(s),
    Value::Object(m) => m.get("text").and_then(Value::as_str).and_then(non_empty),
    _ => None,
  }
}

/// Model-facing question shape; tolerant of the common spellings models use.
#[derive(Deserialize)]
struct QuestionDto {
  #[serde(alias = "question", alias = "question_text", alias = "stem")]
  prompt: String,
  options: OptionsDto,
  #[serde(alias = "correct_answer", alias = "answer")]
  correct_option: String,
  #[serde(default, alias = "question_type", alias = "skill")]
  skill_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptionsDto {
  Map(BTreeMap<String, String>),
  List(Vec<String>),
}

fn extract_questions(v: &Value) -> Option<Vec<Question>> {
  let items = match v {
    Value::Array(items) => items,
    Value::Object(m) => m.get("questions").and_then(Value::as_array)?,
    _ => return None,
  };

  let questions: Vec<Question> = items
    .iter()
    .filter_map(|item| match serde_json::from_value::<QuestionDto>(item.clone()) {
      Ok(dto) => Some(dto),
      Err(e) => {
        debug!(target: "generator", error = %e, "Dropping malformed question");
        None
      }
    })
    .enumerate()
    .map(|(i, dto)| into_question(i, dto))
    .collect();

  if questions.is_empty() { None } else { Some(questions) }
}

fn into_question(index: usize, dto: QuestionDto) -> Question {
  let options: BTreeMap<String, String> = match dto.options {
    OptionsDto::Map(m) => m.into_iter().map(|(k, v)| (normalize_letter(&k), strip_letter_prefix(&v))).collect(),
    OptionsDto::List(list) => OPTION_KEYS
      .iter()
      .map(|k| k.to_string())
      .chain((OPTION_KEYS.len()..list.len()).map(|i| char::from(b'A' + (i as u8 % 26)).to_string()))
      .zip(list)
      .map(|(k, v)| (k, strip_letter_prefix(&v)))
      .collect(),
  };
  let skill_type = dto
    .skill_type
    .as_deref()
    .and_then(SkillType::parse_loose)
    .unwrap_or(SkillType::ROTATION[index % SkillType::ROTATION.len()]);

  Question {
    number: FIRST_QUESTION_NUMBER + index as u32,
    prompt: dto.prompt.trim().to_string(),
    options,
    correct_option: normalize_letter(&dto.correct_option),
    skill_type,
  }
}

/// "b", "(B)", "B) the second one" -> "B". Anything else is kept as given.
fn normalize_letter(s: &str) -> String {
  let t = s.trim().trim_start_matches('(');
  let mut chars = t.chars();
  match (chars.next(), chars.next()) {
    (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_uppercase().to_string(),
    (Some(c), Some(next)) if c.is_ascii_alphabetic() && !next.is_ascii_alphanumeric() => c.to_ascii_uppercase().to_string(),
    _ => s.trim().to_string(),
  }
}

/// "A) text" / "A. text" -> "text".
fn strip_letter_prefix(s: &str) -> String {
  let t = s.trim();
  let b = t.as_bytes();
  if b.len() > 2 && b[0].is_ascii_uppercase() && (b[1] == b')' || b[1] == b'.') && b[2] == b' ' {
    return t[3..].trim().to_string();
  }
  t.to_string()
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use async_trait::async_trait;
  use serde_json::json;

  use super::*;

  /// Replays canned responses; records every request it receives.
  pub(crate) struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    pub(crate) requests: Mutex<Vec<CompletionRequest>>,
  }

  impl ScriptedClient {
    pub(crate) fn new(responses: Vec<Result<String, LlmError>>) -> Self {
      Self { responses: Mutex::new(responses.into()), requests: Mutex::new(Vec::new()) }
    }

    pub(crate) fn calls(&self) -> usize {
      self.requests.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl LlmClient for ScriptedClient {
    async fn complete(&self, req: &CompletionRequest) -> Result<String, LlmError> {
      self.requests.lock().unwrap().push(req.clone());
      self
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(LlmError::Connection("script exhausted".into())))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
      Ok(vec!["scripted".into()])
    }

    fn host(&self) -> &str {
      "scripted://"
    }

    fn model(&self) -> &str {
      "scripted"
    }
  }

  pub(crate) fn title_json() -> String {
    json!({ "title": "The Quiet Return of the Allotment" }).to_string()
  }

  pub(crate) fn text_json(words: usize) -> String {
    let text = (0..words).map(|i| if i % 12 == 11 { "gardens." } else { "gardens" }).collect::<Vec<_>>().join(" ");
    json!({ "text": text }).to_string()
  }

  pub(crate) fn questions_json(count: usize) -> String {
    let qs: Vec<Value> = (0..count)
      .map(|i| {
        json!({
          "number": i + 1,
          "prompt": format!("What is suggested in paragraph {}?", i + 1),
          "options": { "A": "one thing", "B": "another thing", "C": "a third thing", "D": "a fourth thing" },
          "correct_option": "C",
          "skill_type": "detail"
        })
      })
      .collect();
    json!({ "questions": qs }).to_string()
  }

  fn generator(client: Arc<ScriptedClient>) -> TaskGenerator {
    TaskGenerator::new(client, Arc::new(AppConfig::default()))
  }

  #[tokio::test]
  async fn two_parse_failures_then_success_uses_three_calls() {
    let client = Arc::new(ScriptedClient::new(vec![
      Ok("Sure! Here is a title for you".into()),
      Ok("{\"title\": ".into()),
      Ok(title_json()),
      Ok(text_json(600)),
      Ok(questions_json(6)),
    ]));
    let outcome = generator(client.clone()).generate(&GenerationRequest::new("urban gardening", TextType::BlogPost)).await;

    let task = outcome.result.as_ref().expect("task should be generated");
    assert_eq!(outcome.calls_for(Stage::Title), 3);
    assert_eq!(client.calls(), 5);
    assert_eq!(task.title, "The Quiet Return of the Allotment");
    assert_eq!(
      outcome.states,
      vec![
        GeneratorState::Idle,
        GeneratorState::TitleRequested,
        GeneratorState::TextRequested,
        GeneratorState::QuestionsRequested,
        GeneratorState::Validating,
        GeneratorState::Succeeded,
      ]
    );
  }

  #[tokio::test]
  async fn stage_fragments_feed_later_prompts() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(title_json()), Ok(text_json(500)), Ok(questions_json(5))]));
    let mut req = GenerationRequest::new("urban gardening", TextType::NewspaperArticle);
    req.custom_instructions = "Mention a named expert.".into();
    let outcome = generator(client.clone()).generate(&req).await;
    assert!(outcome.result.is_ok());

    let requests = client.requests.lock().unwrap();
    assert!(requests[1].user.contains("The Quiet Return of the Allotment"));
    assert!(requests[1].user.contains("Mention a named expert."));
    assert!(requests[2].user.contains("gardens gardens"));
    assert!(requests.iter().all(|r| r.json_mode && r.max_tokens == 2000));
  }

  #[tokio::test]
  async fn questions_are_renumbered_from_31() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(title_json()), Ok(text_json(500)), Ok(questions_json(5))]));
    let outcome = generator(client).generate(&GenerationRequest::new("remote work", TextType::MagazineArticle)).await;
    let task = outcome.result.unwrap();
    let numbers: Vec<u32> = task.questions.iter().map(|q| q.number).collect();
    assert_eq!(numbers, vec![31, 32, 33, 34, 35]);
    assert_eq!(task.generation_params.model, "scripted");
    assert!(task.created_at.is_some());
  }

  #[tokio::test]
  async fn validation_failure_is_not_retried() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(title_json()), Ok(text_json(150)), Ok(questions_json(5))]));
    let outcome = generator(client.clone()).generate(&GenerationRequest::new("digital nomads", TextType::TravelWriting)).await;
    let failure = outcome.result.unwrap_err();
    assert_eq!(failure.stage, FailedStage::Validation);
    match failure.kind {
      FailureKind::Validation(v) => assert_eq!(v.violations, vec![validator::Violation::TextTooShort { words: 150 }]),
      other => panic!("unexpected failure kind: {other:?}"),
    }
    assert_eq!(client.calls(), 3);
    assert_eq!(outcome.states.last(), Some(&GeneratorState::Failed));
  }

  #[tokio::test]
  async fn exhausted_retries_carry_last_raw_output() {
    let client = Arc::new(ScriptedClient::new(vec![
      Ok(title_json()),
      Ok("not json 1".into()),
      Ok("not json 2".into()),
      Ok("not json 3".into()),
    ]));
    let outcome = generator(client.clone()).generate(&GenerationRequest::new("mindfulness", TextType::NovelExtract)).await;
    let failure = outcome.result.unwrap_err();
    assert_eq!(failure.stage, FailedStage::Text);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.last_raw_output.as_deref(), Some("not json 3"));
    assert!(matches!(failure.kind, FailureKind::Parse(_)));
    assert_eq!(client.calls(), 4);
    assert_eq!(outcome.exchanges.len(), 4);
  }

  #[tokio::test]
  async fn connection_errors_fail_immediately() {
    let client = Arc::new(ScriptedClient::new(vec![Err(LlmError::Connection("connection refused".into()))]));
    let outcome = generator(client.clone()).generate(&GenerationRequest::new("renewables", TextType::ScienceArticle)).await;
    let failure = outcome.result.unwrap_err();
    assert_eq!(failure.stage, FailedStage::Title);
    assert_eq!(failure.attempts, 1);
    assert!(matches!(failure.kind, FailureKind::Connection(LlmError::Connection(_))));
    assert_eq!(client.calls(), 1);
  }

  #[tokio::test]
  async fn timeouts_are_retried_within_the_stage() {
    let client = Arc::new(ScriptedClient::new(vec![
      Err(LlmError::Timeout("read timed out".into())),
      Ok(title_json()),
      Ok(text_json(500)),
      Ok(questions_json(6)),
    ]));
    let outcome = generator(client).generate(&GenerationRequest::new("screen time", TextType::EducationalFeature)).await;
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.calls_for(Stage::Title), 2);
  }

  #[tokio::test]
  async fn observer_sees_every_transition() {
    let client = Arc::new(ScriptedClient::new(vec![Ok(title_json()), Ok(text_json(500)), Ok(questions_json(5))]));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let observer = move |s: GeneratorState| sink.lock().unwrap().push(s);
    let outcome = generator(client).generate_observed(&GenerationRequest::new("fashion", TextType::LifestyleFeature), &observer).await;
    assert_eq!(*seen.lock().unwrap(), outcome.states);
  }

  #[test]
  fn lenient_question_shapes_are_accepted() {
    let v = json!([
      { "question": "Why?", "options": ["A) first", "B) second", "C) third", "D) fourth"], "correct_answer": "b) second", "question_type": "Main idea" },
      { "prompt": "What?", "options": { "a": "x", "b": "y", "c": "z", "d": "w" }, "answer": "(d)" },
      { "prompt": "broken" }
    ]);
    let qs = extract_questions(&v).unwrap();
    assert_eq!(qs.len(), 2);
    assert_eq!(qs[0].options.get("B").map(String::as_str), Some("second"));
    assert_eq!(qs[0].correct_option, "B");
    assert_eq!(qs[0].skill_type, SkillType::MainIdea);
    assert_eq!(qs[1].correct_option, "D");
    assert_eq!(qs[1].options.keys().collect::<Vec<_>>(), vec!["A", "B", "C", "D"]);
    assert_eq!(qs[1].skill_type, SkillType::Vocabulary);
  }

  #[test]
  fn title_accepts_plain_string_and_rejects_blank() {
    assert_eq!(extract_title(&json!("  A Title ")), Some("A Title".into()));
    assert_eq!(extract_title(&json!({ "title": "  " })), None);
    assert_eq!(extract_text(&json!({ "body": "x" })), None);
  }
}
