//! Runtime configuration: LLM connection settings, storage location, prompt
//! templates and catalogue overrides.
//!
//! Loaded from the TOML file at `B2_CONFIG_PATH` (optional), then individual
//! values are overridden from the environment. See `AppConfig` for the schema.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::TextType;
use crate::seeds;

pub const DEFAULT_HOST: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.1:8b";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const TEMPERATURE_RANGE: (f32, f32) = (0.1, 1.0);
pub const MAX_TOKENS_RANGE: (u32, u32) = (1000, 4000);

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub llm: LlmSettings,
  #[serde(default)]
  pub storage: StorageSettings,
  #[serde(default)]
  pub prompts: Prompts,
  /// Replaces the built-in style instruction for the listed text types.
  #[serde(default)]
  pub text_type_styles: HashMap<TextType, String>,
  /// Replaces the built-in topic sets when non-empty.
  #[serde(default)]
  pub topic_sets: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
  pub host: String,
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  pub timeout_secs: u64,
  pub connect_timeout_secs: u64,
  /// Ask Ollama for `format: "json"` on every stage.
  pub json_mode: bool,
  pub max_stage_attempts: u32,
}

impl Default for LlmSettings {
  fn default() -> Self {
    Self {
      host: DEFAULT_HOST.into(),
      model: DEFAULT_MODEL.into(),
      temperature: DEFAULT_TEMPERATURE,
      max_tokens: DEFAULT_MAX_TOKENS,
      timeout_secs: 120,
      connect_timeout_secs: 5,
      json_mode: true,
      max_stage_attempts: 3,
    }
  }
}

impl LlmSettings {
  /// Pull every sampling knob back into its supported range.
  pub fn clamped(mut self) -> Self {
    self.temperature = clamp_temperature(self.temperature);
    self.max_tokens = clamp_max_tokens(self.max_tokens);
    self.max_stage_attempts = self.max_stage_attempts.max(1);
    self.host = self.host.trim_end_matches('/').to_string();
    self
  }
}

pub fn clamp_temperature(t: f32) -> f32 {
  if t.is_nan() {
    return DEFAULT_TEMPERATURE;
  }
  t.clamp(TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1)
}

pub fn clamp_max_tokens(n: u32) -> u32 {
  n.clamp(MAX_TOKENS_RANGE.0, MAX_TOKENS_RANGE.1)
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
  pub output_dir: PathBuf,
}

impl Default for StorageSettings {
  fn default() -> Self {
    Self { output_dir: PathBuf::from("generated_tasks") }
  }
}

/// Prompt templates for the three generation stages.
///
/// Placeholders: `{topic}`, `{text_type}`, `{style}`, `{title}`, `{text}`,
/// `{min_words}`, `{max_words}`, `{question_count}`, `{first_number}`,
/// `{skills}` and `{custom_instructions}` (text stage only).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub title_user_template: String,
  pub text_user_template: String,
  pub questions_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "You write Cambridge B2 First (FCE) Reading Part 5 exam material. Respond ONLY with a single JSON object, no commentary and no markdown fences.".into(),
      title_user_template: "Suggest an engaging title for a {text_type} about \"{topic}\".\nReturn JSON: {\"title\": string}".into(),
      text_user_template: "Write a {text_type} titled \"{title}\" about \"{topic}\" for B2 level readers.\nStyle: {style}\nLength: between {min_words} and {max_words} words, in 5-7 paragraphs separated by blank lines.\nUse B2 vocabulary and varied sentence structures; include opinions and implied meaning that questions can test.\n{custom_instructions}\nReturn JSON: {\"text\": string}".into(),
      questions_user_template: "Text:\n\"\"\"\n{text}\n\"\"\"\n\nWrite {question_count} multiple-choice questions on this text, numbered from {first_number}, in the order the answers appear in the text.\nEach question has options A, B, C and D with exactly one correct answer and plausible distractors.\nCover these skills:\n{skills}\nReturn JSON: {\"questions\": [{\"number\": number, \"prompt\": string, \"options\": {\"A\": string, \"B\": string, \"C\": string, \"D\": string}, \"correct_option\": \"A\"|\"B\"|\"C\"|\"D\", \"skill_type\": string}]}".into(),
    }
  }
}

impl AppConfig {
  /// File config (if any) with environment overrides and clamping applied.
  pub fn from_env() -> Self {
    let cfg = load_config_file_from_env().unwrap_or_default();
    cfg.with_env_overrides(|k| std::env::var(k).ok())
  }

  /// Apply overrides from a lookup function; split out so tests avoid process env.
  pub fn with_env_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(v) = get("OLLAMA_HOST") {
      self.llm.host = v;
    }
    if let Some(v) = get("OLLAMA_MODEL") {
      self.llm.model = v;
    }
    if let Some(v) = get("OLLAMA_TEMPERATURE") {
      match v.parse() {
        Ok(t) => self.llm.temperature = t,
        Err(_) => warn!(target: "b2first_backend", value = %v, "Ignoring invalid OLLAMA_TEMPERATURE"),
      }
    }
    if let Some(v) = get("OLLAMA_MAX_TOKENS") {
      match v.parse() {
        Ok(n) => self.llm.max_tokens = n,
        Err(_) => warn!(target: "b2first_backend", value = %v, "Ignoring invalid OLLAMA_MAX_TOKENS"),
      }
    }
    if let Some(v) = get("OLLAMA_TIMEOUT_SECS") {
      match v.parse() {
        Ok(n) => self.llm.timeout_secs = n,
        Err(_) => warn!(target: "b2first_backend", value = %v, "Ignoring invalid OLLAMA_TIMEOUT_SECS"),
      }
    }
    if let Some(v) = get("TASKS_DIR") {
      self.storage.output_dir = PathBuf::from(v);
    }
    self.llm = self.llm.clamped();
    self
  }

  pub fn style_for(&self, text_type: TextType) -> String {
    self
      .text_type_styles
      .get(&text_type)
      .cloned()
      .unwrap_or_else(|| seeds::default_style(text_type).to_string())
  }

  pub fn topic_sets(&self) -> BTreeMap<String, Vec<String>> {
    if self.topic_sets.is_empty() {
      seeds::default_topic_sets()
    } else {
      self.topic_sets.clone()
    }
  }
}

/// Attempt to load `AppConfig` from B2_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_config_file_from_env() -> Option<AppConfig> {
  let path = std::env::var("B2_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "b2first_backend", %path, "Loaded config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "b2first_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "b2first_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
