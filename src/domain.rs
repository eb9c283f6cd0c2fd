//! Domain models: generated tasks, their questions, review annotations and the
//! fixed enumerations (text types, skill types, review targets).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Option keys every question is expected to carry, in display order.
pub const OPTION_KEYS: [&str; 4] = ["A", "B", "C", "D"];

/// Part 5 questions are numbered 31-36 on the real paper.
pub const FIRST_QUESTION_NUMBER: u32 = 31;

/// Genre of the reading text. The set is fixed; prompts and styles key off it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
  MagazineArticle,
  NewspaperArticle,
  NovelExtract,
  BlogPost,
  ScienceArticle,
  CulturalReview,
  ProfessionalFeature,
  LifestyleFeature,
  TravelWriting,
  EducationalFeature,
}

impl TextType {
  pub const ALL: [TextType; 10] = [
    TextType::MagazineArticle,
    TextType::NewspaperArticle,
    TextType::NovelExtract,
    TextType::BlogPost,
    TextType::ScienceArticle,
    TextType::CulturalReview,
    TextType::ProfessionalFeature,
    TextType::LifestyleFeature,
    TextType::TravelWriting,
    TextType::EducationalFeature,
  ];

  pub fn key(&self) -> &'static str {
    match self {
      TextType::MagazineArticle => "magazine_article",
      TextType::NewspaperArticle => "newspaper_article",
      TextType::NovelExtract => "novel_extract",
      TextType::BlogPost => "blog_post",
      TextType::ScienceArticle => "science_article",
      TextType::CulturalReview => "cultural_review",
      TextType::ProfessionalFeature => "professional_feature",
      TextType::LifestyleFeature => "lifestyle_feature",
      TextType::TravelWriting => "travel_writing",
      TextType::EducationalFeature => "educational_feature",
    }
  }

  /// Human label, also used inside prompts ("Write a blog post about ...").
  pub fn label(&self) -> &'static str {
    match self {
      TextType::MagazineArticle => "magazine article",
      TextType::NewspaperArticle => "newspaper article",
      TextType::NovelExtract => "novel extract",
      TextType::BlogPost => "blog post",
      TextType::ScienceArticle => "popular science article",
      TextType::CulturalReview => "cultural review",
      TextType::ProfessionalFeature => "professional feature",
      TextType::LifestyleFeature => "lifestyle feature",
      TextType::TravelWriting => "travel writing piece",
      TextType::EducationalFeature => "educational feature",
    }
  }
}

impl Default for TextType {
  fn default() -> Self { TextType::MagazineArticle }
}

impl fmt::Display for TextType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

impl FromStr for TextType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    TextType::ALL
      .iter()
      .copied()
      .find(|t| t.key() == s.trim())
      .ok_or_else(|| format!("unknown text type: {s}"))
  }
}

/// Reading skill a question targets.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
  Inference,
  Vocabulary,
  Detail,
  Attitude,
  Reference,
  MainIdea,
}

impl SkillType {
  /// Canonical order used when the model does not say which skill a question tests.
  pub const ROTATION: [SkillType; 6] = [
    SkillType::Inference,
    SkillType::Vocabulary,
    SkillType::Detail,
    SkillType::Attitude,
    SkillType::Reference,
    SkillType::MainIdea,
  ];

  pub fn key(&self) -> &'static str {
    match self {
      SkillType::Inference => "inference",
      SkillType::Vocabulary => "vocabulary",
      SkillType::Detail => "detail",
      SkillType::Attitude => "attitude",
      SkillType::Reference => "reference",
      SkillType::MainIdea => "main_idea",
    }
  }

  /// Lenient parse for model output ("Main idea", "main-idea", "MAIN_IDEA").
  pub fn parse_loose(s: &str) -> Option<SkillType> {
    let norm: String = s
      .trim()
      .to_ascii_lowercase()
      .chars()
      .map(|c| if c == ' ' || c == '-' { '_' } else { c })
      .collect();
    SkillType::ROTATION.iter().copied().find(|k| k.key() == norm)
  }
}

/// One multiple-choice comprehension item.
///
/// `options` is keyed by letter. Well-formed questions have exactly the keys
/// A-D with distinct texts and a `correct_option` among them; the validator
/// reports anything else.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub number: u32,
  pub prompt: String,
  pub options: BTreeMap<String, String>,
  pub correct_option: String,
  pub skill_type: SkillType,
}

/// Parameters a task was generated with; stored alongside it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
  pub model: String,
  pub temperature: f32,
  pub max_tokens: u32,
  #[serde(default)]
  pub custom_instructions: String,
}

/// One generated exam item, exactly as persisted in its JSON file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
  pub title: String,
  pub text: String,
  pub questions: Vec<Question>,
  pub text_type: TextType,
  #[serde(default)]
  pub topic: String,
  pub generation_params: GenerationParams,
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub qa_annotations: BTreeMap<String, Annotation>,
}

impl Task {
  pub fn word_count(&self) -> usize {
    crate::util::word_count(&self.text)
  }

  /// Status of the `overall_task` annotation, pending when absent.
  pub fn overall_status(&self) -> AnnotationStatus {
    self
      .qa_annotations
      .get(ReviewTarget::OverallTask.key().as_str())
      .map(|a| a.status)
      .unwrap_or_default()
  }
}

/// Review state of a single target.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

/// One review record.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Annotation {
  #[serde(default)]
  pub status: AnnotationStatus,
  #[serde(default)]
  pub reviewer: String,
  #[serde(default)]
  pub notes: String,
  #[serde(default)]
  pub timestamp: Option<DateTime<Utc>>,
}

/// What a reviewer is annotating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReviewTarget {
  OverallTask,
  Title,
  Text,
  Question(u32),
}

impl ReviewTarget {
  pub fn key(&self) -> String {
    match self {
      ReviewTarget::OverallTask => "overall_task".into(),
      ReviewTarget::Title => "title".into(),
      ReviewTarget::Text => "text".into(),
      ReviewTarget::Question(n) => format!("question_{n}"),
    }
  }

  /// Every target a task with these questions can be reviewed on.
  pub fn all_for(task: &Task) -> Vec<ReviewTarget> {
    let mut out = vec![ReviewTarget::OverallTask, ReviewTarget::Title, ReviewTarget::Text];
    out.extend(task.questions.iter().map(|q| ReviewTarget::Question(q.number)));
    out
  }
}

impl FromStr for ReviewTarget {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "overall_task" => Ok(ReviewTarget::OverallTask),
      "title" => Ok(ReviewTarget::Title),
      "text" => Ok(ReviewTarget::Text),
      other => other
        .strip_prefix("question_")
        .and_then(|n| n.parse::<u32>().ok())
        .map(ReviewTarget::Question)
        .ok_or_else(|| format!("unknown review target: {other}")),
    }
  }
}

impl fmt::Display for ReviewTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key())
  }
}
