//! B2 First Part 5 task rules. Every rule is evaluated, so a report lists all
//! problems at once.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::domain::Task;
use crate::util::word_count;

pub const MIN_WORDS: usize = 400;
pub const MAX_WORDS: usize = 800;
pub const MIN_QUESTIONS: usize = 5;
pub const MAX_QUESTIONS: usize = 6;
pub const OPTIONS_PER_QUESTION: usize = 4;

/// A single broken rule. `question` fields carry the question's exam number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
  TextTooShort { words: usize },
  TextTooLong { words: usize },
  TooFewQuestions { count: usize },
  TooManyQuestions { count: usize },
  WrongOptionCount { question: u32, count: usize },
  MissingCorrectOption { question: u32, given: String },
  DuplicateOptions { question: u32 },
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Violation::TextTooShort { words } => write!(f, "text has {words} words (minimum {MIN_WORDS})"),
      Violation::TextTooLong { words } => write!(f, "text has {words} words (maximum {MAX_WORDS})"),
      Violation::TooFewQuestions { count } => write!(f, "{count} questions (minimum {MIN_QUESTIONS})"),
      Violation::TooManyQuestions { count } => write!(f, "{count} questions (maximum {MAX_QUESTIONS})"),
      Violation::WrongOptionCount { question, count } => {
        write!(f, "question {question} has {count} options (expected {OPTIONS_PER_QUESTION})")
      }
      Violation::MissingCorrectOption { question, given } => {
        write!(f, "question {question} marks '{given}' as correct, which is not one of its options")
      }
      Violation::DuplicateOptions { question } => write!(f, "question {question} repeats an option"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
  pub valid: bool,
  pub word_count: usize,
  pub violations: Vec<Violation>,
}

/// Check a decoded task against the fixed thresholds.
pub fn validate(task: &Task) -> ValidationReport {
  let mut violations = Vec::new();

  let words = word_count(&task.text);
  if words < MIN_WORDS {
    violations.push(Violation::TextTooShort { words });
  } else if words > MAX_WORDS {
    violations.push(Violation::TextTooLong { words });
  }

  let count = task.questions.len();
  if count < MIN_QUESTIONS {
    violations.push(Violation::TooFewQuestions { count });
  } else if count > MAX_QUESTIONS {
    violations.push(Violation::TooManyQuestions { count });
  }

  for q in &task.questions {
    if q.options.len() != OPTIONS_PER_QUESTION {
      violations.push(Violation::WrongOptionCount { question: q.number, count: q.options.len() });
    }
    if !q.options.contains_key(q.correct_option.as_str()) {
      violations.push(Violation::MissingCorrectOption { question: q.number, given: q.correct_option.clone() });
    }
    let mut seen = HashSet::new();
    if !q.options.values().all(|text| seen.insert(text.trim().to_lowercase())) {
      violations.push(Violation::DuplicateOptions { question: q.number });
    }
  }

  ValidationReport { valid: violations.is_empty(), word_count: words, violations }
}
