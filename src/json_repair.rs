//! Best-effort JSON recovery for free-form model output.
//!
//! Decoding is attempted on the raw text first. When that fails, a fixed list
//! of textual repairs is applied one after another, each working on the output
//! of the previous one, and decoding is retried after every step. The first
//! successful decode wins. Repairs are total functions over the input string:
//! one that finds nothing to fix returns `None` and the chain moves on.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::ParseFailure;

/// Textual repairs, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
  /// Drop markdown fences and prose around the outermost JSON container.
  StripWrapping,
  /// Escape raw control characters inside string literals, drop them outside.
  EscapeControlChars,
  /// Cut trailing garbage after the first complete value, or close a truncated one.
  BalanceBrackets,
  /// Turn single-quoted strings into double-quoted ones.
  NormalizeQuotes,
  /// Escape interior double quotes (dialogue) that do not end a string.
  EscapeStrayQuotes,
}

impl RepairStrategy {
  pub const ORDER: [RepairStrategy; 5] = [
    RepairStrategy::StripWrapping,
    RepairStrategy::EscapeControlChars,
    RepairStrategy::BalanceBrackets,
    RepairStrategy::NormalizeQuotes,
    RepairStrategy::EscapeStrayQuotes,
  ];

  pub fn name(&self) -> &'static str {
    match self {
      RepairStrategy::StripWrapping => "strip_wrapping",
      RepairStrategy::EscapeControlChars => "escape_control_chars",
      RepairStrategy::BalanceBrackets => "balance_brackets",
      RepairStrategy::NormalizeQuotes => "normalize_quotes",
      RepairStrategy::EscapeStrayQuotes => "escape_stray_quotes",
    }
  }

  /// Returns the repaired text, or `None` when there was nothing to change.
  fn apply(&self, input: &str) -> Option<String> {
    let out = match self {
      RepairStrategy::StripWrapping => strip_wrapping(input),
      RepairStrategy::EscapeControlChars => escape_control_chars(input),
      RepairStrategy::BalanceBrackets => balance_brackets(input),
      RepairStrategy::NormalizeQuotes => normalize_quotes(input),
      RepairStrategy::EscapeStrayQuotes => escape_stray_quotes(input),
    };
    if out.is_empty() || out == input { None } else { Some(out) }
  }
}

/// Successfully recovered value and the strategies that were needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
  pub value: Value,
  pub applied: Vec<RepairStrategy>,
}

impl Recovered {
  pub fn was_repaired(&self) -> bool {
    !self.applied.is_empty()
  }
}

/// Decode `raw` as JSON, repairing it if needed.
#[instrument(level = "debug", skip(raw), fields(raw_len = raw.len()))]
pub fn parse_recovering(raw: &str) -> Result<Recovered, ParseFailure> {
  let mut last_err = match serde_json::from_str::<Value>(raw) {
    Ok(value) => return Ok(Recovered { value, applied: Vec::new() }),
    Err(e) => e,
  };

  let mut current = raw.to_string();
  let mut attempted = Vec::with_capacity(RepairStrategy::ORDER.len());

  for strategy in RepairStrategy::ORDER {
    attempted.push(strategy);
    let Some(next) = strategy.apply(&current) else {
      continue;
    };
    match serde_json::from_str::<Value>(&next) {
      Ok(value) => {
        debug!(strategy = strategy.name(), steps = attempted.len(), "Recovered JSON from model output");
        return Ok(Recovered { value, applied: attempted });
      }
      Err(e) => {
        last_err = e;
        current = next;
      }
    }
  }

  Err(ParseFailure {
    raw: raw.to_string(),
    attempted,
    message: last_err.to_string(),
    line: last_err.line(),
    column: last_err.column(),
  })
}

// -------- Strategies --------

fn strip_wrapping(input: &str) -> String {
  let mut s = input.trim();

  // Prefer the body of the first fenced block when there is one.
  if let Some(open) = s.find("```") {
    let after = &s[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    s = match body.find("```") {
      Some(close) => &body[..close],
      None => body,
    };
    s = s.trim();
  }

  // Prose may carry its own brackets ("[B2 level]", "see [1]"): start at the
  // opener of the longest complete value, else at the first object.
  let openers: Vec<usize> = s.match_indices(|c: char| c == '{' || c == '[').map(|(i, _)| i).collect();
  let Some(&first) = openers.first() else {
    return s.to_string();
  };
  let best = openers
    .iter()
    .filter_map(|&i| complete_len(&s[i..]).map(|len| (i, len)))
    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    .map(|(i, _)| i);
  let start = best
    .or_else(|| openers.iter().copied().find(|&i| s[i..].starts_with('{')))
    .unwrap_or(first);

  let closer = if s[start..].starts_with('{') { '}' } else { ']' };
  match s.rfind(closer) {
    Some(end) if end > start => s[start..=end].to_string(),
    // Never closed: keep everything from the opener and let balancing finish it.
    _ => s[start..].to_string(),
  }
}

/// Length of the value starting at the head of `from` once balanced, if it decodes.
fn complete_len(from: &str) -> Option<usize> {
  let balanced = balance_brackets(&escape_control_chars(from));
  serde_json::from_str::<Value>(&balanced).ok().map(|_| balanced.len())
}

fn is_valid_escape(c: char) -> bool {
  matches!(c, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')
}

fn push_escaped_control(out: &mut String, c: char) {
  match c {
    '\n' => out.push_str("\\n"),
    '\r' => out.push_str("\\r"),
    '\t' => out.push_str("\\t"),
    '\u{08}' => out.push_str("\\b"),
    '\u{0C}' => out.push_str("\\f"),
    other => out.push_str(&format!("\\u{:04x}", other as u32)),
  }
}

fn is_control(c: char) -> bool {
  (c as u32) < 0x20 || c == '\u{7f}'
}

fn escape_control_chars(input: &str) -> String {
  let mut out = String::with_capacity(input.len() + 16);
  let mut chars = input.chars().peekable();
  let mut in_string = false;

  while let Some(c) = chars.next() {
    if in_string {
      match c {
        '"' => {
          in_string = false;
          out.push(c);
        }
        '\\' => match chars.peek() {
          Some(&n) if is_valid_escape(n) => {
            out.push('\\');
            out.push(n);
            chars.next();
          }
          _ => out.push_str("\\\\"),
        },
        c if is_control(c) => push_escaped_control(&mut out, c),
        c => out.push(c),
      }
    } else {
      match c {
        '"' => {
          in_string = true;
          out.push(c);
        }
        '\n' | '\r' | '\t' => out.push(c),
        c if is_control(c) => {}
        c => out.push(c),
      }
    }
  }
  out
}

fn balance_brackets(input: &str) -> String {
  let mut out = String::with_capacity(input.len() + 8);
  let mut stack: Vec<char> = Vec::new();
  let mut in_string = false;
  let mut escaped = false;
  let mut started = false;

  for c in input.chars() {
    if in_string {
      out.push(c);
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }

    match c {
      '{' | '[' => {
        started = true;
        stack.push(if c == '{' { '}' } else { ']' });
        out.push(c);
      }
      '}' | ']' => {
        if stack.last() == Some(&c) {
          drop_trailing_comma(&mut out);
          stack.pop();
          out.push(c);
          if stack.is_empty() {
            // First complete top-level value: everything after it is garbage.
            return out;
          }
        }
        // Stray closer with no matching opener is dropped.
      }
      _ if !started => {}
      '"' => {
        in_string = true;
        out.push(c);
      }
      _ => out.push(c),
    }
  }

  if !started {
    return input.to_string();
  }

  // Truncated output: close whatever is still open.
  if in_string {
    if escaped {
      out.pop();
    }
    out.push('"');
  }
  let trimmed_len = out.trim_end().len();
  out.truncate(trimmed_len);
  drop_trailing_comma(&mut out);
  if out.ends_with(':') {
    out.push_str(" null");
  }
  while let Some(closer) = stack.pop() {
    out.push(closer);
  }
  out
}

/// Remove a `,` that is the last non-whitespace character of `out`.
fn drop_trailing_comma(out: &mut String) {
  let trimmed = out.trim_end();
  if trimmed.ends_with(',') {
    let len = trimmed.len() - 1;
    out.truncate(len);
  }
}

fn normalize_quotes(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::with_capacity(input.len());
  let mut in_double = false;
  let mut escaped = false;
  let mut i = 0;

  while i < chars.len() {
    let c = chars[i];
    i += 1;
    if in_double {
      out.push(c);
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_double = false;
      }
      continue;
    }

    match c {
      '"' => {
        in_double = true;
        out.push(c);
      }
      '\'' if opens_token(&out) => match single_quoted(&chars[i..]) {
        Some((body, used)) => {
          out.push('"');
          out.push_str(&body);
          out.push('"');
          i += used;
        }
        None => out.push(c),
      },
      c => out.push(c),
    }
  }
  out
}

/// A key or value may start here: after `{`, `[`, `,`, `:` or at the very beginning.
fn opens_token(out: &str) -> bool {
  matches!(out.trim_end().chars().last(), None | Some('{' | '[' | ',' | ':'))
}

/// Body of a single-quoted string re-escaped for double quotes, plus the chars
/// consumed including the closing quote. `None` when it never closes.
fn single_quoted(rest: &[char]) -> Option<(String, usize)> {
  let mut body = String::new();
  let mut j = 0;
  while j < rest.len() {
    let c = rest[j];
    j += 1;
    match c {
      '\'' => return Some((body, j)),
      '\\' => {
        let n = *rest.get(j)?;
        j += 1;
        if n == '\'' {
          body.push('\'');
        } else {
          body.push('\\');
          body.push(n);
        }
      }
      '"' => body.push_str("\\\""),
      c if is_control(c) => push_escaped_control(&mut body, c),
      c => body.push(c),
    }
  }
  None
}

fn escape_stray_quotes(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::with_capacity(input.len() + 16);
  let mut in_string = false;
  let mut escaped = false;

  for (i, &c) in chars.iter().enumerate() {
    if !in_string {
      if c == '"' {
        in_string = true;
      }
      out.push(c);
      continue;
    }

    if escaped {
      escaped = false;
      out.push(c);
      continue;
    }
    match c {
      '\\' => {
        escaped = true;
        out.push(c);
      }
      '"' => {
        let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
        match next {
          None | Some(',') | Some('}') | Some(']') | Some(':') => {
            in_string = false;
            out.push('"');
          }
          Some(_) => out.push_str("\\\""),
        }
      }
      c => out.push(c),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn valid_json_needs_no_repair() {
    let r = parse_recovering(r#"{"title": "Bees"}"#).unwrap();
    assert_eq!(r.value, json!({"title": "Bees"}));
    assert!(!r.was_repaired());
  }

  #[test]
  fn fenced_and_prose_wrapped_output_is_unwrapped() {
    let raw = "Sure! Here is the JSON you asked for:\n```json\n{\"title\": \"The Quiet Hive\"}\n```\nLet me know if you need more.";
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value, json!({"title": "The Quiet Hive"}));
    assert_eq!(r.applied, vec![RepairStrategy::StripWrapping]);
  }

  #[test]
  fn raw_newlines_inside_strings_are_escaped() {
    let raw = "{\"text\": \"First paragraph.\n\nSecond paragraph.\"}";
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value["text"], "First paragraph.\n\nSecond paragraph.");
    assert_eq!(r.applied.last(), Some(&RepairStrategy::EscapeControlChars));
  }

  #[test]
  fn trailing_garbage_after_value_is_cut() {
    let raw = "{\"a\": [1, 2]} and then {\"b\": 3}";
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value, json!({"a": [1, 2]}));
  }

  #[test]
  fn truncated_output_is_closed() {
    let raw = "{\"questions\": [{\"prompt\": \"Why did Sarah stop?\", \"options\": {\"A\": \"She was ti";
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value["questions"][0]["options"]["A"], "She was ti");
    assert!(r.applied.contains(&RepairStrategy::BalanceBrackets));
  }

  #[test]
  fn trailing_commas_are_dropped() {
    let r = parse_recovering("{\"a\": [1, 2,], }").unwrap();
    assert_eq!(r.value, json!({"a": [1, 2]}));
  }

  #[test]
  fn single_quotes_outside_strings_are_normalized() {
    let raw = "{'title': 'A \"quiet\" morning', \"note\": \"it's fine\"}";
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value["title"], "A \"quiet\" morning");
    assert_eq!(r.value["note"], "it's fine");
    assert!(r.applied.contains(&RepairStrategy::NormalizeQuotes));
  }

  #[test]
  fn dialogue_quotes_are_escaped() {
    let raw = r#"{"text": "She turned and said "not today" before leaving.", "title": "Rain"}"#;
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value["text"], "She turned and said \"not today\" before leaving.");
    assert_eq!(r.value["title"], "Rain");
    assert_eq!(r.applied.last(), Some(&RepairStrategy::EscapeStrayQuotes));
  }

  #[test]
  fn dialogue_with_apostrophes_is_recovered() {
    let raw = r#"{"text": "Tom said "don't go" and left.", "title": "Rain"}"#;
    let r = parse_recovering(raw).unwrap();
    assert_eq!(r.value["text"], "Tom said \"don't go\" and left.");
    assert_eq!(r.value["title"], "Rain");
    assert_eq!(r.applied.last(), Some(&RepairStrategy::EscapeStrayQuotes));
  }

  #[test]
  fn apostrophes_in_prose_never_open_a_string() {
    let raw = r#"{"text": "It's the writer's view", 'title': 'Rain'}"#;
    assert_eq!(normalize_quotes(raw), r#"{"text": "It's the writer's view", "title": "Rain"}"#);
    assert_eq!(normalize_quotes("{'a': 'never closed}"), "{\"a\": 'never closed}");
  }

  #[test]
  fn bracketed_prose_before_the_value_is_skipped() {
    let r = parse_recovering("Here is the task [B2 level]:\n{\"title\": \"Rain\"}").unwrap();
    assert_eq!(r.value, json!({"title": "Rain"}));

    let r = parse_recovering("Sources (see [1]) follow.\n{\"questions\": [{\"prompt\": \"Why?\"}]}\nDone [ok].").unwrap();
    assert_eq!(r.value["questions"][0]["prompt"], "Why?");

    let r = parse_recovering("Note [draft]: {\"text\": \"cut off her").unwrap();
    assert_eq!(r.value["text"], "cut off her");
  }

  #[test]
  fn hopeless_input_reports_every_strategy() {
    let err = parse_recovering("I'm sorry, I can't help with that.").unwrap_err();
    assert_eq!(err.attempted, RepairStrategy::ORDER.to_vec());
    assert_eq!(err.raw, "I'm sorry, I can't help with that.");
    assert!(err.line >= 1);
  }

  #[test]
  fn wrapped_values_decode_like_their_clean_form() {
    let samples = [
      json!({"title": "Urban gardens"}),
      json!({"text": "line one\nline two", "n": 3}),
      json!([{"A": "x"}, {"B": "y"}]),
      json!({"nested": {"deep": [true, false, null]}}),
    ];
    for clean in samples {
      let text = serde_json::to_string_pretty(&clean).unwrap();
      let fenced = format!("```json\n{text}\n```");
      assert_eq!(parse_recovering(&fenced).unwrap().value, clean);

      let chatty = format!("Here you go:\n{text}\nHope this helps!");
      assert_eq!(parse_recovering(&chatty).unwrap().value, clean);

      let with_controls = format!("\u{0001}{text}\u{0002}");
      assert_eq!(parse_recovering(&with_controls).unwrap().value, clean);
    }
  }
}
