//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
/// This is intentionally simple (no nested/conditional logic).
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Whitespace-separated token count, the unit every length threshold uses.
pub fn word_count(text: &str) -> usize {
  text.split_whitespace().count()
}

/// Lowercase ASCII slug for file names ("AI in everyday life" -> "ai_in_everyday_life").
pub fn slugify(s: &str, max_len: usize) -> String {
  let mut out = String::new();
  let mut last_sep = true;
  for ch in s.chars() {
    if ch.is_ascii_alphanumeric() {
      out.push(ch.to_ascii_lowercase());
      last_sep = false;
    } else if !last_sep {
      out.push('_');
      last_sep = true;
    }
    if out.len() >= max_len { break; }
  }
  let trimmed = out.trim_matches('_');
  if trimmed.is_empty() { "untitled".into() } else { trimmed.to_string() }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) { cut -= 1; }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fill_template_replaces_every_occurrence() {
    let out = fill_template("{topic} / {topic} as {text_type}", &[("topic", "bees"), ("text_type", "blog post")]);
    assert_eq!(out, "bees / bees as blog post");
  }

  #[test]
  fn word_count_ignores_extra_whitespace() {
    assert_eq!(word_count("  one two\n\nthree\tfour  "), 4);
    assert_eq!(word_count(""), 0);
  }

  #[test]
  fn slugify_collapses_separators() {
    assert_eq!(slugify("AI in everyday life!", 40), "ai_in_everyday_life");
    assert_eq!(slugify("???", 40), "untitled");
    assert_eq!(slugify("sustainable travel and eco-tourism", 10), "sustainabl");
  }

  #[test]
  fn trunc_for_log_respects_char_boundaries() {
    let s = "ééééé";
    let out = trunc_for_log(s, 3);
    assert!(out.starts_with('é'));
    assert!(out.ends_with("(10 bytes total)"));
  }
}
