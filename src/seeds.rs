//! Built-in catalogue: topic sets, text-type styles and skill guidance.
//! Guarantees the app is usable without a TOML file.

use std::collections::BTreeMap;

use crate::domain::{SkillType, TextType};

/// Style instruction handed to the text prompt for each genre.
pub fn default_style(text_type: TextType) -> &'static str {
  match text_type {
    TextType::MagazineArticle => "Write as an engaging magazine article with a clear structure and an informative yet accessible tone. Include expert quotes or statistics where relevant.",
    TextType::NewspaperArticle => "Write as a newspaper feature article with journalistic style, factual reporting and a balanced perspective.",
    TextType::NovelExtract => "Write as an excerpt from a contemporary novel with character development, some dialogue and narrative description.",
    TextType::BlogPost => "Write as a personal blog post with a first-person perspective, conversational tone and personal reflections.",
    TextType::ScienceArticle => "Write as a popular science article that explains complex ideas in accessible language.",
    TextType::CulturalReview => "Write as a cultural review or commentary with an analytical perspective and informed opinion.",
    TextType::ProfessionalFeature => "Write as a professional feature about workplace trends or industry insights.",
    TextType::LifestyleFeature => "Write as a lifestyle feature about personal interests, home, family or hobbies with practical tips.",
    TextType::TravelWriting => "Write as travel writing with vivid descriptions of places and cultural observations.",
    TextType::EducationalFeature => "Write as an educational feature about learning, study techniques or trends in education.",
  }
}

/// What each question type should test; listed in the questions prompt.
pub fn skill_guidance(skill: SkillType) -> &'static str {
  match skill {
    SkillType::Inference => "requires the reader to infer something implied but not stated",
    SkillType::Vocabulary => "asks for the meaning of a word or phrase in context",
    SkillType::Detail => "asks about specific information stated in the text",
    SkillType::Attitude => "asks about the writer's opinion, attitude or tone",
    SkillType::Reference => "asks what a pronoun or phrase refers to",
    SkillType::MainIdea => "asks about the overall main idea or purpose of the text",
  }
}

/// Topic sets offered for batch generation.
pub fn default_topic_sets() -> BTreeMap<String, Vec<String>> {
  let sets: [(&str, &[&str]); 4] = [
    ("Travel & Adventure", &[
      "sustainable travel and eco-tourism",
      "adventure sports and personal challenges",
      "cultural exchange through travel",
      "digital nomad lifestyle",
    ]),
    ("Technology & Modern Life", &[
      "artificial intelligence in everyday life",
      "social media influence on relationships",
      "remote work and productivity",
      "digital wellness and screen time",
    ]),
    ("Environment & Sustainability", &[
      "urban gardening and community spaces",
      "renewable energy solutions for homes",
      "climate change adaptation strategies",
      "sustainable fashion and consumption",
    ]),
    ("Personal Development", &[
      "mindfulness and mental health awareness",
      "lifelong learning and skill development",
      "creative hobbies and self-expression",
      "work-life balance strategies",
    ]),
  ];
  sets
    .into_iter()
    .map(|(name, topics)| (name.to_string(), topics.iter().map(|t| t.to_string()).collect()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_text_type_has_a_style() {
    for t in TextType::ALL {
      assert!(!default_style(t).is_empty());
    }
  }

  #[test]
  fn topic_sets_are_non_empty() {
    let sets = default_topic_sets();
    assert_eq!(sets.len(), 4);
    assert!(sets.values().all(|topics| topics.len() == 4));
  }
}
