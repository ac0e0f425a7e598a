//! Fuzzy comparison of free-text career names.
//!
//! Career names are entered by hand ("Ing. Civil en Computación mención
//! Informática", "Ingeniería en Informática", ...). Two names are compared on
//! their significant tokens: accents are stripped, case is folded, and a
//! configurable set of generic words is dropped. Synonym clusters extend the
//! comparison to careers that are named differently but overlap in practice.
//!
//! This is a heuristic that gates cross-career enrollment and topic
//! visibility; its boundary rules are pinned by the tests below.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

const DEFAULT_STOPWORDS: &[&str] = &[
  "ing", "ingenieria", "ingeniero", "civil", "en", "de", "del", "la", "el",
  "los", "las", "y", "e", "mencion", "engineering", "in", "of", "the", "and",
  "mention",
];

const DEFAULT_SYNONYMS: &[&[&str]] = &[
  &["computacion", "informatica", "computing", "informatics", "computer"],
  &["industrial", "industria", "industry"],
  &["electronica", "electronics", "electronic"],
  &["mecanica", "mechanical", "mechanics"],
  &["quimica", "chemistry", "chemical"],
];

/// The data behind a [`CareerMatcher`]: which words are ignored and which
/// words are treated as interchangeable. Loadable from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CareerRules {
  pub stopwords: Vec<String>,
  pub synonyms:  Vec<Vec<String>>,
}

impl Default for CareerRules {
  fn default() -> Self {
    Self {
      stopwords: DEFAULT_STOPWORDS.iter().map(|w| (*w).to_owned()).collect(),
      synonyms:  DEFAULT_SYNONYMS
        .iter()
        .map(|group| group.iter().map(|w| (*w).to_owned()).collect())
        .collect(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct CareerMatcher {
  stopwords: HashSet<String>,
  synonyms:  Vec<HashSet<String>>,
}

impl Default for CareerMatcher {
  fn default() -> Self { Self::new(&CareerRules::default()) }
}

impl CareerMatcher {
  /// Build a matcher from `rules`. Rule entries are normalised the same way
  /// as career names, so they may be written with accents or capitals.
  pub fn new(rules: &CareerRules) -> Self {
    let stopwords = rules.stopwords.iter().map(|w| normalize(w)).collect();
    let synonyms = rules
      .synonyms
      .iter()
      .map(|group| group.iter().map(|w| normalize(w)).collect::<HashSet<_>>())
      .filter(|group| !group.is_empty())
      .collect();
    Self { stopwords, synonyms }
  }

  /// The significant tokens of a career name.
  pub fn tokens(&self, career: &str) -> BTreeSet<String> {
    normalize(career)
      .split(|c: char| !c.is_alphanumeric())
      .filter(|t| !t.is_empty() && !self.stopwords.contains(*t))
      .map(str::to_owned)
      .collect()
  }

  /// Token sets are equal, one contains the other, or they share at least
  /// two tokens. A name with no significant tokens coincides with nothing.
  pub fn coincides(&self, a: &str, b: &str) -> bool {
    let (ta, tb) = (self.tokens(a), self.tokens(b));
    if ta.is_empty() || tb.is_empty() {
      return false;
    }
    ta.is_subset(&tb) || tb.is_subset(&ta) || ta.intersection(&tb).count() >= 2
  }

  /// Some token of `a` and some token of `b` fall in the same synonym
  /// cluster (a token is always its own synonym).
  pub fn equivalent(&self, a: &str, b: &str) -> bool {
    let ea = self.expand(self.tokens(a));
    let eb = self.expand(self.tokens(b));
    !ea.is_disjoint(&eb)
  }

  pub fn compatible(&self, a: &str, b: &str) -> bool {
    self.coincides(a, b) || self.equivalent(a, b)
  }

  /// Compatibility where a blank career on either side imposes no
  /// restriction.
  pub fn admits(&self, topic_career: &str, person_career: &str) -> bool {
    topic_career.trim().is_empty()
      || person_career.trim().is_empty()
      || self.compatible(topic_career, person_career)
  }

  fn expand(&self, tokens: BTreeSet<String>) -> BTreeSet<String> {
    let mut out = tokens.clone();
    for group in &self.synonyms {
      if tokens.iter().any(|t| group.contains(t)) {
        out.extend(group.iter().cloned());
      }
    }
    out
  }
}

/// Decompose, strip combining marks and fold case.
pub fn normalize(s: &str) -> String {
  s.nfkd()
    .filter(|c| !is_combining_mark(*c))
    .collect::<String>()
    .to_lowercase()
}
