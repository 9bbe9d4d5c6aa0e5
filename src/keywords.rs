//! User-managed keyword chips.
//!
//! A [`KeywordSet`] tracks two independent axes per keyword: whether it is
//! present in the set at all, and whether it is active. Only active keywords
//! reach the query compiler; inactive ones stay visible so they can be
//! switched back on.

use crate::search::fields::FieldTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

pub const MIN_WEIGHT: u8 = 1;
pub const MAX_WEIGHT: u8 = 9;
pub const DEFAULT_WEIGHT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeywordError {
    #[error("keyword text must not be empty")]
    EmptyText,
    #[error("keyword weight {0} is outside {MIN_WEIGHT}..={MAX_WEIGHT}")]
    WeightOutOfRange(u8),
}

/// A search term bound to a weight and a set of target fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "KeywordInput")]
pub struct Keyword {
    text: String,
    weight: u8,
    #[serde(rename = "applyTo")]
    apply_to: BTreeSet<FieldTag>,
    active: bool,
}

/// Wire shape accepted from transport JSON before validation.
#[derive(Debug, Deserialize)]
struct KeywordInput {
    text: String,
    #[serde(default)]
    weight: Option<u8>,
    #[serde(default, rename = "applyTo", alias = "apply_to")]
    apply_to: Vec<FieldTag>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl TryFrom<KeywordInput> for Keyword {
    type Error = KeywordError;

    fn try_from(input: KeywordInput) -> Result<Self, Self::Error> {
        let mut kw = Keyword::new(input.text, input.weight.unwrap_or(DEFAULT_WEIGHT))?
            .with_fields(input.apply_to);
        kw.active = input.active;
        Ok(kw)
    }
}

impl Keyword {
    /// Create an active keyword applied to the default fields.
    pub fn new(text: impl Into<String>, weight: u8) -> Result<Self, KeywordError> {
        let text = text.into().trim().to_string();
        if text.is_empty() {
            return Err(KeywordError::EmptyText);
        }
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            return Err(KeywordError::WeightOutOfRange(weight));
        }
        Ok(Self {
            text,
            weight,
            apply_to: FieldTag::DEFAULTS.into_iter().collect(),
            active: true,
        })
    }

    /// Restrict the keyword to `fields`; an empty selection keeps the defaults.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldTag>) -> Self {
        let fields: BTreeSet<FieldTag> = fields.into_iter().collect();
        if !fields.is_empty() {
            self.apply_to = fields;
        }
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn apply_to(&self) -> &BTreeSet<FieldTag> {
        &self.apply_to
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Ordered collection of keywords, unique by text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Keyword>", into = "Vec<Keyword>")]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `keyword` unless one with the same text is already present
    /// (active or not). Returns whether the set changed.
    pub fn add(&mut self, keyword: Keyword) -> bool {
        if self.position(keyword.text()).is_some() {
            return false;
        }
        self.keywords.push(keyword);
        true
    }

    pub fn activate(&mut self, text: &str) -> bool {
        self.set_active(text, true)
    }

    pub fn deactivate(&mut self, text: &str) -> bool {
        self.set_active(text, false)
    }

    pub fn remove(&mut self, text: &str) -> Option<Keyword> {
        self.position(text).map(|idx| self.keywords.remove(idx))
    }

    pub fn get(&self, text: &str) -> Option<&Keyword> {
        self.position(text).map(|idx| &self.keywords[idx])
    }

    pub fn active(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter().filter(|k| k.active)
    }

    pub fn inactive(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter().filter(|k| !k.active)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    pub fn clear(&mut self) {
        self.keywords.clear();
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    fn set_active(&mut self, text: &str, active: bool) -> bool {
        match self.position(text) {
            Some(idx) => {
                self.keywords[idx].active = active;
                true
            }
            None => false,
        }
    }

    fn position(&self, text: &str) -> Option<usize> {
        let text = text.trim();
        self.keywords.iter().position(|k| k.text == text)
    }
}

impl FromIterator<Keyword> for KeywordSet {
    fn from_iter<I: IntoIterator<Item = Keyword>>(iter: I) -> Self {
        let mut set = KeywordSet::new();
        for kw in iter {
            set.add(kw);
        }
        set
    }
}

impl From<Vec<Keyword>> for KeywordSet {
    fn from(keywords: Vec<Keyword>) -> Self {
        keywords.into_iter().collect()
    }
}

impl From<KeywordSet> for Vec<Keyword> {
    fn from(set: KeywordSet) -> Self {
        set.keywords
    }
}
