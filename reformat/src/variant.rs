//! [`PromptVariant`]: one concrete, rendered prompt and the choices that produced it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::reformatter::render;
use crate::rules::RuleSelection;

/// Word → replacement map. Keys are lower-cased so iteration order and equality do not
/// depend on insertion order or input casing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Substitutions(BTreeMap<String, String>);

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the substitution for `word`.
    pub fn insert(&mut self, word: impl AsRef<str>, replacement: impl Into<String>) {
        self.0
            .insert(word.as_ref().to_lowercase(), replacement.into());
    }

    pub fn with(mut self, word: impl AsRef<str>, replacement: impl Into<String>) -> Self {
        self.insert(word, replacement);
        self
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.0.get(&word.to_lowercase()).map(String::as_str)
    }

    /// Stored key and replacement for a word as it appears in text.
    pub fn entry(&self, word: &str) -> Option<(&str, &str)> {
        self.0
            .get_key_value(&word.to_lowercase())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn contains(&self, word: &str, replacement: &str) -> bool {
        self.get(word) == Some(replacement)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<W: AsRef<str>, R: Into<String>> FromIterator<(W, R)> for Substitutions {
    fn from_iter<I: IntoIterator<Item = (W, R)>>(iter: I) -> Self {
        let mut subs = Substitutions::new();
        for (w, r) in iter {
            subs.insert(w, r);
        }
        subs
    }
}

/// A base prompt, a rule selection, substitutions, and the text they render to.
///
/// Fields are private so `rendered` can only come from [`render`]; constructing the same
/// variant twice always yields byte-identical text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptVariant {
    base: Arc<str>,
    selection: RuleSelection,
    substitutions: Substitutions,
    rendered: String,
}

impl PromptVariant {
    pub fn new(base: Arc<str>, selection: RuleSelection, substitutions: Substitutions) -> Self {
        let rendered = render(&base, &selection, &substitutions);
        Self {
            base,
            selection,
            substitutions,
            rendered,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Shared handle to the base prompt, for building sibling variants.
    pub fn base_arc(&self) -> Arc<str> {
        Arc::clone(&self.base)
    }

    pub fn selection(&self) -> &RuleSelection {
        &self.selection
    }

    pub fn substitutions(&self) -> &Substitutions {
        &self.substitutions
    }

    pub fn rendered(&self) -> &str {
        &self.rendered
    }
}
