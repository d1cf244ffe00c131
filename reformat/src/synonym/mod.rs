//! Synonym performance store.
//!
//! A [`SynonymStore`] maps a word to candidate replacements, each with a running mean of the
//! score deltas observed when the replacement was part of an accepted prompt. Merges follow
//! [`merge_estimate`], so the final estimate depends only on the multiset of observations.
//!
//! Backends: [`InMemorySynonymStore`] (optionally backed by a JSON file) and
//! [`SqliteSynonymStore`]. A [`Lexicon`] supplies replacements that have not been observed
//! yet; [`SynonymSnapshot`] combines both for one generator call.

mod lexicon;
mod memory;
mod sqlite;

pub use lexicon::Lexicon;
pub use memory::InMemorySynonymStore;
pub use sqlite::SqliteSynonymStore;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Estimate given to a lexicon candidate with no observations.
pub const NEUTRAL_ESTIMATE: f64 = 0.0;

/// One observed (word, replacement) pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SynonymEntry {
    pub word: String,
    pub replacement: String,
    /// Mean observed score delta.
    pub estimate: f64,
    pub count: u64,
}

/// Per-pair statistics, as stored in the JSON file and the SQLite table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SynonymStats {
    pub estimate: f64,
    pub count: u64,
}

impl SynonymStats {
    /// Statistics after one more observation of `delta`.
    pub fn merged(self, delta: f64) -> Self {
        let (estimate, count) = merge_estimate(Some((self.estimate, self.count)), delta);
        Self { estimate, count }
    }

    /// Pooled statistics of two sets of observations of the same pair: the
    /// count-weighted mean of both estimates.
    pub fn combined(self, other: Self) -> Self {
        let count = self.count + other.count;
        if count == 0 {
            return other;
        }
        let estimate = (self.estimate * self.count as f64 + other.estimate * other.count as f64)
            / count as f64;
        Self { estimate, count }
    }

    pub fn first(delta: f64) -> Self {
        Self {
            estimate: delta,
            count: 1,
        }
    }
}

/// Running-mean update. `None` means the pair has never been observed.
pub fn merge_estimate(current: Option<(f64, u64)>, delta: f64) -> (f64, u64) {
    match current {
        None | Some((_, 0)) => (delta, 1),
        Some((estimate, count)) => (
            estimate + (delta - estimate) / (count as f64 + 1.0),
            count + 1,
        ),
    }
}

/// A replacement candidate for one word.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankedReplacement {
    pub replacement: String,
    pub estimate: f64,
    /// Zero for lexicon candidates that were never observed.
    pub count: u64,
}

/// Estimate descending, then count descending, then replacement text.
pub fn rank(replacements: &mut [RankedReplacement]) {
    replacements.sort_by(|a, b| {
        b.estimate
            .partial_cmp(&a.estimate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.replacement.cmp(&b.replacement))
    });
}

/// Read and merge contract shared by every backend.
///
/// Merges to the same word are linearized by the backend; reads may see any prefix of the
/// merges applied so far.
#[async_trait]
pub trait SynonymStore: Send + Sync {
    /// Observed replacements for `word`, best first (see [`rank`]).
    async fn lookup(&self, word: &str) -> Result<Vec<RankedReplacement>, StoreError>;

    /// Folds one observation into the pair and returns the new estimate.
    async fn merge(&self, word: &str, replacement: &str, delta: f64) -> Result<f64, StoreError>;

    /// Every stored pair, ordered by word then replacement.
    async fn entries(&self) -> Result<Vec<SynonymEntry>, StoreError>;
}

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'-]*").expect("word regex"));

/// Distinct lower-cased words of `text`, in sorted order.
pub fn prompt_words(text: &str) -> BTreeSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Candidate replacements for the words of one prompt, read once per iteration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SynonymSnapshot {
    words: BTreeMap<String, Vec<RankedReplacement>>,
}

impl SynonymSnapshot {
    /// Store observations plus unobserved lexicon candidates for every word of `prompt`.
    pub async fn collect(
        store: &dyn SynonymStore,
        lexicon: &Lexicon,
        prompt: &str,
    ) -> Result<Self, StoreError> {
        let mut words = BTreeMap::new();
        for word in prompt_words(prompt) {
            let mut ranked = store.lookup(&word).await?;
            for candidate in lexicon.candidates(&word) {
                if candidate.eq_ignore_ascii_case(&word)
                    || ranked.iter().any(|r| r.replacement == *candidate)
                {
                    continue;
                }
                ranked.push(RankedReplacement {
                    replacement: candidate.clone(),
                    estimate: NEUTRAL_ESTIMATE,
                    count: 0,
                });
            }
            if !ranked.is_empty() {
                rank(&mut ranked);
                words.insert(word, ranked);
            }
        }
        Ok(Self { words })
    }

    /// Builds a snapshot from literal rankings; each list is re-ranked.
    pub fn from_rankings(
        rankings: impl IntoIterator<Item = (String, Vec<RankedReplacement>)>,
    ) -> Self {
        let words = rankings
            .into_iter()
            .filter(|(_, r)| !r.is_empty())
            .map(|(w, mut r)| {
                rank(&mut r);
                (w.to_lowercase(), r)
            })
            .collect();
        Self { words }
    }

    /// Words with at least one candidate, sorted.
    pub fn words(&self) -> impl Iterator<Item = (&str, &[RankedReplacement])> {
        self.words.iter().map(|(w, r)| (w.as_str(), r.as_slice()))
    }

    pub fn get(&self, word: &str) -> Option<&[RankedReplacement]> {
        self.words.get(word).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
