//! In-memory synonym store on a sharded concurrent map, with JSON persistence.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{rank, RankedReplacement, SynonymEntry, SynonymStats, SynonymStore};
use crate::error::StoreError;

/// Layout of the JSON file: `{ word: { replacement: { "estimate": f64, "count": u64 } } }`.
type StoreFile = BTreeMap<String, BTreeMap<String, SynonymStats>>;

/// Concurrent in-memory store.
///
/// Keys are lower-cased words; a merge holds the word's shard lock for the whole
/// read-modify-write, so merges to one word never interleave.
#[derive(Debug, Default)]
pub struct InMemorySynonymStore {
    words: DashMap<String, BTreeMap<String, SynonymStats>>,
}

impl InMemorySynonymStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a JSON file; a missing file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&content)?;
        debug!(path = %path.display(), words = file.len(), "loaded synonym store");
        let store = Self::new();
        for (word, reps) in file {
            // Keys differing only in case are one word; their observations are pooled.
            let mut merged = store.words.entry(word.to_lowercase()).or_default();
            for (replacement, stats) in reps {
                merged
                    .entry(replacement)
                    .and_modify(|s| *s = s.combined(stats))
                    .or_insert(stats);
            }
        }
        Ok(store)
    }

    /// Writes every pair to `path` as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let file: StoreFile = self
            .words
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

#[async_trait]
impl SynonymStore for InMemorySynonymStore {
    async fn lookup(&self, word: &str) -> Result<Vec<RankedReplacement>, StoreError> {
        let mut ranked: Vec<RankedReplacement> = match self.words.get(&word.to_lowercase()) {
            Some(reps) => reps
                .iter()
                .map(|(replacement, stats)| RankedReplacement {
                    replacement: replacement.clone(),
                    estimate: stats.estimate,
                    count: stats.count,
                })
                .collect(),
            None => Vec::new(),
        };
        rank(&mut ranked);
        Ok(ranked)
    }

    async fn merge(&self, word: &str, replacement: &str, delta: f64) -> Result<f64, StoreError> {
        let mut reps = self.words.entry(word.to_lowercase()).or_default();
        let stats = reps
            .entry(replacement.to_string())
            .and_modify(|s| *s = s.merged(delta))
            .or_insert_with(|| SynonymStats::first(delta));
        Ok(stats.estimate)
    }

    async fn entries(&self) -> Result<Vec<SynonymEntry>, StoreError> {
        let mut out: Vec<SynonymEntry> = self
            .words
            .iter()
            .flat_map(|e| {
                let word = e.key().clone();
                e.value()
                    .iter()
                    .map(|(replacement, stats)| SynonymEntry {
                        word: word.clone(),
                        replacement: replacement.clone(),
                        estimate: stats.estimate,
                        count: stats.count,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        out.sort_by(|a, b| (&a.word, &a.replacement).cmp(&(&b.word, &b.replacement)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn merge_creates_then_updates() {
        let store = InMemorySynonymStore::new();
        assert!((store.merge("Utilize", "use", 0.4).await.unwrap() - 0.4).abs() < 1e-12);
        let e = store.merge("utilize", "use", 0.2).await.unwrap();
        assert!((e - 0.3).abs() < 1e-12);
        let ranked = store.lookup("UTILIZE").await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].count, 2);
    }

    #[tokio::test]
    async fn concurrent_merges_to_one_word_are_not_lost() {
        let store = Arc::new(InMemorySynonymStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let delta = if i % 2 == 0 { 0.5 } else { -0.1 };
                store.merge("assist", "help", delta).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let ranked = store.lookup("assist").await.unwrap();
        assert_eq!(ranked[0].count, 32);
        assert!((ranked[0].estimate - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn json_file_round_trip_keeps_stats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synonyms.json");
        let store = InMemorySynonymStore::new();
        store.merge("utilize", "use", 0.4).await.unwrap();
        store.merge("utilize", "employ", -0.2).await.unwrap();
        store.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["utilize"]["use"]["count"], 1);

        let loaded = InMemorySynonymStore::load(&path).unwrap();
        assert_eq!(loaded.entries().await.unwrap(), store.entries().await.unwrap());
    }

    #[tokio::test]
    async fn load_pools_keys_that_differ_only_in_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synonyms.json");
        std::fs::write(
            &path,
            r#"{
                "Utilize": { "use": { "estimate": 0.4, "count": 1 } },
                "utilize": {
                    "use": { "estimate": 0.1, "count": 3 },
                    "employ": { "estimate": -0.2, "count": 2 }
                }
            }"#,
        )
        .unwrap();

        let store = InMemorySynonymStore::load(&path).unwrap();
        let ranked = store.lookup("utilize").await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].replacement, "use");
        assert_eq!(ranked[0].count, 4);
        // (0.4 * 1 + 0.1 * 3) / 4
        assert!((ranked[0].estimate - 0.175).abs() < 1e-12);
        assert_eq!(ranked[1].replacement, "employ");
        assert_eq!(ranked[1].count, 2);
    }

    #[test]
    fn loading_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemorySynonymStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.words.is_empty());
    }
}
