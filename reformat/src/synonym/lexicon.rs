//! Static candidate replacements.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::StoreError;

const BUILTIN_PAIRS: &[(&str, &str)] = &[
    ("utilize", "use"),
    ("utilise", "use"),
    ("assist", "help"),
    ("commence", "start"),
    ("commence", "begin"),
    ("terminate", "end"),
    ("purchase", "buy"),
    ("demonstrate", "show"),
    ("approximately", "about"),
    ("sufficient", "enough"),
    ("numerous", "many"),
    ("obtain", "get"),
    ("require", "need"),
    ("additional", "more"),
    ("endeavor", "try"),
    ("facilitate", "help"),
    ("individuals", "people"),
    ("regarding", "about"),
    ("subsequently", "later"),
    ("prior", "before"),
    ("construct", "build"),
    ("modify", "change"),
    ("indicate", "show"),
    ("initial", "first"),
    ("inquire", "ask"),
    ("sufficiently", "enough"),
];

/// Word → replacements that may be tried without any observations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lexicon {
    words: BTreeMap<String, Vec<String>>,
}

impl Lexicon {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Plain-language replacements for common formal words.
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN_PAIRS.iter().copied())
    }

    pub fn from_pairs<W: AsRef<str>, R: AsRef<str>>(pairs: impl IntoIterator<Item = (W, R)>) -> Self {
        let mut lexicon = Self::default();
        for (w, r) in pairs {
            lexicon.add(w.as_ref(), r.as_ref());
        }
        lexicon
    }

    /// Reads `{ "word": ["replacement", ...] }` from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(&content)?;
        let mut lexicon = Self::default();
        for (word, replacements) in raw {
            for r in replacements {
                lexicon.add(&word, &r);
            }
        }
        Ok(lexicon)
    }

    /// Adds all pairs of `other` to `self`.
    pub fn extend(&mut self, other: Lexicon) {
        for (word, replacements) in other.words {
            for r in replacements {
                self.add(&word, &r);
            }
        }
    }

    fn add(&mut self, word: &str, replacement: &str) {
        let word = word.trim().to_lowercase();
        let replacement = replacement.trim();
        if word.is_empty() || replacement.is_empty() {
            return;
        }
        let list = self.words.entry(word).or_default();
        if !list.iter().any(|r| r == replacement) {
            list.push(replacement.to_string());
        }
    }

    /// Candidates for `word`, in insertion order.
    pub fn candidates(&self, word: &str) -> &[String] {
        self.words
            .get(&word.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_has_utilize() {
        let lexicon = Lexicon::builtin();
        assert_eq!(lexicon.candidates("Utilize"), &["use".to_string()]);
        assert_eq!(lexicon.candidates("commence").len(), 2);
        assert!(lexicon.candidates("table").is_empty());
    }

    #[test]
    fn load_json_and_extend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.json");
        std::fs::write(&path, r#"{"Big": ["large", "huge", "large"], "utilize": ["employ"]}"#)
            .unwrap();
        let mut lexicon = Lexicon::builtin();
        lexicon.extend(Lexicon::load(&path).unwrap());
        assert_eq!(lexicon.candidates("big"), &["large".to_string(), "huge".to_string()]);
        assert_eq!(
            lexicon.candidates("utilize"),
            &["use".to_string(), "employ".to_string()]
        );
    }

    #[test]
    fn load_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Lexicon::load(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}
