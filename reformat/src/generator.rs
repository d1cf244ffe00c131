//! Candidate generation over the rule and synonym search space.
//!
//! The space has one axis per rule class plus one axis per substitutable word (keep the
//! word, or one of its ranked replacements). Each axis has a greedy choice: the current
//! best's rule, or the top replacement when its estimate is not negative. For temperature
//! `t` an axis with `k` options draws the greedy choice with probability `(1 - t) + t/k`
//! and every other option with `t/k`.
//!
//! Candidates are deduplicated by rendered text and never repeat the current best. When
//! the whole space renders to no more than the requested number of distinct prompts, all
//! of them are returned in enumeration order.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::catalog::RulePipeline;
use crate::error::ConfigurationError;
use crate::reformatter::contains_word;
use crate::rules::{FormatRule, RuleClass};
use crate::synonym::SynonymSnapshot;
use crate::variant::{PromptVariant, Substitutions};

/// Spaces up to this many combinations are enumerated to detect small spaces.
const EXHAUSTIVE_LIMIT: usize = 4096;
/// Sampling attempts per requested candidate before giving up on finding new text.
const ATTEMPTS_PER_CANDIDATE: usize = 50;

/// Stochastic candidate generator; owns its RNG so seeded runs are reproducible.
#[derive(Debug)]
pub struct CandidateGenerator {
    rng: StdRng,
}

struct WordAxis {
    word: String,
    /// `None` keeps the word.
    options: Vec<Option<String>>,
    greedy: usize,
}

struct SearchSpace {
    rules: Vec<Vec<FormatRule>>,
    rule_greedy: Vec<usize>,
    words: Vec<WordAxis>,
}

impl SearchSpace {
    fn build(
        pipeline: &RulePipeline,
        snapshot: &SynonymSnapshot,
        current_best: &PromptVariant,
    ) -> Result<Self, ConfigurationError> {
        let mut rules = Vec::with_capacity(RuleClass::ORDER.len());
        let mut rule_greedy = Vec::with_capacity(RuleClass::ORDER.len());
        for class in RuleClass::ORDER {
            let options = pipeline.options(class);
            if options.is_empty() {
                return Err(ConfigurationError::MissingRule(class));
            }
            let current = current_best.selection().rule(class);
            rule_greedy.push(options.iter().position(|r| *r == current).unwrap_or(0));
            rules.push(options);
        }

        let words = snapshot
            .words()
            .filter(|(word, _)| contains_word(current_best.base(), word))
            .map(|(word, ranked)| {
                let greedy = match ranked.first() {
                    Some(top) if top.estimate >= 0.0 => 1,
                    _ => 0,
                };
                let options = std::iter::once(None)
                    .chain(ranked.iter().map(|r| Some(r.replacement.clone())))
                    .collect();
                WordAxis {
                    word: word.to_string(),
                    options,
                    greedy,
                }
            })
            .collect();

        Ok(Self {
            rules,
            rule_greedy,
            words,
        })
    }

    fn axis_sizes(&self) -> Vec<usize> {
        self.rules
            .iter()
            .map(Vec::len)
            .chain(self.words.iter().map(|w| w.options.len()))
            .collect()
    }

    fn greedy_choice(&self) -> Vec<usize> {
        self.rule_greedy
            .iter()
            .copied()
            .chain(self.words.iter().map(|w| w.greedy))
            .collect()
    }

    /// Number of combinations, `None` on overflow.
    fn size(&self) -> Option<usize> {
        self.axis_sizes()
            .into_iter()
            .try_fold(1usize, |acc, k| acc.checked_mul(k))
    }

    fn variant(&self, current_best: &PromptVariant, choice: &[usize]) -> PromptVariant {
        let (rule_choice, word_choice) = choice.split_at(self.rules.len());
        let selection = self
            .rules
            .iter()
            .zip(rule_choice)
            .fold(*current_best.selection(), |sel, (options, i)| {
                sel.with_rule(options[*i])
            });
        let mut subs = Substitutions::new();
        for (axis, i) in self.words.iter().zip(word_choice) {
            if let Some(replacement) = &axis.options[*i] {
                subs.insert(&axis.word, replacement.clone());
            }
        }
        PromptVariant::new(current_best.base_arc(), selection, subs)
    }
}

/// Draws one option of an axis with `k` options.
fn draw(rng: &mut StdRng, k: usize, greedy: usize, temperature: f64) -> usize {
    if k <= 1 || rng.gen::<f64>() < 1.0 - temperature {
        greedy
    } else {
        rng.gen_range(0..k)
    }
}

/// Advances a mixed-radix counter; false once every combination was visited.
fn next_combination(choice: &mut [usize], sizes: &[usize]) -> bool {
    for (digit, size) in choice.iter_mut().zip(sizes).rev() {
        *digit += 1;
        if *digit < *size {
            return true;
        }
        *digit = 0;
    }
    false
}

impl CandidateGenerator {
    /// A generator seeded from `seed`, or from OS entropy when `None`.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Proposes up to `n` variants whose rendered text is distinct and differs from
    /// `current_best`.
    pub fn generate(
        &mut self,
        n: usize,
        temperature: f64,
        pipeline: &RulePipeline,
        snapshot: &SynonymSnapshot,
        current_best: &PromptVariant,
    ) -> Result<Vec<PromptVariant>, ConfigurationError> {
        if !(0.0..=1.0).contains(&temperature) {
            return Err(ConfigurationError::InvalidParameter {
                name: "temperature",
                reason: format!("{} is outside [0, 1]", temperature),
            });
        }
        let space = SearchSpace::build(pipeline, snapshot, current_best)?;
        if n == 0 {
            return Ok(Vec::new());
        }

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(current_best.rendered().to_string());

        if temperature == 0.0 {
            let greedy = space.variant(current_best, &space.greedy_choice());
            let out: Vec<_> = if seen.contains(greedy.rendered()) {
                Vec::new()
            } else {
                vec![greedy]
            };
            debug!(candidates = out.len(), "greedy generation");
            return Ok(out);
        }

        if let Some(size) = space.size().filter(|s| *s <= EXHAUSTIVE_LIMIT) {
            // One distinct variant past `n` proves the space is large enough to sample.
            let found = Self::enumerate(&space, current_best, &seen, n + 1);
            if found.len() <= n {
                debug!(space = size, candidates = found.len(), "exhaustive generation");
                return Ok(found);
            }
        }

        let sizes = space.axis_sizes();
        let greedy = space.greedy_choice();
        let mut out = Vec::with_capacity(n);
        let mut attempts = 0;
        while out.len() < n && attempts < n * ATTEMPTS_PER_CANDIDATE {
            attempts += 1;
            let choice: Vec<usize> = sizes
                .iter()
                .zip(&greedy)
                .map(|(k, g)| draw(&mut self.rng, *k, *g, temperature))
                .collect();
            let variant = space.variant(current_best, &choice);
            if seen.insert(variant.rendered().to_string()) {
                out.push(variant);
            }
        }
        debug!(
            requested = n,
            candidates = out.len(),
            attempts,
            temperature,
            "sampled generation"
        );
        Ok(out)
    }

    /// Distinct variants in enumeration order, stopping once `limit` are found.
    fn enumerate(
        space: &SearchSpace,
        current_best: &PromptVariant,
        seen: &HashSet<String>,
        limit: usize,
    ) -> Vec<PromptVariant> {
        let sizes = space.axis_sizes();
        let mut seen = seen.clone();
        let mut choice = vec![0; sizes.len()];
        let mut out = Vec::new();
        loop {
            let variant = space.variant(current_best, &choice);
            if seen.insert(variant.rendered().to_string()) {
                out.push(variant);
                if out.len() >= limit {
                    return out;
                }
            }
            if !next_combination(&mut choice, &sizes) {
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::{ModelId, RuleCatalog};
    use crate::rules::{CasingRule, SeparatorRule};
    use crate::synonym::RankedReplacement;

    fn best(pipeline: &RulePipeline, prompt: &str) -> PromptVariant {
        PromptVariant::new(
            Arc::from(prompt),
            pipeline.default_selection().unwrap(),
            Substitutions::new(),
        )
    }

    fn snapshot(word: &str, replacement: &str, estimate: f64) -> SynonymSnapshot {
        SynonymSnapshot::from_rankings([(
            word.to_string(),
            vec![RankedReplacement {
                replacement: replacement.into(),
                estimate,
                count: 0,
            }],
        )])
    }

    #[test]
    fn greedy_applies_top_replacement_once() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::General);
        let current = best(pipeline, "Please utilize the attached notes.");
        let mut gen = CandidateGenerator::new(Some(7));
        let out = gen
            .generate(5, 0.0, pipeline, &snapshot("utilize", "use", 0.0), &current)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rendered(), "Please use the attached notes.");
        assert_eq!(out[0].selection(), current.selection());
    }

    #[test]
    fn greedy_keeps_word_with_negative_estimate() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::General);
        let current = best(pipeline, "Please utilize the attached notes.");
        let mut gen = CandidateGenerator::new(Some(7));
        let out = gen
            .generate(5, 0.0, pipeline, &snapshot("utilize", "use", -0.2), &current)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn no_duplicates_at_any_temperature() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::Gpt4o);
        let current = best(pipeline, "Utilize the list:\n1. apples\n2. pears\n3. plums");
        let snap = snapshot("utilize", "use", 0.1);
        for (i, t) in [0.0, 0.1, 0.5, 0.9, 1.0].into_iter().enumerate() {
            let mut gen = CandidateGenerator::new(Some(i as u64));
            let out = gen.generate(12, t, pipeline, &snap, &current).unwrap();
            let texts: HashSet<_> = out.iter().map(|v| v.rendered().to_string()).collect();
            assert_eq!(texts.len(), out.len(), "duplicates at t={}", t);
            assert!(!texts.contains(current.rendered()), "best repeated at t={}", t);
            if t > 0.0 {
                assert_eq!(out.len(), 12, "short batch at t={}", t);
            }
        }
    }

    #[test]
    fn small_space_is_enumerated() {
        let pipeline = RulePipeline {
            separators: SeparatorRule::defaults()[..2].to_vec(),
            casings: CasingRule::defaults(),
            ..RulePipeline::standard()
        };
        let current = best(&pipeline, "hello world");
        let mut gen = CandidateGenerator::new(Some(1));
        let out = gen
            .generate(5, 0.5, &pipeline, &SynonymSnapshot::default(), &current)
            .unwrap();
        let texts: Vec<_> = out.iter().map(PromptVariant::rendered).collect();
        assert_eq!(texts, vec!["Hello World", "HELLO WORLD"]);
    }

    #[test]
    fn enumeration_stops_at_limit() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::Gpt4o);
        let current = best(pipeline, "Please utilize the table.\n1. rows\n2. columns");
        let snap = snapshot("utilize", "use", 0.0);
        let space = SearchSpace::build(pipeline, &snap, &current).unwrap();
        assert!(space.size().unwrap() > 1000);

        let mut seen = HashSet::new();
        seen.insert(current.rendered().to_string());
        let found = CandidateGenerator::enumerate(&space, &current, &seen, 5);
        assert_eq!(found.len(), 5);
        let texts: HashSet<_> = found.iter().map(PromptVariant::rendered).collect();
        assert_eq!(texts.len(), 5);
        assert!(!texts.contains(current.rendered()));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::Gpt4o);
        let current = best(pipeline, "Sort:\n1. b\n2. a");
        let run = |seed| {
            CandidateGenerator::new(Some(seed))
                .generate(6, 0.6, pipeline, &SynonymSnapshot::default(), &current)
                .unwrap()
                .into_iter()
                .map(|v| v.rendered().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn temperature_out_of_range_is_rejected() {
        let catalog = RuleCatalog::builtin();
        let pipeline = catalog.pipeline(ModelId::General);
        let current = best(pipeline, "x");
        let err = CandidateGenerator::new(None)
            .generate(3, 1.5, pipeline, &SynonymSnapshot::default(), &current)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::InvalidParameter { name: "temperature", .. }
        ));
    }

    #[test]
    fn greedy_probability_interpolates() {
        let mut rng = StdRng::seed_from_u64(3);
        let draws = 20_000;
        let hits = (0..draws).filter(|_| draw(&mut rng, 4, 2, 0.5) == 2).count();
        let freq = hits as f64 / draws as f64;
        // (1 - 0.5) + 0.5 / 4
        assert!((freq - 0.625).abs() < 0.02, "freq = {}", freq);
    }

    #[test]
    fn mixed_radix_counter_visits_every_combination() {
        let sizes = [2, 3];
        let mut choice = vec![0, 0];
        let mut count = 1;
        while next_combination(&mut choice, &sizes) {
            count += 1;
        }
        assert_eq!(count, 6);
        assert_eq!(choice, vec![0, 0]);
    }
}
