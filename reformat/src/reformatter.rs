//! Deterministic prompt rendering.
//!
//! [`render`] applies substitutions first, then the selection's four rules in
//! [`RuleClass::ORDER`]. [`render_traced`] returns the same text plus a [`RenderTrace`]
//! recording which stage changed which span; tracing never changes the output.

use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::catalog::RulePipeline;
use crate::error::ConfigurationError;
use crate::rules::{contains_marker, RuleClass, RuleSelection};
use crate::variant::Substitutions;

/// Renders `prompt` with `subs` and `selection`.
pub fn render(prompt: &str, selection: &RuleSelection, subs: &Substitutions) -> String {
    let (mut text, _) = substitute(prompt, subs);
    for rule in selection.rules() {
        text = rule.apply(&text);
    }
    text
}

/// Renders `prompt` with the pipeline's expert-default selection and no substitutions.
pub fn format(prompt: &str, pipeline: &RulePipeline) -> Result<String, ConfigurationError> {
    let selection = pipeline.default_selection()?;
    Ok(render(prompt, &selection, &Substitutions::new()))
}

/// What a render stage was.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum TraceStage {
    Substitution { word: String, replacement: String },
    Rule { class: RuleClass, name: String },
}

/// The part of a stage's input that was rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangedSpan {
    /// Byte range in the stage input.
    pub before: Range<usize>,
    /// Byte range in the stage output.
    pub after: Range<usize>,
    pub removed: String,
    pub inserted: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    #[serde(flatten)]
    pub stage: TraceStage,
    /// `None` when the stage left the text unchanged.
    pub changed: Option<ChangedSpan>,
}

/// Ordered record of every render stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderTrace {
    pub steps: Vec<TraceStep>,
}

impl RenderTrace {
    /// Steps that actually changed the text.
    pub fn changes(&self) -> impl Iterator<Item = &TraceStep> {
        self.steps.iter().filter(|s| s.changed.is_some())
    }
}

/// Same output as [`render`], plus the per-stage trace.
pub fn render_traced(
    prompt: &str,
    selection: &RuleSelection,
    subs: &Substitutions,
) -> (String, RenderTrace) {
    let mut trace = RenderTrace::default();
    let (mut text, hits) = substitute(prompt, subs);
    for (word, replacement) in subs.iter() {
        let own: Vec<&Hit<'_>> = hits.iter().filter(|h| h.word == word).collect();
        let changed = match (own.first(), own.last()) {
            (Some(first), Some(last)) => {
                let before = first.before.start..last.before.end;
                let after = first.after.start..last.after.end;
                diff_span(&prompt[before.clone()], &text[after.clone()]).map(|span| ChangedSpan {
                    before: before.start + span.before.start..before.start + span.before.end,
                    after: after.start + span.after.start..after.start + span.after.end,
                    ..span
                })
            }
            _ => None,
        };
        trace.steps.push(TraceStep {
            stage: TraceStage::Substitution {
                word: word.to_string(),
                replacement: replacement.to_string(),
            },
            changed,
        });
    }
    for rule in selection.rules() {
        let next = rule.apply(&text);
        trace.steps.push(TraceStep {
            stage: TraceStage::Rule {
                class: rule.class(),
                name: rule.name().to_string(),
            },
            changed: diff_span(&text, &next),
        });
        text = next;
    }
    (text, trace)
}

/// One replaced word: its range in the input and in the substituted text.
struct Hit<'s> {
    word: &'s str,
    before: Range<usize>,
    after: Range<usize>,
}

/// Applies every substitution in a single left-to-right pass over `text`, so a
/// replacement is never rewritten by another entry of the map.
fn substitute<'s>(text: &str, subs: &'s Substitutions) -> (String, Vec<Hit<'s>>) {
    let Some(re) = word_alternation(subs.iter().map(|(word, _)| word)) else {
        return (text.to_string(), Vec::new());
    };
    let mut out = String::with_capacity(text.len());
    let mut hits = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        let Some((word, replacement)) = subs.entry(m.as_str()) else {
            continue;
        };
        out.push_str(&text[last..m.start()]);
        let start = out.len();
        out.push_str(&match_case(m.as_str(), replacement));
        hits.push(Hit {
            word,
            before: m.range(),
            after: start..out.len(),
        });
        last = m.end();
    }
    out.push_str(&text[last..]);
    (out, hits)
}

/// Replaces whole-word, case-insensitive occurrences of `word`, copying the casing
/// shape of each match onto `replacement`.
pub fn substitute_word(text: &str, word: &str, replacement: &str) -> String {
    substitute(text, &Substitutions::new().with(word, replacement)).0
}

/// True when `word` occurs in `text` as a whole word (case-insensitive).
pub fn contains_word(text: &str, word: &str) -> bool {
    word_alternation(std::iter::once(word)).is_some_and(|re| re.is_match(text))
}

const MAX_CACHED_PATTERNS: usize = 4096;

static WORD_PATTERNS: Lazy<DashMap<String, Arc<Regex>>> = Lazy::new(DashMap::new);

/// Case-insensitive `\b(?:w1|w2|...)\b` over `words`, longest first. Compiled patterns are
/// cached process-wide.
fn word_alternation<'a>(words: impl Iterator<Item = &'a str>) -> Option<Arc<Regex>> {
    let mut words: Vec<&str> = words.filter(|w| !w.trim().is_empty()).collect();
    if words.is_empty() {
        return None;
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    words.dedup();
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    let pattern = format!(r"\b(?:{})\b", alternatives.join("|"));

    if let Some(re) = WORD_PATTERNS.get(&pattern) {
        return Some(Arc::clone(re.value()));
    }
    let re = Arc::new(
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .ok()?,
    );
    if WORD_PATTERNS.len() >= MAX_CACHED_PATTERNS {
        WORD_PATTERNS.clear();
    }
    WORD_PATTERNS.insert(pattern, Arc::clone(&re));
    Some(re)
}

fn match_case(matched: &str, replacement: &str) -> String {
    let letters: Vec<char> = matched.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if letters.first().is_some_and(|c| c.is_uppercase()) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

fn diff_span(before: &str, after: &str) -> Option<ChangedSpan> {
    if before == after {
        return None;
    }
    let prefix: usize = before
        .chars()
        .zip(after.chars())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();
    let suffix: usize = before[prefix..]
        .chars()
        .rev()
        .zip(after[prefix..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum();
    let before_range = prefix..before.len() - suffix;
    let after_range = prefix..after.len() - suffix;
    Some(ChangedSpan {
        removed: before[before_range.clone()].to_string(),
        inserted: after[after_range.clone()].to_string(),
        before: before_range,
        after: after_range,
    })
}

/// Shape of a prompt, used for verbose output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptAnalysis {
    /// Length in characters.
    pub length: usize,
    pub has_enumeration: bool,
    pub has_fields: bool,
    pub sections: usize,
}

pub fn analyze(prompt: &str) -> PromptAnalysis {
    PromptAnalysis {
        length: prompt.chars().count(),
        has_enumeration: contains_marker(prompt),
        has_fields: prompt.contains(':'),
        sections: prompt.matches('\n').count() + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelId, RuleCatalog};
    use crate::rules::{Casing, CasingRule, EnumerationRule, ItemFormattingRule, SeparatorRule};

    fn selection(sep: &str, casing: Casing, item: &str, enumeration: &str) -> RuleSelection {
        let find_sep = SeparatorRule::defaults().into_iter().find(|r| r.name == sep).unwrap();
        let find_item = ItemFormattingRule::defaults()
            .into_iter()
            .find(|r| r.name == item)
            .unwrap();
        let find_enum = EnumerationRule::defaults()
            .into_iter()
            .find(|r| r.name == enumeration)
            .unwrap();
        RuleSelection::new(find_sep, CasingRule::for_casing(casing), find_item, find_enum)
    }

    #[test]
    fn general_default_renders_capitals_prompt_unchanged() {
        let catalog = RuleCatalog::builtin();
        let out = format(
            "List the capitals of France and Germany.",
            catalog.pipeline(ModelId::General),
        )
        .unwrap();
        assert_eq!(out, "List the capitals of France and Germany.");
    }

    #[test]
    fn rules_compose_in_fixed_order() {
        let sel = selection("Double Dash", Casing::Upper, "Brackets", "Roman Lower");
        let out = render(
            "Pick the best option:\n1. red\n2. blue",
            &sel,
            &Substitutions::new(),
        );
        // Casing runs before enumeration, so the roman numerals stay lower case.
        assert_eq!(out, "PICK THE BEST OPTION: -- [i] RED -- [ii] BLUE");
    }

    #[test]
    fn render_is_deterministic() {
        let sel = selection("Newline", Casing::Title, "Angle", "Alpha Upper");
        let subs = Substitutions::new().with("utilize", "use").with("assist", "help");
        let prompt = "Utilize the notes to assist:\n1) summarize\n2) UTILIZE examples";
        let first = render(prompt, &sel, &subs);
        for _ in 0..5 {
            assert_eq!(render(prompt, &sel, &subs), first);
        }
    }

    #[test]
    fn substitution_is_word_bounded_and_case_preserving() {
        assert_eq!(
            substitute_word("Utilize it; UTILIZE it; utilize it; reutilize", "utilize", "use"),
            "Use it; USE it; use it; reutilize"
        );
        assert_eq!(substitute_word("anything", "", "x"), "anything");
    }

    #[test]
    fn replacement_is_not_rewritten_by_another_entry() {
        let sel = RuleCatalog::builtin()
            .pipeline(ModelId::General)
            .default_selection()
            .unwrap();
        let subs = Substitutions::new().with("assist", "help").with("help", "aid");
        assert_eq!(render("Please assist me.", &sel, &subs), "Please help me.");
        assert_eq!(
            render("Help me assist them.", &sel, &subs),
            "Aid me help them."
        );

        let (text, trace) = render_traced("Please assist me.", &sel, &subs);
        assert_eq!(text, "Please help me.");
        let assist = trace.steps[0].changed.as_ref().unwrap();
        assert_eq!(assist.removed, "assist");
        assert_eq!(assist.inserted, "help");
        assert_eq!(assist.before, 7..13);
        // "help" does not occur in the input, so its step changed nothing.
        assert!(trace.steps[1].changed.is_none());
    }

    #[test]
    fn longer_word_wins_over_its_prefix() {
        let subs = Substitutions::new()
            .with("use", "apply")
            .with("use case", "scenario");
        let sel = selection("Empty", Casing::NoChange, "Parentheses", "Numeric");
        assert_eq!(
            render("Use case: use it", &sel, &subs),
            "Scenario: apply it"
        );
    }

    #[test]
    fn substitutions_run_before_rules() {
        let sel = selection("Space", Casing::Upper, "Parentheses", "Numeric");
        let subs = Substitutions::new().with("utilize", "use");
        assert_eq!(render("please utilize", &sel, &subs), "PLEASE USE");
    }

    #[test]
    fn traced_render_matches_plain_render() {
        let sel = selection("Pipe", Casing::Lower, "Paren", "Roman Upper");
        let subs = Substitutions::new().with("utilize", "use");
        let prompt = "Utilize these:\n1. Maps\n2. Notes";
        let (text, trace) = render_traced(prompt, &sel, &subs);
        assert_eq!(text, render(prompt, &sel, &subs));
        assert_eq!(trace.steps.len(), 5);
        assert_eq!(
            trace.steps[0].stage,
            TraceStage::Substitution {
                word: "utilize".into(),
                replacement: "use".into()
            }
        );
        // Minimal span: "U" and "e these..." are shared by "Utilize" and "Use".
        let sub_change = trace.steps[0].changed.as_ref().unwrap();
        assert_eq!(sub_change.removed, "tiliz");
        assert_eq!(sub_change.inserted, "s");
        assert_eq!(sub_change.before, 1..6);
        assert_eq!(sub_change.after, 1..2);
        let classes: Vec<RuleClass> = trace.steps[1..]
            .iter()
            .map(|s| match &s.stage {
                TraceStage::Rule { class, .. } => *class,
                other => panic!("unexpected stage {:?}", other),
            })
            .collect();
        assert_eq!(classes, RuleClass::ORDER.to_vec());
    }

    #[test]
    fn unchanged_stage_has_no_span() {
        let sel = selection("Empty", Casing::NoChange, "Parentheses", "Numeric");
        let (_, trace) = render_traced("one line", &sel, &Substitutions::new());
        assert_eq!(trace.changes().count(), 0);
    }

    #[test]
    fn diff_span_handles_multibyte_text() {
        let span = diff_span("café au lait", "café noir lait").unwrap();
        assert_eq!(span.removed, "au");
        assert_eq!(span.inserted, "noir");
        assert_eq!(span.before, 6..8);
    }

    #[test]
    fn analyze_reports_prompt_shape() {
        let a = analyze("Task: sort\n1. b\n2. a");
        assert_eq!(a.sections, 3);
        assert!(a.has_enumeration);
        assert!(a.has_fields);
        assert_eq!(a.length, 20);
    }
}
