//! Per-run search state and the report built from it.

use std::sync::Arc;

use serde::Serialize;

use crate::judge::NEUTRAL_SCORE;
use crate::rules::SelectionSummary;
use crate::variant::{PromptVariant, Substitutions};

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every iteration ran.
    Converged,
    /// The wall-clock or call budget ran out first.
    Exhausted,
    /// Every candidate of an iteration failed; only seen in the report carried by
    /// [`ImproveError::AllCandidatesFailed`](super::ImproveError::AllCandidatesFailed).
    Failed,
}

/// One judged candidate.
#[derive(Clone, Debug)]
pub struct EvaluationResult {
    pub variant: PromptVariant,
    pub response: String,
    /// Response of the best variant this candidate was judged against.
    pub baseline_response: Arc<str>,
    /// In `[0, 1]`; only meaningful relative to `baseline_response`.
    pub score: f64,
    /// True when the judge reply was unusable and the neutral score was substituted.
    pub recovered: bool,
}

/// Summary of one iteration.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IterationRecord {
    /// 1-based.
    pub iteration: usize,
    pub generated: usize,
    pub evaluated: usize,
    pub failed: usize,
    /// Not started or cut off by the budget.
    pub cancelled: usize,
    /// Highest score of the iteration, if anything was evaluated.
    pub max_score: Option<f64>,
    pub accepted: bool,
    /// Cumulative gain after this iteration.
    pub cumulative_gain: f64,
}

/// Result of an improve run. Serializable for `--json` output.
#[derive(Clone, Debug, Serialize)]
pub struct ImprovementReport {
    pub original_prompt: String,
    pub original_response: String,
    pub improved_prompt: String,
    pub improved_response: String,
    pub best_format: SelectionSummary,
    pub substitutions: Substitutions,
    /// Score recorded at the last acceptance; 0.5 when nothing was accepted.
    pub improvement_score: f64,
    /// Sum of accepted `score - 0.5` deltas.
    pub cumulative_gain: f64,
    pub num_candidates_evaluated: usize,
    pub all_scores: Vec<f64>,
    pub iterations: Vec<IterationRecord>,
    pub outcome: Outcome,
    pub warnings: Vec<String>,
}

/// Mutable state of one run: current best, its cached response and the history.
#[derive(Debug)]
pub struct SearchState {
    iteration: usize,
    best: PromptVariant,
    best_response: Arc<str>,
    best_score: f64,
    cumulative_gain: f64,
    original_response: Arc<str>,
    history: Vec<EvaluationResult>,
    iterations: Vec<IterationRecord>,
    warnings: Vec<String>,
}

impl SearchState {
    pub fn new(initial: PromptVariant, response: impl Into<Arc<str>>) -> Self {
        let response = response.into();
        Self {
            iteration: 0,
            best: initial,
            best_response: Arc::clone(&response),
            best_score: NEUTRAL_SCORE,
            cumulative_gain: 0.0,
            original_response: response,
            history: Vec::new(),
            iterations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn best(&self) -> &PromptVariant {
        &self.best
    }

    pub fn best_response(&self) -> Arc<str> {
        Arc::clone(&self.best_response)
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn cumulative_gain(&self) -> f64 {
        self.cumulative_gain
    }

    pub fn history(&self) -> &[EvaluationResult] {
        &self.history
    }

    pub(crate) fn begin_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub(crate) fn record(&mut self, result: EvaluationResult) {
        self.history.push(result);
    }

    pub(crate) fn warn(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Makes `winner` the current best. Only called with a score above neutral.
    pub(crate) fn accept(&mut self, winner: &EvaluationResult) {
        debug_assert!(winner.score > NEUTRAL_SCORE);
        self.best = winner.variant.clone();
        self.best_response = Arc::from(winner.response.as_str());
        self.best_score = winner.score;
        self.cumulative_gain += winner.score - NEUTRAL_SCORE;
    }

    pub(crate) fn finish_iteration(&mut self, mut record: IterationRecord) {
        record.cumulative_gain = self.cumulative_gain;
        self.iterations.push(record);
    }

    pub fn report(&self, original_prompt: &str, outcome: Outcome) -> ImprovementReport {
        ImprovementReport {
            original_prompt: original_prompt.to_string(),
            original_response: self.original_response.to_string(),
            improved_prompt: self.best.rendered().to_string(),
            improved_response: self.best_response.to_string(),
            best_format: self.best.selection().summary(),
            substitutions: self.best.substitutions().clone(),
            improvement_score: self.best_score,
            cumulative_gain: self.cumulative_gain,
            num_candidates_evaluated: self.history.len(),
            all_scores: self.history.iter().map(|r| r.score).collect(),
            iterations: self.iterations.clone(),
            outcome,
            warnings: self.warnings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelId, RuleCatalog};

    fn variant(prompt: &str, subs: Substitutions) -> PromptVariant {
        let sel = RuleCatalog::builtin()
            .pipeline(ModelId::General)
            .default_selection()
            .unwrap();
        PromptVariant::new(Arc::from(prompt), sel, subs)
    }

    fn result(score: f64) -> EvaluationResult {
        EvaluationResult {
            variant: variant("utilize it", Substitutions::new().with("utilize", "use")),
            response: "better".into(),
            baseline_response: Arc::from("base"),
            score,
            recovered: false,
        }
    }

    #[test]
    fn initial_state_is_neutral() {
        let state = SearchState::new(variant("utilize it", Substitutions::new()), "base");
        assert_eq!(state.best_score(), NEUTRAL_SCORE);
        assert_eq!(state.cumulative_gain(), 0.0);
        let report = state.report("utilize it", Outcome::Converged);
        assert_eq!(report.improved_prompt, "utilize it");
        assert_eq!(report.original_response, "base");
        assert_eq!(report.num_candidates_evaluated, 0);
    }

    #[test]
    fn accept_moves_best_and_accumulates_gain() {
        let mut state = SearchState::new(variant("utilize it", Substitutions::new()), "base");
        let winner = result(0.9);
        state.record(winner.clone());
        state.accept(&winner);
        assert_eq!(state.best().rendered(), "use it");
        assert_eq!(&*state.best_response(), "better");
        assert!((state.cumulative_gain() - 0.4).abs() < 1e-12);
        let report = state.report("utilize it", Outcome::Converged);
        assert_eq!(report.original_response, "base");
        assert_eq!(report.all_scores, vec![0.9]);
        assert_eq!(report.substitutions.get("utilize"), Some("use"));
    }

    #[test]
    fn report_serializes_outcome_snake_case() {
        let state = SearchState::new(variant("x", Substitutions::new()), "r");
        let json = serde_json::to_value(state.report("x", Outcome::Exhausted)).unwrap();
        assert_eq!(json["outcome"], "exhausted");
        assert_eq!(json["best_format"]["separator"], "Empty");
    }
}
