//! Feedback-driven format search.
//!
//! The [`Improver`] runs `Init → Iterating → Converged | Exhausted`:
//!
//! - **Init**: the prompt rendered with the model's default selection becomes the current
//!   best; its response is fetched once and cached as the judge baseline.
//! - **Iterating**: generate candidates, evaluate them concurrently against the cached
//!   baseline, and accept the top score when it is above 0.5. Acceptance replaces the best
//!   and the baseline and merges the winner's substitutions into the synonym store with
//!   `score - 0.5`.
//! - **Converged** after the last iteration; **Exhausted** when the wall-clock or call
//!   budget stops the run early.
//!
//! Judge replies that cannot be parsed score 0.5 and are reported as warnings. An
//! iteration where every candidate failed ends the run with
//! [`ImproveError::AllCandidatesFailed`], which still carries the best-so-far report.

mod evaluate;
mod state;

pub use state::{EvaluationResult, ImprovementReport, IterationRecord, Outcome, SearchState};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::catalog::{ModelId, RuleCatalog};
use crate::error::{ConfigurationError, ExternalServiceError, StoreError};
use crate::generator::CandidateGenerator;
use crate::judge::{Judge, NEUTRAL_SCORE};
use crate::llm::RetryPolicy;
use crate::response::ResponseClient;
use crate::synonym::{Lexicon, SynonymSnapshot, SynonymStore};
use crate::variant::{PromptVariant, Substitutions};

use evaluate::{baseline_response, evaluate_batch, Budget, CandidateOutcome, EvalContext};

/// Failure of an improve run.
#[derive(Debug, Error)]
pub enum ImproveError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The initial best's response could not be obtained.
    #[error("baseline response failed: {0}")]
    Baseline(ExternalServiceError),

    /// Every candidate of one iteration failed. `best_so_far` is the degraded report.
    #[error("all {failed} candidates failed in iteration {iteration}")]
    AllCandidatesFailed {
        iteration: usize,
        failed: usize,
        best_so_far: Box<ImprovementReport>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The blocking generation task was cancelled before it finished.
    #[error("candidate generation did not complete: {0}")]
    Generation(String),
}

/// Search parameters.
#[derive(Clone, Debug)]
pub struct ImproverConfig {
    pub num_candidates: usize,
    pub num_iterations: usize,
    /// 0 is greedy, 1 is uniform.
    pub temperature: f64,
    /// Candidates evaluated at once.
    pub max_concurrency: usize,
    /// Per-attempt timeout of every external call.
    pub call_timeout: Option<Duration>,
    /// Wall-clock budget for the whole run.
    pub wall_clock_budget: Option<Duration>,
    /// Call budget for the whole run, baseline included.
    pub max_calls: Option<usize>,
    pub retry: RetryPolicy,
    pub seed: Option<u64>,
    /// Also merge the substitutions of evaluated, non-winning candidates.
    pub learn_from_rejected: bool,
}

impl Default for ImproverConfig {
    fn default() -> Self {
        Self {
            num_candidates: 10,
            num_iterations: 3,
            temperature: 0.1,
            max_concurrency: 4,
            call_timeout: Some(Duration::from_secs(60)),
            wall_clock_budget: None,
            max_calls: None,
            retry: RetryPolicy::default(),
            seed: None,
            learn_from_rejected: false,
        }
    }
}

impl ImproverConfig {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigurationError::InvalidParameter {
                name: "temperature",
                reason: format!("{} is outside [0, 1]", self.temperature),
            });
        }
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "max_concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Orchestrates generation, evaluation, selection and store updates for one model.
pub struct Improver {
    model: ModelId,
    catalog: Arc<RuleCatalog>,
    client: Arc<dyn ResponseClient>,
    judge: Arc<dyn Judge>,
    store: Arc<dyn SynonymStore>,
    lexicon: Lexicon,
    config: ImproverConfig,
}

impl Improver {
    pub fn new(
        model: ModelId,
        client: Arc<dyn ResponseClient>,
        judge: Arc<dyn Judge>,
        store: Arc<dyn SynonymStore>,
    ) -> Self {
        Self {
            model,
            catalog: Arc::new(RuleCatalog::builtin()),
            client,
            judge,
            store,
            lexicon: Lexicon::builtin(),
            config: ImproverConfig::default(),
        }
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    pub fn with_config(mut self, config: ImproverConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the search on `prompt` and returns the best variant found.
    pub async fn improve(&self, prompt: &str) -> Result<ImprovementReport, ImproveError> {
        self.config.validate()?;
        let pipeline = self.catalog.pipeline(self.model);
        let initial = PromptVariant::new(
            Arc::from(prompt),
            pipeline.default_selection()?,
            Substitutions::new(),
        );

        let ctx = Arc::new(EvalContext {
            client: Arc::clone(&self.client),
            judge: Arc::clone(&self.judge),
            retry: self.config.retry.clone(),
            call_timeout: self.config.call_timeout,
            budget: Arc::new(Budget::new(
                self.config.wall_clock_budget,
                self.config.max_calls,
            )),
            permits: Arc::new(Semaphore::new(self.config.max_concurrency)),
        });

        let baseline = baseline_response(&ctx, initial.rendered())
            .await
            .map_err(ImproveError::Baseline)?;
        info!(model = %self.model, chars = initial.rendered().len(), "baseline response cached");

        let query: Arc<str> = Arc::from(prompt);
        let mut state = SearchState::new(initial, baseline);
        let mut generator = CandidateGenerator::new(self.config.seed);
        let mut outcome = Outcome::Converged;

        for _ in 0..self.config.num_iterations {
            if ctx.budget.is_exhausted() {
                outcome = Outcome::Exhausted;
                break;
            }
            let iteration = state.begin_iteration();
            let snapshot = SynonymSnapshot::collect(self.store.as_ref(), &self.lexicon, prompt).await?;
            let (returned, candidates) =
                self.generate(generator, snapshot, state.best().clone()).await?;
            generator = returned;
            info!(
                iteration,
                of = self.config.num_iterations,
                candidates = candidates.len(),
                "iteration started"
            );

            let mut record = IterationRecord {
                iteration,
                generated: candidates.len(),
                evaluated: 0,
                failed: 0,
                cancelled: 0,
                max_score: None,
                accepted: false,
                cumulative_gain: 0.0,
            };
            if candidates.is_empty() {
                info!(iteration, "no new candidates");
                state.finish_iteration(record);
                continue;
            }

            let batch =
                evaluate_batch(&ctx, Arc::clone(&query), state.best_response(), candidates).await;

            let mut evaluated: Vec<EvaluationResult> = Vec::new();
            for candidate in batch.outcomes {
                match candidate {
                    CandidateOutcome::Evaluated(result) => {
                        if result.recovered {
                            state.warn(format!(
                                "iteration {}: judge output unusable for {:?}, scored {}",
                                iteration,
                                truncate(result.variant.rendered()),
                                NEUTRAL_SCORE
                            ));
                        }
                        evaluated.push(result);
                    }
                    CandidateOutcome::Failed { variant, error } => {
                        warn!(iteration, error = %error, "candidate failed");
                        debug!(prompt = %variant.rendered(), "failed candidate");
                        record.failed += 1;
                    }
                    CandidateOutcome::Cancelled(_) => record.cancelled += 1,
                }
            }
            record.evaluated = evaluated.len();

            if evaluated.is_empty() && record.failed > 0 && !batch.exhausted {
                state.finish_iteration(record.clone());
                return Err(ImproveError::AllCandidatesFailed {
                    iteration,
                    failed: record.failed,
                    best_so_far: Box::new(state.report(prompt, Outcome::Failed)),
                });
            }

            let winner = select_best(&evaluated);
            record.max_score = winner.map(|i| evaluated[i].score);
            if let Some(i) = winner.filter(|i| evaluated[*i].score > NEUTRAL_SCORE) {
                let won = &evaluated[i];
                let delta = won.score - NEUTRAL_SCORE;
                state.accept(won);
                self.merge_substitutions(won.variant.substitutions(), delta).await?;
                record.accepted = true;
                info!(iteration, score = won.score, gain = state.cumulative_gain(), "new best accepted");
            } else {
                info!(iteration, max_score = ?record.max_score, "no improvement");
            }

            if self.config.learn_from_rejected {
                for (i, result) in evaluated.iter().enumerate() {
                    if record.accepted && Some(i) == winner {
                        continue;
                    }
                    self.merge_substitutions(
                        result.variant.substitutions(),
                        result.score - NEUTRAL_SCORE,
                    )
                    .await?;
                }
            }

            for result in evaluated {
                state.record(result);
            }
            state.finish_iteration(record);

            if batch.exhausted {
                outcome = Outcome::Exhausted;
                break;
            }
        }

        info!(
            outcome = ?outcome,
            best_score = state.best_score(),
            calls = ctx.budget.calls(),
            "improve finished"
        );
        Ok(state.report(prompt, outcome))
    }

    /// Runs the generator on the blocking pool so rendering a small space in full does
    /// not stall the runtime; the generator is handed back for the next iteration.
    async fn generate(
        &self,
        mut generator: CandidateGenerator,
        snapshot: SynonymSnapshot,
        best: PromptVariant,
    ) -> Result<(CandidateGenerator, Vec<PromptVariant>), ImproveError> {
        let catalog = Arc::clone(&self.catalog);
        let model = self.model;
        let n = self.config.num_candidates;
        let temperature = self.config.temperature;
        let joined = tokio::task::spawn_blocking(move || {
            let out = generator.generate(n, temperature, catalog.pipeline(model), &snapshot, &best);
            (generator, out)
        })
        .await;
        match joined {
            Ok((generator, out)) => Ok((generator, out?)),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(ImproveError::Generation(e.to_string())),
        }
    }

    async fn merge_substitutions(&self, subs: &Substitutions, delta: f64) -> Result<(), StoreError> {
        for (word, replacement) in subs.iter() {
            let estimate = self.store.merge(word, replacement, delta).await?;
            debug!(word, replacement, delta, estimate, "synonym merged");
        }
        Ok(())
    }
}

/// Index of the highest score; the earliest candidate wins ties.
fn select_best(results: &[EvaluationResult]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, r) in results.iter().enumerate() {
        if best.map_or(true, |b| r.score > results[b].score) {
            best = Some(i);
        }
    }
    best
}

fn truncate(text: &str) -> String {
    const MAX: usize = 60;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
