//! Concurrent evaluation of one iteration's candidates.
//!
//! Each candidate runs as its own task: a permit from the shared semaphore, then the
//! target-model call and the judge call, each retried under the policy with a per-attempt
//! timeout. Every attempt first takes a slot from the [`Budget`]; once the call count or
//! the deadline is used up, remaining candidates are cancelled.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::state::EvaluationResult;
use crate::error::{ExternalServiceError, JudgeError, JudgeParseError};
use crate::judge::{check_score, Judge, NEUTRAL_SCORE};
use crate::llm::{call_with_retry, RetryPolicy, RetryableError};
use crate::response::ResponseClient;
use crate::variant::PromptVariant;

/// Wall-clock deadline and call-count limit shared by every call of one run.
#[derive(Debug)]
pub(crate) struct Budget {
    deadline: Option<Instant>,
    max_calls: Option<usize>,
    calls: AtomicUsize,
}

impl Budget {
    pub(crate) fn new(wall_clock: Option<Duration>, max_calls: Option<usize>) -> Self {
        Self {
            deadline: wall_clock.map(|d| Instant::now() + d),
            max_calls,
            calls: AtomicUsize::new(0),
        }
    }

    /// Counts a call that is made regardless of the budget.
    pub(crate) fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// Takes one call slot; false when the budget is spent.
    pub(crate) fn try_acquire_call(&self) -> bool {
        if self.deadline_passed() {
            return false;
        }
        match self.max_calls {
            None => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(max) => self
                .calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                .is_ok(),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.deadline_passed() || self.max_calls.is_some_and(|max| self.calls() >= max)
    }
}

/// Failure of one attempt, as seen by the retry loop.
#[derive(Debug)]
enum CallError {
    Service(ExternalServiceError),
    Budget,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Service(e) => e.fmt(f),
            CallError::Budget => f.write_str("budget exhausted"),
        }
    }
}

impl RetryableError for CallError {
    fn is_transient(&self) -> bool {
        match self {
            CallError::Service(e) => e.is_transient(),
            CallError::Budget => false,
        }
    }

    fn timed_out(after: Duration) -> Self {
        CallError::Service(ExternalServiceError::Timeout(after))
    }
}

/// Shared collaborators and limits for every candidate of a run.
pub(crate) struct EvalContext {
    pub client: Arc<dyn ResponseClient>,
    pub judge: Arc<dyn Judge>,
    pub retry: RetryPolicy,
    pub call_timeout: Option<Duration>,
    pub budget: Arc<Budget>,
    pub permits: Arc<Semaphore>,
}

/// What happened to one candidate.
#[derive(Debug)]
pub(crate) enum CandidateOutcome {
    Evaluated(EvaluationResult),
    Failed {
        variant: PromptVariant,
        error: ExternalServiceError,
    },
    Cancelled(PromptVariant),
}

pub(crate) struct BatchOutcome {
    /// One entry per candidate, in generation order.
    pub outcomes: Vec<CandidateOutcome>,
    /// True when the budget cut the batch short.
    pub exhausted: bool,
}

/// Baseline response for the initial best; counted against the call budget but never
/// refused by it.
pub(crate) async fn baseline_response(
    ctx: &EvalContext,
    prompt: &str,
) -> Result<String, ExternalServiceError> {
    call_with_retry(&ctx.retry, ctx.call_timeout, "baseline", move || {
        ctx.budget.record_call();
        ctx.client.send(prompt)
    })
    .await
}

async fn respond(ctx: &EvalContext, prompt: &str) -> Result<String, CallError> {
    call_with_retry(&ctx.retry, ctx.call_timeout, "response", move || async move {
        if !ctx.budget.try_acquire_call() {
            return Err(CallError::Budget);
        }
        ctx.client.send(prompt).await.map_err(CallError::Service)
    })
    .await
}

/// Judge score; an unparseable or out-of-range score is a successful call with an
/// unusable reply.
async fn judge(
    ctx: &EvalContext,
    query: &str,
    baseline: &str,
    candidate: &str,
) -> Result<Result<f64, JudgeParseError>, CallError> {
    call_with_retry(&ctx.retry, ctx.call_timeout, "judge", move || async move {
        if !ctx.budget.try_acquire_call() {
            return Err(CallError::Budget);
        }
        match ctx.judge.compare(query, baseline, candidate).await {
            Ok(score) => Ok(check_score(score)),
            Err(JudgeError::Parse(e)) => Ok(Err(e)),
            Err(JudgeError::Service(e)) => Err(CallError::Service(e)),
        }
    })
    .await
}

async fn evaluate_one(
    ctx: Arc<EvalContext>,
    query: Arc<str>,
    baseline: Arc<str>,
    variant: PromptVariant,
) -> CandidateOutcome {
    let _permit = match Arc::clone(&ctx.permits).acquire_owned().await {
        Ok(p) => p,
        Err(_) => return CandidateOutcome::Cancelled(variant),
    };

    let responded = respond(&ctx, variant.rendered()).await;
    let response = match responded {
        Ok(r) => r,
        Err(CallError::Budget) => return CandidateOutcome::Cancelled(variant),
        Err(CallError::Service(error)) => return CandidateOutcome::Failed { variant, error },
    };

    let judged = judge(&ctx, &query, &baseline, &response).await;
    let (score, recovered) = match judged {
        Ok(Ok(score)) => (score, false),
        Ok(Err(parse)) => {
            warn!(raw = %parse.raw, "judge output unusable, using neutral score");
            (NEUTRAL_SCORE, true)
        }
        Err(CallError::Budget) => return CandidateOutcome::Cancelled(variant),
        Err(CallError::Service(error)) => return CandidateOutcome::Failed { variant, error },
    };
    debug!(score, recovered, "candidate evaluated");

    CandidateOutcome::Evaluated(EvaluationResult {
        variant,
        response,
        baseline_response: baseline,
        score,
        recovered,
    })
}

/// Evaluates `candidates` concurrently and waits for all of them, or for the deadline.
pub(crate) async fn evaluate_batch(
    ctx: &Arc<EvalContext>,
    query: Arc<str>,
    baseline: Arc<str>,
    candidates: Vec<PromptVariant>,
) -> BatchOutcome {
    let mut tasks = JoinSet::new();
    for (idx, variant) in candidates.iter().cloned().enumerate() {
        let ctx = Arc::clone(ctx);
        let query = Arc::clone(&query);
        let baseline = Arc::clone(&baseline);
        tasks.spawn(async move { (idx, evaluate_one(ctx, query, baseline, variant).await) });
    }

    let mut slots: Vec<Option<CandidateOutcome>> = candidates.iter().map(|_| None).collect();
    let mut exhausted = false;
    loop {
        let joined = match ctx.budget.deadline {
            Some(deadline) => tokio::select! {
                joined = tasks.join_next() => joined,
                _ = tokio::time::sleep_until(deadline) => {
                    tasks.abort_all();
                    exhausted = true;
                    None
                }
            },
            None => tasks.join_next().await,
        };
        match joined {
            None => break,
            Some(Ok((idx, outcome))) => slots[idx] = Some(outcome),
            Some(Err(e)) => warn!(error = %e, "candidate task did not complete"),
        }
    }

    let outcomes: Vec<CandidateOutcome> = slots
        .into_iter()
        .zip(candidates)
        .map(|(slot, variant)| match slot {
            Some(outcome) => outcome,
            None if exhausted => CandidateOutcome::Cancelled(variant),
            None => CandidateOutcome::Failed {
                variant,
                error: ExternalServiceError::Api("evaluation task aborted".to_string()),
            },
        })
        .collect();
    exhausted |= outcomes
        .iter()
        .any(|o| matches!(o, CandidateOutcome::Cancelled(_)));
    BatchOutcome {
        outcomes,
        exhausted,
    }
}
