//! Pairwise response judging.
//!
//! A [`Judge`] rates how much better a candidate response is than a baseline response to
//! the same query, on `[0, 1]`. 0.5 is neutral. Replies that are not exactly one number in
//! range are a [`JudgeParseError`]; they are never clamped.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{JudgeError, JudgeParseError};
use crate::llm::{LlmClient, Message};

/// Score used when the judge output cannot be parsed.
pub const NEUTRAL_SCORE: f64 = 0.5;

const SYSTEM_PROMPT: &str = "You are an expert evaluating response quality.";

#[async_trait]
pub trait Judge: Send + Sync {
    /// Score in `[0, 1]`: how much better `candidate` answers `query` than `baseline`.
    async fn compare(&self, query: &str, baseline: &str, candidate: &str)
        -> Result<f64, JudgeError>;
}

/// Judge backed by an evaluator model.
pub struct LlmJudge {
    llm: Arc<dyn LlmClient>,
}

impl LlmJudge {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

fn evaluation_prompt(query: &str, baseline: &str, candidate: &str) -> String {
    format!(
        "Compare and evaluate these two responses to determine if the second response is better than the first.

Prompt:
{query}

Response 1:
{baseline}

Response 2:
{candidate}

Consider the following criteria:
1. Accuracy and correctness of information
2. Completeness of the answer
3. Relevance to the query
4. Clarity and coherence of the response

Rate how much better Response 2 is compared to Response 1 on a scale from 0 to 1, where:
0 = Response 2 is much worse than Response 1
0.5 = Response 2 is about as good as Response 1
1 = Response 2 is significantly better than Response 1

Provide only the numerical score (e.g., 0.85) without any explanation."
    )
}

/// Parses a judge reply: one finite number in `[0, 1]`, surrounding whitespace allowed.
pub fn parse_score(raw: &str) -> Result<f64, JudgeParseError> {
    let trimmed = raw.trim();
    let err = || JudgeParseError {
        raw: trimmed.to_string(),
    };
    let score: f64 = trimmed.parse().map_err(|_| err())?;
    check_score(score).map_err(|_| err())
}

/// Accepts a score only when it is finite and in `[0, 1]`.
pub fn check_score(score: f64) -> Result<f64, JudgeParseError> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(JudgeParseError {
            raw: score.to_string(),
        })
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn compare(
        &self,
        query: &str,
        baseline: &str,
        candidate: &str,
    ) -> Result<f64, JudgeError> {
        let messages = [
            Message::system(SYSTEM_PROMPT),
            Message::user(evaluation_prompt(query, baseline, candidate)),
        ];
        let response = self.llm.invoke(&messages).await?;
        let score = parse_score(&response.content)?;
        debug!(model = %self.llm.model(), score, "judge score");
        Ok(score)
    }
}
