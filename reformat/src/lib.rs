//! # Reformat
//!
//! Rule-driven prompt formatting and a feedback-driven search over formatting choices.
//!
//! ## Two strategies
//!
//! - **Reformatter**: [`render`] applies synonym substitutions and then one rule of each
//!   class (separator → casing → item formatting → enumeration) to a prompt. Pure and
//!   deterministic; [`render_traced`] also reports which stage changed which span.
//! - **Improver**: [`Improver::improve`] proposes variants with the [`CandidateGenerator`],
//!   gets the target model's answer for each through a [`ResponseClient`], asks a
//!   [`Judge`] whether it beats the current best, and feeds accepted substitutions back
//!   into a [`SynonymStore`].
//!
//! ## Main modules
//!
//! - [`rules`]: [`FormatRule`], [`RuleClass`], [`RuleSelection`].
//! - [`catalog`]: [`ModelId`], [`RulePipeline`], [`RuleCatalog`].
//! - [`reformatter`]: [`render`], [`format`], [`render_traced`], [`analyze`].
//! - [`template`]: [`PromptTemplate`] and [`render_template`].
//! - [`synonym`]: [`SynonymStore`] with [`InMemorySynonymStore`] and [`SqliteSynonymStore`];
//!   [`Lexicon`] of candidate replacements.
//! - [`generator`]: [`CandidateGenerator`].
//! - [`llm`]: [`LlmClient`], [`ChatOpenAI`], [`MockLlm`], [`RetryPolicy`].
//! - [`response`], [`judge`]: the target-model and evaluator-model seams.
//! - [`improver`]: [`Improver`], [`ImproverConfig`], [`ImprovementReport`].
//!
//! ## Quick start
//!
//! ```rust
//! use reformat::{format, ModelId, RuleCatalog};
//!
//! let catalog = RuleCatalog::builtin();
//! let prompt = "List the capitals of France and Germany.";
//! let out = format(prompt, catalog.pipeline(ModelId::General)).unwrap();
//! assert_eq!(out, prompt);
//! ```

pub mod catalog;
pub mod error;
pub mod generator;
pub mod improver;
pub mod judge;
pub mod llm;
pub mod reformatter;
pub mod response;
pub mod rules;
pub mod synonym;
pub mod template;
pub mod variant;

pub use catalog::{ModelId, Provider, RuleCatalog, RulePipeline};
pub use error::{
    ConfigurationError, ExternalServiceError, JudgeError, JudgeParseError, StoreError,
};
pub use generator::CandidateGenerator;
pub use improver::{
    EvaluationResult, ImproveError, ImprovementReport, Improver, ImproverConfig,
    IterationRecord, Outcome, SearchState,
};
pub use judge::{check_score, parse_score, Judge, LlmJudge, NEUTRAL_SCORE};
pub use llm::{ChatOpenAI, LlmClient, LlmResponse, Message, MockLlm, RetryPolicy};
pub use reformatter::{analyze, format, render, render_traced, PromptAnalysis, RenderTrace};
pub use response::{ModelResponder, ResponseClient};
pub use rules::{FormatRule, RuleClass, RuleSelection, SelectionSummary};
pub use synonym::{
    InMemorySynonymStore, Lexicon, RankedReplacement, SqliteSynonymStore, SynonymSnapshot,
    SynonymStore,
};
pub use template::{render_template, FieldValue, PromptTemplate, TemplateFields};
pub use variant::{PromptVariant, Substitutions};
