//! Library side of the `reformat` binary: input/output helpers and the two commands.
//!
//! `main.rs` parses flags into [`FormatOptions`] / [`ImproveOptions`] and calls
//! [`run_format`] or [`run_improve`]; everything here is usable without clap.

use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reformat::{
    render_template, render_traced, ChatOpenAI, ConfigurationError, ImproveError,
    ImprovementReport, Improver, ImproverConfig, InMemorySynonymStore, Lexicon, LlmJudge,
    ModelId, ModelResponder, Outcome, PromptTemplate, RenderTrace, RuleCatalog,
    SqliteSynonymStore, StoreError, Substitutions, SynonymStore, TemplateFields,
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("no input: pass a prompt or pipe it through stdin")]
    NoInput,
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Improve(#[from] ImproveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Prompt from the argument, else from `stdin` when it is not a terminal.
pub fn read_input(
    arg: Option<String>,
    mut stdin: impl Read,
    stdin_is_tty: bool,
) -> Result<String, CliError> {
    if let Some(prompt) = arg.filter(|p| !p.trim().is_empty()) {
        return Ok(prompt);
    }
    if stdin_is_tty {
        return Err(CliError::NoInput);
    }
    let mut buf = String::new();
    stdin.read_to_string(&mut buf)?;
    let prompt = buf.trim().to_string();
    if prompt.is_empty() {
        return Err(CliError::NoInput);
    }
    Ok(prompt)
}

/// Reads the prompt from the argument or the process stdin.
pub fn read_prompt(arg: Option<String>) -> Result<String, CliError> {
    let stdin = std::io::stdin();
    let is_tty = stdin.is_terminal();
    read_input(arg, stdin.lock(), is_tty)
}

/// Writes `text` to `path`, or to stdout followed by a newline.
pub fn write_output(text: &str, path: Option<&Path>) -> std::io::Result<()> {
    match path {
        Some(path) => std::fs::write(path, text),
        None => {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", text)?;
            out.flush()
        }
    }
}

#[derive(Clone, Debug)]
pub struct FormatOptions {
    pub prompt: Option<String>,
    pub model: ModelId,
    /// Render a built-in template from a JSON fields file instead of a prompt.
    pub template: Option<String>,
    pub fields: Option<PathBuf>,
}

#[derive(Debug)]
pub struct FormatOutput {
    pub text: String,
    pub input_len: usize,
    /// Per-stage changes; `None` for template rendering.
    pub trace: Option<RenderTrace>,
}

/// Renders the prompt (or template) with the model's default rule selection.
pub fn run_format(opts: FormatOptions, catalog: &RuleCatalog) -> Result<FormatOutput, CliError> {
    let selection = catalog.pipeline(opts.model).default_selection()?;
    if let Some(name) = opts.template.as_deref() {
        let template = PromptTemplate::by_name(name)?;
        let fields: TemplateFields = match &opts.fields {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => TemplateFields::new(),
        };
        let text = render_template(&template, &fields, &selection)?;
        return Ok(FormatOutput {
            input_len: 0,
            text,
            trace: None,
        });
    }

    let prompt = read_prompt(opts.prompt)?;
    let (text, trace) = render_traced(&prompt, &selection, &Substitutions::new());
    Ok(FormatOutput {
        input_len: prompt.len(),
        text,
        trace: Some(trace),
    })
}

/// Human-readable lines for `-v`.
pub fn describe_format(model: ModelId, out: &FormatOutput) -> String {
    let mut lines = vec![
        format!("Model: {}", model),
        "Applied formatting:".to_string(),
        format!("  Input length: {}", out.input_len),
        format!("  Output length: {}", out.text.len()),
    ];
    if let Some(trace) = &out.trace {
        for step in trace.changes() {
            let stage = serde_json::to_string(&step.stage).unwrap_or_default();
            if let Some(span) = &step.changed {
                lines.push(format!(
                    "  {} {:?} -> {:?} at {}..{}",
                    stage, span.removed, span.inserted, span.before.start, span.before.end
                ));
            }
        }
    }
    lines.push("---".to_string());
    lines.join("\n")
}

#[derive(Clone, Debug)]
pub struct ImproveOptions {
    pub prompt: Option<String>,
    pub api_key: Option<String>,
    pub model: ModelId,
    pub judge_model: ModelId,
    pub num_candidates: usize,
    pub num_iterations: usize,
    pub temperature: f64,
    pub synonym_db: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
    pub seed: Option<u64>,
    pub concurrency: usize,
    pub timeout: Option<Duration>,
    pub budget: Option<Duration>,
    pub max_calls: Option<usize>,
}

/// Key for `model`: the explicit key when the provider matches `primary`, else the
/// provider's environment variable.
fn api_key_for(model: ModelId, primary: ModelId, explicit: Option<&str>) -> Result<String, ConfigurationError> {
    let env_var = model.provider().api_key_env();
    explicit
        .filter(|_| model.provider() == primary.provider())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|k| !k.trim().is_empty())
        .ok_or(ConfigurationError::MissingApiKey { env_var })
}

/// Synonym store chosen by `--synonym-db`: a `.json` path is loaded into memory and saved
/// back after the run, any other path is a SQLite file.
enum StoreHandle {
    Memory {
        store: Arc<InMemorySynonymStore>,
        save_to: Option<PathBuf>,
    },
    Sqlite(Arc<SqliteSynonymStore>),
}

impl StoreHandle {
    fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        Ok(match path {
            Some(p) if p.extension().is_some_and(|e| e == "json") => StoreHandle::Memory {
                store: Arc::new(InMemorySynonymStore::load(p)?),
                save_to: Some(p.to_path_buf()),
            },
            Some(p) => StoreHandle::Sqlite(Arc::new(SqliteSynonymStore::new(p)?)),
            None => StoreHandle::Memory {
                store: Arc::new(InMemorySynonymStore::new()),
                save_to: None,
            },
        })
    }

    fn shared(&self) -> Arc<dyn SynonymStore> {
        match self {
            StoreHandle::Memory { store, .. } => Arc::clone(store) as Arc<dyn SynonymStore>,
            StoreHandle::Sqlite(store) => Arc::clone(store) as Arc<dyn SynonymStore>,
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let StoreHandle::Memory {
            store,
            save_to: Some(path),
        } = self
        {
            store.save(path)?;
        }
        Ok(())
    }
}

/// Target and evaluator both answer deterministically so judge comparisons measure the
/// format rather than sampling noise.
const TARGET_TEMPERATURE: f32 = 0.0;
const JUDGE_TEMPERATURE: f32 = 0.0;

/// Clients for the target model and the judge's evaluator model.
fn model_clients(opts: &ImproveOptions) -> Result<(ChatOpenAI, ChatOpenAI), CliError> {
    let key = api_key_for(opts.model, opts.model, opts.api_key.as_deref())?;
    let judge_key = api_key_for(opts.judge_model, opts.model, opts.api_key.as_deref())?;
    Ok((
        ChatOpenAI::for_model(opts.model, key).with_temperature(TARGET_TEMPERATURE),
        ChatOpenAI::for_model(opts.judge_model, judge_key).with_temperature(JUDGE_TEMPERATURE),
    ))
}

/// The run's result after saving the store; a save failure never hides an improve error.
fn settle(
    result: Result<ImprovementReport, ImproveError>,
    saved: Result<(), StoreError>,
) -> Result<ImprovementReport, CliError> {
    match (result, saved) {
        (Ok(report), saved) => {
            saved?;
            Ok(report)
        }
        (Err(e), Ok(())) => Err(e.into()),
        (Err(e), Err(save_err)) => {
            warn!(error = %save_err, "synonym store not saved");
            Err(e.into())
        }
    }
}

/// Runs the improve loop against the hosted models.
pub async fn run_improve(opts: ImproveOptions) -> Result<ImprovementReport, CliError> {
    let (target, evaluator) = model_clients(&opts)?;
    let (target, evaluator) = (Arc::new(target), Arc::new(evaluator));

    let mut lexicon = Lexicon::builtin();
    if let Some(path) = &opts.lexicon {
        lexicon.extend(Lexicon::load(path)?);
    }
    let store = StoreHandle::open(opts.synonym_db.as_deref())?;

    let config = ImproverConfig {
        num_candidates: opts.num_candidates,
        num_iterations: opts.num_iterations,
        temperature: opts.temperature,
        max_concurrency: opts.concurrency,
        call_timeout: opts.timeout,
        wall_clock_budget: opts.budget,
        max_calls: opts.max_calls,
        seed: opts.seed,
        ..ImproverConfig::default()
    };
    let improver = Improver::new(
        opts.model,
        Arc::new(ModelResponder::new(target)),
        Arc::new(LlmJudge::new(evaluator)),
        store.shared(),
    )
    .with_lexicon(lexicon)
    .with_config(config);

    let prompt = read_prompt(opts.prompt)?;
    info!(model = %opts.model, judge = %opts.judge_model, "improving prompt");
    let result = improver.improve(&prompt).await;

    // Accepted substitutions are kept even when the run itself failed.
    settle(result, store.persist())
}

/// Plain-text report: prompts, responses, winning format, score summary.
pub fn describe_report(report: &ImprovementReport, verbose: bool) -> String {
    let rule = "=".repeat(40);
    let mut out = Vec::new();
    for (title, body) in [
        ("Original Prompt", &report.original_prompt),
        ("Improved Prompt", &report.improved_prompt),
        ("Original Response", &report.original_response),
        ("Improved Response", &report.improved_response),
    ] {
        out.push(format!("{}:\n{}\n{}\n", title, rule, body));
    }

    let f = &report.best_format;
    out.push(format!(
        "Best Format Found:\n{}\nseparator: {}\ncasing: {}\nitem_formatting: {}\nenumeration: {}",
        rule, f.separator, f.casing, f.item_formatting, f.enumeration
    ));
    for (word, replacement) in report.substitutions.iter() {
        out.push(format!("substitution: {} -> {}", word, replacement));
    }

    out.push(format!("\nImprovement Score: {:.3}", report.improvement_score));
    out.push(format!("Cumulative Gain: {:.3}", report.cumulative_gain));
    out.push(format!("Candidates evaluated: {}", report.num_candidates_evaluated));
    if !report.all_scores.is_empty() {
        let min = report.all_scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = report.all_scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = report.all_scores.iter().sum::<f64>() / report.all_scores.len() as f64;
        out.push(format!("Scores: min {:.3}, max {:.3}, avg {:.3}", min, max, avg));
    }
    if report.outcome == Outcome::Exhausted {
        out.push("Budget exhausted before the last iteration.".to_string());
    }
    if verbose {
        for it in &report.iterations {
            out.push(format!(
                "iteration {}: generated {}, evaluated {}, failed {}, cancelled {}, max {}, {}",
                it.iteration,
                it.generated,
                it.evaluated,
                it.failed,
                it.cancelled,
                it.max_score.map_or("-".to_string(), |s| format!("{:.3}", s)),
                if it.accepted { "accepted" } else { "no improvement" }
            ));
        }
        for warning in &report.warnings {
            out.push(format!("warning: {}", warning));
        }
    }
    out.join("\n")
}
