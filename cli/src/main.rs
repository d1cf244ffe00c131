//! `reformat` binary: format prompts with expert rules, or search for a better format.
//!
//! Subcommands: `format` (rule catalog only, no network) and `improve` (judge-driven search).

mod logging;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use cli::{
    describe_format, describe_report, run_format, run_improve, write_output, CliError,
    FormatOptions, ImproveOptions,
};
use reformat::{ImproveError, ModelId, RuleCatalog};

const APP_NAME: &str = "reformat";

#[derive(Parser, Debug)]
#[command(name = "reformat")]
#[command(about = "Reformat prompts using expert rules, or search for the format a model answers best")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the model's default formatting rules
    Format(FormatArgs),
    /// Search formats and word choices, judged by an evaluator model
    Improve(ImproveArgs),
}

#[derive(clap::Args, Debug)]
struct FormatArgs {
    /// Input prompt text. If not provided, reads from stdin
    prompt: Option<String>,

    /// Target model for formatting rules
    #[arg(short, long, default_value = "general", value_parser = parse_model)]
    model: ModelId,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print input/output lengths and the rule stages that changed the text to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Render a built-in template (general, multiple_choice) instead of a prompt
    #[arg(long, value_name = "NAME", requires = "fields")]
    template: Option<String>,

    /// JSON file with the template's field values
    #[arg(long, value_name = "PATH")]
    fields: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ImproveArgs {
    /// Input prompt text. If not provided, reads from stdin
    prompt: Option<String>,

    /// API key for the target model's provider (default: GROQ_API_KEY or OPENAI_API_KEY)
    #[arg(short = 'k', long = "api-key", value_name = "KEY")]
    api_key: Option<String>,

    /// Target model (default: general, answered by llama-3.3-70b-versatile)
    #[arg(short, long, value_parser = parse_model)]
    model: Option<ModelId>,

    /// Evaluator model used by the judge
    #[arg(long, value_parser = parse_model)]
    judge_model: Option<ModelId>,

    /// Candidates per iteration (default: 10)
    #[arg(short = 'n', long)]
    candidates: Option<usize>,

    /// Number of iterations (default: 3)
    #[arg(short, long)]
    iterations: Option<usize>,

    /// 0 is greedy, 1 explores uniformly (default: 0.1)
    #[arg(short, long)]
    temperature: Option<f64>,

    /// Output file for the improved prompt (or the JSON report with --json)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print per-iteration records and judge warnings; log to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,

    /// Synonym store: a SQLite file, or a .json file loaded and saved back
    #[arg(long, value_name = "PATH")]
    synonym_db: Option<PathBuf>,

    /// Extra lexicon of candidate replacements ({"word": ["replacement", ...]})
    #[arg(long, value_name = "PATH")]
    lexicon: Option<PathBuf>,

    /// Seed for candidate sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Candidates evaluated at once (default: 4)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-call timeout in seconds (default: 60)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long, value_name = "SECS")]
    budget: Option<u64>,

    /// Maximum number of model calls, baseline included
    #[arg(long)]
    max_calls: Option<usize>,
}

fn parse_model(s: &str) -> Result<ModelId, String> {
    s.parse().map_err(|e: reformat::ConfigurationError| e.to_string())
}

fn parse_setting_model(value: Option<&str>) -> Result<Option<ModelId>, CliError> {
    Ok(value.map(str::parse::<ModelId>).transpose()?)
}

fn format_cmd(args: FormatArgs) -> Result<(), CliError> {
    let model = args.model;
    let out = run_format(
        FormatOptions {
            prompt: args.prompt,
            model,
            template: args.template,
            fields: args.fields,
        },
        &RuleCatalog::builtin(),
    )?;
    if args.verbose {
        eprintln!("{}", describe_format(model, &out));
    }
    write_output(&out.text, args.output.as_deref())?;
    Ok(())
}

async fn improve_cmd(args: ImproveArgs) -> Result<(), CliError> {
    let settings = config::load_improve_settings(APP_NAME).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring [improve] settings");
        config::ImproveSettings::default()
    });
    let defaults = reformat::ImproverConfig::default();

    let model = match args.model {
        Some(m) => m,
        None => parse_setting_model(settings.model.as_deref())?.unwrap_or(ModelId::General),
    };
    let judge_model = match args.judge_model {
        Some(m) => m,
        None => parse_setting_model(settings.judge_model.as_deref())?
            .unwrap_or(ModelId::DEFAULT_REMOTE),
    };
    let timeout_secs = args.timeout.or(settings.timeout_secs);

    let opts = ImproveOptions {
        prompt: args.prompt,
        api_key: args.api_key,
        model,
        judge_model,
        num_candidates: args.candidates.or(settings.candidates).unwrap_or(defaults.num_candidates),
        num_iterations: args.iterations.or(settings.iterations).unwrap_or(defaults.num_iterations),
        temperature: args.temperature.or(settings.temperature).unwrap_or(defaults.temperature),
        synonym_db: args.synonym_db.or(settings.synonym_db),
        lexicon: args.lexicon.or(settings.lexicon),
        seed: args.seed,
        concurrency: args.concurrency.or(settings.concurrency).unwrap_or(defaults.max_concurrency),
        timeout: timeout_secs.map(Duration::from_secs).or(defaults.call_timeout),
        budget: args.budget.map(Duration::from_secs),
        max_calls: args.max_calls,
    };

    let report = match run_improve(opts).await {
        Ok(report) => report,
        Err(e) => {
            if let CliError::Improve(ImproveError::AllCandidatesFailed { best_so_far, .. }) = &e {
                if args.verbose {
                    eprintln!("best prompt so far:\n{}", best_so_far.improved_prompt);
                }
            }
            return Err(e);
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&report)?;
        write_output(&json, args.output.as_deref())?;
    } else {
        match args.output.as_deref() {
            Some(path) => {
                write_output(&report.improved_prompt, Some(path))?;
                println!("{}", describe_report(&report, args.verbose));
            }
            None => write_output(&describe_report(&report, args.verbose), None)?,
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    config::load_and_apply(APP_NAME, None::<&std::path::Path>).ok();
    let args = Args::parse();

    let verbose = match &args.cmd {
        Command::Format(a) => a.verbose,
        Command::Improve(a) => a.verbose,
    };
    if let Err(e) = logging::init(verbose) {
        eprintln!("reformat: logging: {}", e);
    }

    let result = match args.cmd {
        Command::Format(a) => format_cmd(a),
        Command::Improve(a) => improve_cmd(a).await,
    };
    if let Err(e) = result {
        eprintln!("reformat: {}", e);
        std::process::exit(1);
    }
}
