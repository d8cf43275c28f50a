//! Command line front end.
//!
//! # Usage
//!
//! ```bash
//! # Fit the model and score every configuration
//! promptbayes analyze --trials phase1_results.json --truth ground_truth.json \
//!     --output bayesian_analysis.json --preset balanced
//!
//! # Check the priors before spending sampler time
//! promptbayes prior-check --locations 40 --samples 1000
//!
//! # Compare held-out trials of the leaders with the posterior predictions
//! promptbayes validate --analysis bayesian_analysis.json \
//!     --trials phase2_results.json --truth ground_truth.json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use promptbayes::{
    data, output, AnalysisConfig, AnalysisError, Analyzer, ConfigError, FitPolicy,
};
use promptbayes_core::analysis::validate_predictions;

/// Hierarchical Bayesian comparison of LLM proofreading prompt strategies
#[derive(Parser, Debug)]
#[command(name = "promptbayes")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit the model to a trial corpus and score all 128 configurations
    Analyze(AnalyzeArgs),

    /// Simulate from the priors only and report what they imply
    PriorCheck(PriorCheckArgs),

    /// Compare held-out trials with the predictions of a written analysis
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Trial corpus (JSON)
    #[arg(long)]
    trials: PathBuf,

    /// Ground truth (JSON)
    #[arg(long)]
    truth: PathBuf,

    /// Write the analysis document here
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Preset configuration: quick, balanced, thorough
    #[arg(short, long, default_value = "balanced")]
    preset: String,

    /// Retained draws per chain (overrides preset)
    #[arg(long)]
    draws: Option<usize>,

    /// Warmup iterations per chain (overrides preset)
    #[arg(long)]
    tune: Option<usize>,

    /// Number of chains (overrides preset)
    #[arg(long)]
    chains: Option<usize>,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Recall floor of the decision probabilities
    #[arg(long)]
    min_recall: Option<f64>,

    /// Skip the prior predictive check
    #[arg(long)]
    skip_prior_check: bool,

    /// Fail instead of warning when the fit has not converged
    #[arg(long)]
    strict: bool,
}

#[derive(Args, Debug)]
struct PriorCheckArgs {
    /// Number of locations to simulate
    #[arg(long)]
    locations: usize,

    /// Number of prior draws
    #[arg(long, default_value_t = 1000)]
    samples: usize,

    /// RNG seed
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Analysis document written by `analyze --output`
    #[arg(long)]
    analysis: PathBuf,

    /// Held-out trials (JSON)
    #[arg(long)]
    trials: PathBuf,

    /// Ground truth (JSON)
    #[arg(long)]
    truth: PathBuf,

    /// Write the validation report here
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Analyze(args) => analyze(args),
        Command::PriorCheck(args) => prior_check(args),
        Command::Validate(args) => validate(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn analyze(args: AnalyzeArgs) -> Result<(), AnalysisError> {
    let Some(mut config) = AnalysisConfig::preset(&args.preset) else {
        return Err(ConfigError::Invalid {
            field: "preset",
            reason: format!(
                "unknown preset '{}'. Available: quick, balanced, thorough",
                args.preset
            ),
        }
        .into());
    };

    // Apply custom overrides
    if let Some(draws) = args.draws {
        config.sampler.draws = draws;
    }
    if let Some(tune) = args.tune {
        config.sampler.tune = tune;
    }
    if let Some(chains) = args.chains {
        config.sampler.chains = chains;
    }
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    if let Some(min_recall) = args.min_recall {
        config = config.with_min_recall(min_recall);
    }
    if args.skip_prior_check {
        config = config.skip_prior_check(true);
    }
    if args.strict {
        config = config.with_fit_policy(FitPolicy::FailClosed);
    }

    let trials = data::load_trials(&args.trials)?;
    let truth = data::load_ground_truth(&args.truth)?;
    tracing::info!(
        trials = trials.len(),
        true_errors = truth.len(),
        preset = %args.preset,
        "loaded inputs"
    );

    let analysis = Analyzer::new(config).analyze(&trials, &truth)?;

    if let Some(report) = &analysis.prior_check {
        println!("{}", output::format_prior_check(report));
    }
    println!("{}", output::format_analysis(&analysis));

    if let Some(path) = &args.output {
        output::write_analysis(path, &analysis)?;
    }
    Ok(())
}

fn prior_check(args: PriorCheckArgs) -> Result<(), AnalysisError> {
    let mut config = AnalysisConfig::default().with_prior_check_samples(args.samples);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    config.validate()?;
    if args.locations == 0 {
        return Err(ConfigError::Invalid {
            field: "locations",
            reason: "must be positive".into(),
        }
        .into());
    }

    let report = Analyzer::new(config).prior_check(args.locations);
    println!("{}", output::format_prior_check(&report));
    Ok(())
}

fn validate(args: ValidateArgs) -> Result<(), AnalysisError> {
    let table = output::load_score_table(&args.analysis)?;
    let trials = data::load_trials(&args.trials)?;
    let truth = data::load_ground_truth(&args.truth)?;

    let report = validate_predictions(&table, &truth, &trials)?;
    println!("{}", output::format_validation(&report));

    if let Some(path) = &args.output {
        let json = output::validation_to_json_pretty(&report).map_err(data::DataError::from)?;
        std::fs::write(path, json).map_err(data::DataError::from)?;
        tracing::info!(path = %path.display(), "wrote validation report");
    }
    Ok(())
}
