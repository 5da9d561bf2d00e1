//! Signature-constraint compiler CLI.
//!
//! Provides the `sigc` binary: a thin driver that reads signature text,
//! runs the `sigc_check` pipeline and prints the resulting artifacts as JSON
//! (or rendered contract text). `diff` additionally runs the differential
//! oracle against a reference and a generated executable.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use sigc_check::pipeline::split_sources;
use sigc_check::{
    compile_batch, compile_one, BatchEntry, CompiledSignature, EmissionProfile, PipelineError,
    SignatureFailure, Stage, TestPlanConfig,
};
use sigc_oracle::{record_reference_outputs, Oracle, OracleConfig};

/// Signature-constraint compiler: contracts and test plans from dependent
/// type signatures.
#[derive(Parser)]
#[command(name = "sigc", about = "Signature-constraint compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand that synthesizes artifacts.
#[derive(clap::Args)]
struct SynthesisArgs {
    /// Path to the signature text.
    input: PathBuf,

    /// Emission profile JSON file (default: snake, exception, tagged).
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Trials per property-based case.
    #[arg(long, default_value_t = 100)]
    trials: u32,

    /// Seed for property-based generation.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the constraint model of a signature.
    Extract {
        /// Path to the signature text.
        input: PathBuf,
    },

    /// Print the synthesized contracts of a signature.
    Contracts {
        #[command(flatten)]
        args: SynthesisArgs,

        /// Print the structured contract tree instead of rendered text.
        #[arg(long)]
        json: bool,
    },

    /// Print the synthesized test plan of a signature.
    Plan {
        #[command(flatten)]
        args: SynthesisArgs,
    },

    /// Compile many `---`-separated signatures and print a report.
    Batch {
        #[command(flatten)]
        args: SynthesisArgs,
    },

    /// Run the test plan against a reference and a generated executable.
    Diff {
        #[command(flatten)]
        args: SynthesisArgs,

        /// Reference executable.
        #[arg(short, long)]
        reference: PathBuf,

        /// Generated executable.
        #[arg(short, long)]
        generated: PathBuf,

        /// Oracle configuration JSON file.
        #[arg(long)]
        oracle_config: Option<PathBuf>,

        /// Per-invocation timeout in milliseconds (overrides the config file).
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Record reference outputs into the plan before comparing.
        #[arg(long)]
        record: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Extract { input } => run_extract(&input),
        Commands::Contracts { args, json } => run_contracts(&args, json),
        Commands::Plan { args } => run_plan(&args),
        Commands::Batch { args } => run_batch(&args),
        Commands::Diff {
            args,
            reference,
            generated,
            oracle_config,
            timeout_ms,
            record,
        } => run_diff(
            &args,
            &reference,
            &generated,
            oracle_config.as_deref(),
            timeout_ms,
            record,
        ),
    };
    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Shared plumbing
// ---------------------------------------------------------------------------

fn read_text(path: &Path) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("Error: failed to read '{}': {}", path.display(), e);
        3
    })
}

fn read_json<T: serde::de::DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, i32> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("Error: invalid JSON in '{}': {}", path.display(), e);
        3
    })
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: failed to serialize output: {}", e);
            3
        }
    }
}

fn plan_config(args: &SynthesisArgs) -> TestPlanConfig {
    TestPlanConfig {
        property_trials: args.trials,
        random_seed: args.seed,
        ..TestPlanConfig::default()
    }
}

fn describe(error: &PipelineError) -> String {
    match error {
        PipelineError::Signature(e) => format!("{}: {}", e.label(), e),
        other => other.to_string(),
    }
}

fn report_failure(failure: &SignatureFailure) -> i32 {
    eprintln!("Error ({}): {}", failure.stage, describe(&failure.error));
    1
}

/// Reads, parses and fully compiles the single signature in `args.input`.
fn compile_input(args: &SynthesisArgs) -> Result<CompiledSignature, i32> {
    let source = read_text(&args.input)?;
    let profile: EmissionProfile = read_json(args.profile.as_deref())?;
    debug!(?profile, "emission profile");
    let label = args.input.display().to_string();
    compile_one(&label, &source, &profile, &plan_config(args)).map_err(|f| report_failure(&f))
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

/// Execute the extract subcommand.
///
/// Returns exit code: 0 = success, 1 = signature error, 3 = I/O error.
fn run_extract(input: &Path) -> i32 {
    let source = match read_text(input) {
        Ok(source) => source,
        Err(code) => return code,
    };
    let model = sigc_core::parse_signature(&source)
        .and_then(|sig| sigc_check::extract(&sig));
    match model {
        Ok(model) => print_json(&model),
        Err(e) => {
            eprintln!("{}: {}", e.label(), e);
            1
        }
    }
}

fn run_contracts(args: &SynthesisArgs, json: bool) -> i32 {
    let compiled = match compile_input(args) {
        Ok(compiled) => compiled,
        Err(code) => return code,
    };
    if json {
        print_json(&compiled.contract)
    } else {
        print!("{}", compiled.contract.render());
        0
    }
}

fn run_plan(args: &SynthesisArgs) -> i32 {
    match compile_input(args) {
        Ok(compiled) => print_json(&compiled.plan),
        Err(code) => code,
    }
}

/// One line of the batch report.
#[derive(Serialize)]
struct BatchLine {
    label: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    constraints: usize,
    cases: usize,
    gaps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_fingerprint: Option<String>,
}

impl From<&BatchEntry> for BatchLine {
    fn from(entry: &BatchEntry) -> Self {
        match entry {
            BatchEntry::Compiled(compiled) => BatchLine {
                label: compiled.label.clone(),
                ok: true,
                stage: None,
                error: None,
                constraints: compiled.model.constraints.len(),
                cases: compiled.plan.cases.len(),
                gaps: compiled.plan.gaps.len(),
                source_fingerprint: Some(compiled.contract.source_fingerprint.to_string()),
            },
            BatchEntry::Failed(failure) => BatchLine {
                label: failure.label.clone(),
                ok: false,
                stage: Some(failure.stage),
                error: Some(describe(&failure.error)),
                constraints: 0,
                cases: 0,
                gaps: 0,
                source_fingerprint: None,
            },
        }
    }
}

/// Execute the batch subcommand.
///
/// Returns exit code: 0 = every signature compiled, 2 = at least one
/// signature failed, 3 = I/O error.
fn run_batch(args: &SynthesisArgs) -> i32 {
    let text = match read_text(&args.input) {
        Ok(text) => text,
        Err(code) => return code,
    };
    let profile: EmissionProfile = match read_json(args.profile.as_deref()) {
        Ok(profile) => profile,
        Err(code) => return code,
    };
    let entries = compile_batch(&split_sources(&text), &profile, &plan_config(args));
    let lines: Vec<BatchLine> = entries.iter().map(BatchLine::from).collect();
    let code = print_json(&lines);
    if code != 0 {
        return code;
    }
    if lines.iter().all(|line| line.ok) {
        0
    } else {
        2
    }
}

/// Execute the diff subcommand.
///
/// Returns exit code: 0 = every case matched, 1 = signature error,
/// 2 = at least one case failed, 3 = I/O or executable error.
fn run_diff(
    args: &SynthesisArgs,
    reference: &Path,
    generated: &Path,
    oracle_config: Option<&Path>,
    timeout_ms: Option<u64>,
    record: bool,
) -> i32 {
    let mut compiled = match compile_input(args) {
        Ok(compiled) => compiled,
        Err(code) => return code,
    };
    let mut config: OracleConfig = match read_json(oracle_config) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(ms) = timeout_ms {
        config.case_timeout_ms = ms;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 3;
        }
    };

    let report = runtime.block_on(async {
        if record {
            let recorded =
                record_reference_outputs(reference, &mut compiled.plan, &config).await?;
            debug!(recorded, "reference outputs recorded");
        }
        let oracle = Oracle::new(reference, generated, config)?;
        oracle.run(&compiled.plan, &compiled.contract).await
    });

    match report {
        Ok(report) => {
            let code = print_json(&report);
            if code != 0 {
                code
            } else if report.passed() {
                0
            } else {
                2
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn batch_line_for_failure() {
        let entries = compile_batch(
            &[("bad".to_string(), "f(x: Frobnicate) -> Int".to_string())],
            &EmissionProfile::default(),
            &TestPlanConfig::default(),
        );
        let line = BatchLine::from(&entries[0]);
        assert!(!line.ok);
        assert_eq!(line.stage, Some(Stage::Parse));
        assert!(line.error.unwrap().starts_with("UnsupportedTypeError"));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert_eq!(run_extract(Path::new("/nonexistent/sig.txt")), 3);
    }
}
