//! idascripter - run a disassembler script over one binary or a whole tree

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use idascript_core::application::{BatchConfig, BatchRunner, ToolRunner};
use idascript_core::domain::{
    DomainError, InvocationTemplate, RunVerdict, ToolBitness, ToolMode, TIMEOUT_RETURNCODE,
};
use idascript_core::error::AppError;
use idascript_core::port::time_provider::SystemTimeProvider;
use idascript_core::port::{ToolLocator, WaitOutcome};
use idascript_infra_system::{
    BinaryWalker, ObjectFileClassifier, SystemToolLocator, SystemToolSpawner,
};

#[derive(Parser)]
#[command(name = "idascripter")]
#[command(about = "Run a disassembler script over one binary or a whole directory tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Binary file to analyse, or a directory to scan for binaries
    target: PathBuf,

    /// Script auto-run on each binary; without it, trailing arguments are
    /// passed as raw key:value tool options
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Disassembler installation directory (takes precedence over IDA_PATH)
    #[arg(short = 'i', long = "ida-path")]
    ida_path: Option<PathBuf>,

    /// Per-file timeout in seconds; negative means no timeout
    #[arg(short, long)]
    timeout: Option<f64>,

    /// Number of parallel workers (defaults to the CPU count)
    #[arg(short, long)]
    workers: Option<usize>,

    /// CSV file receiving one "path,OK|KO|TO" line per binary
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Arguments forwarded to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    script_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let timeout = cli
        .timeout
        .and_then(|secs| (secs >= 0.0).then(|| Duration::from_secs_f64(secs)));

    // Resolve the tool once per process lifetime; the path travels inside
    // the invocation template from here on.
    let locator = SystemToolLocator::new(cli.ida_path.clone());
    let executable = locator.locate(ToolBitness::B64, ToolMode::Headless)?;
    info!(executable = %executable.display(), "Resolved disassembler");

    let template = build_template(&cli, &executable)?;

    if cli.target.is_file() {
        let code = run_single(&template, &cli.target, timeout).await?;
        // Mirror the tool's own exit code; sentinels map to plain failure
        std::process::exit(if code < 0 { 1 } else { code });
    } else if cli.target.is_dir() {
        run_batch(&cli, template, timeout).await
    } else {
        bail!("Invalid target (not a file or directory): {}", cli.target.display());
    }
}

/// Build the batch-wide invocation template from the CLI arguments
fn build_template(cli: &Cli, executable: &Path) -> Result<InvocationTemplate, AppError> {
    match &cli.script {
        Some(script) => {
            if !script.is_file() {
                return Err(DomainError::ScriptNotFound(script.display().to_string()).into());
            }
            Ok(InvocationTemplate::script_mode(
                executable,
                ToolBitness::B64,
                ToolMode::Headless,
                script,
                cli.script_args.clone(),
            ))
        }
        None => Ok(InvocationTemplate::direct_mode(
            executable,
            ToolBitness::B64,
            ToolMode::Headless,
            cli.script_args.clone(),
        )?),
    }
}

/// Single-file mode: one invocation, exit code passed through
async fn run_single(
    template: &InvocationTemplate,
    target: &PathBuf,
    timeout: Option<Duration>,
) -> Result<i32> {
    let runner = tool_runner();
    let mut run = runner.start(template.for_target(target)).await?;

    match run.wait(timeout).await? {
        WaitOutcome::Exited(code) => Ok(code),
        WaitOutcome::TimedOut => {
            run.kill().await;
            Ok(TIMEOUT_RETURNCODE)
        }
    }
}

/// Batch mode: discover binaries, drive the bounded batch, report progress
async fn run_batch(cli: &Cli, template: InvocationTemplate, timeout: Option<Duration>) -> Result<()> {
    let walker = BinaryWalker::new(Arc::new(ObjectFileClassifier::new()));

    println!("Counting files to analyse..");
    let total = walker.iter_binaries(&cli.target).count() as u64;

    let workers = cli.workers.unwrap_or_else(default_workers).max(1);
    let runner = BatchRunner::new(tool_runner());

    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "[{msg}] [{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})",
        )
        .expect("valid progress template")
        .progress_chars("=>-"),
    );
    bar.set_message("OK:- KO:- TO:-");

    let (mut ok, mut ko, mut to) = (0usize, 0usize, 0usize);
    let mut results: Vec<(PathBuf, RunVerdict)> = Vec::new();

    let mut stream = runner.run(
        walker.iter_binaries(&cli.target),
        template,
        BatchConfig::new(workers, timeout),
    );
    while let Some(outcome) = stream.next().await {
        let verdict = outcome.verdict();
        match verdict {
            RunVerdict::Success => ok += 1,
            RunVerdict::Failure => ko += 1,
            RunVerdict::Timeout => to += 1,
        }
        bar.set_message(format!("OK:{} KO:{} TO:{}", ok, ko, to));
        bar.inc(1);

        if cli.log_file.is_some() {
            results.push((outcome.path, verdict));
        }
    }
    bar.finish();

    if let Some(log_path) = &cli.log_file {
        write_result_log(log_path, &results)?;
        println!("Log file written in {}", log_path.display());
    }

    info!(ok = %ok, ko = %ko, to = %to, "Batch complete");
    Ok(())
}

fn tool_runner() -> Arc<ToolRunner> {
    Arc::new(ToolRunner::new(
        Arc::new(SystemToolSpawner::new()),
        Arc::new(SystemTimeProvider),
    ))
}

fn write_result_log(path: &PathBuf, results: &[(PathBuf, RunVerdict)]) -> Result<()> {
    let mut out = String::new();
    for (file, verdict) in results {
        let abs = file.canonicalize().unwrap_or_else(|_| file.clone());
        out.push_str(&format!("{},{}\n", abs.display(), verdict.label()));
    }
    std::fs::write(path, out)
        .with_context(|| format!("Failed to write result log: {}", path.display()))
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

fn init_tracing() {
    let log_format = std::env::var("IDASCRIPT_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("idascript=warn"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Progress bar owns the terminal; keep human logs on stderr
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
