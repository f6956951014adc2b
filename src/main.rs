use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{debug, error};

use stagehand::orchestrator::Orchestrator;
use stagehand::plan::parser;
use stagehand::worker::{ShellWorker, WorkerCommands, WorkerPool};

/// Phased, dependency-aware build orchestrator
#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Run phased build plans with bounded retry and pluggable workers", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan and emit a build report
    Run {
        /// Path to the YAML plan document
        plan: PathBuf,

        /// Maximum concurrent work units (default: 4)
        #[arg(long, default_value = "4")]
        max_parallel: usize,

        /// Per-submission timeout in seconds (default: 300)
        #[arg(long, default_value = "300")]
        timeout: u64,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the plan's worker build command
        #[arg(long)]
        build_cmd: Option<String>,

        /// Override the plan's worker validate command
        #[arg(long)]
        validate_cmd: Option<String>,

        /// Override the plan's worker fix command
        #[arg(long)]
        fix_cmd: Option<String>,
    },
    /// Parse and validate a plan without executing it
    Check {
        /// Path to the YAML plan document
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .init();

    let result = match cli.command {
        Commands::Run {
            plan,
            max_parallel,
            timeout,
            output,
            build_cmd,
            validate_cmd,
            fix_cmd,
        } => {
            run_plan(
                plan,
                max_parallel,
                timeout,
                output,
                build_cmd,
                validate_cmd,
                fix_cmd,
            )
            .await
        }
        Commands::Check { plan } => check_plan(plan),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            error!("fatal: {err:#}");
            eprintln!("Error: {err:#}");
            2
        }
    };
    std::process::exit(code);
}

#[allow(clippy::too_many_arguments)]
async fn run_plan(
    plan_path: PathBuf,
    max_parallel: usize,
    timeout: u64,
    output: Option<PathBuf>,
    build_cmd: Option<String>,
    validate_cmd: Option<String>,
    fix_cmd: Option<String>,
) -> anyhow::Result<i32> {
    let source = std::fs::read_to_string(&plan_path)
        .with_context(|| format!("failed to read plan {}", plan_path.display()))?;
    let document = parser::load_document(&source)?;
    let plan = parser::plan_from_document(&document)?;
    let commands = resolve_commands(document.worker, build_cmd, validate_cmd, fix_cmd)?;
    debug!(plan = %plan.id, max_parallel, timeout, "worker pool configured");

    let working_dir = plan_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from);
    let mut worker = ShellWorker::new(commands);
    if let Some(dir) = working_dir {
        worker = worker.with_working_dir(dir);
    }
    let pool = Arc::new(WorkerPool::new(
        Arc::new(worker),
        max_parallel,
        Duration::from_secs(timeout),
    ));
    let orchestrator = Orchestrator::new(pool);

    let report = orchestrator.run_plan(plan).await;
    for (module, failure) in report.failures() {
        eprintln!("module '{module}' failed: {failure}");
    }

    let json = serde_json::to_string_pretty(&report)?;
    match output {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
        }
        None => println!("{json}"),
    }

    Ok(report.exit_code())
}

fn check_plan(plan_path: PathBuf) -> anyhow::Result<i32> {
    let source = std::fs::read_to_string(&plan_path)
        .with_context(|| format!("failed to read plan {}", plan_path.display()))?;
    let plan = parser::parse(&source)?;
    println!(
        "plan '{}' is valid: {} phase(s), {} module(s)",
        plan.id,
        plan.phases.len(),
        plan.module_count()
    );
    Ok(0)
}

fn resolve_commands(
    from_plan: Option<WorkerCommands>,
    build: Option<String>,
    validate: Option<String>,
    fix: Option<String>,
) -> anyhow::Result<WorkerCommands> {
    match from_plan {
        Some(mut commands) => {
            if let Some(build) = build {
                commands.build = build;
            }
            if let Some(validate) = validate {
                commands.validate = validate;
            }
            if let Some(fix) = fix {
                commands.fix = fix;
            }
            Ok(commands)
        }
        None => match (build, validate, fix) {
            (Some(build), Some(validate), Some(fix)) => Ok(WorkerCommands {
                build,
                validate,
                fix,
            }),
            _ => anyhow::bail!(
                "plan has no worker section; provide --build-cmd, --validate-cmd and --fix-cmd"
            ),
        },
    }
}
