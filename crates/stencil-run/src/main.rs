//! Stencil Run - plans and executes the script blocks of one template
//!
//! Reads the blocks an extractor produced (a JSON array of `TemplateBlock`),
//! prints the phase plan, runs it, and prints each block's rendered text.
//!
//! Usage: `stencil-run <blocks.json> [--registry FILE] [--max-concurrency N]
//! [--timeout-ms MS] [--fail-fast] [--sequential] [--plan-only] [--json]`

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use stencil_foundation::{CancellationToken, FunctionRegistry, NoHost, StaticRegistry};
use stencil_schedule::{
    BlockOutcome, ExecutionPlan, ExecutorConfig, RenderOutput, TemplateBlock, TemplateRenderer,
};
use stencil_script::{EngineConfig, ScriptEngine};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stencil-run")]
#[command(about = "Plan and run the script blocks of a template")]
struct Cli {
    /// JSON file holding an array of template blocks
    blocks: PathBuf,

    /// JSON object of host function flags, e.g. `{ "system.prompt": { "barrier": true } }`
    #[arg(long)]
    registry: Option<PathBuf>,

    /// JSON file of engine settings (loop cap, call depth, cache size)
    #[arg(long)]
    engine_config: Option<PathBuf>,

    /// Blocks allowed to run at once (default: available parallelism)
    #[arg(long, env = "STENCIL_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Per-block timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Skip remaining phases after the first failed block
    #[arg(long)]
    fail_fast: bool,

    /// Run one block at a time
    #[arg(long, conflicts_with = "max_concurrency")]
    sequential: bool,

    /// Evaluate interpolations on the tree-walking interpreter only
    #[arg(long)]
    no_bytecode: bool,

    /// Print the plan and exit without running anything
    #[arg(long)]
    plan_only: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stencil_run=info,stencil_schedule=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let blocks: Vec<TemplateBlock> = read_json(&cli.blocks)?;
    info!("Loaded {} blocks from {}", blocks.len(), cli.blocks.display());

    let registry: StaticRegistry = match &cli.registry {
        Some(path) => read_json(path)?,
        None => StaticRegistry::new(),
    };
    let registry: Arc<dyn FunctionRegistry> = Arc::new(registry);

    let mut engine_config: EngineConfig = match &cli.engine_config {
        Some(path) => read_json(path)?,
        None => EngineConfig::default(),
    };
    if cli.no_bytecode {
        engine_config = engine_config.with_bytecode(false);
    }

    let executor_config = executor_config(&cli);
    let engine = Arc::new(ScriptEngine::with_config(Arc::new(NoHost), engine_config));
    let renderer = TemplateRenderer::new(engine, registry, executor_config)
        .context("invalid executor settings")?;

    if cli.plan_only {
        let plan = renderer.plan(&blocks);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining blocks");
            on_signal.cancel_with_reason("interrupted");
        }
    });

    let output = renderer.render(&blocks, &cancel).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output_json(&output))?);
    } else {
        print_plan(&output.plan);
        print_results(&output);
    }

    let summary = output.report.summary();
    if summary.failed + summary.timed_out > 0 {
        process::exit(2);
    }
    Ok(())
}

fn executor_config(cli: &Cli) -> ExecutorConfig {
    let mut config = ExecutorConfig::default().with_fail_fast(cli.fail_fast);
    if cli.sequential {
        config = config.with_max_concurrency(1);
    } else if let Some(max) = cli.max_concurrency {
        config = config.with_max_concurrency(max);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_block_timeout(Duration::from_millis(ms));
    }
    config
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_plan(plan: &ExecutionPlan) {
    println!("Plan: {plan}");
    for phase in &plan.phases {
        let ids: Vec<String> = phase.block_ids().map(|id| id.to_string()).collect();
        let mode = if phase.can_parallelize() {
            "parallel"
        } else if phase.has_barrier() {
            "barrier"
        } else {
            "sequential"
        };
        println!("  phase {} [{mode}]: {}", phase.index, ids.join(", "));
    }
}

fn print_results(output: &RenderOutput) {
    println!("Results ({:.1?}):", output.report.elapsed);
    for (id, outcome) in &output.report.results {
        match outcome.render() {
            Some(text) => println!("  block {id} [{}]: {text:?}", outcome.label()),
            None => println!("  block {id} [{}]", outcome.label()),
        }
    }
    println!("tR: {:?}", output.accumulator);
}

fn output_json(output: &RenderOutput) -> serde_json::Value {
    let results: serde_json::Map<String, serde_json::Value> = output
        .report
        .results
        .iter()
        .map(|(id, outcome)| {
            let mut entry = json!({ "status": outcome.label() });
            if let Some(text) = outcome.render() {
                entry["text"] = json!(text);
            }
            if let BlockOutcome::Failure(err) = outcome {
                entry["error"] = json!(err.to_string());
            }
            (id.to_string(), entry)
        })
        .collect();

    json!({
        "plan": output.plan,
        "summary": output.report.summary(),
        "elapsed_ms": output.report.elapsed.as_millis() as u64,
        "results": results,
        "accumulator": output.accumulator,
    })
}
