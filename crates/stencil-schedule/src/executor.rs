//! Concurrent execution of an [`ExecutionPlan`].
//!
//! Phases run strictly one after another. Blocks of a parallel phase are
//! spread over tokio's blocking pool, at most `max_concurrency` at a time;
//! every other phase runs its blocks one by one in id order. Script
//! evaluation is synchronous and host calls may block, hence the blocking
//! pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use stencil_foundation::CancellationToken;
use stencil_foundation::coercion::to_display_string;
use stencil_script::{ScriptEngine, ScriptError};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::block::TemplateBlock;
use crate::config::{ConfigError, ExecutorConfig};
use crate::plan::{ExecutionPhase, ExecutionPlan};

/// Reason given to a block's token when its timeout fires.
pub const TIMEOUT_REASON: &str = "timeout";

/// How one block ended.
#[derive(Debug, Clone)]
pub enum BlockOutcome {
    /// Text the block produced: its `tR` output, or the value of an
    /// interpolation.
    Success(String),
    Failure(ScriptError),
    Timeout,
    /// Not run, or stopped by cancellation. Not an error.
    Cancelled,
}

impl BlockOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BlockOutcome::Success(_))
    }

    /// Failures and timeouts; these trip fail-fast.
    pub fn is_failure(&self) -> bool {
        matches!(self, BlockOutcome::Failure(_) | BlockOutcome::Timeout)
    }

    /// Text to splice in place of the block. `None` leaves the choice of
    /// keeping or stripping the original text to the caller.
    pub fn render(&self) -> Option<String> {
        match self {
            BlockOutcome::Success(text) => Some(text.clone()),
            BlockOutcome::Failure(err) => Some(err.render()),
            BlockOutcome::Timeout | BlockOutcome::Cancelled => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BlockOutcome::Success(_) => "success",
            BlockOutcome::Failure(_) => "failure",
            BlockOutcome::Timeout => "timeout",
            BlockOutcome::Cancelled => "cancelled",
        }
    }
}

/// Outcome counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
}

/// Per-block outcomes of one run, keyed by block id.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub results: BTreeMap<usize, BlockOutcome>,
    /// Phases that started (not skipped).
    pub phases_run: usize,
    pub elapsed: Duration,
}

impl ExecutionReport {
    pub fn get(&self, block_id: usize) -> Option<&BlockOutcome> {
        self.results.get(&block_id)
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for outcome in self.results.values() {
            match outcome {
                BlockOutcome::Success(_) => summary.succeeded += 1,
                BlockOutcome::Failure(_) => summary.failed += 1,
                BlockOutcome::Timeout => summary.timed_out += 1,
                BlockOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Counts a running block until dropped.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ParallelExecutor {
    engine: Arc<ScriptEngine>,
    config: ExecutorConfig,
    permits: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

impl std::fmt::Debug for ParallelExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelExecutor")
            .field("config", &self.config)
            .field("active", &self.active_tasks())
            .finish()
    }
}

impl ParallelExecutor {
    pub fn new(engine: Arc<ScriptEngine>, config: ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            active: Arc::new(AtomicUsize::new(0)),
            engine,
            config,
        })
    }

    pub fn engine(&self) -> &Arc<ScriptEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Blocks currently executing, including timed-out blocks that have not
    /// yet observed their cancellation.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Run every phase of `plan` over `blocks`.
    ///
    /// `cancel` is checked before each phase; once it fires, every block of
    /// the remaining phases is reported [`BlockOutcome::Cancelled`].
    pub async fn execute(
        &self,
        blocks: &[TemplateBlock],
        plan: &ExecutionPlan,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        let started = Instant::now();
        let lookup: HashMap<usize, Arc<TemplateBlock>> = blocks
            .iter()
            .map(|block| (block.id, Arc::new(block.clone())))
            .collect();

        info!(%plan, "executing plan");
        let mut report = ExecutionReport::default();
        let mut halted = false;

        for phase in &plan.phases {
            if !halted && cancel.is_cancelled() {
                warn!(phase = phase.index, reason = ?cancel.reason(), "run cancelled");
                halted = true;
            }
            if halted {
                report
                    .results
                    .extend(phase.block_ids().map(|id| (id, BlockOutcome::Cancelled)));
                continue;
            }

            let outcomes = self.run_phase(phase, &lookup, cancel).await;
            report.phases_run += 1;
            let failed = outcomes.iter().any(|(_, outcome)| outcome.is_failure());
            report.results.extend(outcomes);

            if failed && self.config.fail_fast {
                warn!(phase = phase.index, "block failed, skipping remaining phases");
                halted = true;
            }
        }

        report.elapsed = started.elapsed();
        info!(
            phases = report.phases_run,
            elapsed_ms = report.elapsed.as_millis() as u64,
            summary = ?report.summary(),
            "run finished"
        );
        report
    }

    #[instrument(
        skip_all,
        fields(phase = phase.index, blocks = phase.len(), parallel = phase.can_parallelize())
    )]
    async fn run_phase(
        &self,
        phase: &ExecutionPhase,
        lookup: &HashMap<usize, Arc<TemplateBlock>>,
        cancel: &CancellationToken,
    ) -> Vec<(usize, BlockOutcome)> {
        let blocks: Vec<Arc<TemplateBlock>> = phase
            .block_ids()
            .filter_map(|id| {
                let block = lookup.get(&id).cloned();
                if block.is_none() {
                    warn!(block = id, "planned block missing from input");
                }
                block
            })
            .collect();

        if phase.can_parallelize() {
            let runs = blocks
                .into_iter()
                .map(|block| async move { (block.id, self.run_block(block, cancel).await) });
            join_all(runs).await
        } else {
            let mut outcomes = Vec::with_capacity(blocks.len());
            for block in blocks {
                outcomes.push((block.id, self.run_block(block, cancel).await));
            }
            outcomes
        }
    }

    #[instrument(skip_all, fields(block = block.id))]
    async fn run_block(&self, block: Arc<TemplateBlock>, cancel: &CancellationToken) -> BlockOutcome {
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return BlockOutcome::Cancelled;
        };

        let block_token = CancellationToken::new();
        let token = CancellationToken::link(cancel, &block_token);
        let engine = Arc::clone(&self.engine);
        let active = ActiveGuard::enter(&self.active);

        // The permit and the active count are released when the script
        // returns, not when the timeout fires.
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _active = active;
            run_script(&engine, &block, &token)
        });

        let joined = match self.config.block_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    block_token.cancel_with_reason(TIMEOUT_REASON);
                    warn!(timeout_ms = limit.as_millis() as u64, "block timed out");
                    return BlockOutcome::Timeout;
                }
            },
            None => task.await,
        };

        joined.unwrap_or_else(|err| {
            BlockOutcome::Failure(ScriptError::Host(format!("block task failed: {err}")))
        })
    }
}

fn run_script(engine: &ScriptEngine, block: &TemplateBlock, token: &CancellationToken) -> BlockOutcome {
    let result = if block.is_execution {
        engine.execute_block(&block.command, token)
    } else {
        engine
            .evaluate_expression(&block.command, token)
            .map(|value| to_display_string(&value))
    };

    match result {
        Ok(text) => BlockOutcome::Success(text),
        Err(err) if err.is_cancelled() => {
            warn!(block = block.id, %err, "block cancelled");
            BlockOutcome::Cancelled
        }
        Err(err) => {
            debug!(block = block.id, %err, "block failed");
            BlockOutcome::Failure(err)
        }
    }
}

#[cfg(test)]
mod tests;
