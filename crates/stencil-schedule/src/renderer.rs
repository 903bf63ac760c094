//! One template run: analyze, plan, execute.

use std::sync::Arc;

use stencil_foundation::{CancellationToken, FunctionRegistry};
use stencil_script::ScriptEngine;

use crate::analysis::{BlockAnalysis, DependencyAnalyzer};
use crate::block::TemplateBlock;
use crate::config::{ConfigError, ExecutorConfig};
use crate::executor::{ExecutionReport, ParallelExecutor};
use crate::plan::{ExecutionPlan, Scheduler};

/// Result of [`TemplateRenderer::render`].
#[derive(Debug)]
pub struct RenderOutput {
    pub plan: ExecutionPlan,
    pub report: ExecutionReport,
    /// Final contents of `tR`.
    pub accumulator: String,
}

#[derive(Debug)]
pub struct TemplateRenderer {
    analyzer: DependencyAnalyzer,
    scheduler: Scheduler,
    executor: ParallelExecutor,
}

impl TemplateRenderer {
    pub fn new(
        engine: Arc<ScriptEngine>,
        registry: Arc<dyn FunctionRegistry>,
        config: ExecutorConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            analyzer: DependencyAnalyzer::new(registry),
            scheduler: Scheduler::new(),
            executor: ParallelExecutor::new(engine, config)?,
        })
    }

    pub fn engine(&self) -> &Arc<ScriptEngine> {
        self.executor.engine()
    }

    pub fn analyze(&self, blocks: &[TemplateBlock]) -> Vec<BlockAnalysis> {
        self.analyzer.analyze_all(blocks)
    }

    pub fn plan(&self, blocks: &[TemplateBlock]) -> ExecutionPlan {
        self.scheduler.plan(self.analyze(blocks))
    }

    pub async fn render(&self, blocks: &[TemplateBlock], cancel: &CancellationToken) -> RenderOutput {
        let plan = self.plan(blocks);
        let report = self.executor.execute(blocks, &plan, cancel).await;
        RenderOutput {
            plan,
            report,
            accumulator: self.engine().accumulator(),
        }
    }
}
