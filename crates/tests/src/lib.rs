//! Integration test harness for Stencil.
//!
//! Runs a list of template blocks end to end:
//! Analyze → Plan → Execute → Verify.

use std::sync::Arc;

use stencil_foundation::{
    CancellationToken, FunctionFlags, FunctionRegistry, HostBindings, NoHost, StaticRegistry,
};
use stencil_schedule::{
    BlockOutcome, ExecutionPlan, ExecutorConfig, RenderOutput, TemplateBlock, TemplateRenderer,
};
use stencil_script::{EngineConfig, ScriptEngine};

/// Test harness for one template run.
pub struct TemplateHarness {
    blocks: Vec<TemplateBlock>,
    registry: StaticRegistry,
    host: Arc<dyn HostBindings>,
    engine_config: EngineConfig,
    executor_config: ExecutorConfig,
}

impl Default for TemplateHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateHarness {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            registry: StaticRegistry::new(),
            host: Arc::new(NoHost),
            engine_config: EngineConfig::default(),
            executor_config: ExecutorConfig::default(),
        }
    }

    /// Harness over execution blocks, one per command.
    pub fn from_commands(commands: &[&str]) -> Self {
        commands
            .iter()
            .fold(Self::new(), |harness, command| harness.block(command))
    }

    /// Append an execution block.
    pub fn block(mut self, command: &str) -> Self {
        let id = self.blocks.len();
        self.blocks.push(TemplateBlock::execution(id, command));
        self
    }

    /// Append an interpolation block.
    pub fn interpolation(mut self, command: &str) -> Self {
        let id = self.blocks.len();
        self.blocks.push(TemplateBlock::interpolation(id, command));
        self
    }

    /// Flag `tp.<module>.<function>` as a barrier.
    pub fn barrier(mut self, module: &str, function: &str) -> Self {
        self.registry.register(module, function, FunctionFlags::BARRIER);
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostBindings>) -> Self {
        self.host = host;
        self
    }

    pub fn with_engine_config(mut self, config: EngineConfig) -> Self {
        self.engine_config = config;
        self
    }

    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    pub fn blocks(&self) -> &[TemplateBlock] {
        &self.blocks
    }

    /// Build a fresh renderer. Every call gets its own engine and variables.
    ///
    /// # Panics
    ///
    /// Panics if the executor configuration is invalid.
    pub fn renderer(&self) -> TemplateRenderer {
        let engine = ScriptEngine::with_config(Arc::clone(&self.host), self.engine_config.clone());
        let registry: Arc<dyn FunctionRegistry> = Arc::new(self.registry.clone());
        TemplateRenderer::new(Arc::new(engine), registry, self.executor_config.clone())
            .expect("invalid executor config")
    }

    pub fn plan(&self) -> ExecutionPlan {
        self.renderer().plan(&self.blocks)
    }

    /// Run every block to completion.
    ///
    /// # Panics
    ///
    /// Panics if the tokio runtime cannot be built.
    pub fn run(&self) -> RenderOutput {
        self.run_with_token(&CancellationToken::new())
    }

    /// Run under a caller-owned cancellation token.
    ///
    /// # Panics
    ///
    /// Panics if the tokio runtime cannot be built.
    pub fn run_with_token(&self, cancel: &CancellationToken) -> RenderOutput {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("failed to build tokio runtime");
        let renderer = self.renderer();
        runtime.block_on(renderer.render(&self.blocks, cancel))
    }
}

/// Text of a successful block.
///
/// # Panics
///
/// Panics if the block did not succeed.
pub fn success_text(output: &RenderOutput, block_id: usize) -> &str {
    match output.report.get(block_id) {
        Some(BlockOutcome::Success(text)) => text,
        other => panic!("block {block_id}: expected success, got {other:?}"),
    }
}
