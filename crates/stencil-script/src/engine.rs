//! Script engine facade.
//!
//! One [`ScriptEngine`] serves a whole template run. Blocks of a concurrent
//! phase call into it from several threads at once; each call builds its own
//! [`Interpreter`] over the shared [`Environment`].

use std::sync::Arc;

use stencil_foundation::{CancellationToken, HostBindings, NoHost, Value};
use stencil_parser::{parse_expression, parse_program};
use stencil_vm::{CacheStats, ExprCache, Vm};
use tracing::{debug, trace, warn};

use crate::env::Environment;
use crate::error::{Result, ScriptError};
use crate::interpreter::Interpreter;
use crate::EngineConfig;

pub struct ScriptEngine {
    env: Environment,
    host: Arc<dyn HostBindings>,
    config: EngineConfig,
    cache: ExprCache,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(Arc::new(NoHost))
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("config", &self.config)
            .field("variables", &self.env.len())
            .field("cache", &self.cache)
            .finish()
    }
}

impl ScriptEngine {
    pub fn new(host: Arc<dyn HostBindings>) -> Self {
        Self::with_config(host, EngineConfig::default())
    }

    pub fn with_config(host: Arc<dyn HostBindings>, config: EngineConfig) -> Self {
        Self {
            env: Environment::new(),
            cache: ExprCache::new(config.expr_cache_capacity),
            host,
            config,
        }
    }

    /// Replace the environment, e.g. to pre-seed variables.
    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current value of the `tR` accumulator.
    pub fn accumulator(&self) -> String {
        self.env.accumulator()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run an execution block and return the text it wrote to `tR`.
    ///
    /// Statements the parser could not recover are skipped; the rest run,
    /// and each parse error is appended to the returned text as an inline
    /// `[Parse Error: ...]` (or `[Lexer Error: ...]`) tag. Those tags are not
    /// written to `tR`.
    pub fn execute_block(&self, source: &str, cancel: &CancellationToken) -> Result<String> {
        check(cancel)?;
        let outcome = parse_program(source);
        if outcome.has_errors() {
            warn!(
                errors = outcome.errors.len(),
                recovered = outcome.program.body.len(),
                "block has parse errors, running recovered statements"
            );
        }
        trace!(statements = outcome.program.body.len(), "executing block");

        let mut interpreter = Interpreter::new(&self.env, self.host.as_ref(), cancel, &self.config);
        interpreter.run(&outcome.program)?;

        let mut output = interpreter.into_output();
        for error in outcome.errors {
            output.push_str(&ScriptError::from_parse(error).render());
        }
        Ok(output)
    }

    /// Evaluate an interpolation expression.
    ///
    /// Goes through the bytecode cache when enabled; expressions the
    /// compiler rejects are interpreted instead.
    pub fn evaluate_expression(&self, source: &str, cancel: &CancellationToken) -> Result<Value> {
        check(cancel)?;
        let source = expression_source(source);
        if !self.config.use_bytecode {
            return self.interpret(source, cancel);
        }

        match self.cache.get_or_compile(source) {
            Ok(compiled) => {
                let mut interpreter =
                    Interpreter::new(&self.env, self.host.as_ref(), cancel, &self.config);
                Vm::new().execute(&compiled, &mut interpreter)
            }
            Err(err) => {
                debug!(source, %err, "falling back to interpreter");
                self.interpret(source, cancel)
            }
        }
    }

    /// Evaluate an expression on the tree-walking interpreter only.
    pub fn interpret_expression(&self, source: &str, cancel: &CancellationToken) -> Result<Value> {
        check(cancel)?;
        self.interpret(expression_source(source), cancel)
    }

    fn interpret(&self, source: &str, cancel: &CancellationToken) -> Result<Value> {
        let expr = parse_expression(source).map_err(ScriptError::from_parse)?;
        let mut interpreter = Interpreter::new(&self.env, self.host.as_ref(), cancel, &self.config);
        interpreter.evaluate(&expr)
    }
}

fn check(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(ScriptError::Cancelled(cancel.reason()))
    } else {
        Ok(())
    }
}

/// Interpolation bodies may carry a trailing `;`.
fn expression_source(source: &str) -> &str {
    let source = source.trim();
    source.strip_suffix(';').map_or(source, str::trim_end)
}
