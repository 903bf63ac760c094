// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Stencil Schedule
//!
//! Decides which template blocks may run at the same time and runs them.
//!
//! - [`DependencyAnalyzer`] reads each block's text and records the
//!   variables it reads and writes, whether it touches `tR`, and whether it
//!   calls a blocking host function.
//! - [`Scheduler`] groups the analyses into ordered [`ExecutionPhase`]s.
//! - [`ParallelExecutor`] runs the phases against a shared
//!   [`ScriptEngine`](stencil_script::ScriptEngine).
//! - [`TemplateRenderer`] wires the three together for one template.

pub mod analysis;
pub mod block;
pub mod config;
pub mod executor;
pub mod plan;
pub mod renderer;

pub use analysis::{BlockAnalysis, DependencyAnalyzer};
pub use block::{TemplateBlock, TrimMode};
pub use config::{ConfigError, ExecutorConfig};
pub use executor::{BlockOutcome, ExecutionReport, ParallelExecutor, ReportSummary};
pub use plan::{ExecutionPhase, ExecutionPlan, Scheduler};
pub use renderer::{RenderOutput, TemplateRenderer};
