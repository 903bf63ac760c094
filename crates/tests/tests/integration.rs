//! Integration tests for end-to-end template runs.
//!
//! These tests verify the full pipeline:
//! Blocks → Analyze → Plan → Execute → Verify

use std::sync::Arc;

use stencil_foundation::coercion::to_display_string;
use stencil_foundation::{CancellationToken, HostBindings, HostOutcome, Value};
use stencil_schedule::{BlockOutcome, ExecutionPlan, ExecutorConfig};
use stencil_script::{EngineConfig, Environment, ScriptEngine};
use stencil_tests::{TemplateHarness, success_text};

/// Answers `tp.system.prompt` with a fixed name.
struct PromptHost;

impl HostBindings for PromptHost {
    fn call_function(
        &self,
        name: &str,
        _args: &[Value],
        _cancel: &CancellationToken,
    ) -> Option<HostOutcome> {
        (name == "tp.system.prompt").then(|| HostOutcome::Value(Value::from("Ada")))
    }
}

fn phase_ids(plan: &ExecutionPlan) -> Vec<Vec<usize>> {
    plan.phases
        .iter()
        .map(|phase| phase.block_ids().collect())
        .collect()
}

/// Two declarations followed by a block reading both.
///
/// Verifies: the reader waits for both writers → accumulator "3"
#[test]
fn test_dependent_blocks_accumulate() {
    let harness = TemplateHarness::from_commands(&["let x = 1;", "let y = 2;", "tR += x + y;"]);

    let plan = harness.plan();
    assert_eq!(phase_ids(&plan), vec![vec![0, 1], vec![2]]);
    assert!(plan.phase_of(0) < plan.phase_of(2));
    assert!(plan.phase_of(1) < plan.phase_of(2));

    let output = harness.run();
    assert_eq!(output.accumulator, "3");
    assert_eq!(success_text(&output, 2), "3");
}

/// Independent declarations share one parallel phase.
#[test]
fn test_independent_declarations_share_phase() {
    let harness = TemplateHarness::from_commands(&["let a = 1;", "let b = 2;"]);

    let plan = harness.plan();
    assert_eq!(plan.phases.len(), 1);
    assert!(plan.phases[0].can_parallelize());
    assert_eq!(plan.parallelizable_blocks, 2);

    let output = harness.run();
    assert_eq!(output.report.summary().succeeded, 2);
}

/// A barrier block runs alone; the blocks after it may run together.
#[test]
fn test_barrier_runs_alone() {
    let harness = TemplateHarness::new()
        .barrier("system", "prompt")
        .with_host(Arc::new(PromptHost))
        .block("let name = tp.system.prompt('Name?');")
        .block("let a = 1;")
        .block("let b = 2;");

    let plan = harness.plan();
    assert_eq!(phase_ids(&plan), vec![vec![0], vec![1, 2]]);
    assert!(plan.phases[0].has_barrier());
    assert!(!plan.phases[0].can_parallelize());
    assert!(plan.phases[1].can_parallelize());

    let output = harness.run();
    assert_eq!(output.report.summary().succeeded, 3);
}

/// A counting loop stops on its own condition, well before the cap.
#[test]
fn test_loop_builds_output() {
    let harness =
        TemplateHarness::from_commands(&["for (let i = 1; i <= 3; i++) { tR += i; }"]);
    let output = harness.run();
    assert_eq!(output.accumulator, "123");
}

/// Loose equality coerces; strict equality does not.
#[test]
fn test_equality_in_interpolations() {
    let harness = TemplateHarness::new()
        .interpolation("\"5\" == 5")
        .interpolation("\"5\" === 5");
    let output = harness.run();
    assert_eq!(success_text(&output, 0), "true");
    assert_eq!(success_text(&output, 1), "false");
    // Interpolation values are spliced, never appended to tR.
    assert_eq!(output.accumulator, "");
}

/// A caught throw stays inside its block.
#[test]
fn test_caught_throw_spares_siblings() {
    let harness = TemplateHarness::from_commands(&[
        "try { throw \"x\" } catch (e) { tR += e }",
        "let unrelated = 1;",
    ]);
    let output = harness.run();
    assert_eq!(output.accumulator, "x");
    assert_eq!(output.report.summary().succeeded, 2);
}

/// Uncaught errors render inline and leave other blocks running.
#[test]
fn test_errors_render_inline() {
    let harness = TemplateHarness::from_commands(&[
        "let = ;",
        "throw 'nope';",
        "let fine = 'ok';",
    ])
    .interpolation("fine");
    let output = harness.run();

    let parse = output.report.get(0).and_then(BlockOutcome::render);
    assert!(parse.is_some_and(|text| text.starts_with("[Parse Error:")));
    assert_eq!(
        output.report.get(1).and_then(BlockOutcome::render).as_deref(),
        Some("[Runtime Error: nope]")
    );
    assert_eq!(success_text(&output, 3), "ok");
}

/// Every block lands in exactly one phase, and dependencies point backwards.
#[test]
fn test_plan_partitions_blocks() {
    let harness = TemplateHarness::new()
        .barrier("system", "prompt")
        .block("let a = 1;")
        .block("let b = a + 1;")
        .block("tR += 'x';")
        .block("tp.system.prompt('?');")
        .block("let c = 3;")
        .block("tR += b + c;")
        .interpolation("a")
        .block("a = 10;");

    let renderer = harness.renderer();
    let analyses = renderer.analyze(harness.blocks());
    let plan = renderer.plan(harness.blocks());

    let total: usize = plan.phases.iter().map(|phase| phase.len()).sum();
    assert_eq!(total, plan.total_blocks);
    assert_eq!(total, harness.blocks().len());
    for block in harness.blocks() {
        let count = plan
            .phases
            .iter()
            .filter(|phase| phase.block_ids().any(|id| id == block.id))
            .count();
        assert_eq!(count, 1, "block {} placed {count} times", block.id);
    }

    for later in &analyses {
        for earlier in analyses.iter().filter(|a| a.block_id < later.block_id) {
            if later.depends_on(earlier) {
                assert!(
                    plan.phase_of(earlier.block_id) < plan.phase_of(later.block_id),
                    "block {} must follow block {}",
                    later.block_id,
                    earlier.block_id
                );
            }
        }
    }

    for phase in &plan.phases {
        if phase.has_barrier() {
            assert!(!phase.can_parallelize());
        }
    }
}

/// The renderer shares one engine across blocks, so repeated interpolations
/// compile once.
#[test]
fn test_repeated_interpolations_hit_cache() {
    let harness = TemplateHarness::new()
        .block("let n = 4;")
        .interpolation("n * 2")
        .interpolation("n * 2")
        .interpolation("n * 2");
    let renderer = harness.renderer();
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let output = runtime.block_on(renderer.render(harness.blocks(), &CancellationToken::new()));

    assert_eq!(success_text(&output, 3), "8");
    let stats = renderer.engine().cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}

/// The bytecode VM and the interpreter agree on side-effect-free
/// expressions over the same variables.
#[test]
fn test_vm_and_interpreter_agree() {
    let env = Environment::new();
    env.set("n", Value::from(7_i64));
    env.set("s", Value::from("ab"));
    env.set("flag", Value::from(false));

    let vm = ScriptEngine::default().with_environment(env.clone());
    let ast = ScriptEngine::with_config(
        Arc::new(stencil_foundation::NoHost),
        EngineConfig::default().with_bytecode(false),
    )
    .with_environment(env);
    let cancel = CancellationToken::new();

    for expr in [
        "n + 1",
        "n * 3 - 2",
        "n / 2",
        "n % 4",
        "s + n",
        "n > 5 && !flag",
        "flag || s",
        "n == '7'",
        "n === 7",
        "s < 'b'",
        "-n",
        "n > 3 ? 'big' : 'small'",
    ] {
        let fast = vm.evaluate_expression(expr, &cancel).unwrap();
        let slow = ast.evaluate_expression(expr, &cancel).unwrap();
        assert!(
            fast.is_identical(&slow),
            "{expr}: vm {} vs interpreter {}",
            to_display_string(&fast),
            to_display_string(&slow)
        );
    }
}

/// A token cancelled before the run skips every block without failing any.
#[test]
fn test_cancelled_run_reports_cancelled() {
    let harness = TemplateHarness::from_commands(&["tR += 'a';", "tR += 'b';"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let output = harness.run_with_token(&cancel);
    assert_eq!(output.report.summary().cancelled, 2);
    assert_eq!(output.report.summary().failed, 0);
    assert_eq!(output.accumulator, "");
}

/// Sequential mode still produces the same output.
#[test]
fn test_sequential_matches_parallel() {
    let commands = ["let a = 'x';", "let b = 'y';", "tR += a + b;"];
    let parallel = TemplateHarness::from_commands(&commands).run();
    let sequential = TemplateHarness::from_commands(&commands)
        .with_executor_config(ExecutorConfig::default().with_max_concurrency(1))
        .run();
    assert_eq!(parallel.accumulator, "xy");
    assert_eq!(sequential.accumulator, parallel.accumulator);
}
