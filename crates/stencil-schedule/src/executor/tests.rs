use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use stencil_foundation::{
    CancellationToken, FunctionFlags, HostBindings, HostOutcome, StaticRegistry, Value,
};
use stencil_script::{ScriptEngine, ScriptError};

use super::*;
use crate::{DependencyAnalyzer, Scheduler};

#[derive(Default)]
struct ProbeHost {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl HostBindings for ProbeHost {
    fn call_function(
        &self,
        name: &str,
        _args: &[Value],
        cancel: &CancellationToken,
    ) -> Option<HostOutcome> {
        match name {
            "tp.probe.enter" => {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                self.current.fetch_sub(1, Ordering::SeqCst);
                Some(HostOutcome::Empty)
            }
            "tp.slow.wait" => {
                let deadline = Instant::now() + Duration::from_secs(5);
                while !cancel.is_cancelled() && Instant::now() < deadline {
                    std::thread::sleep(Duration::from_millis(5));
                }
                if cancel.is_cancelled() {
                    Some(HostOutcome::Cancelled)
                } else {
                    Some(HostOutcome::Empty)
                }
            }
            _ => None,
        }
    }
}

fn plan_for(blocks: &[TemplateBlock]) -> ExecutionPlan {
    let registry = StaticRegistry::new().with("slow", "wait", FunctionFlags::CANCELLABLE);
    let analyzer = DependencyAnalyzer::new(Arc::new(registry));
    Scheduler::new().plan(analyzer.analyze_all(blocks))
}

fn executor(host: Arc<ProbeHost>, config: ExecutorConfig) -> ParallelExecutor {
    ParallelExecutor::new(Arc::new(ScriptEngine::new(host)), config).unwrap()
}

fn success(report: &ExecutionReport, id: usize) -> &str {
    match report.get(id) {
        Some(BlockOutcome::Success(text)) => text,
        other => panic!("block {id}: expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_runs_dependent_phases_in_order() {
    let blocks = vec![
        TemplateBlock::execution(0, "let x = 1;"),
        TemplateBlock::execution(1, "let y = 2;"),
        TemplateBlock::execution(2, "tR += x + y;"),
    ];
    let plan = plan_for(&blocks);
    let executor = executor(Arc::default(), ExecutorConfig::default());

    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;

    assert_eq!(report.phases_run, 2);
    assert_eq!(success(&report, 0), "");
    assert_eq!(success(&report, 2), "3");
    assert_eq!(executor.engine().accumulator(), "3");
    assert_eq!(report.summary().succeeded, 3);
}

#[tokio::test]
async fn test_parallel_phase_overlaps_blocks() {
    let blocks = vec![
        TemplateBlock::execution(0, "tp.probe.enter(); let a = 1;"),
        TemplateBlock::execution(1, "tp.probe.enter(); let b = 2;"),
    ];
    let plan = plan_for(&blocks);
    assert!(plan.phases[0].can_parallelize());

    let host = Arc::new(ProbeHost::default());
    let executor = executor(host.clone(), ExecutorConfig::default().with_max_concurrency(2));
    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;

    assert_eq!(report.summary().succeeded, 2);
    assert_eq!(host.peak.load(Ordering::SeqCst), 2);
    assert_eq!(executor.active_tasks(), 0);
}

#[tokio::test]
async fn test_concurrency_limit_of_one_serializes() {
    let blocks = vec![
        TemplateBlock::execution(0, "tp.probe.enter(); let a = 1;"),
        TemplateBlock::execution(1, "tp.probe.enter(); let b = 2;"),
        TemplateBlock::execution(2, "tp.probe.enter(); let c = 3;"),
    ];
    let plan = plan_for(&blocks);
    let host = Arc::new(ProbeHost::default());
    let executor = executor(host.clone(), ExecutorConfig::default().with_max_concurrency(1));

    executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;
    assert_eq!(host.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timeout_cancels_block_token() {
    let blocks = vec![TemplateBlock::execution(0, "tp.slow.wait();")];
    let plan = plan_for(&blocks);
    assert!(plan.phases[0].has_barrier());

    let config = ExecutorConfig::default().with_block_timeout(Duration::from_millis(50));
    let executor = executor(Arc::default(), config);
    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;
    assert!(matches!(report.get(0), Some(BlockOutcome::Timeout)));
    assert_eq!(report.get(0).and_then(BlockOutcome::render), None);

    // The host call observes the cancelled block token and returns.
    let deadline = Instant::now() + Duration::from_secs(2);
    while executor.active_tasks() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(executor.active_tasks(), 0);
}

#[tokio::test]
async fn test_fail_fast_cancels_later_phases() {
    let blocks = vec![
        TemplateBlock::execution(0, "let a = 1; throw 'boom';"),
        TemplateBlock::execution(1, "tR += a;"),
    ];
    let plan = plan_for(&blocks);
    assert_eq!(plan.phases.len(), 2);

    let strict = executor(Arc::default(), ExecutorConfig::default().with_fail_fast(true));
    let report = strict
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;
    assert!(matches!(report.get(0), Some(BlockOutcome::Failure(_))));
    assert!(matches!(report.get(1), Some(BlockOutcome::Cancelled)));
    assert_eq!(report.phases_run, 1);

    let lenient = executor(Arc::default(), ExecutorConfig::default());
    let report = lenient
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;
    assert!(matches!(report.get(0), Some(BlockOutcome::Failure(_))));
    assert_eq!(success(&report, 1), "1");
}

#[tokio::test]
async fn test_cancelled_run_skips_every_phase() {
    let blocks = vec![
        TemplateBlock::execution(0, "tR += 'a';"),
        TemplateBlock::execution(1, "tR += 'b';"),
    ];
    let plan = plan_for(&blocks);
    let cancel = CancellationToken::new();
    cancel.cancel_with_reason("user");

    let executor = executor(Arc::default(), ExecutorConfig::default());
    let report = executor.execute(&blocks, &plan, &cancel).await;
    assert_eq!(report.phases_run, 0);
    assert_eq!(report.summary().cancelled, 2);
    assert_eq!(executor.engine().accumulator(), "");
}

#[tokio::test]
async fn test_failure_renders_inline_and_spares_siblings() {
    let blocks = vec![
        TemplateBlock::execution(0, "tR += missing;"),
        TemplateBlock::execution(1, "try { throw \"x\" } catch (e) { tR += e }"),
        TemplateBlock::execution(2, "let other = 1;"),
    ];
    let plan = plan_for(&blocks);
    let executor = executor(Arc::default(), ExecutorConfig::default());
    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;

    let Some(BlockOutcome::Failure(err)) = report.get(0) else {
        panic!("expected failure");
    };
    assert!(matches!(err, ScriptError::Runtime(_)));
    assert_eq!(
        report.get(0).and_then(BlockOutcome::render).as_deref(),
        Some("[Runtime Error: missing is not defined]")
    );
    assert_eq!(success(&report, 1), "x");
    assert_eq!(success(&report, 2), "");
    assert_eq!(executor.engine().accumulator(), "x");
}

#[tokio::test]
async fn test_interpolation_block_yields_value() {
    let blocks = vec![
        TemplateBlock::execution(0, "let name = 'Ada';"),
        TemplateBlock::interpolation(1, "name.toUpperCase()"),
    ];
    let plan = plan_for(&blocks);
    assert_eq!(plan.phase_of(1), Some(1));

    let executor = executor(Arc::default(), ExecutorConfig::default());
    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;
    assert_eq!(success(&report, 1), "ADA");
}

#[tokio::test]
async fn test_runaway_recursion_fails_only_its_block() {
    let blocks = vec![
        TemplateBlock::execution(0, "function f(n) { return f(n + 1); } tR += f(1);"),
        TemplateBlock::execution(1, "let sibling = 'alive';"),
    ];
    let plan = plan_for(&blocks);
    let executor = executor(Arc::default(), ExecutorConfig::default().with_max_concurrency(2));
    let report = executor
        .execute(&blocks, &plan, &CancellationToken::new())
        .await;

    assert_eq!(
        report.get(0).and_then(BlockOutcome::render).as_deref(),
        Some("[Runtime Error: RangeError: Maximum call stack size exceeded]")
    );
    assert_eq!(success(&report, 1), "");
}
