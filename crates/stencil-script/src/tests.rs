use std::sync::Arc;

use stencil_foundation::coercion::to_display_string;
use stencil_foundation::{CancellationToken, HostBindings, HostOutcome, Value};

use crate::{EngineConfig, RuntimeError, ScriptEngine, ScriptError};

struct TestHost;

impl HostBindings for TestHost {
    fn call_function(
        &self,
        name: &str,
        args: &[Value],
        cancel: &CancellationToken,
    ) -> Option<HostOutcome> {
        match name {
            "tp.date.now" => Some(HostOutcome::Value(Value::from("2024-01-01"))),
            "tp.echo" => Some(HostOutcome::Value(args.first().cloned().unwrap_or_default())),
            "tp.fail" => Some(HostOutcome::Error("boom".into())),
            "tp.stop" => {
                cancel.cancel_with_reason("stopped by host");
                Some(HostOutcome::Empty)
            }
            _ => None,
        }
    }

    fn get_property(&self, receiver: &Value, property: &str) -> Option<Value> {
        match (receiver, property) {
            (Value::HostRef(path), "title") if path.as_ref() == "tp.file" => {
                Some(Value::from("Daily Note"))
            }
            _ => None,
        }
    }
}

fn engine() -> ScriptEngine {
    ScriptEngine::new(Arc::new(TestHost))
}

fn run(source: &str) -> String {
    engine()
        .execute_block(source, &CancellationToken::new())
        .unwrap()
}

fn run_err(source: &str) -> ScriptError {
    engine()
        .execute_block(source, &CancellationToken::new())
        .unwrap_err()
}

#[test]
fn test_for_loop_appends_each_iteration() {
    assert_eq!(run("for (let i = 1; i <= 3; i++) { tR += i; }"), "123");
}

#[test]
fn test_loose_and_strict_equality() {
    let engine = engine();
    let cancel = CancellationToken::new();
    let loose = engine.evaluate_expression("\"5\" == 5", &cancel).unwrap();
    let strict = engine.evaluate_expression("\"5\" === 5", &cancel).unwrap();
    assert!(matches!(loose, Value::Bool(true)));
    assert!(matches!(strict, Value::Bool(false)));
}

#[test]
fn test_thrown_value_is_caught() {
    assert_eq!(run("try { throw \"x\" } catch (e) { tR += e }"), "x");
}

#[test]
fn test_uncaught_throw_fails_block() {
    let err = run_err("tR += 'a'; throw 'bad';");
    assert!(matches!(err, ScriptError::Runtime(RuntimeError::Thrown(_))));
    assert_eq!(err.to_string(), "Runtime Error: bad");
}

#[test]
fn test_reference_error_is_catchable() {
    assert_eq!(
        run("try { missing + 1 } catch (e) { tR += e }"),
        "missing is not defined"
    );
}

#[test]
fn test_finally_runs() {
    assert_eq!(
        run("try { tR += 'a'; throw 1; } catch (e) { tR += 'b'; } finally { tR += 'c'; }"),
        "abc"
    );
}

#[test]
fn test_block_output_and_shared_accumulator() {
    let engine = engine();
    let cancel = CancellationToken::new();
    assert_eq!(engine.execute_block("let x = 1;", &cancel).unwrap(), "");
    assert_eq!(engine.execute_block("let y = 2;", &cancel).unwrap(), "");
    assert_eq!(engine.execute_block("tR += x + y;", &cancel).unwrap(), "3");
    assert_eq!(engine.accumulator(), "3");
}

#[test]
fn test_accumulator_assignment_replaces() {
    let engine = engine();
    let cancel = CancellationToken::new();
    engine.execute_block("tR += 'old';", &cancel).unwrap();
    engine.execute_block("tR = 'new';", &cancel).unwrap();
    assert_eq!(engine.accumulator(), "new");
}

#[test]
fn test_function_declarations_are_hoisted() {
    assert_eq!(
        run("tR += double(4); function double(n) { return n * 2; }"),
        "8"
    );
}

#[test]
fn test_arrow_functions_and_list_callbacks() {
    assert_eq!(
        run("let xs = [1, 2, 3].map(x => x * 10); tR += xs.join('-');"),
        "10-20-30"
    );
    assert_eq!(
        run("tR += [1, 2, 3, 4].filter(n => n % 2 == 0).length;"),
        "2"
    );
}

#[test]
fn test_function_valued_map_member() {
    assert_eq!(
        run("let o = { greet: n => 'hi ' + n }; tR += o.greet('bo');"),
        "hi bo"
    );
}

#[test]
fn test_function_parameters_are_local() {
    assert_eq!(
        run("let n = 'outer'; function f(n) { return n; } tR += f('inner') + n;"),
        "innerouter"
    );
}

#[test]
fn test_call_depth_limit() {
    let config = EngineConfig {
        max_call_depth: 20,
        ..EngineConfig::default()
    };
    let engine = ScriptEngine::with_config(Arc::new(TestHost), config);
    let err = engine
        .execute_block("function f(n) { return f(n + 1); } f(0);", &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ScriptError::Runtime(RuntimeError::Range(_))));
}

#[test]
fn test_runaway_recursion_is_catchable_with_default_limits() {
    let source = "function f(n) { if (n > 0) { return f(n + 1); } return 0; } \
                  try { tR += f(1); } catch (e) { tR += e; }";
    assert_eq!(run(source), "RangeError: Maximum call stack size exceeded");

    let err = run_err("function f(n) { if (n > 0) { return f(n + 1); } return 0; } tR += f(1);");
    assert!(matches!(err, ScriptError::Runtime(RuntimeError::Range(_))));
}

#[test]
fn test_callbacks_see_enclosing_parameters() {
    assert_eq!(
        run("function scale(xs, k) { return xs.map(v => v * k); } tR += scale([1, 2], 3).join(',');"),
        "3,6"
    );
}

#[test]
fn test_nested_call_sees_caller_parameters() {
    assert_eq!(
        run("function inner() { return n * 2; } function outer(n) { return inner(); } tR += outer(5);"),
        "10"
    );
}

#[test]
fn test_parameters_are_restored_after_error() {
    let source = "let k = 'outer'; function boom(k) { throw k; } \
                  try { boom('inner'); } catch (e) { tR += e; } tR += k;";
    assert_eq!(run(source), "innerouter");
}

#[test]
fn test_loop_iteration_cap_stops_silently() {
    let config = EngineConfig::default().with_max_loop_iterations(50);
    let engine = ScriptEngine::with_config(Arc::new(TestHost), config);
    engine
        .execute_block("let n = 0; while (true) { n++; }", &CancellationToken::new())
        .unwrap();
    assert!(matches!(engine.environment().get("n"), Some(Value::Int(50))));
}

#[test]
fn test_break_and_continue() {
    assert_eq!(
        run("for (let i = 0; i < 10; i++) { if (i % 2 == 0) continue; if (i > 6) break; tR += i; }"),
        "135"
    );
}

#[test]
fn test_for_of_over_list_and_string() {
    assert_eq!(run("for (const c of 'ab') { tR += c.toUpperCase(); }"), "AB");
    assert_eq!(run("for (const n of [3, 4]) { tR += n * n; }"), "916");
}

#[test]
fn test_template_literal_interpolation() {
    assert_eq!(
        run("let name = 'Ada'; tR += `Hi ${name.toUpperCase()}, ${1 + 1} times!`;"),
        "Hi ADA, 2 times!"
    );
}

#[test]
fn test_builtin_globals() {
    assert_eq!(run("tR += Math.max(1, 9, 3) + Math.floor(2.7);"), "11");
    assert_eq!(run("tR += parseInt('42px') + Number('8');"), "50");
    assert_eq!(run("tR += Object.keys({ b: 1, a: 2 }).join();"), "b,a");
    assert_eq!(
        run("tR += JSON.stringify({ b: 1, a: [1, 'x'] });"),
        r#"{"b":1,"a":[1,"x"]}"#
    );
    assert_eq!(run("tR += isNaN('abc');"), "true");
}

#[test]
fn test_string_and_list_builtins() {
    assert_eq!(run("tR += '  pad '.trim().padStart(5, '*');"), "**pad");
    assert_eq!(run("tR += 'a,b,c'.split(',').reverse().join('');"), "cba");
    assert_eq!(run("let xs = [1]; xs.push(2, 3); tR += xs.length + ':' + xs.pop();"), "3:3");
    assert_eq!(run("tR += 'abc'.length;"), "3");
}

#[test]
fn test_host_function_and_property() {
    assert_eq!(run("tR += tp.date.now();"), "2024-01-01");
    assert_eq!(run("tR += tp.file.title;"), "Daily Note");
    assert_eq!(run("tR += await tp.echo('hi');"), "hi");
}

#[test]
fn test_unknown_host_function_is_type_error() {
    let err = run_err("tp.nothing.here();");
    assert!(matches!(err, ScriptError::Runtime(RuntimeError::Type(_))));
}

#[test]
fn test_host_error_is_not_catchable() {
    let err = run_err("try { tp.fail(); } catch (e) { tR += 'caught'; }");
    assert!(matches!(err, ScriptError::Host(_)));
    assert_eq!(err.to_string(), "Runtime Error: boom");
}

#[test]
fn test_cancelled_before_start() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine().execute_block("tR += 1;", &cancel).unwrap_err();
    assert!(err.is_cancelled());
}

#[test]
fn test_cancellation_stops_running_loop() {
    let err = run_err("tp.stop(); while (true) { }");
    assert!(matches!(err, ScriptError::Cancelled(Some(ref reason)) if reason == "stopped by host"));
}

#[test]
fn test_parse_error_skips_only_the_bad_statement() {
    let engine = engine();
    let output = engine
        .execute_block("tR += 'a'; let = ; tR += 'b';", &CancellationToken::new())
        .unwrap();
    assert!(output.starts_with("ab[Parse Error:"), "{output}");
    assert!(output.ends_with(']'));
    assert_eq!(engine.accumulator(), "ab");
}

#[test]
fn test_every_parse_error_is_rendered() {
    let output = run("let = 1; tR += 'x'; let = 2;");
    assert!(output.starts_with('x'));
    assert_eq!(output.matches("[Parse Error:").count(), 2);
}

#[test]
fn test_lex_error_is_tagged() {
    let output = run("tR += 'ok'; let s = 'open");
    assert!(output.starts_with("ok[Lexer Error:"), "{output}");
}

#[test]
fn test_expression_cache_hits_on_repeat() {
    let engine = engine();
    let cancel = CancellationToken::new();
    engine.evaluate_expression("1 + 2", &cancel).unwrap();
    engine.evaluate_expression("1 + 2;", &cancel).unwrap();
    let stats = engine.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_uncompilable_expression_falls_back() {
    let engine = engine();
    let cancel = CancellationToken::new();
    let value = engine
        .evaluate_expression("[1, 2].map(x => x + 1).join()", &cancel)
        .unwrap();
    assert_eq!(value.to_string(), "2,3");
    assert_eq!(engine.cache_stats().misses, 1);
}

#[test]
fn test_vm_and_interpreter_agree() {
    let engine = engine();
    engine.environment().set("a", Value::Int(4));
    engine.environment().set("s", Value::from("str"));
    let cancel = CancellationToken::new();

    let expressions = [
        "1 + 2 * 3",
        "7 / 2",
        "-7 % 3",
        "10 / 0",
        "0 / 0",
        "2147483647 + 1",
        "'a' + 1",
        "1 + '2'",
        "'5' - 2",
        "null == undefined",
        "null === undefined",
        "1 < 2 && 'yes'",
        "0 || 'fallback'",
        "typeof unbound",
        "typeof s",
        "true ? 1 : 2",
        "5 & 3 | 8",
        "1 << 4",
        "-16 >> 2",
        "-1 >>> 28",
        "!0",
        "~5",
        "a * a + 1",
        "[1, 2, 3].length",
        "s.toUpperCase()",
        "Math.max(1, 9, 3)",
        "'x'.repeat(3)",
    ];

    for source in expressions {
        let vm = engine.evaluate_expression(source, &cancel).unwrap();
        let tree = engine.interpret_expression(source, &cancel).unwrap();
        assert_eq!(vm.type_name(), tree.type_name(), "{source}");
        assert_eq!(to_display_string(&vm), to_display_string(&tree), "{source}");
    }
    assert_eq!(engine.cache_stats().misses, expressions.len() as u64);
}
