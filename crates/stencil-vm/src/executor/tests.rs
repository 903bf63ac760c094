use super::*;
use crate::Compiler;
use indexmap::IndexMap;

#[derive(Debug, PartialEq)]
enum TestError {
    Vm(VmError),
    Reference(String),
}

impl From<VmError> for TestError {
    fn from(err: VmError) -> Self {
        TestError::Vm(err)
    }
}

#[derive(Default)]
struct TestContext {
    vars: HashMap<String, Value>,
    loads: usize,
    calls: Vec<String>,
}

impl TestContext {
    fn with(vars: &[(&str, Value)]) -> Self {
        Self {
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            ..Self::default()
        }
    }
}

impl VmContext for TestContext {
    type Error = TestError;

    fn load(&mut self, name: &str) -> Result<Value, TestError> {
        self.loads += 1;
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| TestError::Reference(name.to_string()))
    }

    fn load_ref(&mut self, name: &str) -> Result<Value, TestError> {
        self.loads += 1;
        Ok(self
            .vars
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::host_ref(name)))
    }

    fn store(&mut self, name: &str, value: Value) -> Result<(), TestError> {
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    fn get_property(&mut self, object: &Value, name: &str) -> Result<Value, TestError> {
        Ok(match object {
            Value::HostRef(path) => Value::host_ref(format!("{path}.{name}")),
            Value::Map(map) => map.read().get(name).cloned().unwrap_or_default(),
            Value::Str(s) if name == "length" => Value::Int(s.chars().count() as i64),
            _ => Value::Undefined,
        })
    }

    fn get_index(&mut self, object: &Value, index: &Value) -> Result<Value, TestError> {
        let items = object.list_items();
        Ok(index
            .as_int()
            .and_then(|i| items.get(i as usize).cloned())
            .unwrap_or_default())
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, TestError> {
        let Value::HostRef(path) = callee else {
            return Ok(Value::Undefined);
        };
        self.calls.push(path.to_string());
        Ok(Value::from(format!("{path}/{}", args.len())))
    }

    fn call_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, TestError> {
        match receiver {
            Value::HostRef(path) => {
                let path = format!("{path}.{method}");
                let rendered: Vec<String> = args.iter().map(Value::to_string).collect();
                self.calls.push(path.clone());
                Ok(Value::from(format!("{path}({})", rendered.join(","))))
            }
            Value::Str(s) if method == "toUpperCase" => Ok(Value::from(s.to_uppercase())),
            _ => Ok(Value::Undefined),
        }
    }
}

fn run(source: &str, ctx: &mut TestContext) -> Result<Value, TestError> {
    let expr = Compiler::new().compile(source).unwrap();
    Vm::new().execute(&expr, ctx)
}

fn eval(source: &str) -> String {
    run(source, &mut TestContext::default()).unwrap().to_string()
}

#[test]
fn test_arithmetic_and_coercion() {
    assert_eq!(eval("1 + 2 * 3"), "7");
    assert_eq!(eval("7 / 2"), "3.5");
    assert_eq!(eval("7 % 0"), "NaN");
    assert_eq!(eval("'a' + 1"), "a1");
    assert_eq!(eval("'5' == 5"), "true");
    assert_eq!(eval("'5' === 5"), "false");
    assert_eq!(eval("-(2 - 5)"), "3");
    assert_eq!(eval("1 << 4 | 1"), "17");
}

#[test]
fn test_short_circuit_keeps_operand() {
    assert_eq!(eval("0 || 'fallback'"), "fallback");
    assert_eq!(eval("'first' || 'second'"), "first");
    assert_eq!(eval("null && missing"), "null");
    assert_eq!(eval("1 && 2"), "2");
}

#[test]
fn test_short_circuit_skips_right_side() {
    // `missing` is unbound; evaluating it would be a reference error.
    let mut ctx = TestContext::default();
    assert!(run("false && missing", &mut ctx).is_ok());
    assert!(run("true || missing", &mut ctx).is_ok());
    assert_eq!(
        run("true && missing", &mut ctx).unwrap_err(),
        TestError::Reference("missing".into())
    );
}

#[test]
fn test_conditional() {
    assert_eq!(eval("1 > 2 ? 'a' : 'b'"), "b");
    assert_eq!(eval("(3 > 2 ? 10 : 20) + 1"), "11");
}

#[test]
fn test_typeof_unbound_is_undefined() {
    assert_eq!(eval("typeof nothing"), "undefined");
    assert_eq!(eval("typeof 'x'"), "string");
}

#[test]
fn test_host_calls_route_by_path() {
    let mut ctx = TestContext::default();
    let value = run("tp.date.now('YYYY', 1)", &mut ctx).unwrap();
    assert_eq!(value.to_string(), "tp.date.now(YYYY,1)");
    assert_eq!(ctx.calls, vec!["tp.date.now"]);

    let value = run("helper(1, 2)", &mut ctx).unwrap();
    assert_eq!(value.to_string(), "helper/2");
}

#[test]
fn test_variables_properties_and_indexes() {
    let mut entries = IndexMap::new();
    entries.insert("title".to_string(), Value::from("Notes"));
    let mut ctx = TestContext::with(&[
        ("note", Value::map(entries)),
        ("items", Value::list(vec![Value::Int(10), Value::Int(20)])),
        ("name", Value::from("ada")),
    ]);
    assert_eq!(run("note.title", &mut ctx).unwrap().to_string(), "Notes");
    assert_eq!(run("items[1] + items[0]", &mut ctx).unwrap().to_string(), "30");
    assert_eq!(run("name.toUpperCase()", &mut ctx).unwrap().to_string(), "ADA");
    assert_eq!(run("name.length", &mut ctx).unwrap().to_string(), "3");
    assert_eq!(run("[1, name, [2]]", &mut ctx).unwrap().to_string(), "1,ada,2");
}

#[test]
fn test_unbound_bare_identifier_is_reference_error() {
    let mut ctx = TestContext::default();
    assert_eq!(
        run("nope + 1", &mut ctx).unwrap_err(),
        TestError::Reference("nope".into())
    );
}

#[test]
fn test_variable_cache_serves_stable_values() {
    let mut ctx = TestContext::with(&[("x", Value::Int(2))]);
    let value = run("x + x + x", &mut ctx).unwrap();
    assert_eq!(value.to_string(), "6");
    // Two loads establish the value; the third is served from the cache.
    assert_eq!(ctx.loads, 2);
}

#[test]
fn test_store_invalidates_cache() {
    let mut ctx = TestContext::with(&[("x", Value::Int(1))]);
    let compiler_out = Compiler::new().compile("x + x").unwrap();
    let assign = Compiler::new().compile("x = 5").unwrap();
    let mut vm = Vm::new();

    vm.execute(&compiler_out, &mut ctx).unwrap();
    vm.execute(&compiler_out, &mut ctx).unwrap();
    assert!(vm.cache_hits() > 0);

    vm.execute(&assign, &mut ctx).unwrap();
    let value = vm.execute(&compiler_out, &mut ctx).unwrap();
    assert_eq!(value.to_string(), "10");
    assert_eq!(ctx.vars["x"].to_string(), "5");
}

#[test]
fn test_stack_overflow_is_an_error() {
    let source = format!("[{}]", vec!["1"; STACK_SIZE + 1].join(","));
    let mut ctx = TestContext::default();
    assert_eq!(
        run(&source, &mut ctx).unwrap_err(),
        TestError::Vm(VmError::StackOverflow(STACK_SIZE))
    );
}

#[test]
fn test_int_ops_fall_back_for_non_int_operands() {
    let mut expr = CompiledExpr::new();
    let s = expr.add_string("a");
    expr.emit(OpCode::PushStr, s);
    expr.emit(OpCode::PushInt, 1);
    expr.emit(OpCode::AddInt, 0);
    let value = Vm::new()
        .execute(&expr, &mut TestContext::default())
        .unwrap();
    assert_eq!(value.to_string(), "a1");
}
