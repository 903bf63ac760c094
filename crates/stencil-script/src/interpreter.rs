//! Tree-walking interpreter.
//!
//! Statements produce a [`Flow`] so `return`, `break` and `continue` travel up
//! through blocks and loops as ordinary values. Only errors use `Err`.
//!
//! Script functions capture nothing: a call pushes a frame holding its
//! parameters (and any names it declares) and pops it on return, which
//! restores whatever those names meant before the call. Names resolve
//! through the frame stack innermost first, then the shared
//! [`Environment`], so callbacks see the parameters of the calls they run
//! inside.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use stencil_ast::{ExprKind, Expression, FunctionBody, FunctionDef, Program, Statement, StmtKind};
use stencil_foundation::coercion::{to_boolean, to_display_string, to_number, to_property_key};
use stencil_foundation::operators::{apply_binary, apply_unary};
use stencil_foundation::{
    AssignOp, Callable, CancellationToken, HostBindings, HostOutcome, LogicalOp,
    RESULT_ACCUMULATOR, UnaryOp, Value,
};
use stencil_parser::parse_expression;
use stencil_vm::VmContext;

use crate::builtins::global;
use crate::env::Environment;
use crate::error::{Result, RuntimeError, ScriptError, type_error};
use crate::template::{TemplatePart, split_template};
use crate::EngineConfig;

/// Completion state of a statement.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Evaluator for one block execution.
pub struct Interpreter<'a> {
    env: &'a Environment,
    host: &'a dyn HostBindings,
    cancel: &'a CancellationToken,
    config: &'a EngineConfig,
    frames: Vec<HashMap<String, Value>>,
    /// Stack address when the interpreter was created.
    stack_base: usize,
    /// Text this execution wrote to `tR`.
    output: String,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        env: &'a Environment,
        host: &'a dyn HostBindings,
        cancel: &'a CancellationToken,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            env,
            host,
            cancel,
            config,
            frames: Vec::new(),
            stack_base: stack_address(),
            output: String::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Run a whole program. A top-level `return` ends it early.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.hoist(&program.body);
        self.exec_block(&program.body)?;
        Ok(())
    }

    /// Evaluate a single expression.
    pub fn evaluate(&mut self, expr: &Expression) -> Result<Value> {
        self.eval(expr)
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ScriptError::Cancelled(self.cancel.reason()))
        } else {
            Ok(())
        }
    }

    // === Variables ===

    fn lookup(&self, name: &str) -> Option<Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).cloned())
            .or_else(|| self.env.get(name))
    }

    fn declare(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_string(), value);
            }
            None => self.env.set(name, value),
        }
    }

    fn assign_var(&mut self, name: &str, value: Value) {
        if name == RESULT_ACCUMULATOR {
            self.write_accumulator(false, &to_display_string(&value));
            return;
        }
        if let Some(slot) = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.get_mut(name))
        {
            *slot = value;
            return;
        }
        self.env.set(name, value);
    }

    fn write_accumulator(&mut self, append: bool, text: &str) {
        if append {
            self.env.append_accumulator(text);
        } else {
            self.env.set_accumulator(text);
            self.output.clear();
        }
        self.output.push_str(text);
    }

    fn resolve_identifier(&self, name: &str) -> Result<Value> {
        self.lookup(name)
            .or_else(|| global(name))
            .ok_or_else(|| RuntimeError::Reference(name.to_string()).into())
    }

    /// Like [`Self::resolve_identifier`], but an unbound name becomes a host
    /// reference. Used for member objects and callees.
    fn resolve_ref(&self, name: &str) -> Value {
        self.lookup(name)
            .or_else(|| global(name))
            .unwrap_or_else(|| Value::host_ref(name))
    }

    fn eval_root(&mut self, expr: &Expression) -> Result<Value> {
        match &expr.kind {
            ExprKind::Identifier(name) => Ok(self.resolve_ref(name)),
            _ => self.eval(expr),
        }
    }

    /// Declare named function statements before the body runs.
    fn hoist(&mut self, body: &[Statement]) {
        for statement in body {
            if let StmtKind::Function(def) = &statement.kind
                && let Some(name) = &def.name
            {
                self.declare(name, function_value(def));
            }
        }
    }

    // === Statements ===

    fn exec_block(&mut self, body: &[Statement]) -> Result<Flow> {
        for statement in body {
            let flow = self.exec(statement)?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, statement: &Statement) -> Result<Flow> {
        match &statement.kind {
            StmtKind::Declaration { declarations, .. } => {
                for declarator in declarations {
                    let value = match &declarator.init {
                        Some(init) => self.eval(init)?,
                        None => Value::Undefined,
                    };
                    self.declare(&declarator.name, value);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Function(def) => {
                if let Some(name) = &def.name {
                    self.declare(name, function_value(def));
                }
                Ok(Flow::Normal)
            }
            StmtKind::Expression(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::Block(body) => self.exec_block(body),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if to_boolean(&self.eval(test)?) {
                    self.exec(consequent)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::For {
                init,
                test,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.exec(init)?;
                }
                for _ in 0..self.config.max_loop_iterations {
                    self.check_cancelled()?;
                    if let Some(test) = test
                        && !to_boolean(&self.eval(test)?)
                    {
                        return Ok(Flow::Normal);
                    }
                    match self.exec(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update)?;
                    }
                }
                tracing::debug!(location = %statement.location, "loop iteration limit reached");
                Ok(Flow::Normal)
            }
            StmtKind::ForOf {
                binding,
                iterable,
                body,
                ..
            } => {
                let iterable = self.eval(iterable)?;
                let items = iterate(&iterable)?;
                for item in items.into_iter().take(self.config.max_loop_iterations) {
                    self.check_cancelled()?;
                    self.declare(binding, item);
                    match self.exec(body)? {
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::While { test, body } => {
                for _ in 0..self.config.max_loop_iterations {
                    self.check_cancelled()?;
                    if !to_boolean(&self.eval(test)?) {
                        return Ok(Flow::Normal);
                    }
                    match self.exec(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        flow @ Flow::Return(_) => return Ok(flow),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                tracing::debug!(location = %statement.location, "loop iteration limit reached");
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Throw(expr) => {
                let value = self.eval(expr)?;
                Err(RuntimeError::Thrown(value).into())
            }
            StmtKind::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut result = self.exec_block(block);
                if let Some(handler) = handler {
                    result = match result {
                        Err(ScriptError::Runtime(error)) => {
                            if let Some(param) = &handler.param {
                                self.declare(param, error.into_value());
                            }
                            self.exec_block(&handler.body)
                        }
                        other => other,
                    };
                }
                if let Some(finalizer) = finalizer {
                    let flow = self.exec_block(finalizer)?;
                    if !matches!(flow, Flow::Normal) {
                        return Ok(flow);
                    }
                }
                result
            }
            StmtKind::ResultAssign { append, value } => {
                let value = self.eval(value)?;
                self.write_accumulator(*append, &to_display_string(&value));
                Ok(Flow::Normal)
            }
            StmtKind::Empty => Ok(Flow::Normal),
        }
    }

    // === Expressions ===

    fn eval(&mut self, expr: &Expression) -> Result<Value> {
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::number(*n)),
            ExprKind::Str(s) => Ok(Value::from(s.as_str())),
            ExprKind::Template(raw) => self.interpolate(raw).map(Value::from),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Array(items) => {
                let items = self.eval_list(items)?;
                Ok(Value::list(items))
            }
            ExprKind::Object(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Identifier(name) => self.resolve_identifier(name),
            ExprKind::Member { object, property } => {
                let object = self.eval_root(object)?;
                self.read_property(&object, property)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval_root(object)?;
                let index = self.eval(index)?;
                self.read_index(&object, &index)
            }
            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Member { object, property } => {
                    let receiver = self.eval_root(object)?;
                    let args = self.eval_list(args)?;
                    self.invoke_method(&receiver, property, args)
                }
                _ => {
                    let function = self.eval_root(callee)?;
                    let args = self.eval_list(args)?;
                    self.invoke(&function, args)
                }
            },
            ExprKind::Unary { op, operand } => {
                let value = match (&operand.kind, op) {
                    (ExprKind::Identifier(name), UnaryOp::Typeof) => {
                        self.lookup(name).or_else(|| global(name)).unwrap_or_default()
                    }
                    _ => self.eval(operand)?,
                };
                Ok(apply_unary(*op, &value))
            }
            ExprKind::Update { op, prefix, target } => {
                let current = self.eval(target)?;
                let updated = op.apply(&current);
                self.assign(target, updated.clone())?;
                if *prefix {
                    Ok(updated)
                } else {
                    Ok(apply_unary(UnaryOp::Plus, &current))
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(apply_binary(*op, &left, &right))
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval(left)?;
                match op {
                    LogicalOp::And if !to_boolean(&left) => Ok(left),
                    LogicalOp::Or if to_boolean(&left) => Ok(left),
                    _ => self.eval(right),
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if to_boolean(&self.eval(test)?) {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value),
            ExprKind::Function(def) => Ok(function_value(def)),
            ExprKind::Await(inner) => self.eval(inner),
        }
    }

    fn eval_list(&mut self, items: &[Expression]) -> Result<Vec<Value>> {
        items.iter().map(|item| self.eval(item)).collect()
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expression, value: &Expression) -> Result<Value> {
        if let ExprKind::Identifier(name) = &target.kind
            && name == RESULT_ACCUMULATOR
            && matches!(op, AssignOp::Assign | AssignOp::Add)
        {
            let value = self.eval(value)?;
            self.write_accumulator(op == AssignOp::Add, &to_display_string(&value));
            return Ok(Value::from(self.env.accumulator()));
        }

        let rhs = self.eval(value)?;
        let updated = match op.binary() {
            Some(binary) => {
                let current = self.eval(target)?;
                apply_binary(binary, &current, &rhs)
            }
            None => rhs,
        };
        self.assign(target, updated.clone())?;
        Ok(updated)
    }

    fn assign(&mut self, target: &Expression, value: Value) -> Result<()> {
        match &target.kind {
            ExprKind::Identifier(name) => {
                self.assign_var(name, value);
                Ok(())
            }
            ExprKind::Member { object, property } => {
                let object = self.eval_root(object)?;
                write_property(&object, property, value)
            }
            ExprKind::Index { object, index } => {
                let object = self.eval_root(object)?;
                let index = self.eval(index)?;
                write_index(&object, &index, value)
            }
            _ => Err(type_error("invalid assignment target")),
        }
    }

    fn interpolate(&mut self, raw: &str) -> Result<String> {
        let parts = split_template(raw).map_err(RuntimeError::Syntax)?;
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(&text),
                TemplatePart::Expr(source) => {
                    let expr = parse_expression(source)
                        .map_err(|err| RuntimeError::Syntax(err.to_string()))?;
                    let value = self.eval(&expr)?;
                    out.push_str(&to_display_string(&value));
                }
            }
        }
        Ok(out)
    }

    // === Access and calls ===

    pub(crate) fn read_property(&mut self, object: &Value, name: &str) -> Result<Value> {
        if let Some(value) = self.builtin_property(object, name) {
            return Ok(value);
        }
        match object {
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {object} (reading '{name}')"
                )));
            }
            Value::Map(map) => {
                if let Some(value) = map.read().get(name) {
                    return Ok(value.clone());
                }
            }
            Value::List(items) => {
                if let Ok(idx) = name.parse::<usize>() {
                    return Ok(items.read().get(idx).cloned().unwrap_or_default());
                }
            }
            Value::HostRef(path) => {
                return Ok(self
                    .host
                    .get_property(object, name)
                    .unwrap_or_else(|| Value::host_ref(format!("{path}.{name}"))));
            }
            _ => {}
        }
        Ok(self.host.get_property(object, name).unwrap_or_default())
    }

    pub(crate) fn read_index(&mut self, object: &Value, index: &Value) -> Result<Value> {
        if index.is_number() {
            let n = to_number(index);
            let position = (n >= 0.0 && n.fract() == 0.0).then_some(n as usize);
            match object {
                Value::List(items) => {
                    return Ok(position
                        .and_then(|i| items.read().get(i).cloned())
                        .unwrap_or_default());
                }
                Value::Str(s) => {
                    return Ok(position
                        .and_then(|i| s.chars().nth(i))
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or_default());
                }
                _ => {}
            }
        }
        self.read_property(object, &to_property_key(index))
    }

    /// Call a function value.
    pub(crate) fn invoke(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Function(function) => match function.as_any().downcast_ref::<FunctionDef>() {
                Some(def) => self.call_function(def, args),
                None => Err(type_error(format!("{} is not callable", describe(callee)))),
            },
            Value::HostRef(path) => self.call_path(path, args),
            other => Err(type_error(format!("{} is not a function", describe(other)))),
        }
    }

    /// Call `receiver.method(args)`: builtins first, then function-valued map
    /// members, then the host.
    pub(crate) fn invoke_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value> {
        if let Some(value) = self.call_builtin_method(receiver, method, &args)? {
            return Ok(value);
        }
        match receiver {
            Value::HostRef(path) => return self.call_path(&format!("{path}.{method}"), args),
            Value::Undefined | Value::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {receiver} (reading '{method}')"
                )));
            }
            Value::Map(map) => {
                let member = map.read().get(method).cloned();
                if let Some(function @ Value::Function(_)) = member {
                    return self.invoke(&function, args);
                }
            }
            _ => {}
        }

        self.check_cancelled()?;
        match self.host.call_method(receiver, method, &args, self.cancel) {
            Some(outcome) => self.host_result(outcome),
            None => Err(type_error(format!(
                "{}.{method} is not a function",
                describe(receiver)
            ))),
        }
    }

    fn call_function(&mut self, def: &FunctionDef, args: Vec<Value>) -> Result<Value> {
        let stack_used = stack_address().abs_diff(self.stack_base);
        if self.frames.len() >= self.config.max_call_depth
            || stack_used >= self.config.max_stack_bytes
        {
            tracing::debug!(depth = self.frames.len(), stack_used, "call stack limit reached");
            return Err(RuntimeError::Range("Maximum call stack size exceeded".into()).into());
        }

        let mut args = args.into_iter();
        let frame = def
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or_default()))
            .collect();
        self.frames.push(frame);

        let result = match &def.body {
            FunctionBody::Block(body) => {
                self.hoist(body);
                self.exec_block(body).map(|flow| match flow {
                    Flow::Return(value) => value,
                    _ => Value::Undefined,
                })
            }
            FunctionBody::Expression(expr) => self.eval(expr),
        };

        self.frames.pop();
        result
    }

    /// Call a dotted path: builtin globals first, then the host.
    fn call_path(&mut self, path: &str, args: Vec<Value>) -> Result<Value> {
        if let Some(value) = self.call_global(path, &args)? {
            return Ok(value);
        }
        self.check_cancelled()?;
        tracing::debug!(path, argc = args.len(), "host call");
        match self.host.call_function(path, &args, self.cancel) {
            Some(outcome) => self.host_result(outcome),
            None => Err(type_error(format!("{path} is not a function"))),
        }
    }

    fn host_result(&self, outcome: HostOutcome) -> Result<Value> {
        match outcome {
            HostOutcome::Value(value) => Ok(value),
            HostOutcome::Empty => Ok(Value::Undefined),
            HostOutcome::Cancelled => Err(ScriptError::Cancelled(self.cancel.reason())),
            HostOutcome::Error(message) => Err(ScriptError::Host(message)),
        }
    }
}

impl VmContext for Interpreter<'_> {
    type Error = ScriptError;

    fn load(&mut self, name: &str) -> Result<Value> {
        self.resolve_identifier(name)
    }

    fn load_ref(&mut self, name: &str) -> Result<Value> {
        Ok(self.resolve_ref(name))
    }

    fn store(&mut self, name: &str, value: Value) -> Result<()> {
        self.assign_var(name, value);
        Ok(())
    }

    fn get_property(&mut self, object: &Value, name: &str) -> Result<Value> {
        self.read_property(object, name)
    }

    fn get_index(&mut self, object: &Value, index: &Value) -> Result<Value> {
        self.read_index(object, index)
    }

    fn call(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        self.invoke(callee, args)
    }

    fn call_method(&mut self, receiver: &Value, method: &str, args: Vec<Value>) -> Result<Value> {
        self.invoke_method(receiver, method, args)
    }
}

/// Address of a local on the current stack. The difference between two calls
/// on one thread is the stack consumed in between.
#[inline(never)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(std::ptr::addr_of!(marker)) as usize
}

fn function_value(def: &Arc<FunctionDef>) -> Value {
    let callable: Arc<dyn Callable> = def.clone();
    Value::Function(callable)
}

fn iterate(value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items.read().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::from(c.to_string())).collect()),
        other => Err(type_error(format!("{} is not iterable", describe(other)))),
    }
}

fn write_property(object: &Value, name: &str, value: Value) -> Result<()> {
    match object {
        Value::Map(map) => {
            map.write().insert(name.to_string(), value);
            Ok(())
        }
        Value::List(_) if name.parse::<usize>().is_ok() => {
            write_index(object, &Value::from(name), value)
        }
        Value::Undefined | Value::Null => Err(type_error(format!(
            "Cannot set properties of {object} (setting '{name}')"
        ))),
        Value::HostRef(path) => Err(type_error(format!("cannot assign to {path}.{name}"))),
        // Primitives silently ignore property writes.
        _ => Ok(()),
    }
}

/// Lists grow to fit an index, but only this far past their end.
const MAX_LIST_GAP: usize = 10_000;

fn write_index(object: &Value, index: &Value, value: Value) -> Result<()> {
    if let Value::List(items) = object {
        let n = to_number(index);
        if n >= 0.0 && n.fract() == 0.0 {
            let idx = n as usize;
            let mut items = items.write();
            if idx >= items.len() {
                if idx - items.len() > MAX_LIST_GAP {
                    return Err(RuntimeError::Range(format!("invalid list index {idx}")).into());
                }
                items.resize(idx + 1, Value::Undefined);
            }
            items[idx] = value;
            return Ok(());
        }
    }
    write_property(object, &to_property_key(index), value)
}

/// Short description of a value for error messages.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::HostRef(path) => path.to_string(),
        Value::Function(function) => function.name().unwrap_or("anonymous function").to_string(),
        Value::Str(s) => format!("\"{s}\""),
        Value::List(_) | Value::Map(_) => value.type_name().to_string(),
        other => to_display_string(other),
    }
}
