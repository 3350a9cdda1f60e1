//! Tree-walking evaluator for command scripts.
//!
//! The interpreter owns the script's global namespace and the registrations
//! made through `main`, `dispatcher` and `command(name)` while the script
//! body runs.

use super::ScriptError;
use super::builtins;
use super::value::{ActionObject, Scope, ScopeRef, Value};
use crate::ast::{ActionDef, BinaryOp, Expression, FunctionDef, Script, Statement};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// What the script registered as its entry point.
#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Main(Value),
    Dispatcher(Value),
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    pub(crate) entry: Option<Entry>,
    pub(crate) commands: BTreeMap<String, Value>,
}

enum Flow {
    Next,
    Return(Value),
}

#[derive(Debug)]
pub(crate) struct Interpreter {
    globals: ScopeRef,
    registry: RefCell<Registry>,
}

impl Interpreter {
    /// A fresh namespace holding only the builtins.
    pub(crate) fn new() -> Self {
        let globals = Scope::root();
        builtins::install(&globals);
        Interpreter {
            globals,
            registry: RefCell::new(Registry::default()),
        }
    }

    pub(crate) fn global(&self, name: &str) -> Option<Value> {
        Scope::lookup(&self.globals, name)
    }

    pub(crate) fn registry(&self) -> std::cell::Ref<'_, Registry> {
        self.registry.borrow()
    }

    pub(crate) fn register_main(&self, value: Value) {
        let mut registry = self.registry.borrow_mut();
        if registry.entry.is_some() {
            warn!("entry point registered more than once; the last registration wins");
        }
        debug!("registered main action {value}");
        registry.entry = Some(Entry::Main(value));
    }

    pub(crate) fn register_dispatcher(&self, value: Value) {
        let mut registry = self.registry.borrow_mut();
        if registry.entry.is_some() {
            warn!("entry point registered more than once; the last registration wins");
        }
        debug!("registered dispatcher with default {value}");
        registry.entry = Some(Entry::Dispatcher(value));
    }

    pub(crate) fn register_command(&self, name: String, value: Value) {
        debug!(command = %name, "registered sub-command {value}");
        if let Some(previous) = self.registry.borrow_mut().commands.insert(name.clone(), value) {
            warn!(command = %name, "sub-command redefined, replacing {previous}");
        }
    }

    /// Run a script's top-level statements in the global namespace.
    pub(crate) fn execute(&self, script: &Script) -> Result<(), ScriptError> {
        match self.exec_block(&script.statements, &self.globals)? {
            Flow::Next => Ok(()),
            Flow::Return(_) => Err(ScriptError::Invalid(
                "`return` outside of a function".to_string(),
            )),
        }
    }

    fn exec_block(&self, statements: &[Statement], scope: &ScopeRef) -> Result<Flow, ScriptError> {
        for statement in statements {
            if let Flow::Return(value) = self.exec_statement(statement, scope)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec_statement(&self, statement: &Statement, scope: &ScopeRef) -> Result<Flow, ScriptError> {
        match statement {
            Statement::Let { name, value } => {
                bindable(name)?;
                let value = self.eval(value, scope)?;
                scope.borrow_mut().define(name, value);
            }
            Statement::Assign { name, value } => {
                bindable(name)?;
                let value = self.eval(value, scope)?;
                if !Scope::assign(scope, name, value) {
                    return Err(ScriptError::Undeclared(name.clone()));
                }
            }
            Statement::FunctionDef { def, decorators } => {
                bindable(&def.name)?;
                for param in &def.params {
                    bindable(param)?;
                }
                let value = Value::Function(Rc::clone(def));
                scope.borrow_mut().define(&def.name, value.clone());
                self.decorate(value, decorators, scope)?;
            }
            Statement::ActionDef { def, decorators } => {
                bindable(&def.name)?;
                let value = Value::ActionType(Rc::clone(def));
                scope.borrow_mut().define(&def.name, value.clone());
                self.decorate(value, decorators, scope)?;
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.eval(condition, scope)?;
                let branch = if expect_bool("`if` condition", &condition)? {
                    Some(then_branch)
                } else {
                    else_branch.as_ref()
                };
                if let Some(branch) = branch {
                    return self.exec_block(branch, &Scope::child(scope));
                }
            }
            Statement::For {
                variable,
                iterable,
                body,
            } => {
                bindable(variable)?;
                return self.exec_for(variable, iterable, body, scope);
            }
            Statement::Return(value) => {
                let value = match value {
                    Some(expression) => self.eval(expression, scope)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Statement::Expression(expression) => {
                if let Value::Process(process) = self.eval(expression, scope)? {
                    process.borrow_mut().run()?;
                }
            }
        }
        Ok(Flow::Next)
    }

    /// Decorators are applied nearest-first, for their effect only; the
    /// name stays bound to the definition itself.
    fn decorate(
        &self,
        value: Value,
        decorators: &[Expression],
        scope: &ScopeRef,
    ) -> Result<(), ScriptError> {
        for decorator in decorators.iter().rev() {
            let decorator = self.eval(decorator, scope)?;
            self.call_value(decorator, vec![value.clone()])?;
        }
        Ok(())
    }

    fn exec_for(
        &self,
        variable: &str,
        iterable: &Expression,
        body: &[Statement],
        scope: &ScopeRef,
    ) -> Result<Flow, ScriptError> {
        match self.eval(iterable, scope)? {
            Value::List(items) => {
                for item in items {
                    let frame = Scope::child(scope);
                    frame.borrow_mut().define(variable, item);
                    if let Flow::Return(value) = self.exec_block(body, &frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Next)
            }
            Value::Process(process) => {
                // The borrow is released before the body runs so the body can
                // still inspect the process.
                let lines = process.borrow_mut().stdout_lines()?;
                let mut flow = Ok(Flow::Next);
                for line in lines {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            flow = Err(ScriptError::Output(e));
                            break;
                        }
                    };
                    let frame = Scope::child(scope);
                    frame.borrow_mut().define(variable, Value::Str(line));
                    match self.exec_block(body, &frame) {
                        Ok(Flow::Next) => {}
                        other => {
                            flow = other;
                            break;
                        }
                    }
                }
                process.borrow_mut().wait_for_completion()?;
                flow
            }
            other => Err(ScriptError::Type(format!(
                "cannot iterate over a {}",
                other.type_name()
            ))),
        }
    }

    fn eval(&self, expression: &Expression, scope: &ScopeRef) -> Result<Value, ScriptError> {
        match expression {
            Expression::String(s) => Ok(Value::Str(s.clone())),
            Expression::Integer(i) => Ok(Value::Int(*i)),
            Expression::Boolean(b) => Ok(Value::Bool(*b)),
            Expression::List(items) => Ok(Value::List(self.eval_all(items, scope)?)),
            Expression::Variable(name) => {
                Scope::lookup(scope, name).ok_or_else(|| ScriptError::Undefined(name.clone()))
            }
            Expression::Call { callee, args } => {
                let callee = self.eval(callee, scope)?;
                let args = self.eval_all(args, scope)?;
                self.call_value(callee, args)
            }
            Expression::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.eval(receiver, scope)?;
                let args = self.eval_all(args, scope)?;
                self.call_method(receiver, method, args)
            }
            Expression::Index { target, index } => {
                let target = self.eval(target, scope)?;
                let index = self.eval(index, scope)?;
                index_value(target, &index)
            }
            Expression::Not(operand) => {
                let operand = self.eval(operand, scope)?;
                Ok(Value::Bool(!expect_bool("`not`", &operand)?))
            }
            Expression::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs, scope),
        }
    }

    fn eval_all(&self, expressions: &[Expression], scope: &ScopeRef) -> Result<Vec<Value>, ScriptError> {
        expressions.iter().map(|e| self.eval(e, scope)).collect()
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expression,
        rhs: &Expression,
        scope: &ScopeRef,
    ) -> Result<Value, ScriptError> {
        let left = self.eval(lhs, scope)?;
        match op {
            BinaryOp::Or => {
                if expect_bool("`or`", &left)? {
                    return Ok(Value::Bool(true));
                }
                let right = self.eval(rhs, scope)?;
                Ok(Value::Bool(expect_bool("`or`", &right)?))
            }
            BinaryOp::And => {
                if !expect_bool("`and`", &left)? {
                    return Ok(Value::Bool(false));
                }
                let right = self.eval(rhs, scope)?;
                Ok(Value::Bool(expect_bool("`and`", &right)?))
            }
            BinaryOp::Eq => Ok(Value::Bool(left.loose_eq(&self.eval(rhs, scope)?))),
            BinaryOp::Ne => Ok(Value::Bool(!left.loose_eq(&self.eval(rhs, scope)?))),
            BinaryOp::Pipe => match (left, self.eval(rhs, scope)?) {
                // Both operands are copied, so `a | b` leaves `a` and `b` reusable.
                (Value::Process(source), Value::Process(target)) => {
                    let source = source.borrow().try_clone()?;
                    let target = target.borrow().try_clone()?;
                    Ok(Value::process((source | target)?))
                }
                (left, right) => Err(ScriptError::Type(format!(
                    "`|` joins two processes, got {} and {}",
                    left.type_name(),
                    right.type_name()
                ))),
            },
            BinaryOp::Add => add(left, self.eval(rhs, scope)?),
        }
    }

    pub(crate) fn call_value(&self, callee: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(def) => self.call_function(&def, args, &self.globals, None),
            Value::Builtin(builtin) => builtins::call(self, builtin, args),
            Value::Registrar(name) => {
                if args.len() != 1 {
                    return Err(ScriptError::Arity {
                        name: format!("command(\"{name}\")"),
                        expected: 1,
                        got: args.len(),
                    });
                }
                let value = args.into_iter().next().unwrap_or(Value::Null);
                self.register_command(name, value);
                Ok(Value::Null)
            }
            Value::ActionType(def) => {
                if !args.is_empty() {
                    return Err(ScriptError::Arity {
                        name: def.name.clone(),
                        expected: 0,
                        got: args.len(),
                    });
                }
                Ok(Value::Object(self.instantiate(&def)?))
            }
            other => Err(ScriptError::Type(format!(
                "a {} is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_method(&self, receiver: Value, method: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        match receiver {
            Value::Process(process) => builtins::call_process_method(&process, method, args),
            Value::Object(object) => {
                let def = object.method(method).ok_or_else(|| {
                    ScriptError::Type(format!("`{}` has no method `{method}`", object.def.name))
                })?;
                self.call_method_def(&object, &def, args)
            }
            other => Err(ScriptError::Type(format!(
                "a {} has no method `{method}`",
                other.type_name()
            ))),
        }
    }

    /// Methods run in a frame whose parent holds the instance fields; the
    /// instance itself is reachable as `self`.
    pub(crate) fn call_method_def(
        &self,
        object: &Rc<ActionObject>,
        def: &FunctionDef,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        self.call_function(def, args, &object.fields, Some(object))
    }

    pub(crate) fn call_function(
        &self,
        def: &FunctionDef,
        args: Vec<Value>,
        parent: &ScopeRef,
        receiver: Option<&Rc<ActionObject>>,
    ) -> Result<Value, ScriptError> {
        if args.len() != def.params.len() {
            return Err(ScriptError::Arity {
                name: def.name.clone(),
                expected: def.params.len(),
                got: args.len(),
            });
        }
        trace!(function = %def.name, "call");
        let frame = Scope::child(parent);
        {
            let mut frame = frame.borrow_mut();
            if let Some(object) = receiver {
                frame.define("self", Value::Object(Rc::clone(object)));
            }
            for (param, arg) in def.params.iter().zip(args) {
                frame.define(param, arg);
            }
        }
        match self.exec_block(&def.body, &frame)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(Value::Null),
        }
    }

    /// Create an instance: `fn` statements become methods, everything else
    /// runs once in the instance's field scope.
    pub(crate) fn instantiate(&self, def: &Rc<ActionDef>) -> Result<Rc<ActionObject>, ScriptError> {
        let fields = Scope::child(&self.globals);
        let mut methods = HashMap::new();
        for statement in &def.body {
            match statement {
                Statement::FunctionDef { def: method, decorators } => {
                    if !decorators.is_empty() {
                        return Err(ScriptError::Invalid(format!(
                            "method `{}.{}` cannot be decorated",
                            def.name, method.name
                        )));
                    }
                    methods.insert(method.name.clone(), Rc::clone(method));
                }
                other => {
                    if let Flow::Return(_) = self.exec_statement(other, &fields)? {
                        return Err(ScriptError::Invalid(format!(
                            "`return` in the body of action `{}`",
                            def.name
                        )));
                    }
                }
            }
        }
        Ok(Rc::new(ActionObject {
            def: Rc::clone(def),
            fields,
            methods,
        }))
    }
}

/// Builtin names stay bound to the builtins for the whole script.
fn bindable(name: &str) -> Result<(), ScriptError> {
    match builtins::Builtin::from_name(name) {
        Some(builtin) => Err(ScriptError::Reserved(builtin.name().to_string())),
        None => Ok(()),
    }
}

fn expect_bool(context: &str, value: &Value) -> Result<bool, ScriptError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Process(_) => Err(ScriptError::Type(format!(
            "{context} needs a bool, got a process; call `.run()` to test whether it succeeds"
        ))),
        other => Err(ScriptError::Type(format!(
            "{context} needs a bool, got {}",
            other.type_name()
        ))),
    }
}

fn index_value(target: Value, index: &Value) -> Result<Value, ScriptError> {
    let Value::List(items) = target else {
        return Err(ScriptError::Type(format!(
            "cannot index into a {}",
            target.type_name()
        )));
    };
    let Value::Int(i) = *index else {
        return Err(ScriptError::Type(format!(
            "list index must be an int, got {}",
            index.type_name()
        )));
    };
    let len = items.len();
    // Negative indexes count from the end.
    let position = if i < 0 {
        usize::try_from(i.unsigned_abs())
            .ok()
            .and_then(|back| len.checked_sub(back))
    } else {
        usize::try_from(i).ok().filter(|&p| p < len)
    };
    match position {
        Some(p) => Ok(items.into_iter().nth(p).unwrap_or(Value::Null)),
        None => Err(ScriptError::Index { index: i, len }),
    }
}

fn add(left: Value, right: Value) -> Result<Value, ScriptError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or(ScriptError::Overflow),
        (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
        (Value::Str(a), Value::Int(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::Int(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (left, right) => Err(ScriptError::Type(format!(
            "cannot add {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn run(source: &str) -> Interpreter {
        let interpreter = Interpreter::new();
        interpreter.execute(&parse_script(source, None).unwrap()).unwrap();
        interpreter
    }

    fn run_err(source: &str) -> ScriptError {
        let interpreter = Interpreter::new();
        interpreter
            .execute(&parse_script(source, None).unwrap())
            .unwrap_err()
    }

    #[test]
    fn test_functions_see_globals_not_caller_locals() {
        let interpreter = run(
            r#"
let greeting = "hi"
fn greet(name) { return greeting + " " + name }
let out = greet("ash")
"#,
        );
        assert!(matches!(interpreter.global("out"), Some(Value::Str(s)) if s == "hi ash"));

        let err = run_err("fn inner() { return local }\nfn outer() { let local = 1\n return inner() }\nouter()");
        assert!(matches!(err, ScriptError::Undefined(name) if name == "local"));
    }

    #[test]
    fn test_assignment_requires_declaration() {
        let err = run_err("count = 1");
        assert!(matches!(err, ScriptError::Undeclared(name) if name == "count"));
    }

    #[test]
    fn test_builtin_names_cannot_be_rebound() {
        for source in [
            "fn main() {}\n@main\nfn build() {}",
            "let print = 1",
            "main = 1",
            "action env { fn run() {} }",
            "fn build(sh) {}",
            "for len in [1] {}",
            "fn outer() { let join = 1 }\nouter()",
        ] {
            let err = run_err(source);
            assert!(
                matches!(&err, ScriptError::Reserved(_)),
                "`{source}` gave {err}"
            );
        }
        let err = run_err("fn main() {}");
        assert_eq!(err.to_string(), "`main` is a builtin and cannot be redefined");

        let interpreter = run("let printer = 1\nfn mainly() {}");
        assert!(interpreter.global("printer").is_some());
    }

    #[test]
    fn test_conditions_are_strictly_boolean() {
        let err = run_err("if 1 { print(\"no\") }");
        assert!(matches!(err, ScriptError::Type(_)));
        let err = run_err("if sh(\"true\") { print(\"no\") }");
        assert!(matches!(err, ScriptError::Type(msg) if msg.contains(".run()")));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let interpreter = run("let hit = false or true\nlet miss = false and undefined_name");
        assert!(matches!(interpreter.global("hit"), Some(Value::Bool(true))));
        assert!(matches!(interpreter.global("miss"), Some(Value::Bool(false))));
    }

    #[test]
    fn test_decorators_register_without_rebinding() {
        let interpreter = run(
            r#"
@dispatcher
fn usage() { return 2 }

@command("start")
fn start(args) { return 0 }
"#,
        );
        assert!(matches!(interpreter.global("usage"), Some(Value::Function(_))));
        let registry = interpreter.registry();
        assert!(matches!(registry.entry, Some(Entry::Dispatcher(_))));
        assert_eq!(registry.commands.keys().collect::<Vec<_>>(), vec!["start"]);
    }

    #[test]
    fn test_action_fields_and_self() {
        let interpreter = run(
            r#"
action Counter {
    let total = 10
    fn bump(n) { total = total + n
        return total }
    fn run(args) { return self.bump(len(args)) }
}
let c = Counter()
let result = c.run(["a", "b"])
"#,
        );
        assert!(matches!(interpreter.global("result"), Some(Value::Int(12))));
    }

    #[test]
    fn test_list_indexing() {
        let interpreter = run("let xs = [\"a\", \"b\", \"c\"]\nlet last = xs[-1]\nlet first = xs[0]");
        assert!(matches!(interpreter.global("last"), Some(Value::Str(s)) if s == "c"));
        assert!(matches!(interpreter.global("first"), Some(Value::Str(s)) if s == "a"));
        let err = run_err("let xs = [1]\nxs[3]");
        assert!(matches!(err, ScriptError::Index { index: 3, len: 1 }));
    }

    #[test]
    fn test_top_level_return_is_rejected() {
        assert!(matches!(run_err("return 1"), ScriptError::Invalid(_)));
    }

    #[test]
    fn test_pipe_copies_operands() {
        let interpreter = run("let a = sh(\"echo\", \"x\")\nlet b = sh(\"cat\")\nlet p = a | b");
        let Some(Value::Process(a)) = interpreter.global("a") else {
            panic!("Expected process");
        };
        assert!(!a.borrow().is_started());
        let Some(Value::Process(p)) = interpreter.global("p") else {
            panic!("Expected process");
        };
        assert_eq!(p.borrow().to_string(), "(#<echo x> | #<cat>)");
    }

    #[cfg(unix)]
    #[test]
    fn test_for_over_process_output() {
        let interpreter = run(
            r#"
let seen = []
for line in sh("printf", "b\na\n") | sh("sort") {
    seen = seen + [line]
}
let ok = sh("true").run()
let bad = sh("false").run()
"#,
        );
        let Some(Value::List(seen)) = interpreter.global("seen") else {
            panic!("Expected list");
        };
        let seen: Vec<String> = seen.iter().map(ToString::to_string).collect();
        assert_eq!(seen, vec!["a", "b"]);
        assert!(matches!(interpreter.global("ok"), Some(Value::Bool(true))));
        assert!(matches!(interpreter.global("bad"), Some(Value::Bool(false))));
    }
}
