//! The capability surface injected into every script namespace, and the
//! methods scripts can call on processes.
//!
//! Scripts cannot import anything; these bindings are the whole API.

use super::ScriptError;
use super::interpreter::Interpreter;
use super::value::{ScopeRef, Value};
use crate::process::{Process, ProcessError, ShellProcess};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Main,
    Dispatcher,
    Command,
    Sh,
    Do,
    Print,
    Len,
    Join,
    Env,
    Fail,
}

impl Builtin {
    const ALL: [Builtin; 10] = [
        Builtin::Main,
        Builtin::Dispatcher,
        Builtin::Command,
        Builtin::Sh,
        Builtin::Do,
        Builtin::Print,
        Builtin::Len,
        Builtin::Join,
        Builtin::Env,
        Builtin::Fail,
    ];

    pub(crate) fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Main => "main",
            Builtin::Dispatcher => "dispatcher",
            Builtin::Command => "command",
            Builtin::Sh => "sh",
            Builtin::Do => "do",
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Join => "join",
            Builtin::Env => "env",
            Builtin::Fail => "fail",
        }
    }
}

/// Bind every builtin into a fresh global scope.
pub(crate) fn install(globals: &ScopeRef) {
    let mut scope = globals.borrow_mut();
    for builtin in Builtin::ALL {
        scope.define(builtin.name(), Value::Builtin(builtin));
    }
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), ScriptError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ScriptError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn one(name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    expect_arity(name, &args, 1)?;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

fn two(name: &str, args: Vec<Value>) -> Result<(Value, Value), ScriptError> {
    expect_arity(name, &args, 2)?;
    let mut args = args.into_iter();
    Ok((
        args.next().unwrap_or(Value::Null),
        args.next().unwrap_or(Value::Null),
    ))
}

fn expect_str(context: &str, value: Value) -> Result<String, ScriptError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Type(format!(
            "{context} expects a string, got {}",
            other.type_name()
        ))),
    }
}

fn expect_process(context: &str, value: Value) -> Result<Rc<RefCell<Process>>, ScriptError> {
    match value {
        Value::Process(process) => Ok(process),
        other => Err(ScriptError::Type(format!(
            "{context} expects a process, got {}",
            other.type_name()
        ))),
    }
}

/// Flatten command-line words: lists splice in, scalars are stringified.
fn push_words(words: &mut Vec<String>, value: Value) -> Result<(), ScriptError> {
    match value {
        Value::Str(s) => words.push(s),
        Value::Int(i) => words.push(i.to_string()),
        Value::Bool(b) => words.push(b.to_string()),
        Value::List(items) => {
            for item in items {
                push_words(words, item)?;
            }
        }
        other => {
            return Err(ScriptError::Type(format!(
                "cannot pass a {} as a command argument",
                other.type_name()
            )));
        }
    }
    Ok(())
}

fn words(values: Vec<Value>) -> Result<Vec<String>, ScriptError> {
    let mut words = Vec::new();
    for value in values {
        push_words(&mut words, value)?;
    }
    Ok(words)
}

pub(crate) fn call(
    interpreter: &Interpreter,
    builtin: Builtin,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let name = builtin.name();
    match builtin {
        Builtin::Main => {
            interpreter.register_main(one(name, args)?);
            Ok(Value::Null)
        }
        Builtin::Dispatcher => {
            interpreter.register_dispatcher(one(name, args)?);
            Ok(Value::Null)
        }
        Builtin::Command => Ok(Value::Registrar(expect_str(name, one(name, args)?)?)),
        Builtin::Sh => {
            let argv = words(args)?;
            if argv.is_empty() {
                return Err(ProcessError::EmptyCommand.into());
            }
            Ok(Value::process(Process::shell(argv)))
        }
        Builtin::Do => {
            expect_process(name, one(name, args)?)?.borrow_mut().run()?;
            Ok(Value::Null)
        }
        Builtin::Print => {
            let line: Vec<String> = args.iter().map(ToString::to_string).collect();
            println!("{}", line.join(" "));
            Ok(Value::Null)
        }
        Builtin::Len => match one(name, args)? {
            Value::List(items) => Ok(Value::Int(i64::try_from(items.len()).unwrap_or(i64::MAX))),
            Value::Str(s) => Ok(Value::Int(
                i64::try_from(s.chars().count()).unwrap_or(i64::MAX),
            )),
            other => Err(ScriptError::Type(format!(
                "len expects a list or string, got {}",
                other.type_name()
            ))),
        },
        Builtin::Join => {
            let (items, separator) = two(name, args)?;
            let separator = expect_str(name, separator)?;
            let Value::List(items) = items else {
                return Err(ScriptError::Type(format!(
                    "join expects a list, got {}",
                    items.type_name()
                )));
            };
            let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
            Ok(Value::Str(parts.join(&separator)))
        }
        Builtin::Env => {
            let key = expect_str(name, one(name, args)?)?;
            Ok(Value::Str(std::env::var(key).unwrap_or_default()))
        }
        Builtin::Fail => Err(ScriptError::Failed(
            args.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
        )),
    }
}

/// Builder methods return a new, not-started process and leave the
/// receiver untouched.
fn build(
    process: &Rc<RefCell<Process>>,
    edit: impl FnOnce(ShellProcess) -> ShellProcess,
) -> Result<Value, ScriptError> {
    match process.borrow().try_clone()? {
        Process::Shell(shell) => Ok(Value::process(Process::Shell(edit(shell)))),
        piped @ Process::Piped(_) => {
            Err(ProcessError::NotAShellCommand(piped.to_string()).into())
        }
    }
}

pub(crate) fn call_process_method(
    process: &Rc<RefCell<Process>>,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match method {
        "arg" => {
            let extra = words(vec![one(method, args)?])?;
            build(process, |shell| shell.args(extra))
        }
        "args" => {
            let extra = words(args)?;
            build(process, |shell| shell.args(extra))
        }
        "env" => {
            let (key, value) = two(method, args)?;
            let (key, value) = (expect_str(method, key)?, expect_str(method, value)?);
            build(process, |shell| shell.env(key, value))
        }
        "cwd" => {
            let dir = expect_str(method, one(method, args)?)?;
            build(process, |shell| shell.current_dir(dir))
        }
        "clone" => {
            expect_arity(method, &args, 0)?;
            Ok(Value::process(process.borrow().try_clone()?))
        }
        "run" => {
            expect_arity(method, &args, 0)?;
            Ok(Value::Bool(process.borrow_mut().run_to_completion()?))
        }
        "status" => {
            expect_arity(method, &args, 0)?;
            let mut process = process.borrow_mut();
            process.run()?;
            let code = process.exit_status().and_then(|s| s.code()).unwrap_or(-1);
            Ok(Value::Int(i64::from(code)))
        }
        "lines" => {
            expect_arity(method, &args, 0)?;
            let mut process = process.borrow_mut();
            let lines = process
                .stdout_lines()?
                .map(|line| line.map(Value::Str))
                .collect::<Result<Vec<_>, _>>()
                .map_err(ScriptError::Output)?;
            process.wait_for_completion()?;
            debug!(count = lines.len(), "collected output of {process}");
            Ok(Value::List(lines))
        }
        other => Err(ScriptError::Type(format!("process has no method `{other}`"))),
    }
}
