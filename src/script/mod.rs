//! Script environment: loads a command script into an isolated namespace
//! and collects the actions it registers.
//!
//! Each [`ScriptEnvironment`] owns a fresh global namespace pre-populated
//! with the capability surface (`main`, `dispatcher`, `command`, `sh` and a
//! few helpers). Scripts cannot import anything else, and nothing one script
//! defines is visible to another.

mod action;
mod builtins;
mod interpreter;
mod value;

pub use action::{Action, ActionHandler, FunctionAction};
pub use builtins::Builtin;
pub use value::Value;

use crate::parser::{ParseError, parse_script};
use crate::process::{ProcessError, ShellProcess};
use interpreter::{Entry, Interpreter};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("`{0}` is not defined")]
    Undefined(String),
    #[error("cannot assign to `{0}`: declare it with `let` first")]
    Undeclared(String),
    #[error("`{0}` is a builtin and cannot be redefined")]
    Reserved(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("`{name}` takes {expected} argument(s) but {got} were given")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("index {index} out of range for a list of length {len}")]
    Index { index: i64, len: usize },
    #[error("integer overflow")]
    Overflow,
    #[error("{0}")]
    Invalid(String),
    #[error("{0} cannot be used as an action")]
    NotAnAction(String),
    #[error("action `{0}` has no `run` method")]
    MissingRun(String),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("failed to read process output: {0}")]
    Output(#[source] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

/// One script execution: its namespace plus whatever it registered.
pub struct ScriptEnvironment {
    interpreter: Rc<Interpreter>,
}

impl ScriptEnvironment {
    /// An environment holding only the capability surface.
    #[must_use]
    pub fn new() -> Self {
        ScriptEnvironment {
            interpreter: Rc::new(Interpreter::new()),
        }
    }

    /// Read, parse and execute the script at `path` in a fresh namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or its
    /// top-level code fails.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        debug!("loading script {}", path.display());
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_source(&source, Some(&path.display().to_string()))
    }

    /// Parse and execute script text in a fresh namespace.
    ///
    /// # Errors
    ///
    /// Returns a parse error or the first error raised by top-level code.
    pub fn from_source(source: &str, filename: Option<&str>) -> Result<Self, ScriptError> {
        let script = parse_script(source, filename)?;
        let environment = Self::new();
        environment.interpreter.execute(&script)?;
        Ok(environment)
    }

    /// Register the single main action, replacing any earlier registration.
    pub fn set_main_value(&self, value: Value) {
        self.interpreter.register_main(value);
    }

    /// Register a dispatcher whose default action is `value`.
    pub fn set_dispatcher(&self, value: Value) {
        self.interpreter.register_dispatcher(value);
    }

    /// The value `command(name)` returns inside a script: calling it with an
    /// action registers that action under `name`.
    #[must_use]
    pub fn command_registrar(&self, name: &str) -> Value {
        Value::Registrar(name.to_string())
    }

    /// Register `value` as the sub-command `name`.
    ///
    /// # Errors
    ///
    /// Propagates errors from calling the registrar.
    pub fn register_command(&self, name: &str, value: Value) -> Result<(), ScriptError> {
        self.interpreter
            .call_value(self.command_registrar(name), vec![value])
            .map(|_| ())
    }

    /// Start building an invocation of `program`; the `sh(...)` builtin in
    /// Rust form.
    #[must_use]
    pub fn shell_command(&self, program: &str) -> ShellProcess {
        ShellProcess::new(program)
    }

    /// Look up a top-level binding of the loaded script.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<Value> {
        self.interpreter.global(name)
    }

    /// The handler for whatever the script registered: a dispatcher if
    /// `dispatcher` was called last, otherwise the main action. `None` when
    /// the script registered neither.
    ///
    /// # Errors
    ///
    /// Returns an error if a registered value cannot act as an action.
    pub fn main_handler(&self) -> Result<Option<ActionHandler>, ScriptError> {
        let (entry, commands) = {
            let registry = self.interpreter.registry();
            (registry.entry.clone(), registry.commands.clone())
        };
        let Some(entry) = entry else {
            return Ok(None);
        };
        let handler = match entry {
            Entry::Main(value) => {
                if !commands.is_empty() {
                    tracing::warn!("sub-commands registered without a dispatcher are ignored");
                }
                ActionHandler::Simple(action::normalize(&self.interpreter, value)?)
            }
            Entry::Dispatcher(value) => {
                let mut handlers = BTreeMap::new();
                for (name, value) in commands {
                    let handler = ActionHandler::Simple(action::normalize(&self.interpreter, value)?);
                    handlers.insert(name, handler);
                }
                ActionHandler::Dispatcher {
                    default: Box::new(ActionHandler::Simple(action::normalize(
                        &self.interpreter,
                        value,
                    )?)),
                    commands: handlers,
                }
            }
        };
        Ok(Some(handler))
    }
}

impl Default for ScriptEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    fn handler(source: &str) -> ActionHandler {
        ScriptEnvironment::from_source(source, None)
            .unwrap()
            .main_handler()
            .unwrap()
            .expect("script registers an action")
    }

    const DISPATCHER: &str = r#"
@dispatcher
fn usage(args) {
    if len(args) == 0 { return 2 }
    if args[0] == "frobnicate" { return 10 }
    return 11
}

@command("start")
fn start(args) {
    if args == ["x"] { return 20 }
    return 21
}

@command("stop")
fn stop() { return 30 }
"#;

    #[test]
    fn test_dispatcher_scenario() {
        let handler = handler(DISPATCHER);
        assert_eq!(handler.run(&strings(&["start", "x"])).unwrap(), 20);
        assert_eq!(handler.run(&strings(&["frobnicate"])).unwrap(), 10);
        assert_eq!(handler.run(&strings(&["stop", "ignored"])).unwrap(), 30);
        assert_eq!(handler.run(&[]).unwrap(), 2);
        assert_eq!(handler.command_names(), vec!["start", "stop"]);
    }

    #[test]
    fn test_zero_argument_main_ignores_arguments() {
        let handler = handler("@main\nfn build() { return 0 }");
        assert_eq!(handler.run(&strings(&["a", "b"])).unwrap(), 0);
    }

    #[test]
    fn test_action_type_is_instantiated() {
        let handler = handler(
            r#"
@main
action Greeter {
    let prefix = "hello "
    fn run(args) {
        if prefix + join(args, " ") == "hello big world" { return 5 }
        return false
    }
}
"#,
        );
        assert_eq!(handler.run(&strings(&["big", "world"])).unwrap(), 5);
        assert_eq!(handler.run(&strings(&["nope"])).unwrap(), 1);
    }

    #[test]
    fn test_action_without_run_is_rejected() {
        let env = ScriptEnvironment::from_source("@main\naction Empty { let x = 1 }", None).unwrap();
        assert!(matches!(env.main_handler(), Err(ScriptError::MissingRun(name)) if name == "Empty"));
    }

    #[test]
    fn test_non_callable_main_is_rejected() {
        let env = ScriptEnvironment::from_source("main(\"build\")", None).unwrap();
        assert!(matches!(env.main_handler(), Err(ScriptError::NotAnAction(_))));
    }

    #[test]
    fn test_nothing_registered() {
        let env = ScriptEnvironment::from_source("let x = 1", None).unwrap();
        assert!(env.main_handler().unwrap().is_none());
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let first = ScriptEnvironment::from_source("let secret = 1\n@main\nfn m() {}", None).unwrap();
        let second = ScriptEnvironment::from_source("@main\nfn m() { return secret }", None).unwrap();
        assert!(first.global("secret").is_some());
        assert!(second.global("secret").is_none());
        let err = second.main_handler().unwrap().unwrap().run(&[]).unwrap_err();
        assert!(matches!(err, ScriptError::Undefined(name) if name == "secret"));
    }

    #[test]
    fn test_registration_from_rust() {
        let env = ScriptEnvironment::from_source(
            "fn fallback(args) { return 1 }\nfn deploy(args) { return len(args) }",
            None,
        )
        .unwrap();
        env.set_dispatcher(env.global("fallback").unwrap());
        env.register_command("deploy", env.global("deploy").unwrap())
            .unwrap();
        let handler = env.main_handler().unwrap().unwrap();
        assert_eq!(handler.run(&strings(&["deploy", "a", "b"])).unwrap(), 2);
        assert_eq!(
            env.shell_command("git").arg("status").to_string(),
            "#<git status>"
        );
    }

    #[test]
    fn test_out_of_range_exit_code_is_a_parse_error() {
        let result = ScriptEnvironment::from_source("@main\nfn m() { return 99999999999999999999 }", None);
        assert!(matches!(result, Err(ScriptError::Parse(err)) if err.line == 2));
    }

    #[test]
    fn test_parenthesised_statement_starts_a_new_line() {
        let handler = handler(
            "@main\nfn m() {\n    let x = len([1])\n    (sh(\"true\") | sh(\"true\")).run()\n    return x\n}",
        );
        assert_eq!(handler.run(&[]).unwrap(), 1);
    }

    #[test]
    fn test_fail_builtin() {
        let handler = handler("@main\nfn m() { fail(\"bad input:\", 3) }");
        let err = handler.run(&[]).unwrap_err();
        assert_eq!(err.to_string(), "bad input: 3");
    }

    #[test]
    fn test_read_error_names_the_file() {
        let err = ScriptEnvironment::load(Path::new("/nonexistent/build.ash"))
            .err()
            .expect("missing file");
        assert!(err.to_string().contains("/nonexistent/build.ash"));
    }
}
