//! Actions and the handlers that route command-line arguments to them.

use super::ScriptError;
use super::interpreter::Interpreter;
use super::value::{ActionObject, Value};
use crate::ast::FunctionDef;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// A unit of executable behaviour registered by a script.
pub trait Action {
    /// Run with the positional arguments left over after dispatch and
    /// return the exit code.
    ///
    /// # Errors
    ///
    /// Any error raised while the action's script code runs.
    fn run(&self, args: &[String]) -> Result<i32, ScriptError>;
}

/// A zero-argument callable. Command-line arguments are ignored.
pub struct FunctionAction<F> {
    function: F,
}

impl<F> FunctionAction<F>
where
    F: Fn() -> Result<i32, ScriptError>,
{
    pub fn new(function: F) -> Self {
        FunctionAction { function }
    }
}

impl<F> Action for FunctionAction<F>
where
    F: Fn() -> Result<i32, ScriptError>,
{
    fn run(&self, _args: &[String]) -> Result<i32, ScriptError> {
        (self.function)()
    }
}

enum Target {
    /// A function taking the argument list as its first parameter.
    Function(Rc<FunctionDef>),
    /// An action instance and its `run` method.
    Object(Rc<ActionObject>, Rc<FunctionDef>),
}

/// A script value that receives the argument list.
pub(crate) struct ScriptAction {
    interpreter: Rc<Interpreter>,
    target: Target,
}

impl Action for ScriptAction {
    fn run(&self, args: &[String]) -> Result<i32, ScriptError> {
        let value = match &self.target {
            Target::Function(def) => self.interpreter.call_value(
                Value::Function(Rc::clone(def)),
                bind_args(def, args),
            )?,
            Target::Object(object, run) => {
                self.interpreter
                    .call_method_def(object, run, bind_args(run, args))?
            }
        };
        Ok(exit_code(&value))
    }
}

/// The argument list goes to the first parameter; any further parameters
/// are bound to null.
fn bind_args(def: &FunctionDef, args: &[String]) -> Vec<Value> {
    let mut values = Vec::with_capacity(def.params.len());
    if !def.params.is_empty() {
        values.push(Value::List(args.iter().cloned().map(Value::Str).collect()));
        values.resize(def.params.len(), Value::Null);
    }
    values
}

/// Integers become the exit code, `false` fails with 1, anything else is 0.
pub(crate) fn exit_code(value: &Value) -> i32 {
    match value {
        Value::Int(code) => i32::try_from(*code).unwrap_or(1),
        Value::Bool(false) => 1,
        _ => 0,
    }
}

/// Turn a registered script value into an [`Action`].
pub(crate) fn normalize(
    interpreter: &Rc<Interpreter>,
    value: Value,
) -> Result<Box<dyn Action>, ScriptError> {
    match value {
        Value::Function(def) if def.params.is_empty() => {
            let interpreter = Rc::clone(interpreter);
            Ok(Box::new(FunctionAction::new(move || {
                let value = interpreter.call_value(Value::Function(Rc::clone(&def)), Vec::new())?;
                Ok(exit_code(&value))
            })))
        }
        Value::Function(def) => Ok(Box::new(ScriptAction {
            interpreter: Rc::clone(interpreter),
            target: Target::Function(def),
        })),
        Value::ActionType(def) => {
            let object = interpreter.instantiate(&def)?;
            from_object(interpreter, object)
        }
        Value::Object(object) => from_object(interpreter, object),
        other => Err(ScriptError::NotAnAction(other.to_string())),
    }
}

fn from_object(
    interpreter: &Rc<Interpreter>,
    object: Rc<ActionObject>,
) -> Result<Box<dyn Action>, ScriptError> {
    let run = object
        .method("run")
        .ok_or_else(|| ScriptError::MissingRun(object.def.name.clone()))?;
    Ok(Box::new(ScriptAction {
        interpreter: Rc::clone(interpreter),
        target: Target::Object(object, run),
    }))
}

/// Routes an invocation to the registered action.
pub enum ActionHandler {
    Simple(Box<dyn Action>),
    Dispatcher {
        default: Box<ActionHandler>,
        commands: BTreeMap<String, ActionHandler>,
    },
}

impl ActionHandler {
    /// Run the handler. A dispatcher consumes `args[0]` when it names a
    /// sub-command; otherwise the default sees the arguments unchanged.
    ///
    /// # Errors
    ///
    /// Whatever the selected action raises.
    pub fn run(&self, args: &[String]) -> Result<i32, ScriptError> {
        match self {
            ActionHandler::Simple(action) => action.run(args),
            ActionHandler::Dispatcher { default, commands } => {
                if let Some((first, rest)) = args.split_first()
                    && let Some(handler) = commands.get(first)
                {
                    debug!(command = %first, "dispatching sub-command");
                    return handler.run(rest);
                }
                default.run(args)
            }
        }
    }

    /// Sub-command names, sorted. Empty for a simple handler.
    #[must_use]
    pub fn command_names(&self) -> Vec<&str> {
        match self {
            ActionHandler::Simple(_) => Vec::new(),
            ActionHandler::Dispatcher { commands, .. } => {
                commands.keys().map(String::as_str).collect()
            }
        }
    }
}
