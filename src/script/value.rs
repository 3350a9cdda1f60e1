//! Runtime values and lexical scopes of the script interpreter.

use super::builtins::Builtin;
use crate::ast::{ActionDef, FunctionDef};
use crate::process::Process;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Function(Rc<FunctionDef>),
    ActionType(Rc<ActionDef>),
    Object(Rc<ActionObject>),
    Builtin(Builtin),
    /// Returned by `command(name)`: calling it registers a sub-command.
    Registrar(String),
    /// Shared so that a process started through one binding is seen as
    /// started through every other.
    Process(Rc<RefCell<Process>>),
}

impl Value {
    pub(crate) fn process(process: Process) -> Self {
        Value::Process(Rc::new(RefCell::new(process)))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Function(_) => "function",
            Value::ActionType(_) => "action type",
            Value::Object(_) => "action",
            Value::Builtin(_) => "builtin",
            Value::Registrar(_) => "command registrar",
            Value::Process(_) => "process",
        }
    }

    /// Equality used by `==`: structural for data, identity for the rest.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::ActionType(a), Value::ActionType(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Registrar(a), Value::Registrar(b)) => a == b,
            (Value::Process(a), Value::Process(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Function(def) => write!(f, "<fn {}>", def.name),
            Value::ActionType(def) => write!(f, "<action {}>", def.name),
            Value::Object(object) => write!(f, "<{} instance>", object.def.name),
            Value::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name()),
            Value::Registrar(name) => write!(f, "<command {name}>"),
            Value::Process(process) => match process.try_borrow() {
                Ok(process) => write!(f, "{process}"),
                Err(_) => write!(f, "<process>"),
            },
        }
    }
}

/// An instantiated `action`: its fields live in a scope whose parent is the
/// script's global namespace, so methods read fields as plain names.
#[derive(Debug)]
pub struct ActionObject {
    pub(crate) def: Rc<ActionDef>,
    pub(crate) fields: ScopeRef,
    pub(crate) methods: HashMap<String, Rc<FunctionDef>>,
}

impl ActionObject {
    pub(crate) fn method(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.methods.get(name).cloned()
    }
}

pub(crate) type ScopeRef = Rc<RefCell<Scope>>;

#[derive(Debug, Default)]
pub(crate) struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeRef>,
}

impl Scope {
    pub(crate) fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub(crate) fn child(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(Rc::clone(parent)),
        }))
    }

    pub(crate) fn define(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }

    pub(crate) fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = Rc::clone(scope);
        loop {
            let next = {
                let frame = current.borrow();
                if let Some(value) = frame.vars.get(name) {
                    return Some(value.clone());
                }
                frame.parent.clone()?
            };
            current = next;
        }
    }

    /// Rebind `name` in the nearest scope that declares it.
    pub(crate) fn assign(scope: &ScopeRef, name: &str, value: Value) -> bool {
        let mut current = Rc::clone(scope);
        loop {
            let next = {
                let mut frame = current.borrow_mut();
                if let Some(slot) = frame.vars.get_mut(name) {
                    *slot = value;
                    return true;
                }
                match frame.parent.clone() {
                    Some(parent) => parent,
                    None => return false,
                }
            };
            current = next;
        }
    }
}
