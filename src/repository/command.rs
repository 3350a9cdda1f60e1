//! Commands resolved by the repository: script files and built-ins.

use crate::error::AshError;
use crate::script::ScriptEnvironment;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

pub type SpecialCallback = Box<dyn Fn(&[String], &Path) -> Result<i32, AshError>>;

/// A command backed by a script file in a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommand {
    pub name: String,
    pub script: PathBuf,
}

impl FileCommand {
    /// Load the script and run what it registered.
    ///
    /// # Errors
    ///
    /// Fails if the script cannot be loaded, registers no action, or its
    /// action raises an error.
    pub fn execute(&self, args: &[String]) -> Result<i32, AshError> {
        let wrap = |source| AshError::Script {
            path: self.script.clone(),
            source,
        };
        let environment = ScriptEnvironment::load(&self.script).map_err(wrap)?;
        let handler = environment
            .main_handler()
            .map_err(wrap)?
            .ok_or_else(|| AshError::MisconfiguredScript(self.script.clone()))?;
        info!(command = %self.name, "running {}", self.script.display());
        handler.run(args).map_err(wrap)
    }
}

/// A built-in command bound to its behaviour at construction.
pub struct SpecialCommand {
    pub name: String,
    callback: SpecialCallback,
}

impl SpecialCommand {
    pub fn new(name: impl Into<String>, callback: SpecialCallback) -> Self {
        SpecialCommand {
            name: name.into(),
            callback,
        }
    }
}

impl fmt::Debug for SpecialCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpecialCommand")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Command {
    File(FileCommand),
    Special(SpecialCommand),
}

impl Command {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Command::File(command) => &command.name,
            Command::Special(command) => &command.name,
        }
    }

    /// The script behind a file command.
    #[must_use]
    pub fn script(&self) -> Option<&Path> {
        match self {
            Command::File(command) => Some(&command.script),
            Command::Special(_) => None,
        }
    }

    /// Run the command with the arguments that followed its name.
    ///
    /// # Errors
    ///
    /// See [`FileCommand::execute`]; special commands report their own errors.
    pub fn execute(&self, args: &[String], here: &Path) -> Result<i32, AshError> {
        match self {
            Command::File(command) => command.execute(args),
            Command::Special(command) => (command.callback)(args, here),
        }
    }
}
