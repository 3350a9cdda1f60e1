//! Crate-level errors: the ones that reach the command line.

use crate::script::ScriptError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AshError {
    #[error("No command \"{0}\" found.")]
    CommandNotFound(String),
    #[error("{} registers neither a main action nor a dispatcher", .0.display())]
    MisconfiguredScript(PathBuf),
    #[error("{}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: ScriptError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
