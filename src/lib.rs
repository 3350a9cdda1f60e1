//! # ash
//!
//! A script-command dispatcher. `ash build` finds the nearest `ash/build.ash`
//! (or `.ash/build.ash`) walking up from the working directory, then across
//! the directories on `PATH`, and runs the action that script registers.
//!
//! Scripts drive external programs through [`process::Process`]: lazily
//! started, clonable, pipeable shell invocations.

pub mod ast;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod logging;
pub mod parser;
pub mod process;
pub mod repository;
pub mod script;

pub use error::AshError;
