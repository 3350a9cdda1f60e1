//! Lazily started, clonable, pipeable external processes.
//!
//! A [`Process`] is either a single external command ([`ShellProcess`]) or
//! two processes joined by an OS pipe ([`PipedProcess`]). Every process moves
//! through `not-started → running → complete` exactly once. Each external
//! command is spawned and reaped by its own worker thread; the caller only
//! blocks until the child exists, unless it asks to wait.

mod piped;
mod shell;

pub use piped::PipedProcess;
pub use shell::ShellProcess;

use std::fmt;
use std::io::{self, BufRead, BufReader};
use std::ops::BitOr;
use std::path::PathBuf;
use std::process::{ChildStdout, ExitStatus, Stdio};
use thiserror::Error;

/// Errors raised by the process model.
///
/// A child that exits non-zero is *not* an error; callers inspect
/// [`Process::run_to_completion`] instead.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process {0} has already been started")]
    AlreadyStarted(String),

    #[error("process {0} has not been started")]
    NotStarted(String),

    #[error("process {0} has not completed")]
    NotComplete(String),

    #[error("process {0} does not capture its output")]
    NotCaptured(String),

    #[error("cannot add arguments to pipeline {0}")]
    NotAShellCommand(String),

    #[error("cannot run an empty command")]
    EmptyCommand,

    #[error("`{program}` not found on PATH")]
    ProgramNotFound { program: String },

    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for {command}: {source}")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("worker thread for {0} panicked")]
    WorkerPanicked(String),

    #[error("failed to create pipe: {0}")]
    Pipe(#[source] io::Error),
}

/// How captured standard output is buffered while it is read back.
///
/// Mirrors the classic `bufsize` knob: negative means the default buffer,
/// zero means unbuffered, anything else is an explicit capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Buffering {
    #[default]
    Default,
    Unbuffered,
    Capacity(usize),
}

impl Buffering {
    #[must_use]
    pub fn from_bufsize(bufsize: isize) -> Self {
        match usize::try_from(bufsize) {
            Err(_) => Buffering::Default,
            Ok(0) => Buffering::Unbuffered,
            Ok(n) => Buffering::Capacity(n),
        }
    }

    fn reader(self, stdout: ChildStdout) -> BufReader<ChildStdout> {
        match self {
            Buffering::Default => BufReader::new(stdout),
            Buffering::Unbuffered => BufReader::with_capacity(1, stdout),
            Buffering::Capacity(n) => BufReader::with_capacity(n, stdout),
        }
    }
}

/// Per-process configuration, copied (never shared) by [`Process::try_clone`].
///
/// Children never inherit stray descriptors: std opens every descriptor
/// close-on-exec, so there is no `close_fds` switch to turn off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessConfig {
    pub buffering: Buffering,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Where a child's stdin or stdout is connected.
///
/// Pipe ends are owned: handing one to a process transfers it to that
/// process's worker, which closes it once the child has exited.
#[derive(Debug, Default)]
pub enum Redirect {
    #[default]
    Inherit,
    Null,
    Capture,
    PipeReader(io::PipeReader),
    PipeWriter(io::PipeWriter),
}

impl Redirect {
    fn is_pipe(&self) -> bool {
        matches!(self, Redirect::PipeReader(_) | Redirect::PipeWriter(_))
    }

    /// The redirect a clone starts from. Pipe ends belong to one run only;
    /// a cloned pipeline wires fresh ones.
    fn fresh(&self) -> Redirect {
        match self {
            Redirect::Null => Redirect::Null,
            Redirect::Capture => Redirect::Capture,
            Redirect::Inherit | Redirect::PipeReader(_) | Redirect::PipeWriter(_) => {
                Redirect::Inherit
            }
        }
    }

    fn into_stdio(self) -> Stdio {
        match self {
            Redirect::Inherit => Stdio::inherit(),
            Redirect::Null => Stdio::null(),
            Redirect::Capture => Stdio::piped(),
            Redirect::PipeReader(reader) => reader.into(),
            Redirect::PipeWriter(writer) => writer.into(),
        }
    }
}

/// Lines written by a captured process, read as the child produces them.
///
/// Single pass: the sequence ends at the child's EOF and cannot be restarted.
#[derive(Debug)]
pub struct StdoutLines {
    lines: io::Lines<BufReader<ChildStdout>>,
}

impl StdoutLines {
    fn new(stdout: ChildStdout, buffering: Buffering) -> Self {
        Self {
            lines: buffering.reader(stdout).lines(),
        }
    }
}

impl Iterator for StdoutLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}

/// A single command or a pipeline of commands.
#[derive(Debug)]
pub enum Process {
    Shell(ShellProcess),
    Piped(Box<PipedProcess>),
}

impl Process {
    /// Build a not-started process from a program and its arguments.
    pub fn shell<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Process::Shell(ShellProcess::from_argv(argv))
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        match self {
            Process::Shell(shell) => shell.is_started(),
            Process::Piped(piped) => piped.is_started(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self {
            Process::Shell(shell) => shell.is_complete(),
            Process::Piped(piped) => piped.is_complete(),
        }
    }

    /// Whether stdout is redirected into a pipe this process reads back.
    #[must_use]
    pub fn is_captured(&self) -> bool {
        match self {
            Process::Shell(shell) => shell.is_captured(),
            Process::Piped(piped) => piped.target().is_captured(),
        }
    }

    /// Start the process. Fails if it was started before.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AlreadyStarted`] on a second start, or a spawn
    /// error if the program cannot be launched.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        match self {
            Process::Shell(shell) => shell.start(),
            Process::Piped(piped) => piped.start(),
        }
    }

    /// Start the process unless it is already running or done.
    ///
    /// # Errors
    ///
    /// Returns a spawn error if the program cannot be launched.
    pub fn ensure_running(&mut self) -> Result<(), ProcessError> {
        if self.is_started() {
            return Ok(());
        }
        self.start()
    }

    /// Block until the process has exited. Idempotent once complete.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotStarted`] if the process was never started.
    pub fn wait_for_completion(&mut self) -> Result<(), ProcessError> {
        if !self.is_started() {
            return Err(ProcessError::NotStarted(self.to_string()));
        }
        match self {
            Process::Shell(shell) => shell.wait(),
            Process::Piped(piped) => piped.wait(),
        }
    }

    /// Start if needed, then wait for completion. The exit status is kept
    /// but not judged.
    ///
    /// # Errors
    ///
    /// Returns a spawn or wait error.
    pub fn run(&mut self) -> Result<(), ProcessError> {
        self.ensure_running()?;
        self.wait_for_completion()
    }

    /// Run to completion and report whether the exit code was zero.
    ///
    /// # Errors
    ///
    /// Returns a spawn or wait error; a non-zero exit is `Ok(false)`.
    pub fn run_to_completion(&mut self) -> Result<bool, ProcessError> {
        self.run()?;
        self.was_successful()
    }

    /// Whether a completed process exited with status zero. A pipeline
    /// succeeds when its last stage does.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::NotComplete`] before completion.
    pub fn was_successful(&self) -> Result<bool, ProcessError> {
        match self {
            Process::Shell(shell) => shell.was_successful(),
            Process::Piped(piped) => piped.target().was_successful(),
        }
    }

    #[must_use]
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            Process::Shell(shell) => shell.exit_status(),
            Process::Piped(piped) => piped.target().exit_status(),
        }
    }

    /// Capture stdout, start, and stream the output lines.
    ///
    /// The process must not have been started; the returned lines end at the
    /// child's EOF. Call [`Process::wait_for_completion`] afterwards to reap it.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AlreadyStarted`] for a process that already ran.
    pub fn stdout_lines(&mut self) -> Result<StdoutLines, ProcessError> {
        if self.is_started() {
            return Err(ProcessError::AlreadyStarted(self.to_string()));
        }
        self.capture_stdout();
        self.start()?;
        let (stdout, buffering) = self
            .take_stdout()
            .ok_or_else(|| ProcessError::NotCaptured(self.to_string()))?;
        Ok(StdoutLines::new(stdout, buffering))
    }

    /// Copy the command and configuration into a fresh, not-started process.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AlreadyStarted`] if this process was started.
    pub fn try_clone(&self) -> Result<Process, ProcessError> {
        match self {
            Process::Shell(shell) => shell.try_clone().map(Process::Shell),
            Process::Piped(piped) => piped.try_clone().map(|p| Process::Piped(Box::new(p))),
        }
    }

    /// Connect this process's stdout to `target`'s stdin.
    ///
    /// # Errors
    ///
    /// Both sides must be not-started; the pipe itself may also fail to open.
    pub fn pipe(self, target: Process) -> Result<Process, ProcessError> {
        PipedProcess::new(self, target).map(|piped| Process::Piped(Box::new(piped)))
    }

    pub(crate) fn capture_stdout(&mut self) {
        match self {
            Process::Shell(shell) => shell.capture_stdout(),
            Process::Piped(piped) => piped.target_mut().capture_stdout(),
        }
    }

    pub(crate) fn set_stdin(&mut self, redirect: Redirect) {
        match self {
            Process::Shell(shell) => shell.set_stdin(redirect),
            Process::Piped(piped) => piped.source_mut().set_stdin(redirect),
        }
    }

    pub(crate) fn set_stdout(&mut self, redirect: Redirect) {
        match self {
            Process::Shell(shell) => shell.set_stdout(redirect),
            Process::Piped(piped) => piped.target_mut().set_stdout(redirect),
        }
    }

    fn take_stdout(&mut self) -> Option<(ChildStdout, Buffering)> {
        match self {
            Process::Shell(shell) => shell.take_stdout(),
            Process::Piped(piped) => piped.target_mut().take_stdout(),
        }
    }
}

impl From<ShellProcess> for Process {
    fn from(shell: ShellProcess) -> Self {
        Process::Shell(shell)
    }
}

impl BitOr for Process {
    type Output = Result<Process, ProcessError>;

    fn bitor(self, target: Process) -> Self::Output {
        self.pipe(target)
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Process::Shell(shell) => shell.fmt(f),
            Process::Piped(piped) => piped.fmt(f),
        }
    }
}
