//! A single external command run on its own worker thread.

use super::{Buffering, ProcessConfig, ProcessError, Redirect};
use std::fmt;
use std::io;
use std::mem;
use std::path::PathBuf;
use std::process::{ChildStdout, Command, ExitStatus};
use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// What the worker reports once the OS process exists (or failed to).
type Spawned = io::Result<Option<ChildStdout>>;

#[derive(Debug)]
enum State {
    NotStarted,
    Running {
        worker: JoinHandle<io::Result<ExitStatus>>,
        stdout: Option<ChildStdout>,
    },
    /// `status` is `None` when the program never spawned.
    Complete { status: Option<ExitStatus> },
}

/// An external command: argv, configuration, redirects and run state.
#[derive(Debug)]
pub struct ShellProcess {
    argv: Vec<String>,
    config: ProcessConfig,
    stdin: Redirect,
    stdout: Redirect,
    captured: bool,
    state: State,
}

impl ShellProcess {
    /// Start building a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self::from_argv([program.into()])
    }

    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            config: ProcessConfig::default(),
            stdin: Redirect::Inherit,
            stdout: Redirect::Inherit,
            captured: false,
            state: State::NotStarted,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cwd = Some(dir.into());
        self
    }

    #[must_use]
    pub fn buffering(mut self, buffering: Buffering) -> Self {
        self.config.buffering = buffering;
        self
    }

    #[must_use]
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    #[must_use]
    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub(super) fn is_started(&self) -> bool {
        !matches!(self.state, State::NotStarted)
    }

    pub(super) fn is_complete(&self) -> bool {
        matches!(self.state, State::Complete { .. })
    }

    pub(super) fn is_captured(&self) -> bool {
        self.captured
    }

    pub(super) fn capture_stdout(&mut self) {
        self.stdout = Redirect::Capture;
        self.captured = true;
    }

    pub(super) fn set_stdin(&mut self, redirect: Redirect) {
        self.stdin = redirect;
    }

    pub(super) fn set_stdout(&mut self, redirect: Redirect) {
        self.captured = matches!(redirect, Redirect::Capture);
        self.stdout = redirect;
    }

    pub(super) fn try_clone(&self) -> Result<Self, ProcessError> {
        if self.is_started() {
            return Err(ProcessError::AlreadyStarted(self.to_string()));
        }
        Ok(Self {
            argv: self.argv.clone(),
            config: self.config.clone(),
            stdin: self.stdin.fresh(),
            stdout: self.stdout.fresh(),
            captured: self.captured,
            state: State::NotStarted,
        })
    }

    pub(super) fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_started() {
            return Err(ProcessError::AlreadyStarted(self.to_string()));
        }
        let (program, args) = self.argv.split_first().ok_or(ProcessError::EmptyCommand)?;
        let program = program.clone();
        let label = self.to_string();

        let stdin = mem::take(&mut self.stdin);
        let stdout = mem::take(&mut self.stdout);
        let owned_pipes = usize::from(stdin.is_pipe()) + usize::from(stdout.is_pipe());

        let mut command = Command::new(&program);
        command
            .args(args)
            .stdin(stdin.into_stdio())
            .stdout(stdout.into_stdio())
            .envs(self.config.env.iter().map(|(k, v)| (k, v)));
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        // Released exactly once by the worker, after the spawn attempt.
        let (started_tx, started_rx) = mpsc::sync_channel::<Spawned>(1);
        let worker_label = label.clone();
        let worker = thread::Builder::new()
            .name(format!("ash {program}"))
            .spawn(move || run_worker(command, &started_tx, &worker_label, owned_pipes))
            .map_err(|source| ProcessError::Spawn {
                command: label.clone(),
                source,
            })?;

        match started_rx.recv() {
            Ok(Ok(stdout)) => {
                self.state = State::Running { worker, stdout };
                Ok(())
            }
            Ok(Err(source)) => {
                let _ = worker.join();
                self.state = State::Complete { status: None };
                if source.kind() == io::ErrorKind::NotFound && which::which(&program).is_err() {
                    Err(ProcessError::ProgramNotFound { program })
                } else {
                    Err(ProcessError::Spawn {
                        command: label,
                        source,
                    })
                }
            }
            Err(_) => {
                let _ = worker.join();
                self.state = State::Complete { status: None };
                Err(ProcessError::WorkerPanicked(label))
            }
        }
    }

    pub(super) fn wait(&mut self) -> Result<(), ProcessError> {
        match mem::replace(&mut self.state, State::Complete { status: None }) {
            State::NotStarted => {
                self.state = State::NotStarted;
                Err(ProcessError::NotStarted(self.to_string()))
            }
            State::Complete { status } => {
                self.state = State::Complete { status };
                Ok(())
            }
            State::Running { worker, stdout } => {
                // Unread captured output must not keep the child blocked on a full pipe.
                drop(stdout);
                let label = self.to_string();
                let status = worker
                    .join()
                    .map_err(|_| ProcessError::WorkerPanicked(label.clone()))?
                    .map_err(|source| ProcessError::Wait {
                        command: label,
                        source,
                    })?;
                self.state = State::Complete {
                    status: Some(status),
                };
                Ok(())
            }
        }
    }

    pub(super) fn was_successful(&self) -> Result<bool, ProcessError> {
        match &self.state {
            State::Complete { status } => Ok(status.is_some_and(|s| s.success())),
            _ => Err(ProcessError::NotComplete(self.to_string())),
        }
    }

    pub(super) fn exit_status(&self) -> Option<ExitStatus> {
        match &self.state {
            State::Complete { status } => *status,
            _ => None,
        }
    }

    pub(super) fn take_stdout(&mut self) -> Option<(ChildStdout, Buffering)> {
        let buffering = self.config.buffering;
        match &mut self.state {
            State::Running { stdout, .. } => stdout.take().map(|s| (s, buffering)),
            _ => None,
        }
    }
}

impl fmt::Display for ShellProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}>", self.argv.join(" "))
    }
}

/// Body of the worker thread: spawn, report, wait, then release descriptors.
///
/// `command` owns every pipe end given to the child, so dropping it after the
/// child exits closes them whatever the exit status was.
fn run_worker(
    mut command: Command,
    started: &SyncSender<Spawned>,
    label: &str,
    owned_pipes: usize,
) -> io::Result<ExitStatus> {
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            let kind = err.kind();
            drop(command);
            let _ = started.send(Err(err));
            return Err(kind.into());
        }
    };
    debug!(pid = child.id(), "started {label}");
    let _ = started.send(Ok(child.stdout.take()));

    let status = child.wait();
    drop(command);
    trace!(owned_pipes, "released descriptors of {label}");
    if let Ok(status) = &status {
        debug!(%status, "{label} exited");
    }
    status
}
