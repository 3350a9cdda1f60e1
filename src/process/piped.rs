//! Two processes joined by an OS pipe.

use super::{Process, ProcessError, Redirect};
use std::fmt;
use std::io;
use tracing::{debug, trace};

/// `source | target`: the source's stdout feeds the target's stdin.
///
/// Output-facing operations (capture, stdout redirects, success) go to the
/// target; stdin redirects go to the source. Either side may itself be a
/// pipeline, so chains of any length nest.
#[derive(Debug)]
pub struct PipedProcess {
    source: Process,
    target: Process,
}

impl PipedProcess {
    /// Wire a fresh pipe between two not-started processes.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::AlreadyStarted`] if either side was started.
    pub fn new(mut source: Process, mut target: Process) -> Result<Self, ProcessError> {
        for side in [&source, &target] {
            if side.is_started() {
                return Err(ProcessError::AlreadyStarted(side.to_string()));
            }
        }
        let (reader, writer) = io::pipe().map_err(ProcessError::Pipe)?;
        source.set_stdout(Redirect::PipeWriter(writer));
        target.set_stdin(Redirect::PipeReader(reader));
        trace!("piped {source} into {target}");
        Ok(Self { source, target })
    }

    #[must_use]
    pub fn source(&self) -> &Process {
        &self.source
    }

    #[must_use]
    pub fn target(&self) -> &Process {
        &self.target
    }

    pub(super) fn source_mut(&mut self) -> &mut Process {
        &mut self.source
    }

    pub(super) fn target_mut(&mut self) -> &mut Process {
        &mut self.target
    }

    pub(super) fn is_started(&self) -> bool {
        self.source.is_started() || self.target.is_started()
    }

    pub(super) fn is_complete(&self) -> bool {
        self.source.is_complete() && self.target.is_complete()
    }

    /// Both stages run concurrently; the source is launched first.
    pub(super) fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_started() {
            return Err(ProcessError::AlreadyStarted(self.to_string()));
        }
        self.source.start()?;
        if let Err(e) = self.target.start() {
            // The failed target has already closed its read end, so the
            // source sees a broken pipe and exits.
            if let Err(wait_error) = self.source.wait_for_completion() {
                debug!("reaping {} after a failed start: {wait_error}", self.source);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Reap every stage that was started, reader first.
    pub(super) fn wait(&mut self) -> Result<(), ProcessError> {
        for stage in [&mut self.target, &mut self.source] {
            if stage.is_started() {
                stage.wait_for_completion()?;
            }
        }
        Ok(())
    }

    pub(super) fn try_clone(&self) -> Result<Self, ProcessError> {
        Self::new(self.source.try_clone()?, self.target.try_clone()?)
    }
}

impl fmt::Display for PipedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} | {})", self.source, self.target)
    }
}
