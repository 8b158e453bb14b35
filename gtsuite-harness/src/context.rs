//! Per-case carrier of the most recent captured process output.

use crate::process::{ExitOutcome, RunResult};

/// Holds what the most recent capturing step produced.
///
/// A context belongs to exactly one executing test case and starts out empty.
#[derive(Clone, Debug, Default)]
pub struct PipelineContext {
    last_stdout: Vec<u8>,
    last_stderr: Vec<u8>,
    last_outcome: Option<ExitOutcome>,
}

impl PipelineContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result`, replacing whatever was captured before.
    pub fn capture(&mut self, result: RunResult) {
        self.last_stdout = result.stdout;
        self.last_stderr = result.stderr;
        self.last_outcome = Some(result.outcome);
    }

    /// Returns the last captured stdout, for use as the next step's input stream.
    pub fn last_stdout_as_input(&self) -> &[u8] {
        &self.last_stdout
    }

    /// Returns the last captured stdout.
    pub fn last_stdout(&self) -> &[u8] {
        &self.last_stdout
    }

    /// Returns the last captured stderr.
    pub fn last_stderr(&self) -> &[u8] {
        &self.last_stderr
    }

    /// Returns the exit code of the last captured process, if it exited normally.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_outcome.and_then(|o| o.code())
    }

    /// Returns whether anything has been captured since the last reset.
    pub const fn has_capture(&self) -> bool {
        self.last_outcome.is_some()
    }

    /// Clears all captured state.
    pub fn reset(&mut self) {
        self.last_stdout.clear();
        self.last_stderr.clear();
        self.last_outcome = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(stdout: &[u8], code: i32) -> RunResult {
        RunResult {
            outcome: ExitOutcome::Exited(code),
            stdout: stdout.to_vec(),
            stderr: b"warn".to_vec(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn capture_overwrites_previous() {
        let mut ctx = PipelineContext::new();
        ctx.capture(result(b"first", 0));
        ctx.capture(result(b"second", 2));

        assert_eq!(ctx.last_stdout_as_input(), b"second");
        assert_eq!(ctx.last_exit_code(), Some(2));
        assert_eq!(ctx.last_stderr(), b"warn");
    }

    #[test]
    fn reset_clears_everything() {
        let mut ctx = PipelineContext::new();
        ctx.capture(result(b"data", 0));
        ctx.reset();

        assert!(!ctx.has_capture());
        assert!(ctx.last_stdout().is_empty());
        assert!(ctx.last_stderr().is_empty());
        assert_eq!(ctx.last_exit_code(), None);
    }
}
