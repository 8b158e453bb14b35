//! Execution of a single test case.

use crate::comparison::{Comparator, Diff, DiffResult};
use crate::config::RunnerConfig;
use crate::context::PipelineContext;
use crate::error::{GuardError, StepError};
use crate::process::{ProcessRequest, ProcessRunner, RunResult};
use crate::testcase::{GoldenComparison, Invocation, OutputSource, Step, StepInput, TestCase};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// File name, inside a case's working directory, of the materialized last stdout.
pub const LAST_STDOUT_FILE_NAME: &str = "last_stdout";

/// Lifecycle state of a test case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseState {
    /// Not yet dispatched.
    NotStarted,
    /// Steps are executing.
    Running,
    /// All steps completed.
    Passed,
    /// A step failed; later steps were not executed.
    Failed,
    /// Never dispatched.
    Skipped,
}

/// Why a case was skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The case's guard does not hold.
    GuardNotSatisfied(String),
    /// The case's guard could not be evaluated.
    GuardError(GuardError),
    /// The case was excluded by the selection filters.
    FilteredOut,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GuardNotSatisfied(guard) => write!(f, "requires {guard}"),
            Self::GuardError(err) => write!(f, "guard error: {err}"),
            Self::FilteredOut => write!(f, "filtered out"),
        }
    }
}

/// The step at which a case failed, and why.
#[derive(Debug)]
pub struct CaseFailure {
    /// 1-based index of the failing step; absent when the case failed during setup.
    pub step_index: Option<usize>,
    /// Description of the failing step.
    pub step: String,
    /// The error.
    pub error: StepError,
}

/// Final status of a case.
#[derive(Debug)]
pub enum CaseStatus {
    /// All steps completed.
    Passed,
    /// A step failed.
    Failed(CaseFailure),
    /// The case was never dispatched.
    Skipped(SkipReason),
}

/// Result of one test case within a run.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Name of the case.
    pub name: String,
    /// 1-based declaration number of the case.
    pub number: usize,
    /// Final status.
    pub status: CaseStatus,
    /// Time spent executing the case.
    pub duration: Duration,
}

impl ExecutionResult {
    /// Creates the result of a case that was never dispatched.
    pub const fn skipped(name: String, number: usize, reason: SkipReason) -> Self {
        Self {
            name,
            number,
            status: CaseStatus::Skipped(reason),
            duration: Duration::ZERO,
        }
    }

    /// Returns the terminal state of the case.
    pub const fn state(&self) -> CaseState {
        match self.status {
            CaseStatus::Passed => CaseState::Passed,
            CaseStatus::Failed(_) => CaseState::Failed,
            CaseStatus::Skipped(_) => CaseState::Skipped,
        }
    }

    /// Returns the failure, if the case failed.
    pub const fn failure(&self) -> Option<&CaseFailure> {
        match &self.status {
            CaseStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Returns the output diff, if the case failed on a mismatch.
    pub const fn diff(&self) -> Option<&Diff> {
        match self.failure() {
            Some(CaseFailure {
                error: StepError::OutputMismatch { diff, .. },
                ..
            }) => Some(diff),
            _ => None,
        }
    }
}

/// Executes `case` to completion, failing fast on the first failing step.
pub fn execute_case(
    case: &TestCase,
    number: usize,
    config: &RunnerConfig,
    runner: &dyn ProcessRunner,
) -> ExecutionResult {
    let start_time = Instant::now();
    tracing::debug!(case = %case.name, from = ?CaseState::NotStarted, to = ?CaseState::Running, "dispatching");

    let status = match CaseExecution::prepare(case, config, runner) {
        Ok(mut execution) => match execution.run_steps() {
            Ok(()) => CaseStatus::Passed,
            Err(failure) => CaseStatus::Failed(failure),
        },
        Err(error) => CaseStatus::Failed(CaseFailure {
            step_index: None,
            step: String::from("prepare working directory"),
            error,
        }),
    };

    let result = ExecutionResult {
        name: case.name.clone(),
        number,
        status,
        duration: start_time.elapsed(),
    };

    match &result.status {
        CaseStatus::Failed(failure) => {
            tracing::info!(case = %case.name, step = %failure.step, "failed: {}", failure.error);
        }
        _ => tracing::debug!(case = %case.name, state = ?result.state(), "finished"),
    }

    result
}

struct CaseExecution<'a> {
    case: &'a TestCase,
    config: &'a RunnerConfig,
    runner: &'a dyn ProcessRunner,
    context: PipelineContext,
    working_dir: assert_fs::TempDir,
}

impl<'a> CaseExecution<'a> {
    fn prepare(
        case: &'a TestCase,
        config: &'a RunnerConfig,
        runner: &'a dyn ProcessRunner,
    ) -> Result<Self, StepError> {
        let working_dir = assert_fs::TempDir::new()
            .map_err(|e| StepError::Workspace(std::io::Error::other(e)))?;

        Ok(Self {
            case,
            config,
            runner,
            context: PipelineContext::new(),
            working_dir,
        })
    }

    fn run_steps(&mut self) -> Result<(), CaseFailure> {
        self.context.reset();

        for (index, step) in self.case.steps.iter().enumerate() {
            tracing::debug!(case = %self.case.name, step = index + 1, "{step}");

            self.run_step(step).map_err(|error| CaseFailure {
                step_index: Some(index + 1),
                step: step.to_string(),
                error,
            })?;
        }

        Ok(())
    }

    fn run_step(&mut self, step: &Step) -> Result<(), StepError> {
        match step {
            Step::Run(invocation) => {
                self.run_process(invocation)?;
            }
            Step::RunAndCapture(invocation) => {
                let result = self.run_process(invocation)?;
                self.context.capture(result);
            }
            Step::CompareOutput(comparison) => self.compare_output(comparison)?,
        }

        Ok(())
    }

    fn run_process(&self, invocation: &Invocation) -> Result<RunResult, StepError> {
        let program = self.expand(&invocation.program)?;
        let args = invocation
            .args
            .iter()
            .map(|arg| self.expand(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let mut env = self.config.env.clone();
        for (name, value) in &invocation.env {
            env.insert(name.clone(), self.expand(value)?);
        }

        let stdin = match &invocation.stdin {
            StepInput::None => None,
            StepInput::LastStdout => Some(self.context.last_stdout_as_input().to_vec()),
            StepInput::File(path) => {
                let path = self.resolve_data_path(&self.expand(path)?);
                Some(std::fs::read(&path).map_err(StepError::Workspace)?)
            }
        };

        let request = ProcessRequest {
            program,
            args,
            env,
            current_dir: Some(self.working_dir.path().to_path_buf()),
            stdin,
            timeout: invocation
                .timeout
                .or(self.case.timeout)
                .or(self.config.default_timeout),
        };

        let result = self.runner.run(&request)?;

        if result.outcome.code() != Some(invocation.expected_exit_code) {
            return Err(StepError::ProcessFailure {
                program: request.program,
                outcome: result.outcome,
                expected: invocation.expected_exit_code,
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }

        Ok(result)
    }

    fn compare_output(&self, comparison: &GoldenComparison) -> Result<(), StepError> {
        let actual = match comparison.source {
            OutputSource::LastStdout => self.context.last_stdout(),
            OutputSource::LastStderr => self.context.last_stderr(),
        };

        let golden = self.resolve_data_path(&self.expand(&comparison.golden)?);

        if self.config.update_golden {
            tracing::info!(golden = %golden.display(), "updating golden file");
            return std::fs::write(&golden, actual)
                .map_err(|source| StepError::GoldenFile { path: golden, source });
        }

        let expected = std::fs::read(&golden).map_err(|source| StepError::GoldenFile {
            path: golden.clone(),
            source,
        })?;

        let comparator = Comparator::new(&comparison.options)?;
        match comparator.compare(actual, &expected) {
            DiffResult::Identical => Ok(()),
            DiffResult::Different(diff) => Err(StepError::OutputMismatch { golden, diff }),
        }
    }

    fn expand(&self, input: &str) -> Result<String, StepError> {
        crate::util::expand_placeholders(input, |name| match name {
            "testdata" => Ok(self.config.testdata_dir.to_string_lossy().to_string()),
            "workdir" => Ok(self.working_dir.path().to_string_lossy().to_string()),
            "last_stdout" => self.materialize_last_stdout(),
            other => self
                .config
                .vars
                .get(other)
                .cloned()
                .ok_or_else(|| StepError::UnknownVariable(other.to_owned())),
        })
    }

    // Commands that want the previous output as a file argument get a snapshot of it
    // written into the working directory.
    fn materialize_last_stdout(&self) -> Result<String, StepError> {
        let path = self.working_dir.path().join(LAST_STDOUT_FILE_NAME);
        std::fs::write(&path, self.context.last_stdout()).map_err(StepError::Workspace)?;
        Ok(path.to_string_lossy().to_string())
    }

    fn resolve_data_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.testdata_dir.join(path)
        }
    }
}
