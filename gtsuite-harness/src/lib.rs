//! Golden-file test harness for exercising genome toolkit language bindings.
//!
//! Test cases are named, keyword-tagged sequences of steps. A step either runs an
//! external process, runs one and captures its output, or compares the last
//! captured output against a golden file. Cases are registered with a
//! [`Registry`], optionally behind a [`Guard`] over [`RuntimeArguments`], and
//! executed by a [`SuiteRunner`].
//!
//! ```no_run
//! use gtsuite_harness::{
//!     Invocation, Registry, RunnerConfig, RuntimeArguments, Selection, SuiteRunner, TestCase,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let mut registry = Registry::new();
//! registry.register(
//!     TestCase::new("sorted output")
//!         .keyword("demo")
//!         .then_capture(Invocation::new("printf").arg("b\\na\\n"))
//!         .then_capture(Invocation::new("sort").stdin_from_last())
//!         .then_compare("sorted.txt"),
//! )?;
//!
//! let runner = SuiteRunner::new(RunnerConfig::new("testdata".into()));
//! let report = runner
//!     .run(&registry, &RuntimeArguments::new(), &Selection::all())
//!     .await?;
//! std::process::exit(report.exit_code());
//! # }
//! ```

mod comparison;
mod config;
mod context;
mod corpus;
mod error;
mod execution;
mod process;
mod registry;
pub mod reporting;
mod runner;
mod testcase;
pub mod util;

pub use comparison::{CompareOptions, Comparator, Delta, Diff, DiffResult};
pub use config::{LogLevel, OutputFormat, RunnerConfig, TestOptions, parse_assignment};
pub use context::PipelineContext;
pub use corpus::{
    CaseDecl, CompareDecl, InvocationDecl, StdinDecl, StepDecl, StreamDecl, TestCaseSet,
    load_case_set, register_case_dir,
};
pub use error::{GuardError, LoadError, RegistryError, StepError};
pub use execution::{
    CaseFailure, CaseState, CaseStatus, ExecutionResult, LAST_STDOUT_FILE_NAME, SkipReason,
    execute_case,
};
pub use process::{ExitOutcome, ProcessRequest, ProcessRunner, RunResult, SystemProcessRunner};
pub use registry::{Candidate, Guard, GuardOutcome, Registry, RuntimeArguments};
pub use runner::{PlannedCase, Selection, SuiteReport, SuiteRunner, plan};
pub use testcase::{GoldenComparison, Invocation, OutputSource, Step, StepInput, TestCase};
