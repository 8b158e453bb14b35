//! Error types surfaced by the harness.

use std::{path::PathBuf, time::Duration};

use crate::comparison::Diff;
use crate::process::ExitOutcome;

/// An error that aborts the step it occurred in, and with it the enclosing test case.
#[derive(thiserror::Error, Debug)]
pub enum StepError {
    /// The program could not be located or executed.
    #[error("failed to spawn `{program}`: {source}")]
    ProcessSpawn {
        /// Program that was to be executed.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The child did not terminate within its allotted time and was killed.
    #[error("`{program}` did not finish within {timeout:?}")]
    ProcessTimeout {
        /// Program that was executed.
        program: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The child terminated with an unexpected status.
    #[error("`{program}` {outcome}; expected exit code {expected}")]
    ProcessFailure {
        /// Program that was executed.
        program: String,
        /// How the child terminated.
        outcome: ExitOutcome,
        /// The exit code that was expected.
        expected: i32,
        /// Captured standard error of the child.
        stderr: String,
    },

    /// Actual output differs from the golden file.
    #[error("output differs from {}", golden.display())]
    OutputMismatch {
        /// Resolved path of the golden file.
        golden: PathBuf,
        /// The differences found.
        diff: Diff,
    },

    /// The golden file could not be read (or written, when updating).
    #[error("cannot access golden file {}: {source}", path.display())]
    GoldenFile {
        /// Resolved path of the golden file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A line-exclusion pattern is not a valid regular expression.
    #[error("invalid exclusion pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A `${name}` placeholder refers to an unknown variable.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    /// The per-case working directory could not be prepared.
    #[error("working directory error: {0}")]
    Workspace(#[source] std::io::Error),

    /// Executing the case panicked.
    #[error("case execution panicked: {0}")]
    Panicked(String),
}

/// Error raised while evaluating a registration guard.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// A flag consulted as a boolean holds a value that is not one.
    #[error("runtime argument `{name}` has non-boolean value {value:?}")]
    NotABoolean {
        /// Name of the runtime argument.
        name: String,
        /// The offending value.
        value: String,
    },

    /// A custom guard reported a failure.
    #[error("{0}")]
    Custom(String),
}

/// Error raised while registering test cases.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two test cases share a name.
    #[error("test case registered twice: {0}")]
    DuplicateName(String),
}

/// Error raised while loading declarations from YAML.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the declaration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid case set.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Path of the declaration file.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A step does not name exactly one action, or names conflicting inputs.
    #[error("{}: case '{case}', step {step}: {message}", path.display())]
    InvalidStep {
        /// Path of the declaration file.
        path: PathBuf,
        /// Name of the case.
        case: String,
        /// 1-based index of the step.
        step: usize,
        /// What is wrong with it.
        message: &'static str,
    },

    /// The glob pattern used for discovery is malformed.
    #[error("invalid case file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A directory entry could not be inspected during discovery.
    #[error("failed to walk case directory: {0}")]
    Glob(#[from] glob::GlobError),

    /// The loaded cases could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
