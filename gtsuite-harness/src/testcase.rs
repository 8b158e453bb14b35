//! Test case definitions.

use crate::comparison::CompareOptions;
use crate::registry::Guard;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
    time::Duration,
};

/// Where a process step reads its standard input from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StepInput {
    /// Stdin is closed immediately.
    #[default]
    None,
    /// The stdout captured by the most recent capturing step.
    LastStdout,
    /// The contents of a file; relative paths resolve against the test-data root.
    File(String),
}

/// An external command to execute.
///
/// Program, arguments, environment values and the stdin file path may contain
/// `${name}` placeholders, which are expanded when the step runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute.
    pub program: String,
    /// Arguments to pass.
    pub args: Vec<String>,
    /// Environment variables to set for this command only.
    pub env: BTreeMap<String, String>,
    /// Source of the command's stdin.
    pub stdin: StepInput,
    /// Exit code that counts as success.
    pub expected_exit_code: i32,
    /// Timeout overriding the case and runner defaults.
    pub timeout: Option<Duration>,
}

impl Invocation {
    /// Creates an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for this command.
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Feeds the previously captured stdout to this command.
    #[must_use]
    pub fn stdin_from_last(mut self) -> Self {
        self.stdin = StepInput::LastStdout;
        self
    }

    /// Feeds the contents of `path` to this command.
    #[must_use]
    pub fn stdin_from_file(mut self, path: impl Into<String>) -> Self {
        self.stdin = StepInput::File(path.into());
        self
    }

    /// Sets the exit code that counts as success.
    #[must_use]
    pub const fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    /// Sets a timeout for this command.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        match &self.stdin {
            StepInput::None => Ok(()),
            StepInput::LastStdout => write!(f, " < (last stdout)"),
            StepInput::File(path) => write!(f, " < {path}"),
        }
    }
}

/// Which captured stream a comparison inspects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputSource {
    /// The last captured stdout.
    #[default]
    LastStdout,
    /// The last captured stderr.
    LastStderr,
}

/// Comparison of captured output against a golden file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoldenComparison {
    /// Stream to compare.
    pub source: OutputSource,
    /// Golden file path; relative paths resolve against the test-data root.
    pub golden: String,
    /// Normalization applied to both sides before comparing.
    pub options: CompareOptions,
}

/// A single step of a test case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Run a command, checking only its exit status.
    Run(Invocation),
    /// Run a command and capture its output into the pipeline context.
    RunAndCapture(Invocation),
    /// Compare captured output against a golden file.
    CompareOutput(GoldenComparison),
}

impl Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run(invocation) => write!(f, "run `{invocation}`"),
            Self::RunAndCapture(invocation) => write!(f, "capture `{invocation}`"),
            Self::CompareOutput(comparison) => {
                let stream = match comparison.source {
                    OutputSource::LastStdout => "stdout",
                    OutputSource::LastStderr => "stderr",
                };
                write!(f, "compare {stream} with {}", comparison.golden)
            }
        }
    }
}

/// A named, keyword-tagged sequence of steps.
#[derive(Clone, Debug)]
pub struct TestCase {
    /// Name of the test case; unique within a registry.
    pub name: String,
    /// Keywords used for selection.
    pub keywords: BTreeSet<String>,
    /// Steps, executed in order.
    pub steps: Vec<Step>,
    /// Guard deciding whether the case is eligible to run.
    pub guard: Option<Guard>,
    /// Timeout applied to each process step that sets none of its own.
    pub timeout: Option<Duration>,
}

impl TestCase {
    /// Creates an empty test case.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: BTreeSet::new(),
            steps: vec![],
            guard: None,
            timeout: None,
        }
    }

    /// Adds a keyword.
    #[must_use]
    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.insert(keyword.into());
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends a step running `invocation`.
    #[must_use]
    pub fn then_run(self, invocation: Invocation) -> Self {
        self.step(Step::Run(invocation))
    }

    /// Appends a step running `invocation` and capturing its output.
    #[must_use]
    pub fn then_capture(self, invocation: Invocation) -> Self {
        self.step(Step::RunAndCapture(invocation))
    }

    /// Appends an exact comparison of the last stdout against `golden`.
    #[must_use]
    pub fn then_compare(self, golden: impl Into<String>) -> Self {
        self.then_compare_with(golden, CompareOptions::default())
    }

    /// Appends a comparison of the last stdout against `golden` under `options`.
    #[must_use]
    pub fn then_compare_with(self, golden: impl Into<String>, options: CompareOptions) -> Self {
        self.step(Step::CompareOutput(GoldenComparison {
            source: OutputSource::LastStdout,
            golden: golden.into(),
            options,
        }))
    }

    /// Restricts the case with `guard`, in addition to any guard it already has.
    #[must_use]
    pub fn guarded_by(mut self, guard: Guard) -> Self {
        self.guard = Some(match self.guard.take() {
            Some(existing) => existing.and(guard),
            None => guard,
        });
        self
    }

    /// Sets the default timeout for the case's process steps.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns whether the case carries any of `keywords`; an empty filter matches all.
    pub fn matches_keywords(&self, keywords: &[String]) -> bool {
        keywords.is_empty() || keywords.iter().any(|k| self.keywords.contains(k))
    }
}
