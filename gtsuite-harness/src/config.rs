//! Configuration types for the test harness.

use crate::registry::RuntimeArguments;
use clap::Parser;
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// Configuration for the suite runner.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Root directory of fixture and golden files.
    pub testdata_dir: PathBuf,
    /// Number of test cases to execute concurrently.
    pub jobs: usize,
    /// Timeout for process steps that specify none; unlimited when absent.
    pub default_timeout: Option<Duration>,
    /// Values for `${name}` placeholders.
    pub vars: BTreeMap<String, String>,
    /// Environment variables added for every child process.
    pub env: BTreeMap<String, String>,
    /// Write actual output to golden files instead of comparing.
    pub update_golden: bool,
}

impl RunnerConfig {
    /// Creates a new runner config with default values.
    pub fn new(testdata_dir: PathBuf) -> Self {
        Self {
            testdata_dir,
            jobs: 1,
            default_timeout: None,
            vars: BTreeMap::from([(String::from("ruby"), String::from("ruby"))]),
            env: BTreeMap::new(),
            update_golden: false,
        }
    }

    /// Sets the number of concurrently executing cases (at least one).
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Sets the default process timeout.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets a placeholder variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Sets an environment variable for every child process.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Enables or disables golden-file update mode.
    #[must_use]
    pub const fn with_update_golden(mut self, update_golden: bool) -> Self {
        self.update_golden = update_golden;
        self
    }
}

/// Output format for test results.
#[derive(Clone, Copy, Default, clap::ValueEnum, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// `JUnit` XML format.
    Junit,
    /// One line per test case.
    Terse,
}

/// Verbosity of diagnostic logging.
#[derive(Clone, Copy, Default, clap::ValueEnum, Debug, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    #[default]
    Warn,
    /// Progress information.
    Info,
    /// Decisions made while selecting and executing cases.
    Debug,
    /// Everything.
    Trace,
}

/// Parses a `name=value` pair.
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Some((name.to_owned(), value.to_owned())),
        _ => None,
    }
    .ok_or_else(|| format!("expected name=value, got '{s}'"))
}

/// Command-line options for the test harness.
#[derive(Clone, Parser, Debug)]
#[clap(version, about, disable_help_flag = true)]
pub struct TestOptions {
    /// Display usage information.
    #[clap(long = "help", action = clap::ArgAction::HelpLong)]
    pub help: Option<bool>,

    /// Output format for test results.
    #[clap(long = "format", default_value = "pretty")]
    pub format: OutputFormat,

    /// Display details regarding successful and skipped test cases.
    #[clap(short = 'v', long = "verbose", env = "GTSUITE_VERBOSE")]
    pub verbose: bool,

    /// List available tests without running them.
    #[clap(long = "list")]
    pub list_tests_only: bool,

    /// Exactly match name filters (not just substring match).
    #[clap(long = "exact")]
    pub exact_match: bool,

    /// Run only test cases carrying one of these keywords.
    #[clap(short = 'k', long = "keyword")]
    pub keywords: Vec<String>,

    /// Run only the test case with this declaration number.
    #[clap(long = "select")]
    pub select: Option<usize>,

    /// Enable a feature flag (`name`) or set a runtime argument (`name=value`).
    #[clap(short = 'F', long = "feature")]
    pub features: Vec<RuntimeArguments>,

    /// Root directory of fixture and golden files.
    #[clap(long = "testdata", env = "GTSUITE_TESTDATA")]
    pub testdata: Option<PathBuf>,

    /// Directory of YAML test case declarations.
    #[clap(long = "cases-dir")]
    pub cases_dirs: Vec<PathBuf>,

    /// Do not register the built-in test cases.
    #[clap(long = "no-builtin-cases")]
    pub no_builtin_cases: bool,

    /// Set a placeholder variable for commands and paths.
    #[clap(long = "var", value_parser = parse_assignment)]
    pub vars: Vec<(String, String)>,

    /// Set an environment variable for every child process.
    #[clap(long = "env", value_parser = parse_assignment)]
    pub env: Vec<(String, String)>,

    /// Number of test cases to run concurrently.
    #[clap(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Kill process steps that run longer than this many seconds.
    #[clap(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Overwrite golden files with actual output instead of comparing.
    #[clap(long = "update-golden")]
    pub update_golden: bool,

    /// Colorize output?
    #[clap(long = "color", default_value_t = clap::ColorChoice::Auto)]
    pub color: clap::ColorChoice,

    /// Read configuration from this file instead of the default location.
    #[clap(long = "config", env = "GTSUITE_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Do not read any configuration file.
    #[clap(long = "no-config")]
    pub no_config: bool,

    /// Verbosity of diagnostic logging on stderr.
    #[clap(long = "log-level")]
    pub log_level: Option<LogLevel>,

    /// Patterns for tests to be excluded.
    #[clap(long = "skip")]
    pub exclude_filters: Vec<String>,

    /// Patterns for tests to be included.
    pub include_filters: Vec<String>,
}

impl TestOptions {
    /// Returns the runtime arguments given on the command line.
    pub fn runtime_arguments(&self) -> RuntimeArguments {
        let mut args = RuntimeArguments::new();
        for feature in &self.features {
            args.extend(feature.clone());
        }
        args
    }

    /// Returns whether a test should run based on include/exclude filters.
    pub fn should_run_test(&self, name: &str) -> bool {
        crate::runner::Selection::from_options(self).matches_name(name)
    }
}
