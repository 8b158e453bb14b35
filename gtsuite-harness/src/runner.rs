//! Suite runner implementation.

use crate::config::{RunnerConfig, TestOptions};
use crate::error::StepError;
use crate::execution::{
    CaseFailure, CaseState, CaseStatus, ExecutionResult, SkipReason, execute_case,
};
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::registry::{GuardOutcome, Registry, RuntimeArguments};
use crate::testcase::TestCase;
use anyhow::Result;
use std::{sync::Arc, time::Duration};

/// Filters choosing which eligible cases are dispatched.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    /// A case runs if this is empty or shares a keyword with the case.
    pub keywords: Vec<String>,
    /// Name patterns; when non-empty, only matching cases run.
    pub include: Vec<String>,
    /// Name patterns excluding cases.
    pub exclude: Vec<String>,
    /// Match name patterns exactly instead of as substrings.
    pub exact: bool,
    /// Run only the case with this 1-based declaration number.
    pub number: Option<usize>,
}

impl Selection {
    /// Selects every case.
    pub fn all() -> Self {
        Self::default()
    }

    /// Selects cases carrying any of `keywords`.
    pub fn keywords<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Builds the selection described by command-line options.
    pub fn from_options(options: &TestOptions) -> Self {
        Self {
            keywords: options.keywords.clone(),
            include: options.include_filters.clone(),
            exclude: options.exclude_filters.clone(),
            exact: options.exact_match,
            number: options.select,
        }
    }

    /// Returns whether the case declared as `number` is selected.
    pub fn matches(&self, number: usize, case: &TestCase) -> bool {
        self.number.is_none_or(|n| n == number)
            && case.matches_keywords(&self.keywords)
            && self.matches_name(&case.name)
    }

    /// Returns whether `name` passes the include and exclude patterns.
    pub fn matches_name(&self, name: &str) -> bool {
        // If any include filters were given, then we are in opt-in mode.
        if !self.include.is_empty() && !self.any_pattern_matches(name, &self.include) {
            return false;
        }

        !self.any_pattern_matches(name, &self.exclude)
    }

    fn any_pattern_matches(&self, name: &str, patterns: &[String]) -> bool {
        if self.exact {
            patterns.iter().any(|p| p == name)
        } else {
            patterns.iter().any(|p| name.contains(p.as_str()))
        }
    }
}

/// A registered case and what the runner will do with it.
#[derive(Clone, Debug)]
pub struct PlannedCase {
    /// 1-based declaration number.
    pub number: usize,
    /// The case.
    pub case: Arc<TestCase>,
    /// Why the case will not be dispatched; absent when it will run.
    pub skip: Option<SkipReason>,
}

/// Decides, for every registered case in declaration order, whether it runs.
pub fn plan(
    registry: &Registry,
    args: &RuntimeArguments,
    selection: &Selection,
) -> Vec<PlannedCase> {
    registry
        .evaluate(args)
        .into_iter()
        .map(|candidate| {
            let skip = if !selection.matches(candidate.number, &candidate.case) {
                Some(SkipReason::FilteredOut)
            } else {
                match candidate.guard {
                    GuardOutcome::Satisfied => None,
                    GuardOutcome::NotSatisfied => Some(SkipReason::GuardNotSatisfied(
                        candidate
                            .case
                            .guard
                            .as_ref()
                            .map_or_else(String::new, |g| g.description().to_owned()),
                    )),
                    GuardOutcome::Error(err) => Some(SkipReason::GuardError(err)),
                }
            };

            PlannedCase {
                number: candidate.number,
                case: candidate.case,
                skip,
            }
        })
        .collect()
}

/// Aggregated results of a suite run.
#[derive(Debug, Default)]
pub struct SuiteReport {
    /// One result per registered case, in declaration order.
    pub results: Vec<ExecutionResult>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl SuiteReport {
    /// Returns the number of cases considered.
    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Returns the number of cases that passed.
    pub fn passed(&self) -> usize {
        self.count(CaseState::Passed)
    }

    /// Returns the number of cases that failed.
    pub fn failed(&self) -> usize {
        self.count(CaseState::Failed)
    }

    /// Returns the number of cases that were skipped.
    pub fn skipped(&self) -> usize {
        self.count(CaseState::Skipped)
    }

    /// Iterates over the failed cases and their failures.
    pub fn failures(&self) -> impl Iterator<Item = (&ExecutionResult, &CaseFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.failure().map(|failure| (r, failure)))
    }

    /// Returns whether no case failed.
    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Returns the process exit code signalling the outcome of the run.
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.success())
    }

    /// Returns the total time spent in cases that passed.
    pub fn success_duration(&self) -> Duration {
        self.results
            .iter()
            .filter(|r| r.state() == CaseState::Passed)
            .map(|r| r.duration)
            .sum()
    }

    fn count(&self, state: CaseState) -> usize {
        self.results.iter().filter(|r| r.state() == state).count()
    }
}

/// Drives the execution of registered test cases.
#[derive(Clone)]
pub struct SuiteRunner {
    config: Arc<RunnerConfig>,
    process_runner: Arc<dyn ProcessRunner>,
}

impl SuiteRunner {
    /// Creates a runner that spawns real processes.
    pub fn new(config: RunnerConfig) -> Self {
        Self::with_process_runner(config, Arc::new(SystemProcessRunner))
    }

    /// Creates a runner that launches processes through `process_runner`.
    pub fn with_process_runner(
        config: RunnerConfig,
        process_runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            process_runner,
        }
    }

    /// Returns the runner's configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs the selected cases and collects their results.
    ///
    /// Up to `jobs` cases execute at once, each on a blocking worker thread. A failing
    /// case never stops the run; results are reported in declaration order.
    pub async fn run(
        &self,
        registry: &Registry,
        args: &RuntimeArguments,
        selection: &Selection,
    ) -> Result<SuiteReport> {
        let start_time = std::time::Instant::now();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.jobs.max(1)));

        let mut results = vec![];
        let mut join_handles = vec![];

        for PlannedCase { number, case, skip } in plan(registry, args, selection) {
            if let Some(reason) = skip {
                tracing::debug!(case = %case.name, %reason, "skipping");
                results.push(ExecutionResult::skipped(case.name.clone(), number, reason));
                continue;
            }

            let permit = semaphore.clone().acquire_owned().await?;
            let config = self.config.clone();
            let process_runner = self.process_runner.clone();
            let name = case.name.clone();

            let join_handle = tokio::task::spawn_blocking(move || {
                let result = execute_case(&case, number, &config, process_runner.as_ref());
                drop(permit);
                result
            });
            join_handles.push((name, number, std::time::Instant::now(), join_handle));
        }

        // Await all results; a worker that died still yields a result for its case.
        for (name, number, dispatched, join_handle) in join_handles {
            let result = match join_handle.await {
                Ok(result) => result,
                Err(err) => {
                    let message = if err.is_panic() {
                        crate::util::panic_message(err.into_panic().as_ref())
                    } else {
                        err.to_string()
                    };
                    tracing::warn!(case = %name, "case execution aborted: {message}");

                    ExecutionResult {
                        name,
                        number,
                        status: CaseStatus::Failed(CaseFailure {
                            step_index: None,
                            step: "execute case".into(),
                            error: StepError::Panicked(message),
                        }),
                        duration: dispatched.elapsed(),
                    }
                }
            };
            results.push(result);
        }

        results.sort_by_key(|r| r.number);

        Ok(SuiteReport {
            results,
            duration: start_time.elapsed(),
        })
    }
}
