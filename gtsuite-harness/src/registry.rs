//! Registration of test cases, optionally conditioned on runtime arguments.

use crate::error::{GuardError, RegistryError};
use crate::testcase::TestCase;
use std::{
    collections::{BTreeMap, HashSet},
    panic::AssertUnwindSafe,
    str::FromStr,
    sync::Arc,
};

/// Flags and values supplied once at the start of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeArguments {
    values: BTreeMap<String, String>,
}

impl RuntimeArguments {
    /// Creates an empty set of arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates arguments describing the host: `os` is set to the OS id when known.
    pub fn from_host() -> Self {
        let mut args = Self::new();
        if let Some(os_id) = crate::util::get_host_os_id() {
            args.set("os", os_id);
        }
        args
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Sets a boolean flag.
    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.set(name, enabled.to_string());
        self
    }

    /// Sets a value.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Merges `other` into these arguments; values in `other` win.
    pub fn extend(&mut self, other: Self) {
        self.values.extend(other.values);
    }

    /// Returns the raw value of an argument.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Interprets an argument as a boolean flag; an absent flag is disabled.
    pub fn flag(&self, name: &str) -> Result<bool, GuardError> {
        let Some(value) = self.get(name) else {
            return Ok(false);
        };

        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "" | "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(GuardError::NotABoolean {
                name: name.to_owned(),
                value: value.to_owned(),
            }),
        }
    }

    /// Iterates over all arguments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Parses `name` (an enabled flag) or `name=value`.
impl FromStr for RuntimeArguments {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = s.split_once('=').unwrap_or((s, "true"));
        if name.is_empty() {
            return Err(format!("missing argument name in '{s}'"));
        }

        Ok(Self::new().with_value(name, value))
    }
}

type Predicate = dyn Fn(&RuntimeArguments) -> Result<bool, GuardError> + Send + Sync;

/// A predicate over [`RuntimeArguments`] deciding whether a test case may run.
#[derive(Clone)]
pub struct Guard {
    description: String,
    predicate: Arc<Predicate>,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Guard").field(&self.description).finish()
    }
}

impl Guard {
    /// Creates a guard from an arbitrary predicate.
    pub fn new<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RuntimeArguments) -> Result<bool, GuardError> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Requires the flag `name` to be enabled.
    pub fn feature(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), move |args| args.flag(&name))
    }

    /// Requires every flag in `names` to be enabled.
    pub fn all_features<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(Self::feature)
            .reduce(|combined, guard| combined.and(guard))
    }

    /// Requires argument `name` to equal `value`.
    pub fn arg_equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        Self::new(format!("{name}={value}"), move |args| {
            Ok(args.get(&name) == Some(value.as_str()))
        })
    }

    /// Requires both this guard and `other` to hold.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        let description = format!("{} and {}", self.description, other.description);
        Self::new(description, move |args| {
            Ok(self.evaluate(args)? && other.evaluate(args)?)
        })
    }

    /// Inverts this guard.
    #[must_use]
    pub fn negate(self) -> Self {
        let description = format!("not {}", self.description);
        Self::new(description, move |args| Ok(!self.evaluate(args)?))
    }

    /// Evaluates the guard. A panicking predicate is reported as [`GuardError::Custom`].
    pub fn evaluate(&self, args: &RuntimeArguments) -> Result<bool, GuardError> {
        std::panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(args))).unwrap_or_else(
            |payload| {
                Err(GuardError::Custom(format!(
                    "guard '{}' panicked: {}",
                    self.description,
                    crate::util::panic_message(payload.as_ref())
                )))
            },
        )
    }

    /// Returns a human-readable description of the guard.
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Result of evaluating a case's guard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardOutcome {
    /// The case has no guard, or its guard holds.
    Satisfied,
    /// The guard does not hold.
    NotSatisfied,
    /// The guard could not be evaluated.
    Error(GuardError),
}

/// A registered case together with its guard outcome.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// 1-based declaration number.
    pub number: usize,
    /// The case.
    pub case: Arc<TestCase>,
    /// Outcome of the case's guard.
    pub guard: GuardOutcome,
}

/// Ordered collection of declared test cases.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    cases: Vec<Arc<TestCase>>,
    names: HashSet<String>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a case.
    pub fn register(&mut self, case: TestCase) -> Result<(), RegistryError> {
        if !self.names.insert(case.name.clone()) {
            return Err(RegistryError::DuplicateName(case.name));
        }

        self.cases.push(Arc::new(case));
        Ok(())
    }

    /// Registers cases that may only run while `guard` holds.
    pub fn register_guarded<I>(&mut self, guard: &Guard, cases: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = TestCase>,
    {
        for case in cases {
            self.register(case.guarded_by(guard.clone()))?;
        }

        Ok(())
    }

    /// Returns the registered cases in declaration order.
    pub fn cases(&self) -> &[Arc<TestCase>] {
        &self.cases
    }

    /// Returns the number of registered cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns whether no cases are registered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Evaluates every guard under `args`, in declaration order.
    pub fn evaluate(&self, args: &RuntimeArguments) -> Vec<Candidate> {
        self.cases
            .iter()
            .enumerate()
            .map(|(index, case)| {
                let guard = match &case.guard {
                    None => GuardOutcome::Satisfied,
                    Some(guard) => match guard.evaluate(args) {
                        Ok(true) => GuardOutcome::Satisfied,
                        Ok(false) => {
                            tracing::debug!(case = %case.name, guard = guard.description(), "guard not satisfied");
                            GuardOutcome::NotSatisfied
                        }
                        Err(err) => {
                            tracing::warn!(case = %case.name, "guard evaluation failed: {err}");
                            GuardOutcome::Error(err)
                        }
                    },
                };

                Candidate {
                    number: index + 1,
                    case: case.clone(),
                    guard,
                }
            })
            .collect()
    }

    /// Returns the cases whose guards hold under `args`, in declaration order.
    pub fn selectable(&self, args: &RuntimeArguments) -> Vec<Arc<TestCase>> {
        self.evaluate(args)
            .into_iter()
            .filter(|c| c.guard == GuardOutcome::Satisfied)
            .map(|c| c.case)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(cases: &[Arc<TestCase>]) -> Vec<&str> {
        cases.iter().map(|c| c.name.as_str()).collect()
    }

    fn sample_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(TestCase::new("first")).unwrap();
        registry
            .register_guarded(
                &Guard::feature("libgtview"),
                [TestCase::new("view"), TestCase::new("seqids")],
            )
            .unwrap();
        registry.register(TestCase::new("last")).unwrap();
        registry
    }

    #[test]
    fn selectable_respects_guards_and_order() {
        let registry = sample_registry();

        let off = RuntimeArguments::new().with_flag("libgtview", false);
        assert_eq!(names(&registry.selectable(&off)), vec!["first", "last"]);

        let on = RuntimeArguments::new().with_flag("libgtview", true);
        assert_eq!(
            names(&registry.selectable(&on)),
            vec!["first", "view", "seqids", "last"]
        );
    }

    #[test]
    fn guards_are_evaluated_lazily() {
        // Declarations come first; arguments are only known afterwards.
        let registry = sample_registry();
        let args: RuntimeArguments = "libgtview".parse().unwrap();

        assert_eq!(registry.selectable(&args).len(), 4);
    }

    #[test]
    fn guard_error_is_reported_not_selected() {
        let registry = sample_registry();
        let args = RuntimeArguments::new().with_value("libgtview", "maybe");

        let candidates = registry.evaluate(&args);
        assert!(matches!(
            candidates[1].guard,
            GuardOutcome::Error(GuardError::NotABoolean { .. })
        ));
        assert_eq!(names(&registry.selectable(&args)), vec!["first", "last"]);
    }

    #[test]
    fn panicking_guard_is_a_guard_error() {
        let mut registry = Registry::new();
        registry
            .register(
                TestCase::new("broken").guarded_by(Guard::new("libgtview check", |_| {
                    unreachable!("no such library")
                })),
            )
            .unwrap();
        registry.register(TestCase::new("fine")).unwrap();

        let candidates = registry.evaluate(&RuntimeArguments::new());
        match &candidates[0].guard {
            GuardOutcome::Error(GuardError::Custom(message)) => {
                assert!(message.contains("no such library"));
            }
            other => unreachable!("unexpected outcome {other:?}"),
        }
        assert_eq!(candidates[1].guard, GuardOutcome::Satisfied);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = sample_registry();
        assert_eq!(
            registry.register(TestCase::new("view")),
            Err(RegistryError::DuplicateName("view".into()))
        );
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn argument_parsing() {
        let flag: RuntimeArguments = "libgtview".parse().unwrap();
        assert_eq!(flag.flag("libgtview"), Ok(true));

        let value: RuntimeArguments = "os=fedora".parse().unwrap();
        assert_eq!(value.get("os"), Some("fedora"));
        assert_eq!(value.flag("missing"), Ok(false));

        assert!("=x".parse::<RuntimeArguments>().is_err());
    }

    #[test]
    fn composite_guards() {
        let guard = Guard::arg_equals("os", "fedora").and(Guard::feature("cairo").negate());
        let args = RuntimeArguments::new().with_value("os", "fedora");

        assert_eq!(guard.evaluate(&args), Ok(true));
        assert_eq!(
            guard.evaluate(&args.clone().with_flag("cairo", true)),
            Ok(false)
        );
        assert!(Guard::all_features(Vec::<String>::new()).is_none());
    }
}
