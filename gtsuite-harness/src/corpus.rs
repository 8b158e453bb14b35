//! YAML declarations of test cases.
//!
//! A declaration file holds one named case set:
//!
//! ```yaml
//! name: gtruby
//! requires: [libgtview]
//! cases:
//!   - name: "gtruby: show_seqids bindings"
//!     keywords: [gt_ruby]
//!     steps:
//!       - capture:
//!           program: ${ruby}
//!           args: ["${testdata}/gtruby/show_seqids.rb", "${testdata}/encode_known_genes_Mar07.gff3"]
//!       - compare:
//!           golden: encode_known_genes_Mar07.seqids
//! ```

use crate::comparison::CompareOptions;
use crate::error::LoadError;
use crate::registry::{Guard, Registry};
use crate::testcase::{GoldenComparison, Invocation, OutputSource, Step, StepInput, TestCase};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// A set of test cases loaded from a single YAML file.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TestCaseSet {
    /// Name of the test case set.
    pub name: Option<String>,

    /// Feature flags that must all be enabled for any case in the set to run.
    #[serde(default)]
    pub requires: Vec<String>,

    /// The test cases in this set.
    pub cases: Vec<CaseDecl>,

    /// Path to the YAML file (computed at load time).
    #[serde(skip)]
    pub source_file: PathBuf,
}

/// A single declared test case.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CaseDecl {
    /// Name of the test case.
    pub name: String,

    /// Keywords used for selection.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Feature flags that must all be enabled for the case to run.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Timeout for each process step of the case.
    pub timeout_secs: Option<u64>,

    /// Steps, executed in order.
    pub steps: Vec<StepDecl>,
}

/// A declared step; exactly one of the actions must be given.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct StepDecl {
    /// Run a command, checking only its exit status.
    pub run: Option<InvocationDecl>,
    /// Run a command and capture its output.
    pub capture: Option<InvocationDecl>,
    /// Compare captured output against a golden file.
    pub compare: Option<CompareDecl>,
}

/// Symbolic stdin sources.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StdinDecl {
    /// The last captured stdout.
    LastStdout,
}

/// A declared command.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct InvocationDecl {
    /// Program to execute.
    pub program: String,
    /// Arguments to pass.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for this command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Symbolic stdin source.
    pub stdin: Option<StdinDecl>,
    /// File whose contents are fed to stdin.
    pub stdin_file: Option<String>,
    /// Exit code that counts as success.
    #[serde(default)]
    pub expect_exit_code: i32,
    /// Timeout for this command.
    pub timeout_secs: Option<u64>,
}

/// Stream selector for comparisons.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StreamDecl {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
}

/// A declared golden-file comparison.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(try_from = "RawCompareDecl", rename_all = "kebab-case")]
pub struct CompareDecl {
    /// Golden file path.
    pub golden: String,
    /// Stream to compare.
    pub stream: StreamDecl,
    /// Normalization options.
    #[serde(flatten)]
    pub options: CompareOptions,
}

// `deny_unknown_fields` cannot be combined with `flatten`; whatever the options do
// not consume lands in `unknown` and is rejected on conversion.
#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawCompareDecl {
    golden: String,
    #[serde(default)]
    stream: StreamDecl,
    #[serde(flatten)]
    options: CompareOptions,
    #[serde(flatten)]
    unknown: BTreeMap<String, serde_yaml::Value>,
}

impl TryFrom<RawCompareDecl> for CompareDecl {
    type Error = String;

    fn try_from(raw: RawCompareDecl) -> Result<Self, Self::Error> {
        if let Some(field) = raw.unknown.keys().next() {
            return Err(format!(
                "unknown field `{field}` in comparison, expected one of `golden`, `stream`, \
                 `exclude-lines`, `sort-lines`, `ignore-whitespace`"
            ));
        }

        Ok(Self {
            golden: raw.golden,
            stream: raw.stream,
            options: raw.options,
        })
    }
}

impl TestCaseSet {
    /// Converts the declarations into runtime test cases.
    pub fn into_cases(self) -> Result<Vec<TestCase>, LoadError> {
        let set_guard = Guard::all_features(self.requires.iter().cloned());

        self.cases
            .into_iter()
            .map(|decl| {
                let mut case = decl.to_case(&self.source_file)?;
                if let Some(guard) = &set_guard {
                    case = case.guarded_by(guard.clone());
                }
                Ok(case)
            })
            .collect()
    }
}

impl CaseDecl {
    fn to_case(&self, source_file: &Path) -> Result<TestCase, LoadError> {
        let mut case = TestCase::new(self.name.clone());

        for keyword in &self.keywords {
            case = case.keyword(keyword.clone());
        }

        if let Some(guard) = Guard::all_features(self.requires.iter().cloned()) {
            case = case.guarded_by(guard);
        }

        if let Some(secs) = self.timeout_secs {
            case = case.timeout(Duration::from_secs(secs));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let invalid = |message| LoadError::InvalidStep {
                path: source_file.to_path_buf(),
                case: self.name.clone(),
                step: index + 1,
                message,
            };

            let step = match (&step.run, &step.capture, &step.compare) {
                (Some(run), None, None) => Step::Run(run.to_invocation().map_err(invalid)?),
                (None, Some(capture), None) => {
                    Step::RunAndCapture(capture.to_invocation().map_err(invalid)?)
                }
                (None, None, Some(compare)) => Step::CompareOutput(compare.to_comparison()),
                (None, None, None) => return Err(invalid("step has no action")),
                _ => return Err(invalid("step has more than one action")),
            };

            case = case.step(step);
        }

        Ok(case)
    }
}

impl InvocationDecl {
    fn to_invocation(&self) -> Result<Invocation, &'static str> {
        let stdin = match (self.stdin, &self.stdin_file) {
            (None, None) => StepInput::None,
            (Some(StdinDecl::LastStdout), None) => StepInput::LastStdout,
            (None, Some(path)) => StepInput::File(path.clone()),
            (Some(_), Some(_)) => return Err("stdin and stdin-file are mutually exclusive"),
        };

        Ok(Invocation {
            program: self.program.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            stdin,
            expected_exit_code: self.expect_exit_code,
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }
}

impl CompareDecl {
    fn to_comparison(&self) -> GoldenComparison {
        GoldenComparison {
            source: match self.stream {
                StreamDecl::Stdout => OutputSource::LastStdout,
                StreamDecl::Stderr => OutputSource::LastStderr,
            },
            golden: self.golden.clone(),
            options: self.options.clone(),
        }
    }
}

/// Parses the case set in `path`.
pub fn load_case_set(path: &Path) -> Result<TestCaseSet, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut set: TestCaseSet =
        serde_yaml::from_str(&contents).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    set.source_file = path.to_path_buf();
    Ok(set)
}

/// Registers every case declared in `**/*.yaml` under `dir`, in path order.
///
/// Returns the number of cases registered.
pub fn register_case_dir(registry: &mut Registry, dir: &Path) -> Result<usize, LoadError> {
    // Generate a glob pattern to find all the YAML test case files.
    let glob_pattern = dir.join("**/*.yaml").to_string_lossy().to_string();
    tracing::debug!(pattern = %glob_pattern, "discovering case files");

    let mut paths = glob::glob(&glob_pattern)?.collect::<Result<Vec<_>, _>>()?;
    paths.sort();

    let mut count = 0;
    for path in paths {
        for case in load_case_set(&path)?.into_cases()? {
            registry.register(case)?;
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuntimeArguments;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
name: gtruby
cases:
  - name: "gtruby: feature_stuff bindings"
    keywords: [gt_ruby]
    timeout-secs: 30
    steps:
      - capture:
          program: ${ruby}
          args: ["${testdata}/gtruby/feature_stuff.rb", "${testdata}/gff3_file_1_short.txt"]
      - capture:
          program: sort
          stdin: last-stdout
      - compare:
          golden: gff3_file_1_short_sorted.txt
          exclude-lines: ["^##sequence-region"]
  - name: "gtruby: view bindings"
    keywords: [gt_ruby]
    requires: [libgtview]
    steps:
      - run:
          program: ${ruby}
          args: ["${testdata}/gtruby/view.rb", "test.png"]
"#;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn parses_declarations() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = write_file(dir.path(), "gtruby.yaml", SAMPLE);

        let cases = load_case_set(&path).unwrap().into_cases().unwrap();
        assert_eq!(cases.len(), 2);

        let stream = &cases[0];
        assert_eq!(stream.timeout, Some(Duration::from_secs(30)));
        assert!(stream.keywords.contains("gt_ruby"));
        assert!(stream.guard.is_none());

        let Step::RunAndCapture(sort) = &stream.steps[1] else {
            unreachable!("expected a capture step");
        };
        assert_eq!(sort.stdin, StepInput::LastStdout);

        let Step::CompareOutput(comparison) = &stream.steps[2] else {
            unreachable!("expected a compare step");
        };
        assert_eq!(
            comparison.options,
            CompareOptions::default().excluding("^##sequence-region")
        );

        let view_guard = cases[1].guard.as_ref().unwrap();
        assert_eq!(view_guard.evaluate(&RuntimeArguments::new()), Ok(false));
    }

    #[test]
    fn set_requirements_apply_to_every_case() {
        let dir = assert_fs::TempDir::new().unwrap();
        let yaml = "name: view\nrequires: [libgtview]\ncases:\n  - name: a\n    steps: []\n";
        let path = write_file(dir.path(), "view.yaml", yaml);

        let cases = load_case_set(&path).unwrap().into_cases().unwrap();
        let args = RuntimeArguments::new().with_flag("libgtview", true);
        assert_eq!(cases[0].guard.as_ref().unwrap().evaluate(&args), Ok(true));
    }

    #[test]
    fn ambiguous_step_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let yaml = r"
name: broken
cases:
  - name: two actions
    steps:
      - run: { program: 'true' }
        compare: { golden: x.txt }
";
        let path = write_file(dir.path(), "broken.yaml", yaml);

        let err = load_case_set(&path).unwrap().into_cases().unwrap_err();
        assert!(matches!(err, LoadError::InvalidStep { step: 1, .. }));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = write_file(dir.path(), "typo.yaml", "name: x\ncasez: []\n");

        assert!(matches!(
            load_case_set(&path),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn misspelled_comparison_option_is_rejected() {
        let dir = assert_fs::TempDir::new().unwrap();
        let yaml = r"
name: typo
cases:
  - name: sorted
    steps:
      - compare:
          golden: sorted.txt
          sort-line: true
";
        let path = write_file(dir.path(), "typo.yaml", yaml);

        match load_case_set(&path) {
            Err(LoadError::Parse { source, .. }) => {
                assert!(source.to_string().contains("unknown field `sort-line`"));
            }
            other => unreachable!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn comparison_options_still_parse() {
        let compare: CompareDecl = serde_yaml::from_str(
            "golden: seqids.txt\nstream: stderr\nsort-lines: true\nignore-whitespace: true\n",
        )
        .unwrap();

        assert_eq!(compare.stream, StreamDecl::Stderr);
        assert_eq!(
            compare.options,
            CompareOptions::default().sorted().ignoring_whitespace()
        );
    }

    #[test]
    fn discovers_files_in_path_order() {
        let dir = assert_fs::TempDir::new().unwrap();
        write_file(
            dir.path(),
            "b/second.yaml",
            "name: b\ncases:\n  - name: second\n    steps: []\n",
        );
        write_file(
            dir.path(),
            "a.yaml",
            "name: a\ncases:\n  - name: first\n    steps: []\n",
        );
        write_file(dir.path(), "notes.txt", "ignored");

        let mut registry = Registry::new();
        assert_eq!(register_case_dir(&mut registry, dir.path()).unwrap(), 2);

        let names: Vec<_> = registry.cases().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn duplicate_names_across_files_fail() {
        let dir = assert_fs::TempDir::new().unwrap();
        let yaml = "name: a\ncases:\n  - name: same\n    steps: []\n";
        write_file(dir.path(), "a.yaml", yaml);
        write_file(dir.path(), "b.yaml", yaml);

        let mut registry = Registry::new();
        assert!(matches!(
            register_case_dir(&mut registry, dir.path()),
            Err(LoadError::Registry(_))
        ));
    }
}
