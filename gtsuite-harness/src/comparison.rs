//! Comparison of actual output against golden content.

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt::Display};

/// Options controlling how output is normalized before it is compared.
///
/// Every option is applied identically to the actual and the expected stream.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompareOptions {
    /// Regular expressions; lines matching any of them are dropped.
    pub exclude_lines: Vec<String>,
    /// Compare lines as a multiset, in byte order.
    pub sort_lines: bool,
    /// Collapse runs of whitespace to a single space.
    pub ignore_whitespace: bool,
}

impl CompareOptions {
    /// Adds a line-exclusion pattern.
    #[must_use]
    pub fn excluding(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_lines.push(pattern.into());
        self
    }

    /// Enables line-multiset comparison.
    #[must_use]
    pub fn sorted(mut self) -> Self {
        self.sort_lines = true;
        self
    }

    /// Enables whitespace-insensitive comparison.
    #[must_use]
    pub fn ignoring_whitespace(mut self) -> Self {
        self.ignore_whitespace = true;
        self
    }
}

/// A single difference between expected and actual output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delta {
    /// A line present on both sides with different content.
    Changed {
        /// 1-based line number in the expected output.
        line: usize,
        /// Expected content.
        expected: String,
        /// Actual content.
        actual: String,
    },
    /// A line of the expected output with no counterpart in the actual output.
    Missing {
        /// 1-based line number in the expected output.
        line: usize,
        /// Expected content.
        expected: String,
    },
    /// A line of the actual output with no counterpart in the expected output.
    Unexpected {
        /// 1-based line number in the actual output.
        line: usize,
        /// Actual content.
        actual: String,
    },
    /// The streams differ in a way invisible to a line diff (e.g. a trailing newline).
    ByteMismatch {
        /// Offset of the first differing byte.
        offset: usize,
    },
}

impl Display for Delta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Changed {
                line,
                expected,
                actual,
            } => write!(f, "line {line}: expected {expected:?}, got {actual:?}"),
            Self::Missing { line, expected } => {
                write!(f, "line {line}: missing {expected:?}")
            }
            Self::Unexpected { line, actual } => {
                write!(f, "line {line}: unexpected {actual:?}")
            }
            Self::ByteMismatch { offset } => write!(f, "bytes differ at offset {offset}"),
        }
    }
}

/// Structured description of how two streams differ.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diff {
    /// The individual differences, in stream order.
    pub deltas: Vec<Delta>,
    /// Normalized expected output, for rendering.
    pub expected: String,
    /// Normalized actual output, for rendering.
    pub actual: String,
}

/// Outcome of a comparison.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffResult {
    /// The streams are equivalent.
    Identical,
    /// The streams differ.
    Different(Diff),
}

impl DiffResult {
    /// Returns whether the streams were equivalent.
    pub const fn is_identical(&self) -> bool {
        matches!(self, Self::Identical)
    }
}

/// Compares byte streams under a fixed set of [`CompareOptions`].
#[derive(Clone, Debug)]
pub struct Comparator {
    exclude: Vec<regex::bytes::Regex>,
    whitespace: Option<regex::bytes::Regex>,
    sort_lines: bool,
}

impl Comparator {
    /// Builds a comparator, compiling any patterns in `options`.
    pub fn new(options: &CompareOptions) -> Result<Self, regex::Error> {
        let exclude = options
            .exclude_lines
            .iter()
            .map(|p| regex::bytes::Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let whitespace = if options.ignore_whitespace {
            Some(regex::bytes::Regex::new(r"\s+")?)
        } else {
            None
        };

        Ok(Self {
            exclude,
            whitespace,
            sort_lines: options.sort_lines,
        })
    }

    /// Builds a comparator that requires byte-for-byte equality.
    pub fn exact() -> Self {
        Self {
            exclude: vec![],
            whitespace: None,
            sort_lines: false,
        }
    }

    /// Compares `actual` against `expected`.
    pub fn compare(&self, actual: &[u8], expected: &[u8]) -> DiffResult {
        let actual = self.normalize(actual);
        let expected = self.normalize(expected);

        if actual == expected {
            return DiffResult::Identical;
        }

        let expected_text = String::from_utf8_lossy(&expected).into_owned();
        let actual_text = String::from_utf8_lossy(&actual).into_owned();

        let mut deltas = line_deltas(&expected_text, &actual_text);
        if deltas.is_empty() {
            deltas.push(Delta::ByteMismatch {
                offset: first_difference(&expected, &actual),
            });
        }

        DiffResult::Different(Diff {
            deltas,
            expected: expected_text,
            actual: actual_text,
        })
    }

    fn normalize<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        if self.exclude.is_empty() && !self.sort_lines && self.whitespace.is_none() {
            return Cow::Borrowed(input);
        }

        let mut lines: Vec<&[u8]> = input.split_inclusive(|b| *b == b'\n').collect();

        if !self.exclude.is_empty() {
            lines.retain(|line| {
                let content = strip_newline(line);
                !self.exclude.iter().any(|re| re.is_match(content))
            });
        }

        let mut normalized = Vec::with_capacity(input.len());
        if self.sort_lines {
            lines.sort_by(|a, b| strip_newline(a).cmp(strip_newline(b)));
            for line in lines {
                normalized.extend_from_slice(strip_newline(line));
                normalized.push(b'\n');
            }
        } else {
            for line in lines {
                normalized.extend_from_slice(line);
            }
        }

        if let Some(whitespace) = &self.whitespace {
            normalized = whitespace.replace_all(&normalized, &b" "[..]).into_owned();
        }

        Cow::Owned(normalized)
    }
}

fn strip_newline(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

fn first_difference(left: &[u8], right: &[u8]) -> usize {
    left.iter()
        .zip(right)
        .position(|(l, r)| l != r)
        .unwrap_or_else(|| left.len().min(right.len()))
}

// Lines are split as `str::lines` does, so a final newline never shows up as an
// extra empty line; such differences fall through to a byte comparison.
fn line_deltas(expected: &str, actual: &str) -> Vec<Delta> {
    let expected_lines: Vec<&str> = expected.lines().collect();
    let actual_lines: Vec<&str> = actual.lines().collect();

    let mut deltas = vec![];
    let mut removed = vec![];
    let mut added = vec![];
    let mut expected_line = 0;
    let mut actual_line = 0;

    for d in diff::slice(&expected_lines, &actual_lines) {
        match d {
            diff::Result::Left(l) => {
                expected_line += 1;
                removed.push((expected_line, *l));
            }
            diff::Result::Right(r) => {
                actual_line += 1;
                added.push((actual_line, *r));
            }
            diff::Result::Both(_, _) => {
                flush_hunk(&mut deltas, &mut removed, &mut added);
                expected_line += 1;
                actual_line += 1;
            }
        }
    }

    flush_hunk(&mut deltas, &mut removed, &mut added);

    deltas
}

// Pairs up the removed and added lines of one hunk; leftovers on either side are
// reported as missing or unexpected.
fn flush_hunk(
    deltas: &mut Vec<Delta>,
    removed: &mut Vec<(usize, &str)>,
    added: &mut Vec<(usize, &str)>,
) {
    let mut removed_lines = removed.drain(..);
    let mut added_lines = added.drain(..);

    loop {
        let delta = match (removed_lines.next(), added_lines.next()) {
            (Some((line, expected)), Some((_, actual))) => Delta::Changed {
                line,
                expected: expected.to_owned(),
                actual: actual.to_owned(),
            },
            (Some((line, expected)), None) => Delta::Missing {
                line,
                expected: expected.to_owned(),
            },
            (None, Some((line, actual))) => Delta::Unexpected {
                line,
                actual: actual.to_owned(),
            },
            (None, None) => break,
        };

        deltas.push(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn deltas(result: DiffResult) -> Vec<Delta> {
        match result {
            DiffResult::Identical => vec![],
            DiffResult::Different(diff) => diff.deltas,
        }
    }

    #[test]
    fn identical_inputs_compare_identical() {
        let inputs: [&[u8]; 5] = [b"", b"\n", b"a\nb\n", b"no newline", &[0xff, 0x00, b'\n']];
        let comparators = [
            Comparator::exact(),
            Comparator::new(&CompareOptions::default().sorted()).unwrap(),
            Comparator::new(&CompareOptions::default().excluding("^#")).unwrap(),
            Comparator::new(&CompareOptions::default().ignoring_whitespace()).unwrap(),
        ];

        for comparator in &comparators {
            for input in inputs {
                assert!(comparator.compare(input, input).is_identical());
            }
        }
    }

    #[test]
    fn changed_line_is_reported_with_its_number() {
        let result = Comparator::exact().compare(b"x\ny", b"x\nz");

        assert_eq!(
            deltas(result),
            vec![Delta::Changed {
                line: 2,
                expected: "z".into(),
                actual: "y".into(),
            }]
        );
    }

    #[test]
    fn missing_and_unexpected_lines() {
        let missing = Comparator::exact().compare(b"a\nc\n", b"a\nb\nc\n");
        assert_eq!(
            deltas(missing),
            vec![Delta::Missing {
                line: 2,
                expected: "b".into(),
            }]
        );

        let unexpected = Comparator::exact().compare(b"a\nb\nc\nd\n", b"a\nb\nc\n");
        assert_eq!(
            deltas(unexpected),
            vec![Delta::Unexpected {
                line: 4,
                actual: "d".into(),
            }]
        );
    }

    #[test]
    fn trailing_newline_is_a_byte_mismatch() {
        let result = Comparator::exact().compare(b"a\nb", b"a\nb\n");
        assert_eq!(deltas(result), vec![Delta::ByteMismatch { offset: 3 }]);
    }

    #[test]
    fn missing_final_newline_on_either_side() {
        let result = Comparator::exact().compare(b"a\nb\n", b"a\nb");
        assert_eq!(deltas(result), vec![Delta::ByteMismatch { offset: 3 }]);

        let result = Comparator::exact().compare(b"a\nb\nc\n", b"a\nb\n");
        assert_eq!(
            deltas(result),
            vec![Delta::Unexpected {
                line: 3,
                actual: "c".into(),
            }]
        );
    }

    #[test]
    fn excluded_lines_are_ignored_on_both_sides() {
        let comparator =
            Comparator::new(&CompareOptions::default().excluding("^##sequence-region")).unwrap();

        let expected = b"##gff-version 3\n##sequence-region ctg123 1 1497228\nctg123\tgene\n";
        let actual = b"##gff-version 3\nctg123\tgene\n";

        assert!(comparator.compare(actual, expected).is_identical());
        assert!(!Comparator::exact().compare(actual, expected).is_identical());
    }

    #[test]
    fn sorted_comparison_is_order_insensitive() {
        let comparator = Comparator::new(&CompareOptions::default().sorted()).unwrap();

        assert!(comparator.compare(b"b\na\nc", b"a\nb\nc\n").is_identical());
        assert!(!comparator.compare(b"b\na\n", b"a\nb\nb\n").is_identical());
    }

    #[test]
    fn whitespace_runs_collapse() {
        let comparator =
            Comparator::new(&CompareOptions::default().ignoring_whitespace()).unwrap();
        assert!(comparator.compare(b"a  b\tc\n", b"a b c\n").is_identical());
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(Comparator::new(&CompareOptions::default().excluding("(")).is_err());
    }
}
