//! Reporting utilities for test results.

use crate::config::{OutputFormat, TestOptions};
use crate::error::StepError;
use crate::execution::{CaseStatus, ExecutionResult};
use crate::runner::{PlannedCase, SuiteReport};
use crate::util::write_diff;
use anyhow::Result;
use colored::Colorize;
use std::io::Write;

const RULE: &str =
    "================================================================================";

/// Reports test results based on the configured output format.
pub fn report_results(report: &SuiteReport, options: &TestOptions) -> Result<()> {
    match options.format {
        OutputFormat::Pretty => {
            let mut stdout = std::io::stdout().lock();
            write_pretty(&mut stdout, report, options)?;
            write_summary(&mut stdout, report)
        }
        OutputFormat::Junit => {
            let mut stdout = std::io::stdout().lock();
            write_junit(&mut stdout, report, options)?;
            writeln!(stdout)?;
            Ok(())
        }
        OutputFormat::Terse => write_terse(&mut std::io::stdout().lock(), report),
    }
}

/// Writes one entry per executed case; skipped cases are included when `verbose` is set.
pub fn write_pretty<W: Write>(
    writer: &mut W,
    report: &SuiteReport,
    options: &TestOptions,
) -> Result<()> {
    for result in &report.results {
        write_details(writer, result, options)?;
    }

    Ok(())
}

/// Writes the details of one result.
pub fn write_details<W: Write>(
    writer: &mut W,
    result: &ExecutionResult,
    options: &TestOptions,
) -> Result<()> {
    if !options.verbose && matches!(result.status, CaseStatus::Skipped(_)) {
        return Ok(());
    }

    write!(
        writer,
        "* {}: [{}]... ",
        "Test case".bright_yellow(),
        result.name.italic()
    )?;

    let failure = match &result.status {
        CaseStatus::Passed => {
            writeln!(writer, "{}", "ok.".bright_green())?;
            return Ok(());
        }
        CaseStatus::Skipped(reason) => {
            writeln!(writer, "{} ({reason})", "skipped.".cyan())?;
            return Ok(());
        }
        CaseStatus::Failed(failure) => failure,
    };

    writeln!(writer, "{}", "FAILED.".bright_red())?;

    match failure.step_index {
        Some(index) => writeln!(writer, "    step {index}: {}", failure.step)?,
        None => writeln!(writer, "    {}", failure.step)?,
    }
    writeln!(writer, "    {} {}", "error:".bright_red(), failure.error)?;

    match &failure.error {
        StepError::OutputMismatch { diff, .. } => {
            for delta in &diff.deltas {
                writeln!(writer, "      {delta}")?;
            }

            writeln!(
                writer,
                "      {}",
                "------ Expected <> Actual -------------------------------------".cyan()
            )?;
            write_diff(writer, 8, &diff.expected, &diff.actual)?;
            writeln!(
                writer,
                "      {}",
                "---------------------------------------------------------------".cyan()
            )?;
        }
        StepError::ProcessFailure { stderr, .. } if !stderr.is_empty() => {
            writeln!(
                writer,
                "      {}",
                "------ stderr -------------------------------------------------".cyan()
            )?;
            writeln!(writer, "{}", indent::indent_all_by(8, stderr.trim_end()))?;
        }
        _ => (),
    }

    Ok(())
}

/// Writes the closing summary block.
pub fn write_summary<W: Write>(writer: &mut W, report: &SuiteReport) -> Result<()> {
    let failed = report.failed();
    let formatted_fail_count = if failed > 0 {
        failed.to_string().red()
    } else {
        failed.to_string().green()
    };

    let skipped = report.skipped();
    let formatted_skip_count = if skipped > 0 {
        skipped.to_string().cyan()
    } else {
        skipped.to_string().green()
    };

    writeln!(writer, "{RULE}")?;
    writeln!(
        writer,
        "{} test case(s) ran: {} succeeded, {} failed, {} skipped.",
        report.passed() + failed,
        report.passed().to_string().green(),
        formatted_fail_count,
        formatted_skip_count,
    )?;
    writeln!(
        writer,
        "duration of successful tests: {:?}",
        report.success_duration()
    )?;
    writeln!(writer, "{RULE}")?;

    Ok(())
}

/// Writes one line per case: status, declaration number and name.
pub fn write_terse<W: Write>(writer: &mut W, report: &SuiteReport) -> Result<()> {
    for result in &report.results {
        let status = match &result.status {
            CaseStatus::Passed => "ok".green(),
            CaseStatus::Failed(_) => "FAILED".bright_red(),
            CaseStatus::Skipped(_) => "skipped".cyan(),
        };
        writeln!(writer, "{status} {} {}", result.number, result.name)?;
    }

    Ok(())
}

/// Writes the results as a `JUnit` XML document.
pub fn write_junit<W: Write>(
    writer: &mut W,
    report: &SuiteReport,
    options: &TestOptions,
) -> Result<()> {
    let mut suite = junit_report::TestSuite::new("gtsuite");

    for result in &report.results {
        let mut test_case = match &result.status {
            CaseStatus::Passed => {
                junit_report::TestCase::success(&result.name, result.duration.try_into()?)
            }
            CaseStatus::Skipped(_) => junit_report::TestCase::skipped(&result.name),
            CaseStatus::Failed(failure) => junit_report::TestCase::failure(
                &result.name,
                result.duration.try_into()?,
                failure_type(&failure.error),
                &failure.error.to_string(),
            ),
        };

        let mut output_buf: Vec<u8> = vec![];
        write_details(&mut output_buf, result, options)?;

        let output_as_string = String::from_utf8(output_buf)?;
        test_case.set_system_out(strip_ansi_escapes::strip_str(output_as_string).as_str());

        suite.add_testcase(test_case);
    }

    let mut report_xml = junit_report::Report::new();
    report_xml.add_testsuite(suite);
    report_xml.write_xml(writer)?;

    Ok(())
}

const fn failure_type(error: &StepError) -> &'static str {
    match error {
        StepError::ProcessSpawn { .. } => "ProcessSpawnError",
        StepError::ProcessTimeout { .. } => "ProcessTimeoutError",
        StepError::ProcessFailure { .. } => "ProcessFailure",
        StepError::OutputMismatch { .. } => "OutputMismatch",
        StepError::GoldenFile { .. } => "GoldenFileError",
        StepError::InvalidPattern(_) => "InvalidPattern",
        StepError::UnknownVariable(_) => "UnknownVariable",
        StepError::Workspace(_) => "WorkspaceError",
        StepError::Panicked(_) => "Panic",
    }
}

/// Lists cases without running them.
pub fn write_case_list<W: Write>(writer: &mut W, planned: &[PlannedCase]) -> Result<()> {
    for entry in planned {
        let keywords = entry
            .case
            .keywords
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        write!(writer, "{:>4}: {}", entry.number, entry.case.name)?;
        if !keywords.is_empty() {
            write!(writer, " [{keywords}]")?;
        }
        match &entry.skip {
            None => writeln!(writer)?,
            Some(reason) => writeln!(writer, " ({})", reason.to_string().cyan())?,
        }
    }

    Ok(())
}
