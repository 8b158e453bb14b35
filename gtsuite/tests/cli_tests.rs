//! Tests driving the `gtsuite` binary.

// For now, only compile this for Unix-like platforms (Linux, macOS).
#![cfg(unix)]
#![allow(clippy::panic_in_result_fn)]

use anyhow::Result;
use assert_fs::prelude::*;
use predicates::prelude::*;

const PASSING_SET: &str = r#"
name: sorting
cases:
  - name: "sort: pipeline"
    keywords: [demo]
    steps:
      - capture:
          program: printf
          args: ['b\na\n']
      - capture:
          program: sort
          stdin: last-stdout
      - compare:
          golden: sorted.txt
"#;

const FAILING_SET: &str = r#"
name: mismatch
cases:
  - name: "mismatch: changed line"
    keywords: [demo]
    steps:
      - capture:
          program: printf
          args: ['x\ny\n']
      - compare:
          golden: expected.txt
"#;

fn gtsuite() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("gtsuite"));
    cmd.arg("--no-config").arg("--color=never");
    cmd
}

fn workspace(sets: &[(&str, &str)], goldens: &[(&str, &str)]) -> Result<assert_fs::TempDir> {
    let dir = assert_fs::TempDir::new()?;
    for (name, contents) in sets {
        dir.child("cases").child(name).write_str(contents)?;
    }
    for (name, contents) in goldens {
        dir.child("testdata").child(name).write_str(contents)?;
    }
    Ok(dir)
}

fn run_in(cmd: &mut assert_cmd::Command, dir: &assert_fs::TempDir) {
    cmd.arg("--no-builtin-cases")
        .arg("--cases-dir")
        .arg(dir.child("cases").path())
        .arg("--testdata")
        .arg(dir.child("testdata").path());
}

#[test]
fn lists_builtin_cases() {
    gtsuite()
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "1: gtruby: genome_stream bindings (output stream) [gt_ruby]",
        ))
        .stdout(predicate::str::contains(
            "5: gtruby: show_seqids [gt_ruby] (requires libgtview)",
        ));
}

#[test]
fn feature_flag_enables_guarded_cases() {
    gtsuite()
        .args(["--list", "-F", "libgtview", "--exact", "gtruby: show_seqids"])
        .assert()
        .success()
        .stdout(predicate::str::contains("5: gtruby: show_seqids [gt_ruby]\n"))
        .stdout(predicate::str::contains(
            "1: gtruby: genome_stream bindings (output stream) [gt_ruby] (filtered out)",
        ));
}

#[test]
fn passing_suite_exits_zero() -> Result<()> {
    let dir = workspace(&[("sorting.yaml", PASSING_SET)], &[("sorted.txt", "a\nb\n")])?;

    let mut cmd = gtsuite();
    run_in(&mut cmd, &dir);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "1 test case(s) ran: 1 succeeded, 0 failed, 0 skipped.",
        ));

    Ok(())
}

#[test]
fn failing_suite_reports_diff_and_exits_one() -> Result<()> {
    let dir = workspace(
        &[("sorting.yaml", PASSING_SET), ("mismatch.yaml", FAILING_SET)],
        &[("sorted.txt", "a\nb\n"), ("expected.txt", "x\nz\n")],
    )?;

    let mut cmd = gtsuite();
    run_in(&mut cmd, &dir);
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains(
            "* Test case: [sort: pipeline]... ok.",
        ))
        .stdout(predicate::str::contains(
            "* Test case: [mismatch: changed line]... FAILED.",
        ))
        .stdout(predicate::str::contains("line 2: expected \"z\", got \"y\""))
        .stdout(predicate::str::contains(
            "2 test case(s) ran: 1 succeeded, 1 failed, 0 skipped.",
        ));

    Ok(())
}

#[test]
fn keyword_filter_skips_other_cases() -> Result<()> {
    let dir = workspace(&[("sorting.yaml", PASSING_SET)], &[("sorted.txt", "a\nb\n")])?;

    let mut cmd = gtsuite();
    run_in(&mut cmd, &dir);
    cmd.args(["-k", "gt_python", "--format", "terse"])
        .assert()
        .success()
        .stdout(predicate::str::diff("skipped 1 sort: pipeline\n"));

    Ok(())
}

#[test]
fn junit_output() -> Result<()> {
    let dir = workspace(&[("mismatch.yaml", FAILING_SET)], &[("expected.txt", "x\nz\n")])?;

    let mut cmd = gtsuite();
    run_in(&mut cmd, &dir);
    cmd.args(["--format", "junit"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("<testsuite"))
        .stdout(predicate::str::contains("OutputMismatch"));

    Ok(())
}

#[test]
fn update_golden_rewrites_expected_output() -> Result<()> {
    let dir = workspace(&[("mismatch.yaml", FAILING_SET)], &[("expected.txt", "stale\n")])?;

    let mut cmd = gtsuite();
    run_in(&mut cmd, &dir);
    cmd.arg("--update-golden").assert().success();

    dir.child("testdata")
        .child("expected.txt")
        .assert(predicate::str::diff("x\ny\n"));

    let mut rerun = gtsuite();
    run_in(&mut rerun, &dir);
    rerun.assert().success();

    Ok(())
}

#[test]
fn explicit_config_file_must_load() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let config = dir.child("config.toml");
    config.write_str("jobs = [broken")?;

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("gtsuite"))
        .arg("--config")
        .arg(config.path())
        .arg("--list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to parse config file"));

    Ok(())
}

#[test]
fn config_file_supplies_defaults() -> Result<()> {
    let dir = workspace(&[("sorting.yaml", PASSING_SET)], &[("sorted.txt", "a\nb\n")])?;
    let config = dir.child("config.toml");
    config.write_str(&format!(
        "testdata = {:?}\ncases-dirs = [{:?}]\njobs = 2\n",
        dir.child("testdata").path().display().to_string(),
        dir.child("cases").path().display().to_string(),
    ))?;

    assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("gtsuite"))
        .arg("--config")
        .arg(config.path())
        .arg("--no-builtin-cases")
        .args(["--format", "terse", "--color", "never"])
        .assert()
        .success()
        .stdout(predicate::str::diff("ok 1 sort: pipeline\n"));

    Ok(())
}
