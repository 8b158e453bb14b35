//! Command-line driver for the genome toolkit binding test suites.

mod config;
mod events;
mod gtruby;

use anyhow::Context;
use clap::Parser;
use gtsuite_harness::{
    LogLevel, Registry, Selection, SuiteRunner, TestOptions, plan, register_case_dir, reporting,
};

/// Main entry point for `gtsuite`.
fn main() {
    //
    // Set up panic handler. On release builds, it will capture panic details to a
    // temporary .toml file and report a human-readable message to the screen.
    //
    human_panic::setup_panic!(human_panic::Metadata::new(
        env!("CARGO_BIN_NAME"),
        env!("CARGO_PKG_VERSION")
    ));

    let options = TestOptions::parse();

    events::init(options.log_level.unwrap_or(if options.verbose {
        LogLevel::Info
    } else {
        LogLevel::Warn
    }));

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")
        .and_then(|runtime| runtime.block_on(run(options)));

    let exit_code = match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("error: {:#}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Runs the selected suites. Returns the exit code.
async fn run(options: TestOptions) -> anyhow::Result<i32> {
    match options.color {
        clap::ColorChoice::Always => colored::control::set_override(true),
        clap::ColorChoice::Never => colored::control::set_override(false),
        clap::ColorChoice::Auto => (),
    }

    let loaded = config::load_config(options.no_config, options.config_path.as_deref());
    if let Some(error) = loaded.error {
        let path = loaded.path.unwrap_or_default();
        if loaded.explicit_path {
            return Err(error).with_context(|| format!("loading {}", path.display()));
        }
        tracing::warn!("ignoring config file {}: {error}", path.display());
    }
    let file_config = loaded.config;

    let mut registry = Registry::new();
    if !options.no_builtin_cases {
        gtruby::register(&mut registry)?;
    }

    for dir in file_config.cases_dirs(&options) {
        let count = register_case_dir(&mut registry, &dir)
            .with_context(|| format!("loading cases from {}", dir.display()))?;
        tracing::info!("registered {count} case(s) from {}", dir.display());
    }

    let args = file_config.runtime_arguments(&options);
    let selection = Selection::from_options(&options);

    if options.list_tests_only {
        let planned = plan(&registry, &args, &selection);
        reporting::write_case_list(&mut std::io::stdout().lock(), &planned)?;
        return Ok(0);
    }

    let runner_config = file_config
        .runner_config(&options)
        .context("resolving test-data directory")?;
    tracing::info!(
        testdata = %runner_config.testdata_dir.display(),
        jobs = runner_config.jobs,
        "running {} registered case(s)",
        registry.len()
    );

    let report = SuiteRunner::new(runner_config)
        .run(&registry, &args, &selection)
        .await?;

    reporting::report_results(&report, &options)?;

    Ok(report.exit_code())
}
