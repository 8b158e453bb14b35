//! Configuration file support for `gtsuite`.
//!
//! The file is TOML. Unknown fields are ignored, and settings are layered:
//! built-in defaults < config file < command-line arguments.

use etcetera::BaseStrategy;
use gtsuite_harness::{RunnerConfig, RuntimeArguments, TestOptions};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// Test-data root used when neither the command line nor the file names one.
const DEFAULT_TESTDATA_DIR: &str = "testdata";

/// Root configuration structure.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Root directory of fixture and golden files.
    pub testdata: Option<PathBuf>,

    /// Number of cases to run concurrently.
    pub jobs: Option<usize>,

    /// Default timeout for process steps, in seconds.
    pub timeout_secs: Option<u64>,

    /// Directories of YAML case declarations, loaded before any given on the command line.
    pub cases_dirs: Vec<PathBuf>,

    /// Runtime arguments consulted by registration guards.
    pub features: BTreeMap<String, FeatureValue>,

    /// Placeholder variables.
    pub vars: BTreeMap<String, String>,

    /// Environment variables for every child process.
    pub env: BTreeMap<String, String>,
}

/// Value of a runtime argument in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// A flag.
    Flag(bool),
    /// An arbitrary value.
    Value(String),
}

impl Config {
    /// Builds the runner configuration, letting `options` override the file.
    pub fn runner_config(&self, options: &TestOptions) -> std::io::Result<RunnerConfig> {
        let testdata = options
            .testdata
            .as_ref()
            .or(self.testdata.as_ref())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TESTDATA_DIR));

        // Children run in their own working directories.
        let testdata = std::path::absolute(testdata)?;

        let mut config = RunnerConfig::new(testdata)
            .with_jobs(options.jobs.or(self.jobs).unwrap_or(1))
            .with_default_timeout(
                options
                    .timeout_secs
                    .or(self.timeout_secs)
                    .map(Duration::from_secs),
            )
            .with_update_golden(options.update_golden);

        for (name, value) in self.vars.iter().chain(options.vars.iter().map(|(k, v)| (k, v))) {
            config = config.with_var(name.clone(), value.clone());
        }

        for (name, value) in self.env.iter().chain(options.env.iter().map(|(k, v)| (k, v))) {
            config = config.with_env(name.clone(), value.clone());
        }

        Ok(config)
    }

    /// Builds the runtime arguments: host facts < file < command line.
    pub fn runtime_arguments(&self, options: &TestOptions) -> RuntimeArguments {
        let mut args = RuntimeArguments::from_host();

        for (name, value) in &self.features {
            match value {
                FeatureValue::Flag(enabled) => args.set(name.clone(), enabled.to_string()),
                FeatureValue::Value(value) => args.set(name.clone(), value.clone()),
            }
        }

        args.extend(options.runtime_arguments());
        args
    }

    /// Returns the declaration directories to load, file entries first.
    pub fn cases_dirs(&self, options: &TestOptions) -> Vec<PathBuf> {
        self.cases_dirs
            .iter()
            .chain(&options.cases_dirs)
            .cloned()
            .collect()
    }
}

/// Result of attempting to load a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration, or default if loading failed.
    pub config: Config,

    /// The path that was used (or attempted) for loading.
    pub path: Option<PathBuf>,

    /// Any error that occurred during loading.
    pub error: Option<ConfigLoadError>,

    /// Whether the path was explicitly provided by the user (via `--config`).
    /// If true and there's an error, the run should fail rather than continue.
    pub explicit_path: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the TOML content.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Returns the default configuration file path for the current platform.
pub fn default_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("gtsuite").join("config.toml"))
}

/// Loads configuration from the specified path.
pub fn load_from_path(path: &Path) -> ConfigLoadResult {
    let loaded = std::fs::read_to_string(path)
        .map_err(ConfigLoadError::from)
        .and_then(|content| toml::from_str::<Config>(&content).map_err(ConfigLoadError::from));

    let (config, error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    ConfigLoadResult {
        config,
        path: Some(path.to_path_buf()),
        error,
        explicit_path: false,
    }
}

/// Loads configuration, honoring `--no-config` and `--config`.
///
/// A missing file at the default location is not an error.
pub fn load_config(disabled: bool, explicit_path: Option<&Path>) -> ConfigLoadResult {
    let unloaded = |path| ConfigLoadResult {
        config: Config::default(),
        path,
        error: None,
        explicit_path: false,
    };

    if disabled {
        return unloaded(None);
    }

    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) if p.exists() => p,
            other => return unloaded(other),
        },
    };

    let mut result = load_from_path(&path);
    result.explicit_path = explicit_path.is_some();
    result
}
