//! Run configuration for qbench
//!
//! Values resolve in layers, each overriding the previous one:
//! defaults, then a JSON5 config file, then `QBENCH_*` environment variables,
//! then CLI flags. Every key remembers which layer supplied it so
//! `qbench config` can explain the resolved values.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::models::BenchMode;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "qbench.json5";

pub const DEFAULT_WARMUP_RUNS: u32 = 2;
pub const DEFAULT_MEASUREMENT_RUNS: u32 = 10;
pub const DEFAULT_CONCURRENCY: u32 = 4;
pub const DEFAULT_DURATION_SECONDS: u32 = 30;
pub const DEFAULT_GRACE_SECONDS: f64 = 5.0;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const CONCURRENCY_RANGE: RangeInclusive<u32> = 1..=16;
pub const DURATION_RANGE: RangeInclusive<u32> = 20..=60;
pub const MAX_GRACE_SECONDS: f64 = 30.0;

/// Connection settings for the backing store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("benchmark.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Fully resolved run configuration, passed explicitly into each component.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub store: StoreConfig,
    pub queries_file: PathBuf,
    pub results_dir: PathBuf,
    /// Dataset scale label (e.g. `small`), used in output file names.
    pub scale: String,
    /// Index configuration label (e.g. `no_index`), used in output file names.
    pub index_config: String,
    pub warmup_runs: u32,
    pub measurement_runs: u32,
    pub concurrency: u32,
    pub duration_seconds: u32,
    pub grace_seconds: f64,
    sources: HashMap<&'static str, ConfigSource>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            queries_file: PathBuf::from("sql/queries.sql"),
            results_dir: PathBuf::from("results/metrics"),
            scale: "small".to_string(),
            index_config: "no_index".to_string(),
            warmup_runs: DEFAULT_WARMUP_RUNS,
            measurement_runs: DEFAULT_MEASUREMENT_RUNS,
            concurrency: DEFAULT_CONCURRENCY,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            grace_seconds: DEFAULT_GRACE_SECONDS,
            sources: HashMap::new(),
        }
    }
}

/// A partial set of settings supplied by one layer.
///
/// The same shape is deserialized from the config file, parsed from the
/// environment and filled from CLI flags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigLayer {
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: Option<u64>,
    pub queries_file: Option<PathBuf>,
    pub results_dir: Option<PathBuf>,
    pub scale: Option<String>,
    pub index_config: Option<String>,
    pub warmup_runs: Option<u32>,
    pub measurement_runs: Option<u32>,
    pub concurrency: Option<u32>,
    pub duration_seconds: Option<u32>,
    pub grace_seconds: Option<f64>,
}

impl ConfigLayer {
    /// Read a JSON5 config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        json5::from_str(&text).map_err(|e| Error::ConfigFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Collect `QBENCH_*` values through `lookup`.
    ///
    /// Empty values are treated as unset. Unparseable numbers are
    /// configuration errors naming the variable.
    pub fn from_env_with(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            database_path: get("QBENCH_DATABASE_PATH").map(PathBuf::from),
            busy_timeout_ms: parse_env(&get, "QBENCH_BUSY_TIMEOUT_MS", "busy_timeout_ms")?,
            queries_file: get("QBENCH_QUERIES_FILE").map(PathBuf::from),
            results_dir: get("QBENCH_RESULTS_DIR").map(PathBuf::from),
            scale: get("QBENCH_SCALE"),
            index_config: get("QBENCH_INDEX_CONFIG"),
            warmup_runs: parse_env(&get, "QBENCH_WARMUP_RUNS", "warmup_runs")?,
            measurement_runs: parse_env(&get, "QBENCH_MEASUREMENT_RUNS", "measurement_runs")?,
            concurrency: parse_env(&get, "QBENCH_CONCURRENCY", "concurrency")?,
            duration_seconds: parse_env(&get, "QBENCH_DURATION_SECONDS", "duration_seconds")?,
            grace_seconds: parse_env(&get, "QBENCH_GRACE_SECONDS", "grace_seconds")?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(
    get: &dyn Fn(&str) -> Option<String>,
    key: &str,
    field: &'static str,
) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(field, format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}

impl RunConfig {
    /// Resolve defaults, config file and process environment.
    ///
    /// An explicit `config_path` must exist; the implicit `qbench.json5` is
    /// optional. CLI overrides are applied afterwards with [`Self::apply_layer`].
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_with(config_path, &|key| std::env::var(key).ok())
    }

    /// Like [`Self::load`] with an injectable environment lookup.
    pub fn load_with(
        config_path: Option<&Path>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = Self::default();

        let file = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let implicit = PathBuf::from(DEFAULT_CONFIG_FILE);
                implicit.is_file().then_some(implicit)
            }
        };
        if let Some(path) = file {
            let layer = ConfigLayer::from_file(&path)?;
            config.apply_layer(&layer, ConfigSource::ConfigFile);
            tracing::debug!(path = %path.display(), "applied config file");
        }

        let env_layer = ConfigLayer::from_env_with(env)?;
        config.apply_layer(&env_layer, ConfigSource::ProcessEnv);
        Ok(config)
    }

    /// Overlay every value present in `layer`, recording `source` for it.
    pub fn apply_layer(&mut self, layer: &ConfigLayer, source: ConfigSource) {
        let sources = &mut self.sources;
        macro_rules! overlay {
            ($key:literal, $field:expr, $value:expr) => {
                if let Some(v) = $value.clone() {
                    $field = v;
                    sources.insert($key, source);
                }
            };
        }
        overlay!("database_path", self.store.database_path, layer.database_path);
        overlay!("busy_timeout_ms", self.store.busy_timeout_ms, layer.busy_timeout_ms);
        overlay!("queries_file", self.queries_file, layer.queries_file);
        overlay!("results_dir", self.results_dir, layer.results_dir);
        overlay!("scale", self.scale, layer.scale);
        overlay!("index_config", self.index_config, layer.index_config);
        overlay!("warmup_runs", self.warmup_runs, layer.warmup_runs);
        overlay!("measurement_runs", self.measurement_runs, layer.measurement_runs);
        overlay!("concurrency", self.concurrency, layer.concurrency);
        overlay!("duration_seconds", self.duration_seconds, layer.duration_seconds);
        overlay!("grace_seconds", self.grace_seconds, layer.grace_seconds);
    }

    /// Where `key` was resolved from.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.sources
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_secs_f64(self.grace_seconds)
    }

    /// Check every range and label, whichever mode ends up running.
    pub fn validate(&self) -> Result<()> {
        self.validate_for(BenchMode::Latency)?;
        self.validate_for(BenchMode::Throughput)
    }

    /// Check the settings `mode` reads before any benchmark work starts.
    ///
    /// Throughput-only values are not checked for a latency pass and vice
    /// versa.
    pub fn validate_for(&self, mode: BenchMode) -> Result<()> {
        validate_label("scale", &self.scale)?;
        validate_label("index_config", &self.index_config)?;
        if self.store.database_path.as_os_str().is_empty() {
            return Err(Error::config("database_path", "must not be empty"));
        }
        match mode {
            BenchMode::Latency => {
                if self.measurement_runs == 0 {
                    return Err(Error::config(
                        "measurement_runs",
                        "must be at least 1",
                    ));
                }
            }
            BenchMode::Throughput => {
                validate_concurrency(self.concurrency)?;
                validate_duration(self.duration_seconds)?;
                validate_grace(self.grace_seconds)?;
            }
        }
        Ok(())
    }

    /// Build a summary showing resolved values and their sources.
    #[must_use]
    pub fn bootstrap_summary(&self) -> BootstrapSummary {
        let line = |key: &'static str, value: String| BootstrapLine {
            key,
            value,
            source: self.source_of(key),
        };
        BootstrapSummary {
            lines: vec![
                line(
                    "database_path",
                    self.store.database_path.display().to_string(),
                ),
                line("busy_timeout_ms", self.store.busy_timeout_ms.to_string()),
                line("queries_file", self.queries_file.display().to_string()),
                line("results_dir", self.results_dir.display().to_string()),
                line("scale", self.scale.clone()),
                line("index_config", self.index_config.clone()),
                line("warmup_runs", self.warmup_runs.to_string()),
                line("measurement_runs", self.measurement_runs.to_string()),
                line("concurrency", self.concurrency.to_string()),
                line("duration_seconds", self.duration_seconds.to_string()),
                line("grace_seconds", self.grace_seconds.to_string()),
            ],
        }
    }
}

pub fn validate_concurrency(concurrency: u32) -> Result<()> {
    if CONCURRENCY_RANGE.contains(&concurrency) {
        Ok(())
    } else {
        Err(Error::config(
            "concurrency",
            format!(
                "{concurrency} is outside {}..={}",
                CONCURRENCY_RANGE.start(),
                CONCURRENCY_RANGE.end()
            ),
        ))
    }
}

pub fn validate_duration(duration_seconds: u32) -> Result<()> {
    if DURATION_RANGE.contains(&duration_seconds) {
        Ok(())
    } else {
        Err(Error::config(
            "duration_seconds",
            format!(
                "{duration_seconds}s is outside {}..={}s",
                DURATION_RANGE.start(),
                DURATION_RANGE.end()
            ),
        ))
    }
}

pub fn validate_grace(grace_seconds: f64) -> Result<()> {
    if grace_seconds.is_finite() && grace_seconds > 0.0 && grace_seconds <= MAX_GRACE_SECONDS {
        Ok(())
    } else {
        Err(Error::config(
            "grace_seconds",
            format!("{grace_seconds} must be in (0, {MAX_GRACE_SECONDS}]"),
        ))
    }
}

// Labels end up in file names.
fn validate_label(field: &'static str, value: &str) -> Result<()> {
    let ok = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(Error::config(
            field,
            format!("{value:?} must be non-empty and use only [A-Za-z0-9_.-]"),
        ))
    }
}

/// Where a configuration value was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// JSON5 config file.
    ConfigFile,
    /// Process environment variable.
    ProcessEnv,
    /// CLI argument override.
    CliArg,
    /// Hardcoded default.
    Default,
}

impl ConfigSource {
    /// Short label for terminal display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ConfigFile => "file",
            Self::ProcessEnv => "env",
            Self::CliArg => "cli",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One line in the bootstrap summary.
#[derive(Debug, Clone)]
pub struct BootstrapLine {
    pub key: &'static str,
    pub value: String,
    pub source: ConfigSource,
}

/// Resolved configuration with per-key sources.
#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    pub lines: Vec<BootstrapLine>,
}

impl BootstrapSummary {
    /// Format as a compact tree for terminal display.
    #[must_use]
    pub fn format(&self) -> String {
        use std::fmt::Write;
        let width = self.lines.iter().map(|l| l.key.len() + 1).max().unwrap_or(0);
        let mut out = String::new();
        let _ = writeln!(out, "  qbench: resolved configuration");
        let last_idx = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let connector = if i == last_idx {
                "\u{2514}\u{2500}"
            } else {
                "\u{251c}\u{2500}"
            };
            let _ = writeln!(
                out,
                "  {connector} {:<width$} {} ({})",
                format!("{}:", line.key),
                line.value,
                line.source.label(),
            );
        }
        out
    }
}
