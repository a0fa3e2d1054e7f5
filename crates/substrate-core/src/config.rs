//! Configuration loading and typed config structures for the substrate.
//!
//! The canonical configuration lives in `substrate-config.yaml` at the
//! project root. Every section is optional and falls back to the defaults
//! below, so an empty file is a valid configuration.

use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::scheduler::SchedulerConfig;

/// Environment variable overriding `scheduler.base_seed`.
pub const ENV_BASE_SEED: &str = "SUBSTRATE_BASE_SEED";

/// Environment variable overriding `scheduler.enabled`.
pub const ENV_ENABLED: &str = "SUBSTRATE_ENABLED";

/// Smallest Rule 110 width the runtime accepts.
pub const MIN_RULE110_WIDTH: u32 = 8;

/// Largest Rule 110 width the runtime accepts.
pub const MAX_RULE110_WIDTH: u32 = 4096;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level substrate configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubstrateConfig {
    /// Host-loop participation flag and base seed.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Values shared with the surrounding simulation.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Which stepper the runtime manager keeps registered.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Rule 110 runtime stepper settings.
    #[serde(default)]
    pub rule110: Rule110Config,

    /// Snapshot capture toggles.
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Observability overlay settings.
    #[serde(default)]
    pub overlay: OverlayConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SubstrateConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `SUBSTRATE_BASE_SEED` overrides `scheduler.base_seed`
    /// - `SUBSTRATE_ENABLED` overrides `scheduler.enabled`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_yaml(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the file exists but is not valid
    /// YAML, or [`ConfigError::Io`] if it exists but cannot be read.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            info!(path = %path.display(), "loading substrate config");
            Self::from_file(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_yaml(yaml)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn parse_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Override scheduler values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override scheduler values from an arbitrary variable lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_BASE_SEED) {
            match raw.trim().parse::<u32>() {
                Ok(seed) => self.scheduler.base_seed = seed,
                Err(_) => warn!(var = ENV_BASE_SEED, value = %raw, "ignoring invalid base seed"),
            }
        }
        if let Some(raw) = lookup(ENV_ENABLED) {
            match parse_flag(&raw) {
                Some(enabled) => self.scheduler.enabled = enabled,
                None => warn!(var = ENV_ENABLED, value = %raw, "ignoring invalid enabled flag"),
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Values shared with the surrounding simulation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Starting resource (chi) quantity of a fresh agent.
    #[serde(default = "default_start_chi")]
    pub start_chi: f64,
}

impl SimulationConfig {
    /// Upper bound for chi thresholds: four times the starting chi.
    pub fn max_chi_threshold(&self) -> f64 {
        self.start_chi * 4.0
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_chi: default_start_chi(),
        }
    }
}

/// Stepper kind the runtime manager drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum RuntimeMode {
    /// Keep a Rule 110 stepper registered.
    Rule110,
    /// No runtime stepper.
    #[default]
    None,
}

impl From<String> for RuntimeMode {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("rule110") {
            Self::Rule110
        } else {
            Self::None
        }
    }
}

/// Runtime selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    /// Which stepper to run.
    #[serde(default)]
    pub mode: RuntimeMode,
}

/// Rule 110 runtime stepper settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule110Config {
    /// Number of cells; clamped into `[8, 4096]` when applied.
    #[serde(default = "default_rule110_width")]
    pub width: u32,

    /// Initializer name (`ether`, `glider`, `random`).
    #[serde(default = "default_initializer")]
    pub initializer: String,

    /// Ether phase offset.
    #[serde(default)]
    pub phase: i64,

    /// Glider offset; `None` auto-centers.
    #[serde(default)]
    pub offset: Option<i64>,

    /// Seed for the random initializer.
    #[serde(default)]
    pub random_seed: u32,

    /// Live-cell density for the random initializer.
    #[serde(default = "default_random_density")]
    pub random_density: f64,

    /// Chunk key of the current cells.
    #[serde(default = "default_rule110_state_key")]
    pub state_key: String,

    /// Chunk key of the staged cells.
    #[serde(default = "default_rule110_buffer_key")]
    pub buffer_key: String,

    /// Chunk key captured snapshots are stored under.
    #[serde(default = "default_rule110_snapshot_key")]
    pub snapshot_key: String,
}

impl Rule110Config {
    /// Width clamped into the accepted range.
    pub fn clamped_width(&self) -> usize {
        let width = self.width.clamp(MIN_RULE110_WIDTH, MAX_RULE110_WIDTH);
        usize::try_from(width).unwrap_or(4096)
    }

    /// Random density clamped to `[0, 1]`; non-finite values fall back to 0.5.
    pub fn clamped_density(&self) -> f64 {
        if self.random_density.is_finite() {
            self.random_density.clamp(0.0, 1.0)
        } else {
            default_random_density()
        }
    }
}

impl Default for Rule110Config {
    fn default() -> Self {
        Self {
            width: default_rule110_width(),
            initializer: default_initializer(),
            phase: 0,
            offset: None,
            random_seed: 0,
            random_density: default_random_density(),
            state_key: default_rule110_state_key(),
            buffer_key: default_rule110_buffer_key(),
            snapshot_key: default_rule110_snapshot_key(),
        }
    }
}

/// Snapshot capture toggles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SnapshotConfig {
    /// Store the latest pre-step Rule 110 snapshot in the chunk store.
    #[serde(default)]
    pub rule110_capture: bool,
}

/// Observability overlay settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OverlayConfig {
    /// Whether snapshots are recorded at all.
    #[serde(default)]
    pub enabled: bool,

    /// Ring buffer capacity (at least 1).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: default_max_entries(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_start_chi() -> f64 {
    15.0
}

const fn default_rule110_width() -> u32 {
    256
}

fn default_initializer() -> String {
    "ether".to_owned()
}

const fn default_random_density() -> f64 {
    0.5
}

fn default_rule110_state_key() -> String {
    "tc.rule110.state".to_owned()
}

fn default_rule110_buffer_key() -> String {
    "tc.rule110.next".to_owned()
}

fn default_rule110_snapshot_key() -> String {
    "tc.rule110.snapshot".to_owned()
}

const fn default_max_entries() -> usize {
    6
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_without_env(yaml: &str) -> SubstrateConfig {
        SubstrateConfig::parse_yaml(yaml)
            .ok()
            .unwrap_or_else(SubstrateConfig::default)
    }

    #[test]
    fn default_config_is_valid() {
        let config = SubstrateConfig::default();
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.base_seed, 0);
        assert_eq!(config.runtime.mode, RuntimeMode::None);
        assert_eq!(config.rule110.width, 256);
        assert_eq!(config.rule110.state_key, "tc.rule110.state");
        assert_eq!(config.overlay.max_entries, 6);
        assert!((config.simulation.max_chi_threshold() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
scheduler:
  enabled: true
  base_seed: 99

simulation:
  start_chi: 10

runtime:
  mode: "rule110"

rule110:
  width: 64
  initializer: "glider"
  phase: 3
  offset: 12
  random_seed: 5
  random_density: 0.25
  state_key: "host.state"
  buffer_key: "host.next"
  snapshot_key: "host.snapshot"

snapshots:
  rule110_capture: true

overlay:
  enabled: true
  max_entries: 4

logging:
  level: "debug"
"#;
        let config = SubstrateConfig::parse_yaml(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_else(SubstrateConfig::default);

        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.base_seed, 99);
        assert_eq!(config.runtime.mode, RuntimeMode::Rule110);
        assert_eq!(config.rule110.width, 64);
        assert_eq!(config.rule110.initializer, "glider");
        assert_eq!(config.rule110.offset, Some(12));
        assert_eq!(config.rule110.snapshot_key, "host.snapshot");
        assert!(config.snapshots.rule110_capture);
        assert_eq!(config.overlay.max_entries, 4);
        assert_eq!(config.logging.level, "debug");
        assert!((config.simulation.max_chi_threshold() - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = parse_without_env("");
        assert_eq!(config, SubstrateConfig::default());
    }

    #[test]
    fn unknown_mode_means_none() {
        let config = parse_without_env("runtime:\n  mode: lava-lamp\n");
        assert_eq!(config.runtime.mode, RuntimeMode::None);
        let config = parse_without_env("runtime:\n  mode: RULE110\n");
        assert_eq!(config.runtime.mode, RuntimeMode::Rule110);
    }

    #[test]
    fn width_and_density_are_clamped() {
        let mut rule110 = Rule110Config {
            width: 2,
            random_density: 3.0,
            ..Rule110Config::default()
        };
        assert_eq!(rule110.clamped_width(), 8);
        assert!((rule110.clamped_density() - 1.0).abs() < f64::EPSILON);
        rule110.width = 100_000;
        rule110.random_density = f64::NAN;
        assert_eq!(rule110.clamped_width(), 4096);
        assert!((rule110.clamped_density() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn overrides_replace_scheduler_values() {
        let mut config = SubstrateConfig::default();
        config.apply_overrides(|name| match name {
            ENV_BASE_SEED => Some("1234".to_owned()),
            ENV_ENABLED => Some("yes".to_owned()),
            _ => None,
        });
        assert_eq!(config.scheduler.base_seed, 1234);
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut config = SubstrateConfig::default();
        config.apply_overrides(|name| match name {
            ENV_BASE_SEED => Some("-1".to_owned()),
            ENV_ENABLED => Some("maybe".to_owned()),
            _ => None,
        });
        assert_eq!(config.scheduler.base_seed, 0);
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let result = SubstrateConfig::parse("scheduler: [unclosed");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = Path::new("/nonexistent/substrate-config.yaml");
        let config = SubstrateConfig::load_or_default(path);
        assert!(config.is_ok());
    }
}
