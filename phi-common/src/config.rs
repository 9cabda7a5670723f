//! Configuration loading and resolution
//!
//! Configuration is loaded once at process start and treated as read-only
//! for the lifetime of a pipeline. Resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. Environment variable (`PHI_CONFIG`)
//! 3. Platform config file (`<config_dir>/phi/config.toml`)
//! 4. Compiled defaults

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "PHI_CONFIG";

/// Default inclusive lower edge of the Hold band
pub const DEFAULT_HOLD_THRESHOLD: f64 = 0.34;

/// Default inclusive lower edge of the Accept band
pub const DEFAULT_ACCEPT_THRESHOLD: f64 = 0.67;

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Score band thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Category weights for balance aggregation
    #[serde(default)]
    pub balance: BalanceConfig,

    /// Stage specifications, in declaration order
    #[serde(default = "default_stages")]
    pub stages: Vec<StageSpec>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            scoring: ScoringConfig::default(),
            balance: BalanceConfig::default(),
            stages: default_stages(),
        }
    }
}

impl TomlConfig {
    /// Validate the parts of the configuration that can be checked without
    /// building a pipeline (bands, category weights, individual stage specs).
    ///
    /// Graph-level checks (duplicates, unknown dependencies, cycles) happen
    /// when the orchestrator is constructed.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.balance.validate()?;
        for spec in &self.stages {
            spec.validate()?;
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Score band edges
///
/// Each edge is the inclusive lower bound of its band: a score exactly on an
/// edge belongs to the band above it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Lower edge of Hold (scores below are Reject)
    #[serde(default = "default_hold")]
    pub hold: f64,

    /// Lower edge of Accept
    #[serde(default = "default_accept")]
    pub accept: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            hold: DEFAULT_HOLD_THRESHOLD,
            accept: DEFAULT_ACCEPT_THRESHOLD,
        }
    }
}

impl ScoringConfig {
    /// Band edges must satisfy `0 <= hold <= accept <= 1`
    pub fn validate(&self) -> Result<()> {
        if !self.hold.is_finite() || !self.accept.is_finite() {
            return Err(Error::Config(format!(
                "score thresholds must be finite (hold={}, accept={})",
                self.hold, self.accept
            )));
        }
        if !(0.0..=1.0).contains(&self.hold) || !(0.0..=1.0).contains(&self.accept) {
            return Err(Error::Config(format!(
                "score thresholds must lie in [0, 1] (hold={}, accept={})",
                self.hold, self.accept
            )));
        }
        if self.hold > self.accept {
            return Err(Error::Config(format!(
                "hold threshold {} exceeds accept threshold {}",
                self.hold, self.accept
            )));
        }
        Ok(())
    }
}

/// Weights of the four balance categories
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceConfig {
    #[serde(default = "default_category_weight")]
    pub fire: f64,
    #[serde(default = "default_category_weight")]
    pub water: f64,
    #[serde(default = "default_category_weight")]
    pub air: f64,
    #[serde(default = "default_category_weight")]
    pub earth: f64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            fire: 1.0,
            water: 1.0,
            air: 1.0,
            earth: 1.0,
        }
    }
}

impl BalanceConfig {
    /// Every category weight must be finite and strictly positive
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("fire", self.fire),
            ("water", self.water),
            ("air", self.air),
            ("earth", self.earth),
        ] {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(Error::Config(format!(
                    "category '{}' weight must be > 0, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }
}

/// Specification of one pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Stage name (unique within a pipeline)
    pub name: String,

    /// Relative weight in the unified score (> 0)
    pub weight: f64,

    /// Names of stages whose results this stage consumes
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Execution bound in milliseconds (> 0)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl StageSpec {
    /// Create a stage spec with no dependencies and the default timeout
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
            depends_on: Vec::new(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Builder: add dependencies
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Per-spec checks: non-empty name, positive finite weight, positive timeout
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("stage name must not be empty".to_string()));
        }
        if !self.weight.is_finite() || self.weight <= 0.0 {
            return Err(Error::Config(format!(
                "stage '{}' weight must be > 0, got {}",
                self.name, self.weight
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(format!(
                "stage '{}' timeout_ms must be positive",
                self.name
            )));
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hold() -> f64 {
    DEFAULT_HOLD_THRESHOLD
}

fn default_accept() -> f64 {
    DEFAULT_ACCEPT_THRESHOLD
}

fn default_category_weight() -> f64 {
    1.0
}

fn default_timeout_ms() -> u64 {
    1000
}

/// Compiled default pipeline: two independent analysis stages feeding a
/// synthesis stage.
fn default_stages() -> Vec<StageSpec> {
    vec![
        StageSpec::new("perception", 1.0),
        StageSpec::new("intuition", 1.0),
        StageSpec::new("synthesis", 1.0).depends_on(["perception", "intuition"]),
    ]
}

/// Load and validate configuration from a TOML file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    debug!(path = %path.display(), stages = config.stages.len(), "Loaded TOML config");
    Ok(config)
}

/// Write configuration to a TOML file
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Platform config file location (`<config_dir>/phi/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("phi").join("config.toml"))
}

/// Resolve configuration following the priority order in the module docs
///
/// An explicit path (argument or environment) that cannot be loaded is a
/// startup fault. A missing platform file falls through to compiled defaults.
pub fn resolve_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        info!("Loading config from command-line path: {}", path.display());
        return load_toml_config(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            info!("Loading config from {}: {}", CONFIG_ENV_VAR, path);
            return load_toml_config(Path::new(&path));
        }
    }

    // Priority 3: Platform config file
    if let Some(path) = default_config_path() {
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_toml_config(&path);
        }
    }

    // Priority 4: Compiled defaults
    info!("No config file found, using compiled defaults");
    Ok(TomlConfig::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stages.len(), 3);
        assert_eq!(config.scoring.hold, 0.34);
        assert_eq!(config.scoring.accept, 0.67);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config, TomlConfig::default());
    }

    #[test]
    fn test_partial_stage_table() {
        let config: TomlConfig = toml::from_str(
            r#"
            [[stages]]
            name = "vision"
            weight = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.stages.len(), 1);
        assert!(config.stages[0].depends_on.is_empty());
        assert_eq!(config.stages[0].timeout_ms, 1000);
    }

    #[test]
    fn test_disordered_bands_rejected() {
        let scoring = ScoringConfig {
            hold: 0.8,
            accept: 0.5,
        };
        assert!(matches!(scoring.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_out_of_range_band_rejected() {
        let scoring = ScoringConfig {
            hold: -0.1,
            accept: 0.5,
        };
        assert!(scoring.validate().is_err());
    }

    #[test]
    fn test_non_positive_category_weight_rejected() {
        let balance = BalanceConfig {
            air: 0.0,
            ..Default::default()
        };
        let err = balance.validate().unwrap_err();
        assert!(err.to_string().contains("air"));
    }

    #[test]
    fn test_stage_spec_validation() {
        assert!(StageSpec::new("a", 1.0).validate().is_ok());
        assert!(StageSpec::new("a", 0.0).validate().is_err());
        assert!(StageSpec::new("a", f64::NAN).validate().is_err());
        assert!(StageSpec::new("  ", 1.0).validate().is_err());
        assert!(StageSpec::new("a", 1.0).with_timeout_ms(0).validate().is_err());
    }
}
