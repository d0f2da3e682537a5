use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::Level;

const DEFAULT_REPLICATIONS: usize = 100;
const DEFAULT_OUTPUT_DIR: &str = "output";
const NAME_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root experiment configuration loaded from YAML.
///
/// Every axis is a list of candidate values; the experiment runs the full
/// cartesian product of them. A singleton list means that axis is not swept.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExperimentConfig {
    /// Prefix of every output file; a UTC timestamp when left empty.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_replications")]
    pub replications: usize,
    #[serde(default)]
    pub rng: RngConfig,
    #[serde(default)]
    pub axes: AxesConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            replications: DEFAULT_REPLICATIONS,
            rng: RngConfig::default(),
            axes: AxesConfig::default(),
            outputs: OutputsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: ExperimentConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O. An empty name is
    /// replaced by the current timestamp.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            self.name = timestamp_name()?;
        }
        validate_name(&self.name)?;
        if self.replications == 0 {
            return Err(ValidationError::InvalidField {
                field: "replications".to_string(),
                message: "at least one replication is required".to_string(),
            });
        }
        self.axes.validate()?;
        self.outputs.validate()?;
        self.logging.normalize();
        Ok(())
    }

    /// Output paths derived from the output directory and experiment name.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        let dir = PathBuf::from(&self.outputs.dir);
        let file = |suffix: &str| dir.join(format!("{}-{suffix}", self.name));
        ResolvedOutputs {
            data: file("data.csv"),
            summary: file("summary.csv"),
            log: file("log.txt"),
            manifest: file("manifest.json"),
            timeseries: self.outputs.timeseries.then(|| file("timeseries.csv")),
            report: self.outputs.report.then(|| file("report.md")),
        }
    }
}

fn default_replications() -> usize {
    DEFAULT_REPLICATIONS
}

fn timestamp_name() -> Result<String, ValidationError> {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year][month][day]-[hour][minute][second]"
        ))
        .map_err(|err| ValidationError::InvalidField {
            field: "name".to_string(),
            message: format!("failed to derive a timestamp name: {err}"),
        })
}

/// Random stream configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RngConfig {
    /// Seed of the experiment stream; drawn at random (and recorded) when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub mode: RngMode,
}

/// How replications consume randomness.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RngMode {
    /// One sequential stream shared by every replication, in sweep order.
    #[default]
    Shared,
    /// The experiment stream only hands out one seed per replication; each
    /// replication owns an independent generator.
    PerReplication,
}

/// Candidate values for every swept parameter.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AxesConfig {
    #[serde(default = "default_arms")]
    pub arms: Vec<usize>,
    #[serde(default = "default_turns")]
    pub turns: Vec<usize>,
    #[serde(default = "default_payoff")]
    pub payoff: Vec<PayoffSpec>,
    #[serde(default = "default_turbulence_model")]
    pub turbulence_model: Vec<TurbulenceSpec>,
    #[serde(default = "default_policy")]
    pub policy: Vec<PolicySpec>,
    #[serde(default = "default_belief")]
    pub belief: Vec<BeliefSpec>,
    #[serde(default = "default_turbulence")]
    pub turbulence: Vec<f64>,
    #[serde(default = "default_strategy")]
    pub strategy: Vec<f64>,
    #[serde(default = "default_latency")]
    pub latency: Vec<usize>,
    #[serde(default = "default_memory")]
    pub memory: Vec<usize>,
    /// Free-learning turns; each condition uses its own latency when absent.
    #[serde(default)]
    pub initial_learning: Option<Vec<usize>>,
}

impl Default for AxesConfig {
    fn default() -> Self {
        Self {
            arms: default_arms(),
            turns: default_turns(),
            payoff: default_payoff(),
            turbulence_model: default_turbulence_model(),
            policy: default_policy(),
            belief: default_belief(),
            turbulence: default_turbulence(),
            strategy: default_strategy(),
            latency: default_latency(),
            memory: default_memory(),
            initial_learning: None,
        }
    }
}

impl AxesConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        non_empty("axes.arms", &self.arms)?;
        non_empty("axes.turns", &self.turns)?;
        non_empty("axes.payoff", &self.payoff)?;
        non_empty("axes.turbulence_model", &self.turbulence_model)?;
        non_empty("axes.policy", &self.policy)?;
        non_empty("axes.belief", &self.belief)?;
        non_empty("axes.turbulence", &self.turbulence)?;
        non_empty("axes.strategy", &self.strategy)?;
        non_empty("axes.latency", &self.latency)?;
        non_empty("axes.memory", &self.memory)?;
        if let Some(initial_learning) = &self.initial_learning {
            non_empty("axes.initial_learning", initial_learning)?;
        }

        if self.arms.contains(&0) {
            return Err(ValidationError::InvalidField {
                field: "axes.arms".to_string(),
                message: "arm counts must be greater than zero".to_string(),
            });
        }
        if self.turns.contains(&0) {
            return Err(ValidationError::InvalidField {
                field: "axes.turns".to_string(),
                message: "turn counts must be greater than zero".to_string(),
            });
        }
        if let Some(rate) = self
            .turbulence
            .iter()
            .find(|rate| !(rate.is_finite() && (0.0..=1.0).contains(*rate)))
        {
            return Err(ValidationError::InvalidField {
                field: "axes.turbulence".to_string(),
                message: format!("turbulence rate {rate} is not a probability"),
            });
        }
        if let Some(value) = self.strategy.iter().find(|value| !value.is_finite()) {
            return Err(ValidationError::InvalidField {
                field: "axes.strategy".to_string(),
                message: format!("strategy parameter {value} is not finite"),
            });
        }
        Ok(())
    }

    /// Number of conditions in the full cartesian product.
    pub fn condition_count(&self) -> usize {
        self.arms.len()
            * self.turns.len()
            * self.payoff.len()
            * self.turbulence_model.len()
            * self.policy.len()
            * self.belief.len()
            * self.turbulence.len()
            * self.strategy.len()
            * self.latency.len()
            * self.memory.len()
            * self.initial_learning.as_ref().map_or(1, Vec::len)
    }
}

fn non_empty<T>(field: &str, values: &[T]) -> Result<(), ValidationError> {
    if values.is_empty() {
        return Err(ValidationError::InvalidField {
            field: field.to_string(),
            message: "at least one value is required".to_string(),
        });
    }
    Ok(())
}

fn default_arms() -> Vec<usize> {
    vec![10]
}

fn default_turns() -> Vec<usize> {
    vec![500]
}

fn default_payoff() -> Vec<PayoffSpec> {
    vec![PayoffSpec::Beta {
        alpha: default_beta_shape(),
        beta: default_beta_shape(),
    }]
}

fn default_turbulence_model() -> Vec<TurbulenceSpec> {
    vec![TurbulenceSpec::RandomShock {
        redraw_probability: default_redraw_probability(),
    }]
}

fn default_policy() -> Vec<PolicySpec> {
    vec![PolicySpec::Softmax]
}

fn default_belief() -> Vec<BeliefSpec> {
    vec![BeliefSpec::Windowed]
}

fn default_turbulence() -> Vec<f64> {
    vec![0.0]
}

fn default_strategy() -> Vec<f64> {
    vec![0.5]
}

fn default_latency() -> Vec<usize> {
    vec![0]
}

fn default_memory() -> Vec<usize> {
    vec![500]
}

/// Payoff distribution an arm's probability is drawn from.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayoffSpec {
    Beta {
        #[serde(default = "default_beta_shape")]
        alpha: f64,
        #[serde(default = "default_beta_shape")]
        beta: f64,
    },
    Uniform {
        #[serde(default)]
        low: f64,
        #[serde(default = "default_uniform_high")]
        high: f64,
    },
}

fn default_beta_shape() -> f64 {
    2.0
}

fn default_uniform_high() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurbulenceSpec {
    RandomShock {
        #[serde(default = "default_redraw_probability")]
        redraw_probability: f64,
    },
}

fn default_redraw_probability() -> f64 {
    0.5
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySpec {
    Softmax,
    EpsilonGreedy,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BeliefSpec {
    Windowed,
    Cumulative,
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OutputsConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Write the per-replication metric series table.
    #[serde(default)]
    pub timeseries: bool,
    /// Write the Markdown report with confidence intervals.
    #[serde(default = "default_true")]
    pub report: bool,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            timeseries: false,
            report: true,
        }
    }
}

impl OutputsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.dir.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "outputs.dir".to_string(),
                message: "path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn default_output_dir() -> String {
    DEFAULT_OUTPUT_DIR.to_string()
}

fn default_true() -> bool {
    true
}

/// Narration log configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Mirror the narration to standard output.
    #[serde(default = "default_true")]
    pub echo: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            echo: true,
            tracing_level: default_tracing_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if !name.chars().all(|c| NAME_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "name".to_string(),
            message: "name may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }
    Ok(())
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub data: PathBuf,
    pub summary: PathBuf,
    pub log: PathBuf,
    pub manifest: PathBuf,
    pub timeseries: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
