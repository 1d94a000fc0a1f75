//! Configuration surface (spec.md §6): everything an operator sets externally to
//! shape where the server listens, how watches and simulations are bounded, and
//! which scoring strategy the generator uses. Deserialized from YAML/JSON the way
//! the teacher's `SimulationConfig` was, but re-shaped around this system's knobs.

use std::time::Duration;

use serde::Deserialize;

use crate::generator::GenerationMode;
use crate::metrics::printer::{MetricsPrinterConfig, OutputFormat};
use crate::simulation::scoring::{ScoreWeights, ScoringStrategy};

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_prefix() -> String {
    "cluster".to_string()
}

fn default_kubeconfig_path() -> String {
    "kubeconfig.yaml".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default = "default_watch_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_watch_timeout_secs")]
    pub timeout_seconds: u64,
}

fn default_watch_queue_size() -> usize {
    100
}

fn default_watch_timeout_secs() -> u64 {
    300
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            queue_size: default_watch_queue_size(),
            timeout_seconds: default_watch_timeout_secs(),
        }
    }
}

impl WatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Path to a scheduler configuration document (spec.md §6 `scheduler.configPath`).
    /// `None` means the in-process `DefaultScheduler` runs unconfigured.
    #[serde(default)]
    pub config_path: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { config_path: None }
    }
}

fn default_max_concurrent() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRuntimeConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SimulationRuntimeConfig {
    fn default() -> Self {
        Self { max_concurrent: default_max_concurrent() }
    }
}

fn default_metrics_output_file() -> std::path::PathBuf {
    std::path::PathBuf::from("metrics.json")
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_metrics_output_file")]
    pub output_file: std::path::PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            output_file: default_metrics_output_file(),
        }
    }
}

impl From<&MetricsConfig> for MetricsPrinterConfig {
    fn from(config: &MetricsConfig) -> Self {
        MetricsPrinterConfig {
            format: config.format,
            output_file: config.output_file.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ScoringConfig {
    #[serde(default = "default_strategy")]
    pub strategy: ScoringStrategy,
    #[serde(default)]
    pub weights: Option<ScoreWeights>,
}

fn default_strategy() -> ScoringStrategy {
    ScoringStrategy::LeastWaste
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            weights: None,
        }
    }
}

impl ScoringConfig {
    pub fn weights(&self) -> ScoreWeights {
        self.weights.clone().unwrap_or_default()
    }
}

fn default_generation_mode() -> GenerationModeConfig {
    GenerationModeConfig::Incremental
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GenerationModeConfig {
    Incremental,
    AllAtOnce,
}

impl From<GenerationModeConfig> for GenerationMode {
    fn from(value: GenerationModeConfig) -> Self {
        match value {
            GenerationModeConfig::Incremental => GenerationMode::Incremental,
            GenerationModeConfig::AllAtOnce => GenerationMode::AllAtOnce,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdviceConfig {
    #[serde(default = "default_generation_mode")]
    pub generation_mode: GenerationModeConfig,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self { generation_mode: default_generation_mode() }
    }
}

/// Top-level server configuration (spec.md §6 "Configuration surface"). Loaded once
/// at startup from a YAML/JSON document via [`Config::load`].
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_base_prefix")]
    pub base_prefix: String,
    #[serde(default = "default_kubeconfig_path")]
    pub kube_config_path: String,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub simulation: SimulationRuntimeConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub advice: AdviceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            base_prefix: default_base_prefix(),
            kube_config_path: default_kubeconfig_path(),
            watch: WatchConfig::default(),
            scheduler: SchedulerConfig::default(),
            simulation: SimulationRuntimeConfig::default(),
            scoring: ScoringConfig::default(),
            advice: AdviceConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, crate::errors::InitError> {
        let contents = std::fs::read_to_string(path).map_err(|e| crate::errors::InitError::ConfigLoad(e.to_string()))?;
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &str) -> Result<Self, crate::errors::InitError> {
        if path.ends_with(".json") {
            serde_json::from_str(contents).map_err(|e| crate::errors::InitError::ConfigLoad(e.to_string()))
        } else {
            serde_yaml::from_str(contents).map_err(|e| crate::errors::InitError::ConfigLoad(e.to_string()))
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.watch.queue_size, 100);
        assert_eq!(config.watch.timeout_seconds, 300);
        assert_eq!(config.base_prefix, "cluster");
        assert_eq!(config.scoring.strategy, ScoringStrategy::LeastWaste);
    }

    #[test]
    fn parses_yaml_document() {
        let yaml = r#"
bindAddress: "0.0.0.0"
port: 9090
basePrefix: "base"
kubeConfigPath: "/tmp/kc.yaml"
watch:
  queueSize: 50
  timeoutSeconds: 60
simulation:
  maxConcurrent: 2
scoring:
  strategy: least-cost
advice:
  generationMode: AllAtOnce
"#;
        let config = Config::parse(yaml, "config.yaml").unwrap();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.watch.queue_size, 50);
        assert_eq!(config.simulation.max_concurrent, 2);
        assert_eq!(config.scoring.strategy, ScoringStrategy::LeastCost);
        assert_eq!(config.advice.generation_mode, GenerationModeConfig::AllAtOnce);
    }
}
