// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Hub Configuration Types
//
// Defines the configuration schema for a research hub process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Entry storage location and backend
// - Runtime tuning (steer buffers, batching, grace periods, retention)
// - Event relay ring buffer sizing
// - External collaborators (status endpoint, alert response directory)
// - Decision model endpoints for research agents
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "research-hub/v1";
pub const KIND: &str = "HubConfig";

/// Top-level Kubernetes-style hub configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfigManifest {
    /// API version (must be "research-hub/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "HubConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: HubConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable hub name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Hub configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfigSpec {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Decision model endpoints, referenced by name from research agent params
    #[serde(default)]
    pub models: Vec<ModelEndpointConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory holding one entry log per agent
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
            backend: StorageBackend::File,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Maximum queued steers per agent before the overflow policy applies
    #[serde(default = "default_steer_capacity")]
    pub steer_buffer_capacity: usize,

    /// Maximum mailbox messages handed to an agent in one step
    #[serde(default = "default_message_batch")]
    pub message_batch: usize,

    /// How long an idle agent sleeps before stepping again
    #[serde(default = "default_idle_tick_ms")]
    pub idle_tick_ms: u64,

    #[serde(default = "default_grace_period_secs")]
    pub default_grace_period_secs: u64,

    /// Entries retained in each agent's memory view
    #[serde(default = "default_view_capacity")]
    pub memory_view_capacity: usize,

    /// How long a terminated agent's handle is kept before reaping
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_supervisor_tick_ms")]
    pub supervisor_tick_ms: u64,
}

impl RuntimeConfig {
    pub fn idle_tick(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }

    pub fn default_grace_period(&self) -> Duration {
        Duration::from_secs(self.default_grace_period_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn supervisor_tick(&self) -> Duration {
        Duration::from_millis(self.supervisor_tick_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            steer_buffer_capacity: default_steer_capacity(),
            message_batch: default_message_batch(),
            idle_tick_ms: default_idle_tick_ms(),
            default_grace_period_secs: default_grace_period_secs(),
            memory_view_capacity: default_view_capacity(),
            retention_secs: default_retention_secs(),
            supervisor_tick_ms: default_supervisor_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Ring buffer capacity
    #[serde(default = "default_relay_capacity")]
    pub capacity: usize,

    /// Size the buffer is trimmed back to once capacity is exceeded
    #[serde(default = "default_relay_trim_to")]
    pub trim_to: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: default_relay_capacity(),
            trim_to: default_relay_trim_to(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Base URL of the job status service; status reporting is disabled when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_status_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_status_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Directory polled for `<alert_id>.response` files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_dir: Option<PathBuf>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            response_dir: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEndpointConfig {
    /// Name research agents use in their `model` param
    pub name: String,

    /// OpenAI-compatible base URL (e.g. "https://api.openai.com/v1")
    pub endpoint: String,

    /// Model identifier sent to the endpoint
    pub model: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("research-hub"))
        .unwrap_or_else(|| PathBuf::from(".research-hub"))
}

fn default_steer_capacity() -> usize {
    16
}

fn default_message_batch() -> usize {
    32
}

fn default_idle_tick_ms() -> u64 {
    250
}

fn default_grace_period_secs() -> u64 {
    10
}

fn default_view_capacity() -> usize {
    2000
}

fn default_retention_secs() -> u64 {
    300
}

fn default_supervisor_tick_ms() -> u64 {
    100
}

fn default_relay_capacity() -> usize {
    1000
}

fn default_relay_trim_to() -> usize {
    500
}

fn default_status_timeout_ms() -> u64 {
    5000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for HubConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "research-hub".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: HubConfigSpec::default(),
        }
    }
}

impl HubConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. RESEARCH_HUB_CONFIG environment variable
    /// 2. ./research-hub.yaml (working directory)
    /// 3. ~/.research-hub/config.yaml (user home)
    /// 4. /etc/research-hub/config.yaml (system, Unix) or C:\ProgramData\ResearchHub\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RESEARCH_HUB_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./research-hub.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".research-hub").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/research-hub/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\ResearchHub\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RESEARCH_HUB_STORAGE_ROOT") {
            tracing::info!("Environment override: RESEARCH_HUB_STORAGE_ROOT={}", val);
            self.spec.storage.root_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RESEARCH_HUB_STORAGE_BACKEND") {
            match val.parse::<StorageBackend>() {
                Ok(backend) => {
                    tracing::info!("Environment override: RESEARCH_HUB_STORAGE_BACKEND={}", val);
                    self.spec.storage.backend = backend;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for RESEARCH_HUB_STORAGE_BACKEND: '{}'. Expected file/memory. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("RESEARCH_HUB_STATUS_ENDPOINT") {
            tracing::info!("Environment override: RESEARCH_HUB_STATUS_ENDPOINT={}", val);
            self.spec.status.endpoint = if val.is_empty() { None } else { Some(val) };
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.storage.backend == StorageBackend::File
            && self.spec.storage.root_dir.as_os_str().is_empty()
        {
            anyhow::bail!("spec.storage.root_dir cannot be empty for the file backend");
        }

        let runtime = &self.spec.runtime;
        if runtime.steer_buffer_capacity == 0 {
            anyhow::bail!("spec.runtime.steer_buffer_capacity must be greater than 0");
        }
        if runtime.message_batch == 0 {
            anyhow::bail!("spec.runtime.message_batch must be greater than 0");
        }
        if runtime.memory_view_capacity == 0 {
            anyhow::bail!("spec.runtime.memory_view_capacity must be greater than 0");
        }
        if runtime.idle_tick_ms == 0 || runtime.supervisor_tick_ms == 0 {
            anyhow::bail!("spec.runtime tick intervals must be greater than 0");
        }

        let relay = &self.spec.relay;
        if relay.capacity == 0 {
            anyhow::bail!("spec.relay.capacity must be greater than 0");
        }
        if relay.trim_to >= relay.capacity {
            anyhow::bail!(
                "spec.relay.trim_to ({}) must be smaller than spec.relay.capacity ({})",
                relay.trim_to,
                relay.capacity
            );
        }

        if let Some(endpoint) = &self.spec.status.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("spec.status.endpoint must be an http(s) URL: {}", endpoint);
            }
        }

        let mut seen = std::collections::HashSet::new();
        for model in &self.spec.models {
            if model.name.is_empty() {
                anyhow::bail!("Model endpoint name cannot be empty");
            }
            if model.endpoint.is_empty() {
                anyhow::bail!("Model endpoint URL cannot be empty for: {}", model.name);
            }
            if model.model.is_empty() {
                anyhow::bail!("Model identifier cannot be empty for: {}", model.name);
            }
            if !seen.insert(model.name.as_str()) {
                anyhow::bail!("Duplicate model endpoint name: {}", model.name);
            }
        }

        Ok(())
    }

    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_else(|| LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            })
    }

    /// Metrics settings when the exporter is enabled.
    pub fn metrics(&self) -> Option<MetricsConfig> {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.metrics.clone())
            .filter(|m| m.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = HubConfigManifest::default();
        assert_eq!(manifest.api_version, "research-hub/v1");
        assert_eq!(manifest.kind, "HubConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.relay.capacity, 1000);
        assert_eq!(manifest.spec.relay.trim_to, 500);
        assert_eq!(manifest.spec.runtime.steer_buffer_capacity, 16);
        assert_eq!(manifest.spec.storage.backend, StorageBackend::File);
        assert!(manifest.spec.models.is_empty());
    }

    #[test]
    fn test_yaml_minimal_fills_defaults() {
        let yaml = r#"
apiVersion: research-hub/v1
kind: HubConfig
metadata:
  name: lab-hub
spec:
  storage:
    root_dir: /tmp/hub
    backend: memory
  relay:
    capacity: 200
    trim_to: 100
  models:
    - name: planner
      endpoint: http://localhost:8000/v1
      model: qwen2.5
      api_key: env:PLANNER_KEY
"#;
        let manifest = HubConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "lab-hub");
        assert_eq!(manifest.spec.storage.root_dir, PathBuf::from("/tmp/hub"));
        assert_eq!(manifest.spec.storage.backend, StorageBackend::Memory);
        assert_eq!(manifest.spec.relay.capacity, 200);
        assert_eq!(manifest.spec.runtime.message_batch, 32);
        assert_eq!(manifest.spec.models[0].timeout_secs, 60);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut manifest = HubConfigManifest::default();
        manifest.metadata.name = "test-hub".to_string();
        manifest.spec.status.endpoint = Some("http://status.local".to_string());
        manifest.spec.observability = Some(ObservabilityConfig {
            logging: Some(LoggingConfig {
                level: "debug".to_string(),
                format: "json".to_string(),
            }),
            metrics: None,
        });

        let yaml = serde_yaml::to_string(&manifest).unwrap();
        let parsed = HubConfigManifest::from_yaml_str(&yaml).unwrap();

        assert_eq!(parsed.metadata.name, "test-hub");
        assert_eq!(parsed.spec.status.endpoint.as_deref(), Some("http://status.local"));
        assert_eq!(parsed.logging().format, "json");
        assert!(parsed.metrics().is_none());
    }

    #[test]
    fn test_validation() {
        let mut manifest = HubConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "test-hub".to_string();

        manifest.spec.relay.trim_to = manifest.spec.relay.capacity;
        assert!(manifest.validate().is_err());
        manifest.spec.relay.trim_to = 500;

        manifest.spec.runtime.steer_buffer_capacity = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.runtime.steer_buffer_capacity = 16;

        manifest.spec.status.endpoint = Some("status.local".to_string());
        assert!(manifest.validate().is_err());
        manifest.spec.status.endpoint = None;

        let model = ModelEndpointConfig {
            name: "planner".to_string(),
            endpoint: "http://localhost:8000/v1".to_string(),
            model: "qwen2.5".to_string(),
            api_key: None,
            temperature: 0.2,
            timeout_secs: 30,
        };
        manifest.spec.models = vec![model.clone(), model];
        assert!(manifest.validate().is_err());
    }
}
