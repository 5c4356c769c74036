use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tools::mock::MockProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthdeskConfig {
    pub gateway: GatewayConfig,
    pub limits: LimitsConfig,
    pub engine: EngineConfig,
    pub collectors: CollectorsConfig,
    pub threads: ThreadsConfig,
}

impl HealthdeskConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HealthdeskConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_steps == 0 {
            return Err(ConfigError::Invalid("limits.max_steps must be positive".into()));
        }
        if self.limits.max_history < 2 {
            return Err(ConfigError::Invalid(
                "limits.max_history must allow at least one turn".into(),
            ));
        }
        if self.limits.engine_timeout_secs == 0 || self.limits.collector_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8822)),
        }
    }
}

/// Per-session bounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Streaming turns allowed per connection.
    pub max_steps: u32,
    /// Messages allowed on a diagnostic thread.
    pub max_history: usize,
    pub engine_timeout_secs: u64,
    pub collector_timeout_secs: u64,
}

impl LimitsConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            max_history: 50,
            engine_timeout_secs: 120,
            collector_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub diagnostic_temperature: f32,
    pub solution_temperature: f32,
    pub connect_timeout_secs: u64,
}

impl EngineConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            diagnostic_temperature: 0.0,
            solution_temperature: 0.2,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollectorBackend {
    #[default]
    Mock,
    Kubectl,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectorsConfig {
    pub backend: CollectorBackend,
    pub mock_profile: MockProfile,
    pub kubectl_path: PathBuf,
    pub kube_context: Option<String>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            backend: CollectorBackend::Mock,
            mock_profile: MockProfile::Default,
            kubectl_path: PathBuf::from("kubectl"),
            kube_context: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThreadsConfig {
    pub backend: ThreadBackend,
    pub dir: PathBuf,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            backend: ThreadBackend::Memory,
            dir: PathBuf::from("storage/threads"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HealthdeskConfig::from_toml_str("").unwrap();
        assert_eq!(config, HealthdeskConfig::default());
        assert_eq!(config.gateway.bind_addr.port(), 8822);
        assert_eq!(config.limits.engine_timeout(), Duration::from_secs(120));
        assert_eq!(config.collectors.backend, CollectorBackend::Mock);
    }

    #[test]
    fn test_partial_sections() {
        let config = HealthdeskConfig::from_toml_str(
            r#"
            [limits]
            max_steps = 4

            [collectors]
            backend = "kubectl"
            kube_context = "staging"

            [threads]
            backend = "file"
            dir = "/var/lib/healthdesk"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_steps, 4);
        assert_eq!(config.limits.max_history, 50);
        assert_eq!(config.collectors.backend, CollectorBackend::Kubectl);
        assert_eq!(config.collectors.kube_context.as_deref(), Some("staging"));
        assert_eq!(config.threads.backend, ThreadBackend::File);
        assert_eq!(config.engine.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            HealthdeskConfig::from_toml_str("[limits]\nmax_steps = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            HealthdeskConfig::from_toml_str("[collectors]\nbackend = \"ssh\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HealthdeskConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, HealthdeskConfig::default());
    }
}
