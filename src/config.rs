use crate::driver::DeviceIdentity;
use crate::transport::ConnectionConfig;
use crate::transport::tcp::DEFAULT_PORT;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub vna: VnaConfig,
    pub transport: TransportConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VnaConfig {
    /// Instrument to connect to at startup. Without it the node waits for a
    /// connection request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Port used when an address carries none
    pub port: u16,
    pub expected_vendor: String,
    pub expected_model: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransportConfig {
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for VnaConfig {
    fn default() -> Self {
        let identity = DeviceIdentity::default();
        Self {
            address: None,
            port: DEFAULT_PORT,
            expected_vendor: identity.vendor,
            expected_model: identity.model,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            read_timeout_ms: 10000,
            write_timeout_ms: 5000,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7878".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl VnaConfig {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            vendor: self.expected_vendor.clone(),
            model: self.expected_model.clone(),
        }
    }
}

impl TransportConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

impl AppConfig {
    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vna.expected_vendor.trim().is_empty() || self.vna.expected_model.trim().is_empty() {
            return Err(ConfigError::Message(
                "vna.expected_vendor and vna.expected_model must not be empty".to_string(),
            ));
        }
        if self.vna.port == 0 {
            return Err(ConfigError::Message("vna.port must not be 0".to_string()));
        }

        let timeouts = [
            ("connect_timeout_ms", self.transport.connect_timeout_ms),
            ("read_timeout_ms", self.transport.read_timeout_ms),
            ("write_timeout_ms", self.transport.write_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Message(format!(
                "transport.{name} must be greater than 0"
            )));
        }

        Ok(())
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    build_config(config_path, environment())
}

/// Environment overrides, e.g. VNA_NODE_VNA__ADDRESS=192.168.0.10
fn environment() -> Environment {
    Environment::with_prefix("VNA_NODE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn build_config(config_path: Option<&Path>, env: Environment) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        let possible_paths = ["vna_node.toml", "config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    builder = builder.add_source(env);

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration, falling back to defaults on any error
pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vna.identity(), DeviceIdentity::default());
        assert_eq!(
            config.transport.connection_config().read_timeout,
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(
            r#"
[vna]
address = "192.168.0.10"
port = 9001

[transport]
read_timeout_ms = 30000

[logging]
log_level = "debug"
"#,
        );

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(config.vna.address.as_deref(), Some("192.168.0.10"));
        assert_eq!(config.vna.port, 9001);
        assert_eq!(config.vna.expected_model, "MS2026C/2");
        assert_eq!(config.transport.read_timeout_ms, 30000);
        assert_eq!(config.transport.connect_timeout_ms, 5000);
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.server.bind_address, "127.0.0.1:7878");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = load_config(Some(Path::new("/nonexistent/vna_node.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = write_config("[transport]\nwrite_timeout_ms = 0\n");
        assert!(load_config(Some(file.path())).is_err());

        let mut config = AppConfig::default();
        config.vna.expected_vendor = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_to_defaults() {
        let config = load_config_or_default(Some(Path::new("/nonexistent/vna_node.toml")));
        assert_eq!(config.vna.port, DEFAULT_PORT);
        assert!(config.vna.address.is_none());
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config("[vna]\naddress = \"10.0.0.1\"\nport = 9001\n");
        let vars = config::Map::from([
            ("VNA_NODE_VNA__ADDRESS".to_string(), "192.168.0.10".to_string()),
            ("VNA_NODE_TRANSPORT__READ_TIMEOUT_MS".to_string(), "2500".to_string()),
            ("OTHER_VNA__PORT".to_string(), "1".to_string()),
        ]);

        let config = build_config(Some(file.path()), environment().source(Some(vars))).unwrap();
        assert_eq!(config.vna.address.as_deref(), Some("192.168.0.10"));
        assert_eq!(config.vna.port, 9001);
        assert_eq!(config.transport.read_timeout_ms, 2500);
    }
}
