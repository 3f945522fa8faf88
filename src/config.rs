/// Service configuration loader - parses floodcast.toml
///
/// Separates deployment details (serial port, model artifact, Firebase
/// credentials, monitored sites) from code, so a new board or database can
/// be wired up without recompiling the service.
///
/// Every section is optional; missing keys fall back to the values the
/// single-board field deployment uses. A handful of environment variables (loaded
/// from `.env` when present) override the file for secrets and
/// machine-specific paths.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

use crate::logging::LogLevel;
use crate::model::FloodError;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "floodcast.toml";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub model: ModelConfig,
    pub sync: SyncConfig,
    pub poll: PollConfig,
    #[serde(rename = "site")]
    pub sites: Vec<SiteConfig>,
    pub web: WebConfig,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            model: ModelConfig::default(),
            sync: SyncConfig::default(),
            poll: PollConfig::default(),
            sites: default_sites(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Serial link to the sensor board
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Pause after opening the port while the board resets.
    pub settle_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM11".to_string(),
            baud_rate: 9600,
            settle_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the JSON model artifact.
    pub path: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/rf_model.json".to_string(),
        }
    }
}

/// Firebase Realtime Database target
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Service account key (or legacy database secret) JSON file.
    pub credentials: String,
    pub database_url: String,
    /// Location written on every iteration; empty means the database root.
    pub path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credentials: "ServiceAccountKey.json".to_string(),
            database_url: "https://floodprediction-108b6-default-rtdb.firebaseio.com/".to_string(),
            path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

/// One monitored site: the sensor reporting its flow and the rainfall
/// figure fed to the model alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SiteConfig {
    pub sensor_id: u32,
    pub rainfall: f64,
}

fn default_sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig { sensor_id: 1, rainfall: 1.2 },
        SiteConfig { sensor_id: 2, rainfall: 1.3 },
    ]
}

/// Which form the web front door serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormVariant {
    /// `feature1..feature3` in, JSON out.
    Features,
    /// `date, month, year, flow, rainfall` in, HTML page out.
    Site,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub port: u16,
    pub variant: FormVariant,
    pub workers: usize,
    /// Separate artifact for the form, when it takes a different feature
    /// set than the poll loop's model. Unset means share the main model.
    pub model: Option<String>,
    /// Optional standard scaling for the features form: `(x - mean) / scale`.
    pub scaler_mean: Option<Vec<f64>>,
    pub scaler_scale: Option<Vec<f64>>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            variant: FormVariant::Features,
            workers: 4,
            model: None,
            scaler_mean: None,
            scaler_scale: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Parses configuration text and validates it.
    pub fn from_toml(contents: &str) -> Result<Self, FloodError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FloodError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), FloodError> {
        if self.sites.is_empty() {
            return Err(FloodError::Config("at least one [[site]] must be configured".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(FloodError::Config("serial.baud_rate must be non-zero".into()));
        }
        if self.poll.interval_secs == 0 {
            return Err(FloodError::Config("poll.interval_secs must be non-zero".into()));
        }
        if self.web.workers == 0 {
            return Err(FloodError::Config("web.workers must be non-zero".into()));
        }
        if !self.sync.database_url.starts_with("https://") {
            return Err(FloodError::Config(format!(
                "sync.database_url must be an https:// URL, got '{}'",
                self.sync.database_url
            )));
        }
        match (&self.web.scaler_mean, &self.web.scaler_scale) {
            (None, None) => {}
            (Some(mean), Some(scale)) => {
                if mean.len() != scale.len() {
                    return Err(FloodError::Config(format!(
                        "web.scaler_mean has {} entries but web.scaler_scale has {}",
                        mean.len(),
                        scale.len()
                    )));
                }
                if scale.iter().any(|s| *s == 0.0) {
                    return Err(FloodError::Config("web.scaler_scale entries must be non-zero".into()));
                }
            }
            _ => {
                return Err(FloodError::Config(
                    "web.scaler_mean and web.scaler_scale must be set together".into(),
                ));
            }
        }
        Ok(())
    }

    /// Applies environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = env::var("FLOODCAST_SERIAL_PORT") {
            self.serial.port = port;
        }
        if let Ok(path) = env::var("FLOODCAST_MODEL_PATH") {
            self.model.path = path;
        }
        if let Ok(path) = env::var("FIREBASE_CREDENTIALS") {
            self.sync.credentials = path;
        }
        if let Ok(url) = env::var("FIREBASE_DATABASE_URL") {
            self.sync.database_url = url;
        }
    }
}

/// Loads configuration from `path`, applying `.env` and environment overrides.
///
/// A missing file is not an error: the built-in defaults are used instead,
/// which match the single-board field deployment.
pub fn load_config(path: &Path) -> Result<Config, FloodError> {
    dotenv::dotenv().ok();

    let mut config = if path.exists() {
        let contents = fs::read_to_string(path)
            .map_err(|e| FloodError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str::<Config>(&contents).map_err(|e| {
            FloodError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?
    } else {
        Config::default()
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Resolves the configuration path: explicit argument, then
/// `FLOODCAST_CONFIG`, then [`DEFAULT_CONFIG_PATH`].
pub fn config_path(explicit: Option<&str>) -> String {
    explicit
        .map(String::from)
        .or_else(|| env::var("FLOODCAST_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_field_deployment() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.settle_ms, 2000);
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.sites.len(), 2);
        assert_eq!(config.sites[0], SiteConfig { sensor_id: 1, rainfall: 1.2 });
        assert_eq!(config.sites[1], SiteConfig { sensor_id: 2, rainfall: 1.3 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_file_parses() {
        let config = load_config(Path::new(DEFAULT_CONFIG_PATH))
            .expect("floodcast.toml should be valid");
        assert!(!config.sites.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [serial]
            port = "/dev/ttyACM0"

            [web]
            variant = "site"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.web.variant, FormVariant::Site);
        assert_eq!(config.sites.len(), 2);
    }

    #[test]
    fn test_site_list_replaces_defaults() {
        let config = Config::from_toml(
            r#"
            [[site]]
            sensor_id = 4
            rainfall = 0.7
            "#,
        )
        .unwrap();

        assert_eq!(config.sites, vec![SiteConfig { sensor_id: 4, rainfall: 0.7 }]);
    }

    #[test]
    fn test_rejects_empty_site_list() {
        let mut config = Config::default();
        config.sites.clear();
        assert!(matches!(config.validate(), Err(FloodError::Config(_))));
    }

    #[test]
    fn test_rejects_mismatched_scaler() {
        let result = Config::from_toml(
            r#"
            [web]
            scaler_mean = [1.0, 2.0]
            scaler_scale = [1.0]
            "#,
        );
        assert!(matches!(result, Err(FloodError::Config(_))));
    }

    #[test]
    fn test_rejects_plain_http_database() {
        let result = Config::from_toml(
            r#"
            [sync]
            database_url = "http://localhost:9000"
            "#,
        );
        assert!(matches!(result, Err(FloodError::Config(_))));
    }

    #[test]
    fn test_unknown_variant_is_config_error() {
        let result = Config::from_toml("[web]\nvariant = \"carousel\"\n");
        assert!(matches!(result, Err(FloodError::Config(_))));
    }

    #[test]
    fn test_config_path_prefers_explicit() {
        assert_eq!(config_path(Some("custom.toml")), "custom.toml");
    }
}
