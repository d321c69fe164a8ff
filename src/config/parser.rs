//! Configuration parser for loading stack declarations.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, SgwError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::StackConfig;

/// Prefix of environment variables that override named inputs.
const INPUT_ENV_PREFIX: &str = "SGW_INPUT_";

/// Configuration parser for loading stack configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(SgwError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            SgwError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<StackConfig> {
        debug!("Parsing YAML configuration");

        let config: StackConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            SgwError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!("Successfully parsed configuration for project: {}", config.project.name);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// Environment variables are checked in the format
    /// `SGW_<SECTION>_<KEY>` (e.g., `SGW_PROJECT_NAME`), and named inputs
    /// can be set with `SGW_INPUT_<NAME>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let mut config = self.load_file(path)?;

        Self::apply_env_overrides(&mut config, std::env::vars());

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut StackConfig, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            match key.as_str() {
                "SGW_PROJECT_NAME" => {
                    debug!("Overriding project.name from environment");
                    config.project.name = value;
                }
                "SGW_PROJECT_ENVIRONMENT" => {
                    debug!("Overriding project.environment from environment");
                    config.project.environment = value;
                }
                "SGW_PROJECT_REGION" => {
                    debug!("Overriding project.region from environment");
                    config.project.region = value;
                }
                "SGW_ACCOUNT_ID" => {
                    debug!("Overriding project.account_id from environment");
                    config.project.account_id = Some(value);
                }
                "SGW_STATE_BUCKET" => {
                    debug!("Overriding state.bucket from environment");
                    config.state.bucket = Some(value);
                }
                "SGW_STATE_PREFIX" => {
                    debug!("Overriding state.prefix from environment");
                    config.state.prefix = Some(value);
                }
                other => {
                    if let Some(name) = other.strip_prefix(INPUT_ENV_PREFIX) {
                        let name = name.to_lowercase();
                        debug!("Overriding input.{name} from environment");
                        config.inputs.insert(name, value);
                    }
                }
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                SgwError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "sgw.stack.yaml",
    "sgw.stack.yml",
    "stack.yaml",
    "stack.yml",
];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(SgwError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComparisonOperator, Principal, StateBackend, Statistic};

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
project:
  name: sgw-alerts
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        assert_eq!(config.project.name, "sgw-alerts");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.project.region, "us-east-1");
        assert_eq!(config.state.backend, StateBackend::Local);
        assert!(config.topics.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
project:
  name: sgw-alerts
  environment: prod
  region: us-east-1
  account_id: '123456789012'

state:
  backend: s3
  bucket: sgw-state
  prefix: sgw-alerts/prod

topics:
  - name: storage-gateway-health-alerts

policies:
  - name: storage-gateway-health-alerts-publish
    topic: storage-gateway-health-alerts
    statements:
      - sid: AllowCloudWatchPublish
        principal:
          service: [cloudwatch.amazonaws.com]
        action: SNS:Publish

alarms:
  - name: storage-gateway-health
    comparison_operator: GreaterThanOrEqualToThreshold
    evaluation_periods: 1
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    period_secs: 300
    statistic: Sum
    threshold: 1
    dimensions:
      GatewayId: sgw-12A3456B
    alarm_actions: [storage-gateway-health-alerts]
    ok_actions: [storage-gateway-health-alerts]
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();

        assert_eq!(config.project.account_id.as_deref(), Some("123456789012"));
        assert_eq!(config.state.backend, StateBackend::S3);
        assert_eq!(config.topics.len(), 1);
        assert_eq!(
            config.policies[0].statements[0].principal,
            Principal::Service(vec![String::from("cloudwatch.amazonaws.com")])
        );
        assert_eq!(config.policies[0].version, "2012-10-17");

        let alarm = &config.alarms[0];
        assert_eq!(alarm.comparison_operator, ComparisonOperator::GreaterThanOrEqualToThreshold);
        assert_eq!(alarm.statistic, Statistic::Sum);
        assert!((alarm.threshold - 1.0).abs() < f64::EPSILON);
        assert_eq!(alarm.ok_actions, vec![String::from("storage-gateway-health-alerts")]);
        assert!(alarm.actions_enabled);
    }

    #[test]
    fn test_parse_rejects_negative_period() {
        let yaml = r"
project:
  name: sgw-alerts
alarms:
  - name: bad
    comparison_operator: GreaterThanThreshold
    metric_name: HealthNotifications
    namespace: AWS/StorageGateway
    period_secs: -60
    statistic: Sum
    threshold: 1
";
        assert!(ConfigParser::new().parse_yaml(yaml, None).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigParser::new()
            .parse_yaml("project:\n  name: sgw-alerts\n", None)
            .unwrap();

        let vars = vec![
            (String::from("SGW_PROJECT_ENVIRONMENT"), String::from("prod")),
            (String::from("SGW_INPUT_ALERT_EMAIL"), String::from("ops@example.com")),
            (String::from("UNRELATED"), String::from("x")),
        ];
        ConfigParser::apply_env_overrides(&mut config, vars.into_iter());

        assert_eq!(config.project.environment, "prod");
        assert_eq!(config.inputs["alert_email"], "ops@example.com");
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join("sgw.stack.yaml"), "project:\n  name: x\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join("sgw.stack.yaml"));
    }
}
