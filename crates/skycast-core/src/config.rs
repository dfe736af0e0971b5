use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Weather service settings
    pub weather: WeatherConfig,

    /// Location source and watch policy
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Endpoint queried with `?lat=..&lon=..`
    pub endpoint: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Icon URL; `{icon}` is replaced with the icon id from the response
    pub icon_url_template: String,
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3001/weather".to_string(),
            timeout_ms: 5000,
            icon_url_template: "https://openweathermap.org/img/wn/{icon}@4x.png".to_string(),
        }
    }
}

/// Where positions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationSourceKind {
    /// Coordinates from `location.latitude` / `location.longitude`
    Fixed,
    /// IP geolocation lookup over HTTP
    #[default]
    Ip,
}

impl std::str::FromStr for LocationSourceKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "ip" => Ok(Self::Ip),
            other => Err(ConfigError::Invalid(format!(
                "unknown location source '{}', expected 'fixed' or 'ip'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub source: LocationSourceKind,

    /// Used by the fixed source
    pub latitude: f64,
    pub longitude: f64,

    /// Used by the IP source; must answer with JSON `{"lat": .., "lon": ..}`
    pub ip_lookup_url: String,

    /// Minimum time between watch reports
    pub min_interval_secs: u64,

    /// Minimum movement before the watch reports again
    pub min_distance_meters: f64,

    /// Degrees of latitude/longitude a refresh must move before refetching
    pub significance_degrees: f64,
}

impl LocationConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            source: LocationSourceKind::default(),
            latitude: 0.0,
            longitude: 0.0,
            ip_lookup_url: "http://ip-api.com/json".to_string(),
            min_interval_secs: 30,
            min_distance_meters: 500.0,
            significance_degrees: 0.01,
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate and hand the configuration back
    ///
    /// Warnings are logged; errors fail with a summary of every problem.
    pub fn into_validated(self) -> Result<(Self, ValidationResult), ConfigError> {
        let validation = self.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((self, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.endpoint, "weather.endpoint", &mut result);

        if self.weather.timeout_ms == 0 {
            result.add_error("weather.timeout_ms", "Timeout must be greater than 0");
        } else if self.weather.timeout_ms > 60_000 {
            result.add_warning("weather.timeout_ms", "Timeout is more than a minute");
        }

        if !self.weather.icon_url_template.contains("{icon}") {
            result.add_warning(
                "weather.icon_url_template",
                "Template has no {icon} placeholder; every condition shows the same icon",
            );
        }

        match self.location.source {
            LocationSourceKind::Ip => {
                self.validate_url(
                    &self.location.ip_lookup_url,
                    "location.ip_lookup_url",
                    &mut result,
                );
            }
            LocationSourceKind::Fixed => {
                if !(-90.0..=90.0).contains(&self.location.latitude) {
                    result.add_error("location.latitude", "Latitude must be within -90..=90");
                }
                if !(-180.0..=180.0).contains(&self.location.longitude) {
                    result.add_error("location.longitude", "Longitude must be within -180..=180");
                }
            }
        }

        if self.location.min_interval_secs == 0 {
            result.add_warning(
                "location.min_interval_secs",
                "Watch interval of 0 seconds polls continuously",
            );
        }

        if self.location.min_distance_meters < 0.0 {
            result.add_error(
                "location.min_distance_meters",
                "Distance must not be negative",
            );
        }

        let threshold = self.location.significance_degrees;
        if threshold.is_nan() || threshold <= 0.0 {
            result.add_error(
                "location.significance_degrees",
                "Threshold must be greater than 0",
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if url.port() == Some(0) {
                    result.add_error(field_name, "Port cannot be 0");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("skycast");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_default_watch_policy() {
        let config = Config::default();
        assert_eq!(config.weather.timeout(), Duration::from_millis(5000));
        assert_eq!(config.location.min_interval(), Duration::from_secs(30));
        assert_eq!(config.location.min_distance_meters, 500.0);
        assert_eq!(config.location.significance_degrees, 0.01);
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut config = Config::default();
        config.weather.endpoint = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.endpoint"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.weather.endpoint = "ftp://localhost:3001/weather".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_zero_timeout_is_error() {
        let mut config = Config::default();
        config.weather.timeout_ms = 0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.timeout_ms"));
    }

    #[test]
    fn test_fixed_source_checks_coordinates() {
        let mut config = Config::default();
        config.location.source = LocationSourceKind::Fixed;
        config.location.latitude = 91.0;
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "location.latitude"));
    }

    #[test]
    fn test_missing_icon_placeholder_is_warning() {
        let mut config = Config::default();
        config.weather.icon_url_template = "https://example.com/icon.png".to_string();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field == "weather.icon_url_template"));
    }

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("fixed".parse::<LocationSourceKind>().unwrap(), LocationSourceKind::Fixed);
        assert_eq!("IP".parse::<LocationSourceKind>().unwrap(), LocationSourceKind::Ip);
        assert!("gps".parse::<LocationSourceKind>().is_err());
    }

    #[test]
    fn test_load_from_missing_path_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();

        assert!(path.exists());
        assert_eq!(config.weather.timeout_ms, 5000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[weather]
endpoint = "https://weather.example.com/now"

[location]
source = "fixed"
latitude = -22.9
longitude = -43.2
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.weather.endpoint, "https://weather.example.com/now");
        assert_eq!(config.weather.timeout_ms, 5000);
        assert_eq!(config.location.source, LocationSourceKind::Fixed);
        assert_eq!(config.location.latitude, -22.9);
        assert_eq!(config.location.min_interval_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_into_validated_rejects_errors() {
        let mut config = Config::default();
        config.weather.endpoint = "nope".to_string();
        config.weather.timeout_ms = 0;

        let err = config.into_validated().unwrap_err();
        match err {
            ConfigError::Invalid(summary) => {
                assert!(summary.contains("weather.endpoint"));
                assert!(summary.contains("weather.timeout_ms"));
            }
            other => panic!("expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }

    #[test]
    fn test_saved_file_has_only_known_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        Config::default().save_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();

        assert!(contents.contains("[weather]"));
        assert!(contents.contains("[location]"));
        assert!(!contents.contains("config_dir"));
    }

    #[test]
    fn test_stale_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = \"/tmp/old\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.timeout_ms, 5000);
    }
}
