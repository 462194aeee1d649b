use std::path::PathBuf;
use std::str::FromStr;

use crate::datastore::cloud::DEFAULT_ENDPOINT;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub datastore: DatastoreConfig,
    pub templates_dir: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatastoreBackend {
    Cloud,
    Memory,
}

impl FromStr for DatastoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cloud" | "datastore" => Ok(Self::Cloud),
            "memory" | "mem" => Ok(Self::Memory),
            _ => Err(ConfigError::Invalid {
                key: "DATASTORE_BACKEND",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DatastoreConfig {
    pub backend: DatastoreBackend,
    pub project_id: Option<String>,
    pub emulator_host: Option<String>,
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl DatastoreConfig {
    /// Base URL for the REST API; the emulator wins over everything else.
    pub fn endpoint(&self) -> String {
        if let Some(host) = &self.emulator_host {
            if host.starts_with("http://") || host.starts_with("https://") {
                return host.clone();
            }
            return format!("http://{}", host);
        }
        self.endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let port = match get("SERVER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "SERVER_PORT",
                value: raw,
            })?,
            None => 8080,
        };

        let backend = match get("DATASTORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => DatastoreBackend::Cloud,
        };

        let project_id = get("DATASTORE_PROJECT_ID").or_else(|| get("GOOGLE_CLOUD_PROJECT"));
        if backend == DatastoreBackend::Cloud && project_id.is_none() {
            return Err(ConfigError::Missing("DATASTORE_PROJECT_ID"));
        }

        let timeout_secs = match get("DATASTORE_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid {
                    key: "DATASTORE_TIMEOUT_SECS",
                    value: raw,
                })?,
            None => 30,
        };

        Ok(AppConfig {
            server: ServerConfig {
                host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
            },
            datastore: DatastoreConfig {
                backend,
                project_id,
                emulator_host: get("DATASTORE_EMULATOR_HOST"),
                endpoint: get("DATASTORE_ENDPOINT"),
                access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
                timeout_secs,
            },
            templates_dir: get("TEMPLATES_DIR").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_project() {
        let config = config_from(&[("GOOGLE_CLOUD_PROJECT", "demo")]).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.datastore.backend, DatastoreBackend::Cloud);
        assert_eq!(config.datastore.project_id.as_deref(), Some("demo"));
        assert_eq!(config.datastore.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.datastore.timeout_secs, 30);
        assert!(config.templates_dir.is_none());
    }

    #[test]
    fn test_cloud_requires_project() {
        assert!(matches!(
            config_from(&[]),
            Err(ConfigError::Missing("DATASTORE_PROJECT_ID"))
        ));
        let config = config_from(&[("DATASTORE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.datastore.backend, DatastoreBackend::Memory);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("DATASTORE_BACKEND", "memory"), ("SERVER_PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "SERVER_PORT", .. })
        ));
        assert!(matches!(
            config_from(&[("DATASTORE_BACKEND", "postgres")]),
            Err(ConfigError::Invalid { key: "DATASTORE_BACKEND", .. })
        ));
        assert!(matches!(
            config_from(&[("DATASTORE_BACKEND", "memory"), ("DATASTORE_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { key: "DATASTORE_TIMEOUT_SECS", .. })
        ));
    }

    #[test]
    fn test_emulator_overrides_endpoint() {
        let config = config_from(&[
            ("DATASTORE_PROJECT_ID", "demo"),
            ("DATASTORE_ENDPOINT", "https://example.test"),
            ("DATASTORE_EMULATOR_HOST", "localhost:8081"),
        ])
        .unwrap();
        assert_eq!(config.datastore.endpoint(), "http://localhost:8081");
    }
}
