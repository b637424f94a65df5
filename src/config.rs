use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// The `ldap_auth` configuration surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Which user-provider kind to construct. Defaults to the
    /// database-backed provider when unset.
    #[serde(default)]
    pub provider: Option<String>,
    /// Identifier of the local identity record (the table holding local
    /// users). Required by the database-backed provider.
    #[serde(default)]
    pub model: Option<String>,
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    #[serde(default)]
    pub hash: HashKind,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub url: String,
    pub base_dn: String,
    pub bind_dn: Option<String>,
    pub bind_password: Option<String>,
    /// Search filter with `{}` as the username placeholder.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
}

fn default_user_filter() -> String {
    "(uid={})".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub backend: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashKind {
    #[default]
    #[serde(rename = "argon2")]
    Argon2,
    #[serde(rename = "bcrypt")]
    Bcrypt,
    #[serde(rename = "scrypt")]
    Scrypt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// When false, no listeners from `events` are subscribed.
    #[serde(default)]
    pub enabled: bool,
    /// Event identifier to listener identifier.
    #[serde(default)]
    pub events: HashMap<String, String>,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_console() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            events: HashMap::new(),
            level: default_log_level(),
            file: None,
            console: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: None,
            model: Some("users".to_string()),
            connection: ConnectionSettings {
                url: "ldap://localhost:389".to_string(),
                base_dn: "dc=example,dc=com".to_string(),
                bind_dn: None,
                bind_password: None,
                user_filter: default_user_filter(),
            },
            database: Some(DatabaseSettings {
                backend: "postgres".to_string(),
                url: "postgres://localhost/app".to_string(),
            }),
            hash: HashKind::Argon2,
            logging: LoggingSettings::default(),
        }
    }
}

/// The per-registration mapping the host hands to the provider factory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub model: Option<String>,
}

impl Settings {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        info!("Configuration loaded successfully");
        Ok(settings)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.url.is_empty() {
            return Err(Error::Config("LDAP URL cannot be empty".to_string()));
        }

        if !self.connection.url.starts_with("ldap://") && !self.connection.url.starts_with("ldaps://") {
            return Err(Error::Config(format!(
                "Invalid LDAP URL scheme: {}",
                self.connection.url
            )));
        }

        if self.connection.base_dn.is_empty() {
            return Err(Error::Config("Base DN cannot be empty".to_string()));
        }

        if !self.connection.user_filter.contains("{}") {
            return Err(Error::Config(format!(
                "User filter must contain a {{}} placeholder: {}",
                self.connection.user_filter
            )));
        }

        if let Some(database) = &self.database {
            match database.backend.to_lowercase().as_str() {
                "mysql" | "postgres" | "pgsql" | "postgresql" => {}
                other => {
                    return Err(Error::Config(format!("Unsupported database backend: {other}")));
                }
            }
            if database.url.is_empty() {
                return Err(Error::Config("Database URL cannot be empty".to_string()));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(Error::Config(format!("Invalid log level: {}", self.logging.level)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn default_settings_round_trip() {
        let settings = Settings::default();
        let yaml = serde_yaml::to_string(&settings).unwrap();
        let parsed: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.provider, settings.provider);
        assert_eq!(parsed.model, settings.model);
        assert!(!parsed.logging.enabled);
        assert!(parsed.logging.events.is_empty());
    }

    #[test]
    fn minimal_yaml_applies_defaults() {
        let yaml = "connection:\n  url: ldap://dir.example.com\n  base_dn: dc=example,dc=com\n";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert!(settings.provider.is_none());
        assert_eq!(settings.connection.user_filter, "(uid={})");
        assert_eq!(settings.hash, HashKind::Argon2);
        assert!(!settings.logging.enabled);
    }

    #[test]
    fn rejects_bad_url_scheme() {
        let mut settings = Settings::default();
        settings.connection.url = "http://dir.example.com".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_unsupported_database_backend() {
        let mut settings = Settings::default();
        settings.database = Some(DatabaseSettings {
            backend: "sqlite".to_string(),
            url: "sqlite://app.db".to_string(),
        });
        assert!(settings.validate().is_err());
    }
}
