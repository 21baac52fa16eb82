use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

use crate::errors::ImportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub google: GoogleConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OAuth2 client secrets downloaded from the Google Cloud console
    pub credentials_path: PathBuf,
    /// Where the access and refresh tokens are stored between runs
    pub token_path: PathBuf,
    /// Overrides the first redirect URI listed in the client secrets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Calendar used for rows with a blank "Calendar Name"
    pub default_calendar: String,
    /// Length of timed events that have no "End Time"
    pub default_event_minutes: u32,
    /// Only offer calendars the account can write to
    pub writable_calendars_only: bool,
    /// Time zone for rows without one (falls back to the account setting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google: GoogleConfig {
                credentials_path: PathBuf::from("credentials.json"),
                token_path: PathBuf::from("token.json"),
                redirect_uri: None,
            },
            import: ImportConfig {
                default_calendar: "Primary".to_string(),
                default_event_minutes: 60,
                writable_calendars_only: true,
                timezone: None,
            },
        }
    }
}

impl Config {
    /// Load the config file, writing the defaults out first if it does not exist yet
    pub async fn load(path: Option<&Path>) -> Result<Arc<RwLock<Config>>> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            Self::parse(&content).with_context(|| "Failed to parse config file")?
        } else {
            info!("Config file not found, creating default configuration");
            let default_config = Config::default();
            default_config.save(&config_path).await?;
            default_config
        };

        config.validate()?;
        debug!("Loaded configuration from {:?}", config_path);

        Ok(Arc::new(RwLock::new(config)))
    }

    pub fn parse(content: &str) -> Result<Config, ImportError> {
        Ok(toml::from_str(content)?)
    }

    pub async fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(config_path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("xlsx-to-calendar");

        Ok(config_dir.join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        if self.import.default_event_minutes == 0 {
            return Err(ImportError::Config {
                message: "import.default_event_minutes must be greater than zero".to_string(),
            });
        }

        if self.import.default_calendar.trim().is_empty() {
            return Err(ImportError::Config {
                message: "import.default_calendar must not be empty".to_string(),
            });
        }

        if let Some(timezone) = &self.import.timezone {
            if timezone.parse::<chrono_tz::Tz>().is_err() {
                return Err(ImportError::Config {
                    message: format!("import.timezone '{}' is not a known time zone", timezone),
                });
            }
        }

        Ok(())
    }

    /// Default event length as chrono Duration
    pub fn default_event_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.import.default_event_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed = Config::parse(&content).unwrap();

        assert_eq!(parsed.google.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(parsed.google.token_path, PathBuf::from("token.json"));
        assert_eq!(parsed.import.default_calendar, "Primary");
        assert_eq!(parsed.import.default_event_minutes, 60);
        assert!(parsed.import.timezone.is_none());
    }

    #[test]
    fn test_validate_rejects_unknown_timezone() {
        let mut config = Config::default();
        config.import.timezone = Some("Mars/Olympus_Mons".to_string());
        assert!(matches!(config.validate(), Err(ImportError::Config { .. })));

        config.import.timezone = Some("Europe/Berlin".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let mut config = Config::default();
        config.import.default_event_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.read().import.default_calendar, "Primary");

        let reloaded = Config::load(Some(&path)).await.unwrap();
        assert_eq!(reloaded.read().import.default_event_minutes, 60);
    }
}
