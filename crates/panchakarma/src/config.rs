//! Configuration management for panchakarma.
//!
//! Configuration is layered with figment: built-in defaults, then the TOML
//! config file, then `PANCHAKARMA_` environment variables (nested keys are
//! separated by a double underscore, e.g. `PANCHAKARMA_BACKEND__ANON_KEY`).

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::Verbosity;
use crate::slots::TimeSlot;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "panchakarma";

/// Default sandbox database file name.
const DATABASE_FILE_NAME: &str = "clinic.db";

/// Shown in place of secrets.
const REDACTED: &str = "********";

/// Default session file name.
const SESSION_FILE_NAME: &str = "session.json";

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which backend to talk to and how to reach it.
    pub backend: BackendConfig,
    /// Clinic scheduling settings.
    pub clinic: ClinicConfig,
    /// Session persistence.
    pub session: SessionConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level used when neither `-q`/`-v` nor `RUST_LOG` is given.
    pub verbosity: Verbosity,
}

/// Which backend implementation serves records and identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The hosted backend-as-a-service.
    #[default]
    Hosted,
    /// The local SQLite sandbox.
    Local,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hosted => write!(f, "hosted"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Backend-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend implementation.
    pub kind: BackendKind,
    /// Base URL of the hosted service. Required when `kind = "hosted"`.
    pub url: Option<String>,
    /// Public access key of the hosted service. Required when `kind = "hosted"`.
    pub anon_key: Option<String>,
    /// Transport timeout for hosted requests, in seconds.
    pub timeout_secs: u64,
    /// Path of the sandbox database.
    /// Defaults to `~/.local/share/panchakarma/clinic.db`
    pub database_path: Option<PathBuf>,
}

/// Clinic scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    /// Time slots offered for booking, as `H:MM AM|PM` labels.
    pub time_slots: Vec<String>,
    /// Length of a full Panchakarma program, in sessions.
    pub program_days: u32,
}

/// Session persistence settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the CLI keeps the signed-in session between invocations.
    /// Defaults to `~/.local/share/panchakarma/session.json`
    pub path: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Hosted,
            url: None,
            anon_key: None,
            timeout_secs: 15,
            database_path: None,
        }
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            time_slots: crate::slots::OFFERED_SLOTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            program_days: 21,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the result does not validate.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if loading fails or the result does not validate. A
    /// hosted backend without a URL or access key fails here, before any
    /// request is made.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config = Self::figment(config_path).extract::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Build the layered figment without extracting it.
    #[must_use]
    pub fn figment(config_path: Option<PathBuf>) -> Figment {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("PANCHAKARMA_").split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.backend.kind == BackendKind::Hosted {
            if self.backend.url.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(Error::MissingBackendSetting("backend.url"));
            }
            if self
                .backend
                .anon_key
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
            {
                return Err(Error::MissingBackendSetting("backend.anon_key"));
            }
            if let Some(url) = &self.backend.url {
                if reqwest::Url::parse(url).is_err() {
                    return Err(Error::ConfigValidation {
                        message: format!("backend.url is not a valid URL: {url}"),
                    });
                }
            }
        }

        if self.backend.timeout_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "timeout_secs must be greater than 0".to_string(),
            });
        }

        if self.clinic.program_days == 0 {
            return Err(Error::ConfigValidation {
                message: "program_days must be greater than 0".to_string(),
            });
        }

        if self.clinic.time_slots.is_empty() {
            return Err(Error::ConfigValidation {
                message: "at least one time slot must be offered".to_string(),
            });
        }

        for label in &self.clinic.time_slots {
            if let Err(e) = label.parse::<TimeSlot>() {
                return Err(Error::ConfigValidation {
                    message: e.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Offered time slots, parsed.
    ///
    /// Labels that do not parse are skipped; [`Config::validate`] rejects them
    /// on load.
    #[must_use]
    pub fn offered_slots(&self) -> Vec<TimeSlot> {
        self.clinic
            .time_slots
            .iter()
            .filter_map(|label| label.parse().ok())
            .collect()
    }

    /// Get the sandbox database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.backend
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the session file path, resolving defaults if not set.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.session
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(SESSION_FILE_NAME))
    }

    /// A copy safe to print, with the access key masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        if let Some(key) = shown.backend.anon_key.as_mut() {
            *key = REDACTED.to_string();
        }
        shown
    }

    /// Get the hosted request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }
}
