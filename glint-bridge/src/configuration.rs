//! User notification configuration and bridge settings

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use glint_proto::{Command, LedColor, Vibration};

use crate::arbitrator::DateWindow;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Feedback settings for one application, keyed by its bundle identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfiguration {
    pub identifier: String,
    pub color: LedColor,
    pub vibration: Vibration,
    pub activated: bool,
}

impl ApplicationConfiguration {
    pub fn new(identifier: impl Into<String>, color: LedColor, vibration: Vibration) -> Self {
        Self {
            identifier: identifier.into(),
            color,
            vibration,
            activated: true,
        }
    }

    /// The accessory-side settings entry for this application
    pub fn add_command(&self) -> Command {
        Command::AddApplication {
            identifier: self.identifier.clone(),
            color: self.color,
            vibration: self.vibration,
        }
    }

    /// Name reported with "notification sent" analytics
    pub fn analytics_name(&self) -> &str {
        self.identifier.rsplit('.').next().unwrap_or(&self.identifier)
    }
}

/// LED color for a contact, matched against notification titles by any of its names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactConfiguration {
    pub identifier: String,
    /// Display name first, then the nickname if the contact has one
    pub names: Vec<String>,
    pub color: LedColor,
}

impl ContactConfiguration {
    pub fn new(identifier: impl Into<String>, names: Vec<String>, color: LedColor) -> Self {
        Self {
            identifier: identifier.into(),
            names,
            color,
        }
    }

    /// The accessory matches contacts by name, so every name gets its own entry
    pub fn add_commands(&self) -> impl Iterator<Item = Command> + '_ {
        self.names.iter().map(|name| Command::AddContact {
            name: name.clone(),
            color: self.color,
        })
    }
}

/// Case-insensitive comparison where `candidate` is cut to the length of `received` first.
///
/// ANCS truncates long identifiers and titles, so a received value may only be a prefix of the
/// configured one.
pub(crate) fn matches_truncated(received: &str, candidate: &str) -> bool {
    if received.is_empty() {
        return false;
    }
    let len = received.chars().count();
    let trimmed: String = candidate.chars().take(len).collect();
    trimmed.to_lowercase() == received.to_lowercase()
}

/// Everything the user configured for notifications
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub applications: Vec<ApplicationConfiguration>,
    #[serde(default)]
    pub contacts: Vec<ContactConfiguration>,
    /// Only let notifications from configured contacts through
    #[serde(default)]
    pub inner_ring: bool,
}

impl Configuration {
    /// Load from file, or return an empty configuration if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        write_json(path, self)
    }

    pub fn application_matching(&self, identifier: &str) -> Option<&ApplicationConfiguration> {
        self.applications
            .iter()
            .find(|c| matches_truncated(identifier, &c.identifier))
    }

    pub fn contact_matching(&self, name: &str) -> Option<&ContactConfiguration> {
        self.contacts
            .iter()
            .find(|c| c.names.iter().any(|n| matches_truncated(name, n)))
    }

    /// Insert or replace the configuration with the same identifier
    pub fn upsert_application(&mut self, configuration: ApplicationConfiguration) {
        match self
            .applications
            .iter_mut()
            .find(|c| c.identifier == configuration.identifier)
        {
            Some(existing) => *existing = configuration,
            None => self.applications.push(configuration),
        }
    }

    /// Insert or replace the configuration with the same identifier
    pub fn upsert_contact(&mut self, configuration: ContactConfiguration) {
        match self
            .contacts
            .iter_mut()
            .find(|c| c.identifier == configuration.identifier)
        {
            Some(existing) => *existing = configuration,
            None => self.contacts.push(configuration),
        }
    }

    pub fn remove_application(&mut self, identifier: &str) -> bool {
        let before = self.applications.len();
        self.applications.retain(|c| c.identifier != identifier);
        self.applications.len() != before
    }

    pub fn remove_contact(&mut self, identifier: &str) -> bool {
        let before = self.contacts.len();
        self.contacts.retain(|c| c.identifier != identifier);
        self.contacts.len() != before
    }
}

/// Bridge settings, persisted next to the signature cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub signature_cache_limit: usize,
    /// Notifications dated further in the past than this are too old
    pub past_cutoff_secs: u64,
    /// Notifications dated further in the future than this are too new
    pub future_cutoff_secs: u64,
    /// Quiet period after the last configuration change before a V2 accessory is resynchronized
    pub debounce_secs: u64,
    /// Applications whose notification titles name a contact
    pub inner_ring_applications: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            signature_cache_limit: crate::signatures::DEFAULT_LIMIT,
            past_cutoff_secs: 3600,
            future_cutoff_secs: 600,
            debounce_secs: 5,
            inner_ring_applications: vec![
                "com.apple.mobilephone".to_string(),
                "com.apple.facetime".to_string(),
                "com.apple.MobileSMS".to_string(),
            ],
        }
    }
}

impl BridgeConfig {
    /// Load config from file, writing the defaults out if it does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            return read_json(path);
        }
        let config = Self::default();
        write_json(path, &config)?;
        Ok(config)
    }

    pub fn date_window(&self) -> DateWindow {
        DateWindow {
            past: Duration::from_secs(self.past_cutoff_secs),
            future: Duration::from_secs(self.future_cutoff_secs),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Encode {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    })
}
