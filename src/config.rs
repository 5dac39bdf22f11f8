use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Username and password accepted by the basic-auth gate.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Realm announced in the `WWW-Authenticate` challenge
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Accepted credentials
    #[serde(default = "default_credentials")]
    pub credentials: Vec<Credential>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("no credentials configured")]
    NoCredentials,
}

fn default_realm() -> String {
    "restricted".to_string()
}

fn default_credentials() -> Vec<Credential> {
    vec![Credential::new("user", "112233")]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            realm: default_realm(),
            credentials: default_credentials(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Replace the configured credentials with a single pair.
    pub fn with_credential(mut self, username: String, password: String) -> Self {
        self.credentials = vec![Credential::new(username, password)];
        self
    }

    /// Reject configurations nobody could log in to.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(())
    }

    /// Whether the built-in credential is still active.
    pub fn uses_default_credentials(&self) -> bool {
        self.credentials == default_credentials()
    }
}
