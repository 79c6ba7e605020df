use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_MEASURES_URL: &str = "https://sonar.prd.whoid.com/api/measures/component";
pub const DEFAULT_HISTORY_URL: &str = "https://sonar.prd.whoid.com/api/measures/search_history";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variables that override the SonarQube section.
pub const ENV_MEASURES_URL: &str = "SONARQUBE_URL";
pub const ENV_HISTORY_URL: &str = "SONAR_HISTORY_URL";
pub const ENV_TOKEN: &str = "SONARQUBE_TOKEN";
pub const ENV_DEFAULT_BRANCH: &str = "SONAR_DEFAULT_BRANCH";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,

    #[error("Default branch cannot be empty")]
    EmptyDefaultBranch,

    #[error("Invalid URL in {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        source: url::ParseError,
    },
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the public API routes
    #[serde(default)]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    /// Upstream SonarQube server
    #[serde(default)]
    pub sonarqube: SonarQubeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: Listener::admin_default(),
            sonarqube: SonarQubeConfig::default(),
        }
    }
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.sonarqube.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }

    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Where and how to reach SonarQube.
#[derive(Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SonarQubeConfig {
    /// `api/measures/component` endpoint
    pub measures_url: Url,
    /// `api/measures/search_history` endpoint
    pub history_url: Url,
    /// User token, sent as the basic-auth username with an empty password
    pub token: Option<String>,
    /// Branch queried when the caller does not name one
    pub default_branch: String,
    /// Bound on the wait for upstream response headers
    pub timeout_secs: u64,
}

impl Default for SonarQubeConfig {
    fn default() -> Self {
        SonarQubeConfig {
            measures_url: Url::parse(DEFAULT_MEASURES_URL).expect("default measures url"),
            history_url: Url::parse(DEFAULT_HISTORY_URL).expect("default history url"),
            token: None,
            default_branch: DEFAULT_BRANCH.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for SonarQubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SonarQubeConfig")
            .field("measures_url", &self.measures_url.as_str())
            .field("history_url", &self.history_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("default_branch", &self.default_branch)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl SonarQubeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The token, if one is configured and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Overrides fields from environment variables.
    ///
    /// `lookup` returns the value of a variable; unset and empty values are
    /// ignored so the file or built-in default stays in effect.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_MEASURES_URL) {
            self.measures_url = Url::parse(&v).map_err(|source| ValidationError::InvalidUrl {
                name: ENV_MEASURES_URL,
                source,
            })?;
        }
        if let Some(v) = get(ENV_HISTORY_URL) {
            self.history_url = Url::parse(&v).map_err(|source| ValidationError::InvalidUrl {
                name: ENV_HISTORY_URL,
                source,
            })?;
        }
        if let Some(v) = get(ENV_TOKEN) {
            self.token = Some(v);
        }
        if let Some(v) = get(ENV_DEFAULT_BRANCH) {
            self.default_branch = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.default_branch.is_empty() {
            return Err(ValidationError::EmptyDefaultBranch);
        }
        Ok(())
    }
}
