use std::env;
use std::time::Duration;

use thiserror::Error;

/// Default recognition endpoint, overridable through `MATHINK_HOST`.
pub const DEFAULT_HOST: &str = "cloud.myscript.com";
/// Protocol version string announced during the handshake.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2.0.1";

const ENV_APPLICATION_KEY: &str = "MATHINK_APPLICATION_KEY";
const ENV_HMAC_KEY: &str = "MATHINK_HMAC_KEY";
const ENV_HOST: &str = "MATHINK_HOST";
const ENV_SCHEME: &str = "MATHINK_SCHEME";

/// Errors produced while building or validating a [`SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential was absent or empty.
    #[error("missing credential: set the {0} environment variable")]
    MissingCredential(&'static str),
    /// A tunable was set to a value the session cannot operate with.
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Connection settings for the remote recognition service.
///
/// Credentials come from the deployment environment; everything else has
/// defaults matching the service's documented reliability parameters.
/// Validation happens up front so a missing key fails with a descriptive
/// error instead of an opaque network failure later.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket scheme, `wss` in production.
    pub scheme: String,
    pub host: String,
    pub protocol_version: String,
    pub application_key: String,
    pub hmac_key: String,
    /// Transport-level heartbeat interval.
    pub ping_interval: Duration,
    /// Consecutive unanswered heartbeats before the connection is declared dead.
    pub max_ping_lost: u32,
    /// Connection attempts before `connect` gives up.
    pub max_retry: u32,
    /// Largest single outbound message the transport will accept.
    pub max_chunk_bytes: usize,
}

impl SessionConfig {
    pub fn new(application_key: impl Into<String>, hmac_key: impl Into<String>) -> Self {
        Self {
            scheme: "wss".to_owned(),
            host: DEFAULT_HOST.to_owned(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_owned(),
            application_key: application_key.into(),
            hmac_key: hmac_key.into(),
            ping_interval: Duration::from_secs(1),
            max_ping_lost: 3,
            max_retry: 3,
            max_chunk_bytes: 1024 * 1024,
        }
    }

    /// Build a configuration from the environment, validating it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let application_key =
            env::var(ENV_APPLICATION_KEY).map_err(|_| ConfigError::MissingCredential(ENV_APPLICATION_KEY))?;
        let hmac_key = env::var(ENV_HMAC_KEY).map_err(|_| ConfigError::MissingCredential(ENV_HMAC_KEY))?;

        let mut config = Self::new(application_key, hmac_key);
        if let Ok(host) = env::var(ENV_HOST) {
            config.host = host;
        }
        if let Ok(scheme) = env::var(ENV_SCHEME) {
            config.scheme = scheme;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(ENV_APPLICATION_KEY));
        }
        if self.hmac_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(ENV_HMAC_KEY));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue { name: "host", value: self.host.clone() });
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::InvalidValue { name: "ping_interval", value: "0".to_owned() });
        }
        if self.max_ping_lost == 0 {
            return Err(ConfigError::InvalidValue { name: "max_ping_lost", value: "0".to_owned() });
        }
        if self.max_retry == 0 {
            return Err(ConfigError::InvalidValue { name: "max_retry", value: "0".to_owned() });
        }
        if self.max_chunk_bytes == 0 {
            return Err(ConfigError::InvalidValue { name: "max_chunk_bytes", value: "0".to_owned() });
        }
        Ok(())
    }

    /// Websocket URL of the recognition document endpoint.
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}://{}/api/v4.0/iink/document?applicationKey={}",
            self.scheme, self.host, self.application_key
        )
    }
}
