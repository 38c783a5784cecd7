use std::time::Duration;

use garde::Validate;
use serde::Deserialize;
use url::Url;

use crate::models::identity::Identity;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    /// Backend HTTP base URL (e.g., "http://localhost:8000")
    #[garde(custom(path_capable))]
    pub api_endpoint: Url,

    /// Push channel base URL (e.g., "ws://localhost:8000/ws")
    #[garde(custom(path_capable))]
    pub websocket_endpoint: Url,

    /// User id to act as when none is given on the command line
    #[serde(default)]
    #[garde(skip)]
    pub deepdetect_user_id: Option<String>,

    /// First reconnect delay for the push channel, in milliseconds
    #[serde(default = "default_reconnect_initial_ms")]
    #[garde(range(min = 2))]
    pub reconnect_initial_ms: u64,

    /// Upper bound on a single reconnect delay, in milliseconds
    #[serde(default = "default_reconnect_max_ms")]
    #[garde(range(min = 2))]
    pub reconnect_max_ms: u64,

    /// Give up after this many consecutive failed reconnects. Unset retries forever.
    #[serde(default)]
    #[garde(skip)]
    pub reconnect_max_attempts: Option<usize>,
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn path_capable(value: &Url, _ctx: &()) -> garde::Result {
    if value.cannot_be_a_base() {
        return Err(garde::Error::new("URL cannot carry path segments"));
    }
    Ok(())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: AppConfig = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration for explicit endpoints with default reconnect settings.
    pub fn for_endpoints(api_endpoint: Url, websocket_endpoint: Url) -> Self {
        Self {
            api_endpoint,
            websocket_endpoint,
            deepdetect_user_id: None,
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            reconnect_max_attempts: None,
        }
    }

    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::new(self.api_endpoint.clone(), self.websocket_endpoint.clone())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max_delay: Duration::from_millis(self.reconnect_max_ms.max(self.reconnect_initial_ms)),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

/// Backoff settings for re-opening the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max_delay: Duration,
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(default_reconnect_initial_ms()),
            max_delay: Duration::from_millis(default_reconnect_max_ms()),
            max_attempts: None,
        }
    }
}

/// Backend and push-channel URLs for a given user and file.
#[derive(Debug, Clone)]
pub struct Endpoints {
    api: Url,
    ws: Url,
}

impl Endpoints {
    pub fn new(api: Url, ws: Url) -> Result<Self, ConfigError> {
        for url in [&api, &ws] {
            if url.cannot_be_a_base() {
                return Err(ConfigError::NotABase(url.to_string()));
            }
        }
        Ok(Self { api, ws })
    }

    /// `POST {API_BASE}/upload`
    pub fn upload(&self) -> Url {
        join(&self.api, &["upload"])
    }

    /// `GET {API_BASE}/user-uploads/{userId}`
    pub fn user_uploads(&self, identity: &Identity) -> Url {
        join(&self.api, &["user-uploads", identity.user_id()])
    }

    /// `GET|DELETE {API_BASE}/file/{fileId}/{userId}`
    pub fn file(&self, file_id: &str, identity: &Identity) -> Url {
        join(&self.api, &["file", file_id, identity.user_id()])
    }

    /// `{WS_BASE}/{userId}`
    pub fn push_channel(&self, identity: &Identity) -> Url {
        join(&self.ws, &[identity.user_id()])
    }
}

// Segments are percent-encoded; bases were checked in `Endpoints::new`.
fn join(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments.iter().copied());
    }
    url
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),

    #[error("Endpoint URL cannot carry path segments: {0}")]
    NotABase(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(api: &str, ws: &str) -> Endpoints {
        Endpoints::new(Url::parse(api).unwrap(), Url::parse(ws).unwrap()).unwrap()
    }

    #[test]
    fn test_endpoint_paths() {
        let endpoints = endpoints("http://localhost:8000", "ws://localhost:8000/ws/");
        let user = Identity::from_user_id("kp_42").unwrap();

        assert_eq!(endpoints.upload().as_str(), "http://localhost:8000/upload");
        assert_eq!(
            endpoints.user_uploads(&user).as_str(),
            "http://localhost:8000/user-uploads/kp_42"
        );
        assert_eq!(
            endpoints.file("-NxA1", &user).as_str(),
            "http://localhost:8000/file/-NxA1/kp_42"
        );
        assert_eq!(endpoints.push_channel(&user).as_str(), "ws://localhost:8000/ws/kp_42");
    }

    #[test]
    fn test_segments_are_encoded() {
        let endpoints = endpoints("https://api.example.com/v1/", "wss://api.example.com/ws");
        let user = Identity::from_user_id("a/b c").unwrap();

        assert_eq!(
            endpoints.user_uploads(&user).as_str(),
            "https://api.example.com/v1/user-uploads/a%2Fb%20c"
        );
    }

    #[test]
    fn test_rejects_non_base_urls() {
        let result = Endpoints::new(
            Url::parse("mailto:ops@example.com").unwrap(),
            Url::parse("ws://localhost/ws").unwrap(),
        );
        assert!(matches!(result, Err(ConfigError::NotABase(_))));
    }

    #[test]
    fn test_validation_checks_backoff_bounds() {
        let mut config = AppConfig::for_endpoints(
            Url::parse("http://localhost:8000").unwrap(),
            Url::parse("ws://localhost:8000/ws").unwrap(),
        );
        assert!(config.validate().is_ok());

        config.reconnect_initial_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_cap_never_below_initial_delay() {
        let mut config = AppConfig::for_endpoints(
            Url::parse("http://localhost:8000").unwrap(),
            Url::parse("ws://localhost:8000/ws").unwrap(),
        );
        config.reconnect_initial_ms = 2_000;
        config.reconnect_max_ms = 100;

        let policy = config.reconnect_policy();
        assert_eq!(policy.max_delay, Duration::from_millis(2_000));
    }
}
