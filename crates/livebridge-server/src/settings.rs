//! Server configuration from environment variables.
//!
//! | Variable                  | Default          | Meaning                          |
//! |---------------------------|------------------|----------------------------------|
//! | `LIVEBRIDGE_HOST`         | `0.0.0.0`        | Bind address                     |
//! | `LIVEBRIDGE_PORT`         | `8000`           | Bind port                        |
//! | `PROJECT_ID`              | *(required)*     | Cloud project of the model       |
//! | `LOCATION`                | `us-central1`    | Cloud region of the model        |
//! | `MODEL_ID`                | `gemini-2.0-flash-exp` | Model to stream against    |
//! | `LIVEBRIDGE_UPSTREAM_URL` | *(derived)*      | Full upstream URL override       |
//! | `LIVEBRIDGE_STATIC_TOKEN` | *(none)*         | Fixed bearer token; when unset, tokens come from the metadata service |

use std::sync::Arc;

use thiserror::Error;

use livebridge_core::UpstreamSettings;
use livebridge_link::{MetadataTokenProvider, StaticTokenProvider, TokenProvider};

/// Configuration error.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required variable is absent.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable is present but unusable.
    #[error("invalid value for {name}: {value:?}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Resolved server configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Upstream target.
    pub upstream: UpstreamSettings,
    /// Fixed bearer token, mainly for local development.
    pub static_token: Option<String>,
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary lookup function.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let host = lookup("LIVEBRIDGE_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("LIVEBRIDGE_PORT") {
            None => 8000,
            Some(raw) => raw
                .parse()
                .map_err(|_| SettingsError::Invalid { name: "LIVEBRIDGE_PORT", value: raw })?,
        };
        let project_id = lookup("PROJECT_ID").ok_or(SettingsError::Missing("PROJECT_ID"))?;
        let location = lookup("LOCATION").unwrap_or_else(|| "us-central1".to_string());
        let model_id = lookup("MODEL_ID").unwrap_or_else(|| "gemini-2.0-flash-exp".to_string());

        Ok(Self {
            host,
            port,
            upstream: UpstreamSettings {
                project_id,
                location,
                model_id,
                endpoint_override: lookup("LIVEBRIDGE_UPSTREAM_URL"),
            },
            static_token: lookup("LIVEBRIDGE_STATIC_TOKEN"),
        })
    }

    /// The token provider implied by this configuration.
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        match &self.static_token {
            Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
            None => Arc::new(MetadataTokenProvider::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn load(pairs: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let map = vars(pairs);
        Settings::from_vars(|name| map.get(name).cloned())
    }

    #[test]
    fn minimal_configuration_uses_defaults() {
        let settings = load(&[("PROJECT_ID", "proj")]).unwrap();
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.upstream.project_id, "proj");
        assert_eq!(settings.upstream.location, "us-central1");
        assert_eq!(settings.upstream.model_id, "gemini-2.0-flash-exp");
        assert!(settings.upstream.endpoint_override.is_none());
        assert!(settings.static_token.is_none());
    }

    #[test]
    fn missing_project_is_rejected() {
        let err = load(&[]).unwrap_err();
        assert_matches!(err, SettingsError::Missing("PROJECT_ID"));
    }

    #[test]
    fn explicit_values_override_defaults() {
        let settings = load(&[
            ("PROJECT_ID", "proj"),
            ("LIVEBRIDGE_HOST", "127.0.0.1"),
            ("LIVEBRIDGE_PORT", "9001"),
            ("LOCATION", "europe-west4"),
            ("MODEL_ID", "gemini-live-2"),
            ("LIVEBRIDGE_UPSTREAM_URL", "ws://localhost:7777/ws"),
            ("LIVEBRIDGE_STATIC_TOKEN", "dev-token"),
        ])
        .unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.port, 9001);
        assert_eq!(settings.upstream.location, "europe-west4");
        assert_eq!(settings.upstream.model_id, "gemini-live-2");
        assert_eq!(settings.upstream.endpoint_override.as_deref(), Some("ws://localhost:7777/ws"));
        assert_eq!(settings.static_token.as_deref(), Some("dev-token"));
    }

    #[test]
    fn unparseable_port_is_rejected() {
        let err = load(&[("PROJECT_ID", "p"), ("LIVEBRIDGE_PORT", "eighty")]).unwrap_err();
        assert_matches!(err, SettingsError::Invalid { name: "LIVEBRIDGE_PORT", .. });
    }
}
