//! Portal configuration.

use std::{env, time::Duration};

use thiserror::Error;
use url::Url;

pub const DEFAULT_PORTAL_URL: &str = "https://zkproofport.com/portal";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const PROOF_MESSAGE_TYPE: &str = "zkproofport-proof";
pub const CANCEL_MESSAGE_TYPE: &str = "zkproofport-cancel";
/// Browsing-context name the portal is opened under.
pub const POPUP_TARGET: &str = "zkproofport";

pub const PORTAL_URL_ENV: &str = "ZKPP_PORTAL_URL";
pub const PORTAL_TIMEOUT_ENV: &str = "ZKPP_PORTAL_TIMEOUT_MS";
pub const ORIGIN_ENV: &str = "ZKPP_ORIGIN";

#[derive(Error, Debug)]
pub enum PortalConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid portal url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 980,
            height: 720,
        }
    }
}

#[derive(Clone, Debug)]
pub struct PortalConfig {
    pub portal_url: Url,
    /// Handshake deadline, measured from opening the portal.
    pub timeout: Duration,
    /// Identity of the requesting application, embedded in the session URL.
    pub origin: String,
    pub message_type: String,
    pub cancel_type: String,
    pub window: WindowSize,
}

impl PortalConfig {
    pub fn new(origin: impl Into<String>) -> Result<Self, PortalConfigError> {
        Ok(Self {
            portal_url: parse_portal_url(DEFAULT_PORTAL_URL)?,
            timeout: DEFAULT_TIMEOUT,
            origin: origin.into(),
            message_type: PROOF_MESSAGE_TYPE.to_string(),
            cancel_type: CANCEL_MESSAGE_TYPE.to_string(),
            window: WindowSize::default(),
        })
    }

    pub fn with_portal_url(mut self, url: &str) -> Result<Self, PortalConfigError> {
        self.portal_url = parse_portal_url(url)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, PortalConfigError> {
        let origin = env::var(ORIGIN_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(PortalConfigError::Missing(ORIGIN_ENV))?;
        let mut config = Self::new(origin.trim())?;

        if let Ok(url) = env::var(PORTAL_URL_ENV) {
            config = config.with_portal_url(url.trim())?;
        }
        if let Ok(raw) = env::var(PORTAL_TIMEOUT_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| PortalConfigError::Invalid {
                name: PORTAL_TIMEOUT_ENV,
                reason: format!("'{raw}' is not a number of milliseconds"),
            })?;
            config.timeout = Duration::from_millis(millis);
        }
        Ok(config)
    }

    /// The only origin portal messages are accepted from: scheme and host of
    /// the portal URL.
    pub fn portal_origin(&self) -> String {
        self.portal_url.origin().ascii_serialization()
    }

    /// URL that opens one proof session on the portal.
    pub fn session_url(&self, circuit_id: &str, nonce: &str) -> Url {
        let mut url = self.portal_url.clone();
        url.query_pairs_mut()
            .append_pair("sdk", "1")
            .append_pair("circuit", circuit_id)
            .append_pair("origin", &self.origin)
            .append_pair("nonce", nonce);
        url
    }

    pub fn window_features(&self) -> String {
        format!(
            "width={},height={},popup=yes,noopener=yes,noreferrer=yes",
            self.window.width, self.window.height
        )
    }
}

fn parse_portal_url(url: &str) -> Result<Url, PortalConfigError> {
    Url::parse(url).map_err(|source| PortalConfigError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_portal() {
        let config = PortalConfig::new("https://app.example").unwrap();
        assert_eq!(config.portal_url.as_str(), DEFAULT_PORTAL_URL);
        assert_eq!(config.timeout, Duration::from_secs(120));
        assert_eq!(config.portal_origin(), "https://zkproofport.com");
        assert_eq!(
            config.window_features(),
            "width=980,height=720,popup=yes,noopener=yes,noreferrer=yes"
        );
    }

    #[test]
    fn session_url_carries_request_parameters() {
        let config = PortalConfig::new("https://app.example").unwrap();
        let url = config.session_url("coinbase_kyc", "n-1");
        assert_eq!(
            url.as_str(),
            "https://zkproofport.com/portal?sdk=1&circuit=coinbase_kyc&origin=https%3A%2F%2Fapp.example&nonce=n-1"
        );
    }

    #[test]
    fn portal_origin_keeps_explicit_port() {
        let config = PortalConfig::new("https://app.example")
            .unwrap()
            .with_portal_url("http://localhost:5173/portal")
            .unwrap();
        assert_eq!(config.portal_origin(), "http://localhost:5173");
        assert!(PortalConfig::new("o").unwrap().with_portal_url("not a url").is_err());
    }
}
