//! Client configuration for hosts embedding the sync engine.
//!
//! Provides `ClientConfig`, used by the CLI profile file and by anything else
//! that needs to point the remote client at a deployment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identifier::DEFAULT_CODE_PREFIX;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Remote endpoint and sync policy settings.
///
/// Holds no secrets. The bearer credential is supplied separately through a
/// `CredentialProvider`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_code_prefix")]
    pub patient_code_prefix: String,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_code_prefix() -> String {
    DEFAULT_CODE_PREFIX.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            patient_code_prefix: default_code_prefix(),
        }
    }
}

impl ClientConfig {
    /// Check and normalize the configured values in place.
    pub fn validate(mut self) -> Result<Self> {
        self.api_base_url = match normalize_text_option(self.api_base_url.take()) {
            Some(url) => Some(normalize_http_url(&url, "api_base_url")?),
            None => None,
        };

        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let prefix = self.patient_code_prefix.trim();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidInput(
                "patient_code_prefix must be non-empty and alphanumeric".to_string(),
            ));
        }
        self.patient_code_prefix = prefix.to_string();

        Ok(self)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL of the remote, or an error when none is configured.
    pub fn require_api_base_url(&self) -> Result<&str> {
        self.api_base_url.as_deref().ok_or_else(|| {
            Error::InvalidInput("No remote API base URL is configured".to_string())
        })
    }
}

/// Parse a config from a raw JSON payload and validate it.
pub fn parse_client_config(payload: &str) -> Result<ClientConfig> {
    let config: ClientConfig = serde_json::from_str(payload)?;
    config.validate()
}

fn normalize_http_url(value: &str, field: &str) -> Result<String> {
    if is_http_url(value) {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(format!(
            "config field '{field}' must include http:// or https://"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_sync_policy() {
        let config = parse_client_config("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.patient_code_prefix, "pasien");
    }

    #[test]
    fn base_url_is_trimmed() {
        let config =
            parse_client_config(r#"{ "api_base_url": " https://api.example.com/v1/ " }"#).unwrap();
        assert_eq!(
            config.require_api_base_url().unwrap(),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = parse_client_config(r#"{ "supabase_url": "x" }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_client_config(r#"{ "api_base_url": "api.example.com" }"#).is_err());
        assert!(parse_client_config(r#"{ "request_timeout_secs": 0 }"#).is_err());
        assert!(parse_client_config(r#"{ "patient_code_prefix": "  " }"#).is_err());
        assert!(parse_client_config(r#"{ "patient_code_prefix": "pa-sien" }"#).is_err());
    }

    #[test]
    fn missing_base_url_is_reported() {
        let config = ClientConfig::default();
        assert!(matches!(
            config.require_api_base_url(),
            Err(Error::InvalidInput(_))
        ));
    }
}
