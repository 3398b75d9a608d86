//! Connection settings for one provider.

use super::Provider;
use crate::{Error, ErrorContext, Result};
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// API key, endpoint and HTTP settings for a provider.
///
/// Values set explicitly on the call builder win over the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub proxy: Option<String>,
    pub headers: Vec<(String, String)>,
    /// Vertex AI project id.
    pub project: Option<String>,
    /// Vertex AI region.
    pub location: Option<String>,
}

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `<PREFIX>_API_KEY`, `<PREFIX>_BASE_URL`, `AI_HTTP_TIMEOUT_SECS`,
    /// `AI_PROXY_URL`, `VERTEX_PROJECT` and `VERTEX_LOCATION`.
    pub fn from_env(prefix: &str) -> Self {
        Self::from_lookup(prefix, |key| env::var(key).ok())
    }

    /// Environment settings for `P`.
    pub fn for_provider<P: Provider>() -> Self {
        Self::from_env(P::ENV_PREFIX)
    }

    pub fn from_lookup(prefix: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let prefix = prefix.to_uppercase();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: non_empty(&format!("{}_API_KEY", prefix)),
            base_url: non_empty(&format!("{}_BASE_URL", prefix)),
            timeout: non_empty("AI_HTTP_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
            proxy: non_empty("AI_PROXY_URL"),
            headers: Vec::new(),
            project: non_empty("VERTEX_PROJECT"),
            location: non_empty("VERTEX_LOCATION"),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Fields set in `explicit` replace the ones in `self`.
    pub fn overlay(mut self, explicit: &ProviderConfig) -> Self {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if explicit.$field.is_some() {
                    self.$field = explicit.$field.clone();
                })*
            };
        }
        take!(api_key, base_url, timeout, proxy, project, location);
        self.headers.extend(explicit.headers.iter().cloned());
        self
    }

    /// Reject a base URL that is not an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let Some(base) = self.base_url.as_deref() else {
            return Ok(());
        };
        let invalid = |reason: String| {
            Error::configuration_with_context(
                format!("invalid base url `{}`: {}", base, reason),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("provider_config"),
            )
        };
        let url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(invalid(format!("unsupported scheme `{}`", other))),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Base URL without a trailing slash, or `default`.
    pub fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_lookup_reads_prefixed_keys() {
        let vars: HashMap<&str, &str> = [
            ("GROQ_API_KEY", "gsk-test"),
            ("AI_HTTP_TIMEOUT_SECS", "12"),
            ("AI_PROXY_URL", ""),
        ]
        .into_iter()
        .collect();
        let cfg = ProviderConfig::from_lookup("groq", |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(cfg.timeout(), Duration::from_secs(12));
        assert!(cfg.proxy.is_none());
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn test_explicit_values_win() {
        let env = ProviderConfig::new()
            .with_api_key("from-env")
            .with_base_url("https://env.example");
        let explicit = ProviderConfig::new().with_api_key("explicit");
        let merged = env.overlay(&explicit);
        assert_eq!(merged.api_key.as_deref(), Some("explicit"));
        assert_eq!(merged.base_url_or("x"), "https://env.example");
        assert_eq!(merged.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_validate_base_url() {
        assert!(ProviderConfig::new().validate().is_ok());
        assert!(ProviderConfig::new()
            .with_base_url("http://localhost:4000/v1")
            .validate()
            .is_ok());
        let err = ProviderConfig::new()
            .with_base_url("localhost:4000")
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(ProviderConfig::new()
            .with_base_url("not a url")
            .validate()
            .is_err());
    }
}
