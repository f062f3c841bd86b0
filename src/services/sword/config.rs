use std::time::Duration;

use crate::errors::{Result, SwordError};

/// Proxy used for every request made by one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub server: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxySettings {
    pub fn new<S: Into<String>>(server: S) -> Self {
        Self {
            server: server.into(),
            port: None,
            username: None,
            password: None,
        }
    }

    /// Proxy URL in the form reqwest expects; a bare host gets an http scheme
    pub fn proxy_url(&self) -> String {
        let server = self.server.trim_end_matches('/');
        let base = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };

        match self.port {
            Some(port) => format!("{}:{}", base, port),
            None => base,
        }
    }
}

/// Retry and redirect limits for one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Additional attempts after the first one fails with a transient error
    pub max_retries: u32,
    /// Redirect hops followed before the next redirect response is an error
    pub max_redirects: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_redirects: 10,
        }
    }
}

/// Options accepted when opening a connection to a SWORD server
#[derive(Debug, Clone, Default)]
pub struct ConnectionOptions {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Identity sent as `On-Behalf-Of` when depositing for another user
    pub on_behalf_of: Option<String>,
    /// Bounds a single attempt; an elapsed timeout is retried
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxySettings>,
    /// Log every request and response line
    pub debug_mode: bool,
    pub accept_invalid_certs: bool,
    pub user_agent: Option<String>,
    pub retry: RetryConfig,
}

impl ConnectionOptions {
    /// Credentials to send, only when both halves are present
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(proxy) = &self.proxy {
            if proxy.server.trim().is_empty() {
                return Err(SwordError::configuration("Proxy server cannot be empty"));
            }
        }

        if matches!(self.timeout, Some(timeout) if timeout.is_zero()) {
            return Err(SwordError::configuration("Timeout must be greater than zero"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_url_adds_scheme_and_port() {
        let mut proxy = ProxySettings::new("proxy.example.edu");
        assert_eq!(proxy.proxy_url(), "http://proxy.example.edu");

        proxy.port = Some(3128);
        assert_eq!(proxy.proxy_url(), "http://proxy.example.edu:3128");

        let https = ProxySettings::new("https://secure-proxy/");
        assert_eq!(https.proxy_url(), "https://secure-proxy");
    }

    #[test]
    fn test_credentials_require_both_halves() {
        let mut options = ConnectionOptions {
            username: Some("sword".to_string()),
            ..Default::default()
        };
        assert_eq!(options.credentials(), None);

        options.password = Some("secret".to_string());
        assert_eq!(options.credentials(), Some(("sword", "secret")));
    }

    #[test]
    fn test_default_limits() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.max_redirects, 10);
    }

    #[test]
    fn test_validate_rejects_blank_proxy_and_zero_timeout() {
        let options = ConnectionOptions {
            proxy: Some(ProxySettings::new("  ")),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = ConnectionOptions {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        assert!(ConnectionOptions::default().validate().is_ok());
    }
}
