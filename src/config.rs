use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, SwordError};
use crate::services::sword::{CollectionSelector, ConnectionOptions, ProxySettings};

/// Every option the client recognises. Unknown keys are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwordConfig {
    pub service_doc_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub on_behalf_of: Option<String>,
    #[serde(default)]
    pub proxy_server: Option<String>,
    #[serde(default)]
    pub proxy_port: Option<u16>,
    #[serde(default)]
    pub proxy_username: Option<String>,
    #[serde(default)]
    pub proxy_password: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub default_collection_url: Option<String>,
    #[serde(default)]
    pub default_collection_name: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl SwordConfig {
    pub fn new<S: Into<String>>(service_doc_url: S) -> Self {
        Self {
            service_doc_url: service_doc_url.into(),
            ..Default::default()
        }
    }

    /// Reads `SWORD_*` variables, after loading a `.env` file if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = SwordConfig {
            service_doc_url: env_var("SWORD_SERVICE_DOC_URL").unwrap_or_default(),
            username: env_var("SWORD_USERNAME"),
            password: env_var("SWORD_PASSWORD"),
            on_behalf_of: env_var("SWORD_ON_BEHALF_OF"),
            proxy_server: env_var("SWORD_PROXY_SERVER"),
            proxy_port: env_parse("SWORD_PROXY_PORT")?,
            proxy_username: env_var("SWORD_PROXY_USERNAME"),
            proxy_password: env_var("SWORD_PROXY_PASSWORD"),
            timeout_seconds: env_parse("SWORD_TIMEOUT_SECONDS")?,
            debug_mode: env_flag("SWORD_DEBUG_MODE")?,
            default_collection_url: env_var("SWORD_DEFAULT_COLLECTION_URL"),
            default_collection_name: env_var("SWORD_DEFAULT_COLLECTION_NAME"),
            accept_invalid_certs: env_flag("SWORD_ACCEPT_INVALID_CERTS")?,
            user_agent: env_var("SWORD_USER_AGENT"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON object of options; unknown keys are a configuration error
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SwordConfig = serde_json::from_str(json)
            .map_err(|e| SwordError::configuration(format!("Invalid SWORD configuration: {}", e)))?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.service_doc_url.trim();
        if url.is_empty() {
            return Err(SwordError::configuration(
                "Service document URL is required but was not set",
            ));
        }

        let parsed = Url::parse(url).map_err(|e| {
            SwordError::configuration(format!(
                "URL for Service Document seems to be an invalid HTTP URL: {} ({})",
                url, e
            ))
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(SwordError::configuration(format!(
                "URL for Service Document seems to be an invalid HTTP URL: {}",
                url
            )));
        }

        let proxy_detail_set = self.proxy_port.is_some()
            || self.proxy_username.is_some()
            || self.proxy_password.is_some();
        if proxy_detail_set && blank(&self.proxy_server) {
            return Err(SwordError::configuration(
                "Proxy port or credentials given without a proxy server",
            ));
        }

        if self.timeout_seconds == Some(0) {
            return Err(SwordError::configuration("Timeout must be greater than zero"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        let proxy = self
            .proxy_server
            .as_deref()
            .filter(|server| !server.trim().is_empty())
            .map(|server| ProxySettings {
                server: server.trim().to_string(),
                port: self.proxy_port,
                username: self.proxy_username.clone(),
                password: self.proxy_password.clone(),
            });

        ConnectionOptions {
            username: self.username.clone(),
            password: self.password.clone(),
            on_behalf_of: self.on_behalf_of.clone(),
            timeout: self.timeout(),
            proxy,
            debug_mode: self.debug_mode,
            accept_invalid_certs: self.accept_invalid_certs,
            user_agent: self.user_agent.clone(),
            ..Default::default()
        }
    }

    pub fn collection_selector(&self) -> CollectionSelector {
        CollectionSelector {
            url: self.default_collection_url.clone(),
            title: self.default_collection_name.clone(),
        }
    }

    /// Blank strings count as unset
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.username,
            &mut self.password,
            &mut self.on_behalf_of,
            &mut self.proxy_server,
            &mut self.proxy_username,
            &mut self.proxy_password,
            &mut self.default_collection_url,
            &mut self.default_collection_name,
            &mut self.user_agent,
        ] {
            if blank(field) {
                *field = None;
            }
        }
        self
    }
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_var(name) {
        Some(value) => value.trim().parse().map(Some).map_err(|_| {
            SwordError::configuration(format!("{} has an invalid value: {}", name, value))
        }),
        None => Ok(None),
    }
}

fn env_flag(name: &str) -> Result<bool> {
    match env_var(name).map(|value| value.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(value) => match value.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(SwordError::configuration(format!(
                "{} must be true or false, got {}",
                name, value
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_reads_every_option() {
        let config = SwordConfig::from_json(
            r#"{
                "service_doc_url": "http://localhost:8080/sword/servicedocument",
                "username": "depositor",
                "password": "secret",
                "proxy_server": "proxy.example.edu",
                "proxy_port": 3128,
                "timeout_seconds": 30,
                "debug_mode": true,
                "default_collection_name": "Theses"
            }"#,
        )
        .unwrap();

        assert_eq!(config.username.as_deref(), Some("depositor"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.debug_mode);

        let options = config.connection_options();
        assert_eq!(options.credentials(), Some(("depositor", "secret")));
        let proxy = options.proxy.unwrap();
        assert_eq!(proxy.proxy_url(), "http://proxy.example.edu:3128");

        assert_eq!(
            config.collection_selector(),
            CollectionSelector::by_title("Theses")
        );
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let err = SwordConfig::from_json(
            r#"{"service_doc_url": "http://localhost/sd", "pasword": "typo"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, SwordError::Configuration { .. }));
        assert!(err.to_string().contains("pasword"));
    }

    #[test]
    fn test_missing_or_invalid_service_document_url() {
        assert!(SwordConfig::default().validate().is_err());
        assert!(SwordConfig::new("   ").validate().is_err());
        assert!(SwordConfig::new("ftp://localhost/sd").validate().is_err());
        assert!(SwordConfig::new("not a url").validate().is_err());
        assert!(SwordConfig::new("https://localhost/sd").validate().is_ok());
    }

    #[test]
    fn test_blank_strings_are_unset() {
        let config = SwordConfig::from_json(
            r#"{"service_doc_url": "http://localhost/sd", "username": "", "proxy_server": "  "}"#,
        )
        .unwrap();
        assert_eq!(config.username, None);
        assert!(config.connection_options().proxy.is_none());
    }

    #[test]
    fn test_proxy_details_need_a_server() {
        let mut config = SwordConfig::new("http://localhost/sd");
        config.proxy_port = Some(8080);
        assert!(config.validate().is_err());

        config.proxy_server = Some("proxy".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let mut config = SwordConfig::new("http://localhost/sd");
        config.timeout_seconds = Some(0);
        assert!(config.validate().is_err());
    }
}
