//! Wire-level HTTP exchange
//!
//! [`Transport`] performs exactly one HTTP exchange and classifies failures;
//! retries and redirects live in [`super::connection::SwordConnection`].

use std::error::Error as StdError;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::blocking::{Body, Client};
use reqwest::{redirect, Method, Proxy};
use tracing::debug;

use super::config::ConnectionOptions;
use crate::errors::{Result, SwordError, TransientKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn to_reqwest(self) -> Method {
        match self {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Request payload. Files are opened afresh for every attempt and streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    pub basic_auth: Option<(String, String)>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirection(&self) -> bool {
        (300..400).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure of a single exchange, classified for the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    ConnectionRefused(String),
    Transient { kind: TransientKind, message: String },
    /// The file to upload could not be opened for this attempt
    FileUnavailable { path: PathBuf, message: String },
    Other(String),
}

impl TransportError {
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            kind: TransientKind::Timeout,
            message: message.into(),
        }
    }
}

/// Performs one HTTP exchange without following redirects
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// Blocking reqwest transport. Proxy and TLS settings are fixed once built.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(options: &ConnectionOptions) -> Result<Self> {
        // The blocking client otherwise cuts every request off after 30s;
        // only the per-request timeout from the options applies
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(None);

        if let Some(proxy_settings) = &options.proxy {
            let mut proxy = Proxy::all(proxy_settings.proxy_url()).map_err(|e| {
                SwordError::configuration(format!(
                    "Invalid proxy '{}': {}",
                    proxy_settings.server, e
                ))
            })?;
            if let (Some(username), Some(password)) =
                (&proxy_settings.username, &proxy_settings.password)
            {
                proxy = proxy.basic_auth(username, password);
            }
            debug!("Routing SWORD requests through proxy {}", proxy_settings.proxy_url());
            builder = builder.proxy(proxy);
        }

        if options.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|e| {
            SwordError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.to_reqwest(), &request.url);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some((username, password)) = &request.basic_auth {
            builder = builder.basic_auth(username, Some(password));
        }

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::File(path) => {
                let unavailable = |e: io::Error| TransportError::FileUnavailable {
                    path: path.clone(),
                    message: e.to_string(),
                };
                let file = File::open(path).map_err(unavailable)?;
                let length = file.metadata().map_err(unavailable)?.len();
                builder.body(Body::sized(file, length))
            }
        };

        let response = builder.send().map_err(|e| classify_error(&e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().map_err(|e| classify_error(&e))?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Maps a reqwest failure onto the retry classes
pub fn classify_error(err: &reqwest::Error) -> TransportError {
    if let Some(io_error) = find_io_error(err) {
        if let Some(classified) = classify_io_kind(io_error.kind(), err.to_string()) {
            return classified;
        }
    }

    if err.is_timeout() {
        return TransportError::timeout(err.to_string());
    }

    TransportError::Other(err.to_string())
}

fn classify_io_kind(kind: io::ErrorKind, message: String) -> Option<TransportError> {
    let transient = match kind {
        io::ErrorKind::ConnectionRefused => return Some(TransportError::ConnectionRefused(message)),
        io::ErrorKind::BrokenPipe => TransientKind::BrokenPipe,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransientKind::Timeout,
        io::ErrorKind::InvalidInput => TransientKind::InvalidInput,
        _ => return None,
    };
    Some(TransportError::Transient {
        kind: transient,
        message,
    })
}

fn find_io_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut source = err.source();
    while let Some(current) = source {
        if let Some(io_error) = current.downcast_ref::<io::Error>() {
            return Some(io_error);
        }
        source = current.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds_map_to_retry_classes() {
        assert_eq!(
            classify_io_kind(io::ErrorKind::ConnectionRefused, "refused".to_string()),
            Some(TransportError::ConnectionRefused("refused".to_string()))
        );
        assert!(matches!(
            classify_io_kind(io::ErrorKind::BrokenPipe, String::new()),
            Some(TransportError::Transient { kind: TransientKind::BrokenPipe, .. })
        ));
        assert!(matches!(
            classify_io_kind(io::ErrorKind::TimedOut, String::new()),
            Some(TransportError::Transient { kind: TransientKind::Timeout, .. })
        ));
        assert!(matches!(
            classify_io_kind(io::ErrorKind::InvalidInput, String::new()),
            Some(TransportError::Transient { kind: TransientKind::InvalidInput, .. })
        ));
        assert_eq!(classify_io_kind(io::ErrorKind::PermissionDenied, String::new()), None);
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::new(302).with_header("location", "/next");
        assert!(response.is_redirection());
        assert!(!response.is_success());
        assert_eq!(response.header("Location"), Some("/next"));

        let ok = HttpResponse::new(201).with_body("<entry/>");
        assert!(ok.is_success());
        assert_eq!(ok.text(), "<entry/>");
    }

    #[test]
    fn test_request_header_lookup_ignores_case() {
        let request = HttpRequest {
            method: HttpMethod::Post,
            url: "http://localhost/deposit".to_string(),
            headers: vec![("Content-Type".to_string(), "application/zip".to_string())],
            body: RequestBody::Empty,
            basic_auth: None,
            timeout: None,
        };
        assert_eq!(request.header("content-type"), Some("application/zip"));
        assert_eq!(request.header("X-Packaging"), None);
    }

    #[test]
    fn test_transport_builds_with_proxy() {
        let options = ConnectionOptions {
            proxy: Some(super::super::config::ProxySettings {
                server: "proxy.example.edu".to_string(),
                port: Some(8080),
                username: Some("proxyuser".to_string()),
                password: Some("proxypass".to_string()),
            }),
            ..Default::default()
        };
        assert!(ReqwestTransport::new(&options).is_ok());
    }
}
