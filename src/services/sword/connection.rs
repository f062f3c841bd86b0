use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use super::config::ConnectionOptions;
use super::headers::{
    content_disposition, http_post_headers, WireHeaders, CONTENT_DISPOSITION, CONTENT_TYPE,
    DEFAULT_MIME_TYPE, DEFAULT_PACKAGING, ON_BEHALF_OF, USER_AGENT, X_PACKAGING,
};
use super::transport::{
    HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport,
    TransportError,
};
use crate::errors::{Result, SwordError};

pub const DEFAULT_USER_AGENT: &str = concat!("sword-client/", env!("CARGO_PKG_VERSION"));

/// Connection to one SWORD server, identified by its service document URL.
///
/// Every verb resolves transient failures (up to `max_retries` extra attempts,
/// no delay) and redirects (up to `max_redirects` hops) before returning.
/// Not meant for concurrent use from several call sites.
pub struct SwordConnection {
    url: Url,
    options: ConnectionOptions,
    transport: Box<dyn Transport>,
}

impl SwordConnection {
    /// Prepares a connection without contacting the server
    pub fn new(service_doc_url: &str, options: ConnectionOptions) -> Result<Self> {
        let transport = ReqwestTransport::new(&options)?;
        Self::with_transport(service_doc_url, options, Box::new(transport))
    }

    pub fn with_transport(
        service_doc_url: &str,
        options: ConnectionOptions,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let url = Url::parse(service_doc_url.trim()).map_err(|e| {
            SwordError::configuration(format!(
                "URL for Service Document seems to be an invalid HTTP URL: {} ({})",
                service_doc_url, e
            ))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SwordError::configuration(format!(
                "URL for Service Document seems to be an invalid HTTP URL: {}",
                service_doc_url
            )));
        }

        options.validate()?;

        debug!(
            "Prepared SWORD connection to {} (auth: {}, proxy: {})",
            url,
            options.credentials().is_some(),
            options.proxy.is_some()
        );

        Ok(Self {
            url,
            options,
            transport,
        })
    }

    /// Service document URL this connection was opened for
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` of the service document URL
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn set_credentials(&mut self, username: Option<String>, password: Option<String>) {
        self.options.username = username;
        self.options.password = password;
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.options.timeout = timeout;
    }

    /// Fetches the service document body. Sends a new request on every call.
    pub fn service_document(&self) -> Result<String> {
        let url = self.url.to_string();
        let response = self.get(&url, &WireHeaders::new())?;
        Ok(response.text())
    }

    pub fn get(&self, url: &str, headers: &WireHeaders) -> Result<HttpResponse> {
        self.do_request(HttpMethod::Get, url, RequestBody::Empty, headers)
    }

    pub fn post(&self, body: RequestBody, url: &str, headers: &WireHeaders) -> Result<HttpResponse> {
        self.do_request(HttpMethod::Post, url, body, headers)
    }

    pub fn put(&self, body: RequestBody, url: &str, headers: &WireHeaders) -> Result<HttpResponse> {
        self.do_request(HttpMethod::Put, url, body, headers)
    }

    pub fn delete(&self, url: &str, headers: &WireHeaders) -> Result<HttpResponse> {
        self.do_request(HttpMethod::Delete, url, RequestBody::Empty, headers)
    }

    /// Posts a local file to a collection's deposit URL.
    ///
    /// `headers` uses the symbolic keys `user_agent`, `verbose`, `no_op`,
    /// `packaging`, `mime_type` and `md5`; anything else is ignored.
    pub fn post_file(
        &self,
        file_path: &Path,
        deposit_url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse> {
        self.post_file_with_headers(file_path, deposit_url, http_post_headers(headers))
    }

    /// Same as [`post_file`](Self::post_file) with headers already in wire form
    pub fn post_file_with_headers(
        &self,
        file_path: &Path,
        deposit_url: &str,
        mut headers: WireHeaders,
    ) -> Result<HttpResponse> {
        if !file_path.is_file() {
            return Err(SwordError::configuration(format!(
                "Could not find file at {}",
                file_path.display()
            )));
        }

        if deposit_url.trim().is_empty() {
            return Err(SwordError::configuration(format!(
                "File '{}' could not be posted via SWORD as no deposit URL was specified",
                file_path.display()
            )));
        }

        headers.set_default(CONTENT_TYPE, DEFAULT_MIME_TYPE);
        headers.set_default(X_PACKAGING, DEFAULT_PACKAGING);
        if let Some(disposition) = content_disposition(file_path) {
            headers.set_default(CONTENT_DISPOSITION, disposition);
        }

        info!(
            "Posting {} to {} as {}",
            file_path.display(),
            deposit_url,
            headers.get(X_PACKAGING).unwrap_or(DEFAULT_PACKAGING)
        );

        self.post(
            RequestBody::File(file_path.to_path_buf()),
            deposit_url,
            &headers,
        )
    }

    /// Follows redirects, re-issuing the same verb, body and headers
    fn do_request(
        &self,
        method: HttpMethod,
        url: &str,
        body: RequestBody,
        headers: &WireHeaders,
    ) -> Result<HttpResponse> {
        let mut current = self.resolve(url)?;
        let mut remaining = self.options.retry.max_redirects;

        loop {
            let response = self.request(method, &current, &body, headers)?;

            if response.is_success() {
                return Ok(response);
            }

            if response.is_redirection() {
                if remaining == 0 {
                    return Err(SwordError::redirect_too_deep(current.as_str()));
                }

                let location = response.header("Location").ok_or_else(|| {
                    SwordError::MissingLocation {
                        url: current.to_string(),
                    }
                })?;
                let next = current.join(location).map_err(|e| SwordError::Request {
                    url: current.to_string(),
                    message: format!("invalid redirect location '{}': {}", location, e),
                })?;

                remaining -= 1;
                debug!(
                    "Following {} redirect {} -> {} ({} hops left)",
                    response.status, current, next, remaining
                );
                current = next;
                continue;
            }

            return Err(SwordError::http_status(
                response.status,
                current.as_str(),
                response.text().trim(),
            ));
        }
    }

    /// One logical request, retried on transient I/O failure
    fn request(
        &self,
        method: HttpMethod,
        url: &Url,
        body: &RequestBody,
        headers: &WireHeaders,
    ) -> Result<HttpResponse> {
        let request = self.build_request(method, url, body, headers);
        let max_attempts = self.options.retry.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if self.options.debug_mode {
                info!("-> {} {} (attempt {}/{})", method.as_str(), url, attempt, max_attempts);
                for (name, value) in &request.headers {
                    info!("-> {}: {}", name, value);
                }
            }

            match self.transport.execute(&request) {
                Ok(response) => {
                    if self.options.debug_mode {
                        info!("<- {} {} ({} bytes)", response.status, url, response.body.len());
                    }
                    return Ok(response);
                }
                Err(TransportError::Transient { kind, message }) => {
                    if attempt >= max_attempts {
                        return Err(SwordError::Transport {
                            kind,
                            attempts: attempt,
                            message,
                        });
                    }
                    warn!(
                        "{} {} failed ({}): {}, retrying (attempt {}/{})",
                        method.as_str(),
                        url,
                        kind,
                        message,
                        attempt + 1,
                        max_attempts
                    );
                }
                Err(TransportError::ConnectionRefused(cause)) => {
                    return Err(SwordError::connection_refused(url.as_str(), cause));
                }
                Err(TransportError::FileUnavailable { path, message }) => {
                    return Err(SwordError::configuration(format!(
                        "Could not open file at {}: {}",
                        path.display(),
                        message
                    )));
                }
                Err(TransportError::Other(message)) => {
                    return Err(SwordError::Request {
                        url: url.to_string(),
                        message,
                    });
                }
            }
        }
    }

    fn build_request(
        &self,
        method: HttpMethod,
        url: &Url,
        body: &RequestBody,
        headers: &WireHeaders,
    ) -> HttpRequest {
        let mut headers = headers.clone();
        headers.set_default(
            USER_AGENT,
            self.options
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        );
        if let Some(identity) = &self.options.on_behalf_of {
            headers.set_default(ON_BEHALF_OF, identity.clone());
        }

        HttpRequest {
            method,
            url: url.to_string(),
            headers: headers.into_vec(),
            body: body.clone(),
            basic_auth: self
                .options
                .credentials()
                .filter(|_| self.same_authority(url))
                .map(|(username, password)| (username.to_string(), password.to_string())),
            timeout: self.options.timeout,
        }
    }

    /// Credentials are only sent to the host and port of the service document
    fn same_authority(&self, url: &Url) -> bool {
        url.host_str() == self.url.host_str()
            && url.port_or_known_default() == self.url.port_or_known_default()
    }

    /// Absolute URLs pass through; relative ones resolve against the service document URL
    fn resolve(&self, url: &str) -> Result<Url> {
        self.url.join(url.trim()).map_err(|e| {
            SwordError::configuration(format!("Invalid request URL '{}': {}", url, e))
        })
    }
}
