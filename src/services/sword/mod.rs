// SWORD client modules organized by layer

pub mod config;
pub mod connection;
pub mod headers;
pub mod repository;
pub mod transport;

// Re-export main types for convenience
pub use config::{ConnectionOptions, ProxySettings, RetryConfig};
pub use connection::{SwordConnection, DEFAULT_USER_AGENT};
pub use headers::{http_post_headers, SwordHeader, WireHeaders, DEFAULT_MIME_TYPE, DEFAULT_PACKAGING};
pub use repository::{CollectionSelector, DepositRequest, Repository};
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, RequestBody, Transport, TransportError,
};

#[cfg(any(test, feature = "test-utils"))]
pub use transport::MockTransport;
