use thiserror::Error;

use super::{ErrorKind, TransientKind};

/// Errors raised while talking to a SWORD server or interpreting its documents
#[derive(Error, Debug)]
pub enum SwordError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection to SWORD server (path='{path}') was refused! Is it up? Underlying error: {cause}")]
    ConnectionRefused { path: String, cause: String },

    #[error("Transport failure ({kind}) after {attempts} attempts: {message}")]
    Transport {
        kind: TransientKind,
        attempts: u32,
        message: String,
    },

    #[error("HTTP redirection is too deep, cannot retrieve requested path: {url}")]
    RedirectTooDeep { url: String },

    #[error("Redirect response from '{url}' carried no Location header")]
    MissingLocation { url: String },

    #[error("Request to '{url}' failed with HTTP {status}: {body}")]
    HttpStatus { status: u16, url: String, body: String },

    #[error("Request to '{url}' failed: {message}")]
    Request { url: String, message: String },

    #[error("Parse error: {message} (near: {excerpt:?})")]
    Parse { message: String, excerpt: String },
}

impl SwordError {
    /// The error kind this variant belongs to
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwordError::Configuration { .. } => ErrorKind::Configuration,
            SwordError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            SwordError::Transport { .. } => ErrorKind::TransientTransport,
            SwordError::RedirectTooDeep { .. }
            | SwordError::MissingLocation { .. }
            | SwordError::HttpStatus { .. }
            | SwordError::Request { .. } => ErrorKind::Protocol,
            SwordError::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Stable machine-readable code, for logs and callers that branch on it
    pub fn error_code(&self) -> &'static str {
        match self {
            SwordError::Configuration { .. } => "SWORD_CONFIG_INVALID",
            SwordError::ConnectionRefused { .. } => "SWORD_CONNECTION_REFUSED",
            SwordError::Transport { kind, .. } => match kind {
                TransientKind::BrokenPipe => "SWORD_TRANSPORT_BROKEN_PIPE",
                TransientKind::Timeout => "SWORD_TRANSPORT_TIMEOUT",
                TransientKind::InvalidInput => "SWORD_TRANSPORT_INVALID_INPUT",
            },
            SwordError::RedirectTooDeep { .. } => "SWORD_REDIRECT_TOO_DEEP",
            SwordError::MissingLocation { .. } => "SWORD_REDIRECT_NO_LOCATION",
            SwordError::HttpStatus { .. } => "SWORD_HTTP_STATUS",
            SwordError::Request { .. } => "SWORD_REQUEST_FAILED",
            SwordError::Parse { .. } => "SWORD_PARSE_FAILED",
        }
    }

    /// Only transient transport failures are ever retried, and only inside the connection
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwordError::Transport { .. })
    }

    /// HTTP status of the failing response, when the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            SwordError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Convenience methods for creating common SWORD errors
impl SwordError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn connection_refused<S: Into<String>, C: std::fmt::Display>(path: S, cause: C) -> Self {
        Self::ConnectionRefused {
            path: path.into(),
            cause: cause.to_string(),
        }
    }

    pub fn redirect_too_deep<S: Into<String>>(url: S) -> Self {
        Self::RedirectTooDeep { url: url.into() }
    }

    pub fn http_status<S: Into<String>>(status: u16, url: S, body: S) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            body: body.into(),
        }
    }

    /// Builds a parse error, keeping a short window of the input around `position`
    pub fn parse<S: Into<String>>(message: S, input: &str, position: usize) -> Self {
        Self::Parse {
            message: message.into(),
            excerpt: excerpt_around(input, position),
        }
    }
}

const EXCERPT_RADIUS: usize = 40;

fn excerpt_around(input: &str, position: usize) -> String {
    let position = position.min(input.len());
    let mut start = position.saturating_sub(EXCERPT_RADIUS);
    while !input.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (position + EXCERPT_RADIUS).min(input.len());
    while !input.is_char_boundary(end) {
        end += 1;
    }
    input[start..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_onto_closed_set() {
        assert_eq!(SwordError::configuration("x").kind(), ErrorKind::Configuration);
        assert_eq!(
            SwordError::connection_refused("/sd", "refused").kind(),
            ErrorKind::ConnectionRefused
        );
        assert_eq!(SwordError::redirect_too_deep("http://a").kind(), ErrorKind::Protocol);
        assert_eq!(SwordError::http_status(500, "http://a", "boom").kind(), ErrorKind::Protocol);
        assert_eq!(SwordError::parse("bad", "<a>", 1).kind(), ErrorKind::Parse);
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        let transient = SwordError::Transport {
            kind: TransientKind::Timeout,
            attempts: 4,
            message: "timed out".to_string(),
        };
        assert!(transient.is_retryable());
        assert_eq!(transient.error_code(), "SWORD_TRANSPORT_TIMEOUT");
        assert!(!SwordError::connection_refused("/", "no").is_retryable());
        assert!(!SwordError::parse("bad", "", 0).is_retryable());
    }

    #[test]
    fn test_connection_refused_message_names_path_and_cause() {
        let err = SwordError::connection_refused("/sword/servicedocument", "os error 111");
        let message = err.to_string();
        assert!(message.contains("/sword/servicedocument"));
        assert!(message.contains("os error 111"));
    }

    #[test]
    fn test_parse_excerpt_is_bounded_and_char_safe() {
        let input = format!("{}<é broken>{}", "a".repeat(100), "b".repeat(100));
        let err = SwordError::parse("mismatched tag", &input, 101);
        match err {
            SwordError::Parse { excerpt, .. } => {
                assert!(excerpt.contains("é broken"));
                assert!(excerpt.len() <= 2 * EXCERPT_RADIUS + 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_status_only_for_http_errors() {
        assert_eq!(SwordError::http_status(404, "http://a", "").status(), Some(404));
        assert_eq!(SwordError::configuration("x").status(), None);
    }
}
