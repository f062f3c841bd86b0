use std::fmt;

pub mod sword;

pub use sword::SwordError;

pub type Result<T> = std::result::Result<T, SwordError>;

/// The closed set of failure kinds a caller can observe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid setting, or no usable deposit target
    Configuration,
    /// The server actively refused the TCP connection
    ConnectionRefused,
    /// Timeout, broken pipe or invalid-argument I/O that survived every retry
    TransientTransport,
    /// Excess redirects or a non-success HTTP status
    Protocol,
    /// Malformed service document or response body
    Parse,
}

/// Transient I/O failure classes that the connection retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    BrokenPipe,
    Timeout,
    InvalidInput,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransientKind::BrokenPipe => "broken pipe",
            TransientKind::Timeout => "timeout",
            TransientKind::InvalidInput => "invalid argument",
        };
        f.write_str(label)
    }
}
