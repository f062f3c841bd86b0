use std::collections::HashMap;
use std::path::Path;

/// Packaging profile assumed when the caller names none: zipped METS for DSpace
pub const DEFAULT_PACKAGING: &str = "http://purl.org/net/sword-types/METSDSpaceSIP";
pub const DEFAULT_MIME_TYPE: &str = "application/zip";

pub const USER_AGENT: &str = "User-Agent";
pub const ON_BEHALF_OF: &str = "On-Behalf-Of";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
pub const X_PACKAGING: &str = "X-Packaging";
pub const SLUG: &str = "Slug";

/// Caller-facing header keys accepted by `post_file`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwordHeader {
    UserAgent,
    Verbose,
    NoOp,
    Packaging,
    MimeType,
    Md5,
}

impl SwordHeader {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "user_agent" => Some(SwordHeader::UserAgent),
            "verbose" => Some(SwordHeader::Verbose),
            "no_op" => Some(SwordHeader::NoOp),
            "packaging" => Some(SwordHeader::Packaging),
            "mime_type" => Some(SwordHeader::MimeType),
            "md5" => Some(SwordHeader::Md5),
            _ => None,
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            SwordHeader::UserAgent => USER_AGENT,
            SwordHeader::Verbose => "X-Verbose",
            SwordHeader::NoOp => "X-No-Op",
            SwordHeader::Packaging => X_PACKAGING,
            SwordHeader::MimeType => CONTENT_TYPE,
            SwordHeader::Md5 => "Content-MD5",
        }
    }
}

/// Ordered list of wire headers with case-insensitive replacement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireHeaders(Vec<(String, String)>);

impl WireHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a header, replacing any existing value under the same name
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(entry) => entry.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Sets a header only when it is not present yet
    pub fn set_default<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) {
        let name = name.into();
        if !self.contains(&name) {
            self.0.push((name, value.into()));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for WireHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = WireHeaders::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}

/// Translates symbolic keys to wire names and fills in the POST defaults.
/// Unrecognised keys are dropped.
pub fn http_post_headers(headers: &HashMap<String, String>) -> WireHeaders {
    let mut wire = WireHeaders::new();

    // HashMap order is arbitrary; sort so the wire order is stable
    let mut symbols: Vec<_> = headers.iter().collect();
    symbols.sort_by(|a, b| a.0.cmp(b.0));

    for (symbol, value) in symbols {
        if let Some(header) = SwordHeader::from_symbol(symbol) {
            wire.set(header.wire_name(), value.clone());
        }
    }

    wire.set_default(CONTENT_TYPE, DEFAULT_MIME_TYPE);
    wire.set_default(X_PACKAGING, DEFAULT_PACKAGING);
    wire
}

/// `Content-Disposition` value naming the uploaded file
pub fn content_disposition(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| format!("filename={}", name.to_string_lossy()))
}
