use serde::Serialize;

use super::collection::Collection;

/// Parsed SWORD service document: protocol capabilities plus deposit targets
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceDocument {
    pub version: Option<String>,
    pub verbose: bool,
    pub no_op: bool,
    /// Largest accepted upload, in kilobytes
    pub max_upload_size: Option<u64>,
    /// Text of the last `title` found outside every collection
    pub repository_name: Option<String>,
    /// Collections in document order
    pub collections: Vec<Collection>,
}

impl ServiceDocument {
    pub fn collection_by_url(&self, url: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.matches_url(url))
    }

    pub fn collection_by_title(&self, title: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.matches_title(title))
    }

    /// Upload limit in bytes, if the server advertised one
    pub fn max_upload_bytes(&self) -> Option<u64> {
        self.max_upload_size.map(|kb| kb.saturating_mul(1024))
    }
}
