use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::collection::PropertyValue;

/// What the server reports back about a successful deposit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepositReceipt {
    pub title: Option<String>,
    /// Identifier the repository assigned to the new item
    pub id: Option<String>,
    /// `src` of the entry's `content` element
    pub content_src: Option<String>,
    /// `href` of every `link` element, in document order
    pub links: Vec<String>,
    pub rights: Option<String>,
    pub server_name: Option<String>,
    pub server_uri: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    /// Every entry-level field with namespace declarations removed
    pub fields: BTreeMap<String, PropertyValue>,
}

impl DepositReceipt {
    pub fn field(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.get(name)
    }
}

/// One entry of a collection's Atom feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: Option<String>,
    pub link: Option<String>,
    pub updated: Option<String>,
    pub authors: Vec<String>,
}

impl FeedItem {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.link.is_none() && self.updated.is_none() && self.authors.is_empty()
    }
}
