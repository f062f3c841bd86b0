use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::{debug, info, warn};

use super::connection::SwordConnection;
use super::headers::{http_post_headers, WireHeaders, CONTENT_DISPOSITION, SLUG, X_PACKAGING};
use crate::errors::{Result, SwordError};
use crate::models::{Collection, DepositReceipt, FeedItem, ServiceDocument};
use crate::sword_xml_parser::{parse_deposit_receipt, parse_feed, parse_service_document};

/// Metadata key sent as the `Slug` header
pub const METADATA_SLUG: &str = "slug";
/// Metadata key overriding the filename in `Content-Disposition`
pub const METADATA_FILENAME: &str = "filename";

/// How the default collection is picked from a service document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSelector {
    pub url: Option<String>,
    pub title: Option<String>,
}

impl CollectionSelector {
    pub fn by_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            title: None,
        }
    }

    pub fn by_title<S: Into<String>>(title: S) -> Self {
        Self {
            url: None,
            title: Some(title.into()),
        }
    }

    /// Picks a collection in document order.
    ///
    /// A URL selector, when given, is the only one consulted; the title is
    /// used only without one. With no match the first collection is returned.
    pub fn select<'a>(&self, document: &'a ServiceDocument) -> Option<&'a Collection> {
        let url = self.url.as_deref().filter(|url| !url.trim().is_empty());
        let title = self.title.as_deref().filter(|title| !title.trim().is_empty());

        let selected = match (url, title) {
            (Some(url), _) => document.collection_by_url(url),
            (None, Some(title)) => document.collection_by_title(title),
            (None, None) => None,
        };

        selected.or_else(|| document.collections.first())
    }
}

/// One package going to one collection
#[derive(Debug, Clone)]
pub struct DepositRequest {
    pub collection: Collection,
    pub file_path: PathBuf,
    pub metadata: HashMap<String, String>,
    /// Symbolic header overrides, see [`http_post_headers`]
    pub headers: HashMap<String, String>,
}

impl DepositRequest {
    pub fn new<P: Into<PathBuf>>(collection: Collection, file_path: P) -> Self {
        Self {
            collection,
            file_path: file_path.into(),
            metadata: HashMap::new(),
            headers: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    fn wire_headers(&self) -> WireHeaders {
        let mut headers = http_post_headers(&self.headers);

        if let Some(slug) = non_blank(self.metadata.get(METADATA_SLUG)) {
            headers.set(SLUG, slug);
        }
        if let Some(filename) = non_blank(self.metadata.get(METADATA_FILENAME)) {
            headers.set(CONTENT_DISPOSITION, format!("filename={}", filename));
        }

        for key in self.metadata.keys() {
            if key != METADATA_SLUG && key != METADATA_FILENAME {
                debug!("Metadata '{}' is left to the packager", key);
            }
        }

        headers
    }
}

/// Service document retrieval, collection selection and deposits against one server
pub struct Repository {
    connection: Arc<SwordConnection>,
    cache: ArcSwapOption<ServiceDocument>,
}

impl Repository {
    pub fn new(connection: Arc<SwordConnection>) -> Self {
        Self {
            connection,
            cache: ArcSwapOption::empty(),
        }
    }

    pub fn connection(&self) -> &Arc<SwordConnection> {
        &self.connection
    }

    /// Cached service document, if one was fetched already
    pub fn cached(&self) -> Option<Arc<ServiceDocument>> {
        self.cache.load_full()
    }

    /// Returns the cached service document, fetching it on first use
    pub fn fetch(&self) -> Result<Arc<ServiceDocument>> {
        match self.cached() {
            Some(document) => Ok(document),
            None => self.refresh(),
        }
    }

    /// Fetches and parses the service document again, replacing the cached one
    pub fn refresh(&self) -> Result<Arc<ServiceDocument>> {
        info!("📄 Retrieving service document from {}", self.connection.url());
        let body = self.connection.service_document()?;
        let document = Arc::new(parse_service_document(&body)?);

        info!(
            "✅ Service document lists {} collection(s)",
            document.collections.len()
        );

        self.cache.store(Some(Arc::clone(&document)));
        Ok(document)
    }

    pub fn collections(&self) -> Result<Vec<Collection>> {
        Ok(self.fetch()?.collections.clone())
    }

    pub fn name(&self) -> Result<Option<String>> {
        Ok(self.fetch()?.repository_name.clone())
    }

    pub fn default_collection(&self, selector: &CollectionSelector) -> Result<Option<Collection>> {
        let document = self.fetch()?;
        let selected = selector.select(&document).cloned();

        match &selected {
            Some(collection) => debug!(
                "Default collection: {} ({:?})",
                collection.deposit_url.as_deref().unwrap_or("<no href>"),
                collection.title
            ),
            None => warn!("Service document has no collections"),
        }

        Ok(selected)
    }

    /// Posts the package and parses the Atom entry the server answers with
    pub fn deposit(&self, request: &DepositRequest) -> Result<DepositReceipt> {
        let deposit_url = request
            .collection
            .deposit_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                SwordError::configuration(format!(
                    "Collection {:?} has no deposit URL",
                    request.collection.title
                ))
            })?;

        self.check_upload_size(&request.file_path)?;

        let headers = request.wire_headers();
        if let Some(packaging) = headers.get(X_PACKAGING) {
            if !request.collection.accept_packaging.is_empty()
                && !request.collection.accepts_packaging(packaging)
            {
                warn!(
                    "Collection {} does not advertise packaging {}",
                    deposit_url, packaging
                );
            }
        }

        let response = self
            .connection
            .post_file_with_headers(&request.file_path, deposit_url, headers)?;

        let receipt = parse_deposit_receipt(&response.text())?;
        info!(
            "✅ Deposited {} into {} (id: {})",
            request.file_path.display(),
            deposit_url,
            receipt.id.as_deref().unwrap_or("unknown")
        );
        Ok(receipt)
    }

    /// Lists the items already deposited in a collection
    pub fn collection_items(&self, collection: &Collection) -> Result<Vec<FeedItem>> {
        let deposit_url = collection
            .deposit_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| SwordError::configuration("Collection has no deposit URL to list"))?;

        let response = self.connection.get(deposit_url, &WireHeaders::new())?;
        parse_feed(&response.text())
    }

    /// Compares the package size against the cached document's `maxUploadSize`
    fn check_upload_size(&self, file_path: &Path) -> Result<()> {
        let Some(limit) = self.cached().and_then(|document| document.max_upload_bytes()) else {
            return Ok(());
        };

        // A missing file is reported by the connection
        let Ok(metadata) = std::fs::metadata(file_path) else {
            return Ok(());
        };

        if metadata.len() > limit {
            return Err(SwordError::configuration(format!(
                "File {} is {} bytes, larger than the server's maxUploadSize of {} bytes",
                file_path.display(),
                metadata.len(),
                limit
            )));
        }

        Ok(())
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}
