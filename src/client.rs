use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::{dispatcher, info, Dispatch};

use crate::config::SwordConfig;
use crate::errors::{Result, SwordError};
use crate::models::{Collection, DepositReceipt, FeedItem, ServiceDocument};
use crate::services::sword::{
    DepositRequest, HttpResponse, Repository, SwordConnection, Transport,
};

/// Entry point for depositing packages into one SWORD server.
///
/// The connection and repository are built on first use and then reused for
/// the lifetime of the client. Log events go to the injected dispatcher, which
/// discards everything unless one is supplied.
pub struct SwordClient {
    config: SwordConfig,
    dispatch: Dispatch,
    transport: Mutex<Option<Box<dyn Transport>>>,
    repository: OnceLock<Repository>,
}

impl SwordClient {
    pub fn new(config: SwordConfig) -> Result<Self> {
        Self::build(config, Dispatch::none(), None)
    }

    pub fn with_logger(config: SwordConfig, dispatch: Dispatch) -> Result<Self> {
        Self::build(config, dispatch, None)
    }

    /// Uses `transport` instead of the reqwest one when the connection is built
    pub fn with_transport(
        config: SwordConfig,
        dispatch: Dispatch,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        Self::build(config, dispatch, Some(transport))
    }

    fn build(
        config: SwordConfig,
        dispatch: Dispatch,
        transport: Option<Box<dyn Transport>>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dispatch,
            transport: Mutex::new(transport),
            repository: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &SwordConfig {
        &self.config
    }

    pub fn connection(&self) -> Result<Arc<SwordConnection>> {
        self.logged(|| Ok(Arc::clone(self.repository()?.connection())))
    }

    /// Posts a file and returns the raw response.
    ///
    /// With `deposit_url` of `None` the file goes to the default collection.
    pub fn post_file(
        &self,
        file_path: &Path,
        deposit_url: Option<&str>,
        headers: &HashMap<String, String>,
    ) -> Result<HttpResponse> {
        self.logged(|| {
            let repository = self.repository()?;
            // Only an absent URL falls back; a blank one is rejected by the connection
            let target = match deposit_url {
                Some(url) => url.to_string(),
                None => self
                    .default_collection_inner()?
                    .and_then(|collection| collection.deposit_url)
                    .ok_or_else(no_deposit_target)?,
            };

            repository.connection().post_file(file_path, &target, headers)
        })
    }

    /// Deposits a file into the default collection and parses the receipt
    pub fn deposit(
        &self,
        file_path: &Path,
        metadata: HashMap<String, String>,
        headers: HashMap<String, String>,
    ) -> Result<DepositReceipt> {
        self.logged(|| {
            let collection = self
                .default_collection_inner()?
                .filter(|collection| collection.deposit_url.is_some())
                .ok_or_else(no_deposit_target)?;

            info!(
                "📦 Depositing {} into {:?}",
                file_path.display(),
                collection.title
            );

            let request = DepositRequest::new(collection, file_path)
                .with_metadata(metadata)
                .with_headers(headers);
            self.repository()?.deposit(&request)
        })
    }

    /// Deposits into a specific collection, bypassing default selection
    pub fn deposit_into(&self, request: &DepositRequest) -> Result<DepositReceipt> {
        self.logged(|| self.repository()?.deposit(request))
    }

    pub fn service_document(&self) -> Result<Arc<ServiceDocument>> {
        self.logged(|| self.repository()?.fetch())
    }

    pub fn collections(&self) -> Result<Vec<Collection>> {
        self.logged(|| self.repository()?.collections())
    }

    pub fn repository_name(&self) -> Result<Option<String>> {
        self.logged(|| self.repository()?.name())
    }

    pub fn default_collection(&self) -> Result<Option<Collection>> {
        self.logged(|| self.default_collection_inner())
    }

    pub fn collection_items(&self, collection: &Collection) -> Result<Vec<FeedItem>> {
        self.logged(|| self.repository()?.collection_items(collection))
    }

    /// Drops the cached service document and fetches it again
    pub fn refresh(&self) -> Result<Arc<ServiceDocument>> {
        self.logged(|| self.repository()?.refresh())
    }

    fn default_collection_inner(&self) -> Result<Option<Collection>> {
        self.repository()?
            .default_collection(&self.config.collection_selector())
    }

    fn repository(&self) -> Result<&Repository> {
        if let Some(repository) = self.repository.get() {
            return Ok(repository);
        }

        let options = self.config.connection_options();
        let injected = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let connection = match injected {
            Some(transport) => {
                SwordConnection::with_transport(&self.config.service_doc_url, options, transport)?
            }
            None => SwordConnection::new(&self.config.service_doc_url, options)?,
        };

        info!("🔗 Connecting to SWORD server at {}", connection.authority());
        Ok(self
            .repository
            .get_or_init(|| Repository::new(Arc::new(connection))))
    }

    fn logged<T>(&self, operation: impl FnOnce() -> Result<T>) -> Result<T> {
        dispatcher::with_default(&self.dispatch, operation)
    }
}

fn no_deposit_target() -> SwordError {
    SwordError::configuration("File could not be posted: no deposit URL or default collection")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sword::{HttpMethod, MockTransport, RequestBody};
    use mockall::Sequence;
    use std::io::Write;

    const SERVICE_URL: &str = "http://localhost:8080/sword/servicedocument";
    const DEPOSIT_URL: &str = "http://localhost:8080/sword/deposit/7";

    fn service_document(collections: &str) -> String {
        format!(
            r#"<service xmlns="http://www.w3.org/2007/app" xmlns:atom="http://www.w3.org/2005/Atom">
  <workspace><atom:title>Test Repository</atom:title>{}</workspace>
</service>"#,
            collections
        )
    }

    fn one_collection() -> String {
        service_document(&format!(
            r#"<collection href="{}"><atom:title>Only</atom:title></collection>"#,
            DEPOSIT_URL
        ))
    }

    fn package() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("example")
            .suffix(".zip")
            .tempfile()
            .unwrap();
        file.write_all(b"PK\x03\x04 not really a zip").unwrap();
        file
    }

    #[test]
    fn test_construction_requires_service_document_url() {
        let err = SwordClient::new(SwordConfig::new("")).err().unwrap();
        assert!(matches!(err, SwordError::Configuration { .. }));
    }

    #[test]
    fn test_construction_does_not_touch_network() {
        let mut mock = MockTransport::new();
        mock.expect_execute().never();

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock));
        assert!(client.is_ok());
    }

    #[test]
    fn test_post_file_to_default_collection() {
        let file = package();
        let mut seq = Sequence::new();
        let mut mock = MockTransport::new();

        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|request| request.method == HttpMethod::Get && request.url == SERVICE_URL)
            .returning(|_| Ok(HttpResponse::new(200).with_body(one_collection())));

        mock.expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == DEPOSIT_URL
                    && request.header("Content-Type") == Some("application/zip")
                    && request.header("X-Packaging")
                        == Some("http://purl.org/net/sword-types/METSDSpaceSIP")
                    && request
                        .header("Content-Disposition")
                        .map_or(false, |value| value.starts_with("filename=example"))
                    && matches!(request.body, RequestBody::File(_))
            })
            .returning(|_| Ok(HttpResponse::new(201).with_body("<entry/>")));

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock))
                .unwrap();
        let response = client.post_file(file.path(), None, &HashMap::new()).unwrap();
        assert_eq!(response.status, 201);
    }

    #[test]
    fn test_post_file_with_explicit_url_skips_service_document() {
        let file = package();
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .times(1)
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "http://localhost:8080/sword/deposit/other"
            })
            .returning(|_| Ok(HttpResponse::new(201)));

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock))
                .unwrap();
        client
            .post_file(
                file.path(),
                Some("http://localhost:8080/sword/deposit/other"),
                &HashMap::new(),
            )
            .unwrap();
    }

    #[test]
    fn test_post_file_with_blank_url_is_rejected_without_network() {
        let file = package();
        let mut mock = MockTransport::new();
        mock.expect_execute().never();

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock))
                .unwrap();

        for blank in ["", "   "] {
            let err = client
                .post_file(file.path(), Some(blank), &HashMap::new())
                .unwrap_err();
            assert!(matches!(err, SwordError::Configuration { .. }));
            assert!(err.to_string().contains("no deposit URL"));
        }
    }

    #[test]
    fn test_post_file_without_collections_is_configuration_error() {
        let file = package();
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .times(1)
            .withf(|request| request.method == HttpMethod::Get)
            .returning(|_| Ok(HttpResponse::new(200).with_body(service_document(""))));

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock))
                .unwrap();
        let err = client.post_file(file.path(), None, &HashMap::new()).unwrap_err();

        assert!(matches!(err, SwordError::Configuration { .. }));
        assert!(err.to_string().contains("no deposit URL or default collection"));
    }

    #[test]
    fn test_deposit_returns_receipt_for_named_collection() {
        let file = package();
        let mut mock = MockTransport::new();
        let document = service_document(
            r#"<collection href="http://localhost:8080/sword/deposit/1"><atom:title>Articles</atom:title></collection>
               <collection href="http://localhost:8080/sword/deposit/2"><atom:title>Theses</atom:title></collection>"#,
        );

        mock.expect_execute()
            .times(1)
            .withf(|request| request.method == HttpMethod::Get)
            .returning(move |_| Ok(HttpResponse::new(200).with_body(document.clone())));
        mock.expect_execute()
            .times(1)
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "http://localhost:8080/sword/deposit/2"
            })
            .returning(|_| {
                Ok(HttpResponse::new(201).with_body(
                    r#"<entry xmlns="http://www.w3.org/2005/Atom"><title>Thesis</title><id>hdl:2/1</id></entry>"#,
                ))
            });

        let mut config = SwordConfig::new(SERVICE_URL);
        config.default_collection_name = Some("theses".to_string());

        let client = SwordClient::with_transport(config, Dispatch::none(), Box::new(mock)).unwrap();
        let receipt = client
            .deposit(file.path(), HashMap::new(), HashMap::new())
            .unwrap();

        assert_eq!(receipt.id.as_deref(), Some("hdl:2/1"));
        assert_eq!(client.repository_name().unwrap().as_deref(), Some("Test Repository"));
    }

    #[test]
    fn test_connection_is_built_once() {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200).with_body(one_collection())));

        let client =
            SwordClient::with_transport(SwordConfig::new(SERVICE_URL), Dispatch::none(), Box::new(mock))
                .unwrap();

        let first = client.connection().unwrap();
        let second = client.connection().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert_eq!(client.collections().unwrap().len(), 1);
        assert_eq!(client.collections().unwrap().len(), 1);
    }
}
