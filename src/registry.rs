use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::{error, info, Dispatch};

use crate::client::SwordClient;
use crate::config::SwordConfig;
use crate::errors::{Result, SwordError};
use crate::models::DepositReceipt;

/// Several SWORD servers addressed by name.
///
/// Deposits to more than one server run one after another; a failure on one
/// server does not undo or stop the others.
#[derive(Default)]
pub struct Registry {
    clients: Vec<(String, SwordClient)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds one client per entry of a JSON object keyed by repository name
    pub fn from_json(json: &str, dispatch: Dispatch) -> Result<Self> {
        let configs: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)
            .map_err(|e| SwordError::configuration(format!("Invalid repository list: {}", e)))?;

        let mut registry = Self::new();
        for (name, value) in configs {
            let config = SwordConfig::from_json(&value.to_string()).map_err(|e| {
                SwordError::configuration(format!("Repository '{}': {}", name, e))
            })?;
            registry.insert(name, SwordClient::with_logger(config, dispatch.clone())?)?;
        }
        Ok(registry)
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, client: SwordClient) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SwordError::configuration("Repository name cannot be empty"));
        }
        if self.get(&name).is_some() {
            return Err(SwordError::configuration(format!(
                "Repository '{}' is already configured",
                name
            )));
        }
        self.clients.push((name, client));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SwordClient> {
        self.clients
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, client)| client)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.clients.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn deposit_to(
        &self,
        name: &str,
        file_path: &Path,
        metadata: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> Result<DepositReceipt> {
        let client = self.get(name).ok_or_else(|| {
            SwordError::configuration(format!("No repository named '{}' is configured", name))
        })?;
        client.deposit(file_path, metadata.clone(), headers.clone())
    }

    /// Deposits into every repository, returning each outcome by name
    pub fn deposit_all(
        &self,
        file_path: &Path,
        metadata: &HashMap<String, String>,
        headers: &HashMap<String, String>,
    ) -> Vec<(String, Result<DepositReceipt>)> {
        self.clients
            .iter()
            .map(|(name, client)| {
                let outcome = client.deposit(file_path, metadata.clone(), headers.clone());
                match &outcome {
                    Ok(_) => info!("✅ Deposit into '{}' succeeded", name),
                    Err(e) => error!("❌ Deposit into '{}' failed: {}", name, e),
                }
                (name.clone(), outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::sword::{HttpMethod, HttpResponse, MockTransport, TransportError};
    use std::io::Write;

    fn client_for(deposit_ok: bool) -> SwordClient {
        let mut mock = MockTransport::new();
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Get)
            .returning(|_| {
                Ok(HttpResponse::new(200).with_body(
                    r#"<service><workspace><collection href="http://localhost/deposit"><title>C</title></collection></workspace></service>"#,
                ))
            });
        mock.expect_execute()
            .withf(|request| request.method == HttpMethod::Post)
            .returning(move |_| {
                if deposit_ok {
                    Ok(HttpResponse::new(201).with_body("<entry><id>urn:ok</id></entry>"))
                } else {
                    Err(TransportError::ConnectionRefused("connection refused".to_string()))
                }
            });

        SwordClient::with_transport(
            SwordConfig::new("http://localhost/servicedocument"),
            Dispatch::none(),
            Box::new(mock),
        )
        .unwrap()
    }

    fn package() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"package").unwrap();
        file
    }

    #[test]
    fn test_duplicate_and_blank_names_are_rejected() {
        let mut registry = Registry::new();
        registry.insert("dspace", client_for(true)).unwrap();
        assert!(registry.insert("dspace", client_for(true)).is_err());
        assert!(registry.insert(" ", client_for(true)).is_err());
        assert_eq!(registry.names(), vec!["dspace"]);
    }

    #[test]
    fn test_deposit_to_unknown_name() {
        let registry = Registry::new();
        let file = package();
        let err = registry
            .deposit_to("missing", file.path(), &HashMap::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, SwordError::Configuration { .. }));
    }

    #[test]
    fn test_deposit_all_reports_each_repository() {
        let mut registry = Registry::new();
        registry.insert("first", client_for(true)).unwrap();
        registry.insert("second", client_for(false)).unwrap();

        let file = package();
        let results = registry.deposit_all(file.path(), &HashMap::new(), &HashMap::new());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "first");
        assert_eq!(
            results[0].1.as_ref().ok().and_then(|receipt| receipt.id.as_deref()),
            Some("urn:ok")
        );
        assert_eq!(results[1].0, "second");
        assert!(matches!(
            results[1].1,
            Err(SwordError::ConnectionRefused { .. })
        ));
    }

    #[test]
    fn test_from_json_builds_named_clients() {
        let registry = Registry::from_json(
            r#"{
                "archive": {"service_doc_url": "http://archive.example.edu/sword/servicedocument"},
                "dspace": {"service_doc_url": "https://dspace.example.edu/sword/servicedocument", "username": "u", "password": "p"}
            }"#,
            Dispatch::none(),
        )
        .unwrap();

        assert_eq!(registry.names(), vec!["archive", "dspace"]);
        assert_eq!(
            registry.get("dspace").map(|client| client.config().username.clone()),
            Some(Some("u".to_string()))
        );
    }

    #[test]
    fn test_from_json_rejects_invalid_entry() {
        let result = Registry::from_json(
            r#"{"broken": {"service_doc_url": ""}}"#,
            Dispatch::none(),
        );
        assert!(matches!(result, Err(SwordError::Configuration { .. })));
    }
}
