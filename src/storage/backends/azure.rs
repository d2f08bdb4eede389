use anyhow::{Result, bail};
use opendal::Operator;
use opendal::services::Azblob;
use serde::Deserialize;

use crate::storage::contract::BackendKind;
use crate::storage::directory::DirectoryListing;
use crate::storage::provider::Provider;

/// Azure Blob Storage account settings.
///
/// Either `account_name`/`account_key` or a `connection_string` is needed.
/// Values in the connection string win over the separate fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    pub endpoint: String,
    pub account_name: String,
    pub account_key: String,
    pub connection_string: String,
}

/// The parts of an Azure storage connection string this adapter uses.
#[derive(Debug, Default, PartialEq, Eq)]
struct ConnectionString {
    account_name: Option<String>,
    account_key: Option<String>,
    blob_endpoint: Option<String>,
}

impl ConnectionString {
    /// Parse `Key=Value;Key=Value` pairs. Keys are case-insensitive; values may
    /// contain `=` (account keys are base64).
    fn parse(raw: &str) -> Result<Self> {
        let mut parsed = Self::default();
        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                bail!("malformed azure connection string segment `{pair}`");
            };
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => parsed.account_name = Some(value),
                "accountkey" => parsed.account_key = Some(value),
                "blobendpoint" => parsed.blob_endpoint = Some(value),
                _ => {}
            }
        }
        Ok(parsed)
    }
}

pub struct AzureProvider {
    endpoint: String,
    account_name: String,
    account_key: String,
}

impl AzureProvider {
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let conn = if config.connection_string.trim().is_empty() {
            ConnectionString::default()
        } else {
            ConnectionString::parse(&config.connection_string)?
        };

        let account_name = conn
            .account_name
            .unwrap_or_else(|| config.account_name.clone());
        let account_key = conn
            .account_key
            .unwrap_or_else(|| config.account_key.clone());
        if account_name.is_empty() || account_key.is_empty() {
            bail!(
                "azure storage needs storage.azure.account_name and storage.azure.account_key \
                 or a connection string carrying both"
            );
        }

        let endpoint = match conn.blob_endpoint {
            Some(endpoint) => endpoint,
            None if !config.endpoint.is_empty() => config.endpoint.clone(),
            None => format!("https://{account_name}.blob.core.windows.net"),
        };

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            account_name,
            account_key,
        })
    }
}

impl Provider for AzureProvider {
    const KIND: BackendKind = BackendKind::Azure;
    const DIRECTORY_LISTING: DirectoryListing = DirectoryListing::Synthesized;

    fn operator(&self, container: &str) -> opendal::Result<Operator> {
        let builder = Azblob::default()
            .endpoint(&self.endpoint)
            .container(container)
            .account_name(&self.account_name)
            .account_key(&self.account_key);
        Ok(Operator::new(builder)?.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_derived_from_account() {
        let config = AzureConfig {
            account_name: "acme".into(),
            account_key: "a2V5".into(),
            ..Default::default()
        };
        let provider = AzureProvider::new(&config).unwrap();
        assert_eq!(provider.endpoint, "https://acme.blob.core.windows.net");
    }

    #[test]
    fn test_connection_string_overrides_fields() {
        let config = AzureConfig {
            account_name: "ignored".into(),
            connection_string: "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;\
                AccountKey=Eby8vdM02xNO==;BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/;"
                .into(),
            ..Default::default()
        };
        let provider = AzureProvider::new(&config).unwrap();
        assert_eq!(provider.account_name, "devstoreaccount1");
        assert_eq!(provider.account_key, "Eby8vdM02xNO==");
        assert_eq!(provider.endpoint, "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_missing_credentials_fail() {
        let err = AzureProvider::new(&AzureConfig::default()).err().unwrap();
        assert!(err.to_string().contains("account_name"));
    }

    #[test]
    fn test_malformed_connection_string() {
        assert!(ConnectionString::parse("AccountName").is_err());
    }
}
