//! Provider adapters. Each module holds the provider's settings and the
//! [`Provider`](super::provider::Provider) that turns them into an operator.

pub mod azure;
pub mod memory;
pub mod minio;
pub mod obs;
pub mod oss;

use anyhow::{Result, bail};

/// Prefix `endpoint` with `http://` or `https://` unless it already has a scheme.
pub(crate) fn with_scheme(endpoint: &str, use_ssl: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return endpoint.to_string();
    }
    let scheme = if use_ssl { "https" } else { "http" };
    format!("{scheme}://{endpoint}")
}

pub(crate) fn require(provider: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("storage.{provider}.{field} must be set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_scheme() {
        assert_eq!(with_scheme("minio:9000", false), "http://minio:9000");
        assert_eq!(
            with_scheme("oss-cn-hangzhou.aliyuncs.com", true),
            "https://oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(with_scheme("https://obs.example.com", false), "https://obs.example.com");
    }

    #[test]
    fn test_require_rejects_blank() {
        let err = require("minio", "endpoint", "  ").unwrap_err();
        assert_eq!(err.to_string(), "storage.minio.endpoint must be set");
        assert!(require("minio", "endpoint", "localhost:9000").is_ok());
    }
}
