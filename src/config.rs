use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use serde::Deserialize;
use std::{env, fs, time::Duration};

use crate::storage::{BackendKind, StorageConfig};

/// Centralized application configuration.
///
/// Resolved in order: built-in defaults, optional TOML file, `FILESERVICE_*`
/// environment variables, then CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Deadline for a single storage operation; 0 disables it.
    pub operation_timeout_secs: u64,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            log_level: "info".into(),
            operation_timeout_secs: 300,
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Command-line configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File gateway over MinIO, OSS, OBS and Azure Blob")]
pub struct Args {
    /// TOML config file (overrides FILESERVICE_CONFIG)
    #[arg(long)]
    pub config: Option<String>,

    /// Host to bind to (overrides FILESERVICE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILESERVICE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log filter used when RUST_LOG is unset (overrides FILESERVICE_LOG_LEVEL)
    #[arg(long)]
    pub log_level: Option<String>,

    /// minio, oss, obs, azure or memory (overrides FILESERVICE_STORAGE_TYPE)
    #[arg(long)]
    pub storage_type: Option<String>,

    /// Default bucket (overrides FILESERVICE_STORAGE_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Per-operation deadline in seconds, 0 for none
    /// (overrides FILESERVICE_OPERATION_TIMEOUT_SECS)
    #[arg(long)]
    pub operation_timeout_secs: Option<u64>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();
        Self::load(&args, |key| env::var(key).ok())
    }

    /// Resolve the configuration with `lookup` standing in for the environment.
    pub fn load<F>(args: &Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match args.config.clone().or_else(|| lookup("FILESERVICE_CONFIG")) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        cfg.apply_env(&lookup)?;
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(path: &str) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading config file `{path}`"))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file `{path}`"))
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                *target = value;
            }
        };

        string("FILESERVICE_HOST", &mut self.host);
        string("FILESERVICE_LOG_LEVEL", &mut self.log_level);
        if let Some(value) = lookup("FILESERVICE_PORT") {
            self.port = value
                .parse()
                .with_context(|| format!("parsing FILESERVICE_PORT value `{value}`"))?;
        }
        if let Some(value) = lookup("FILESERVICE_OPERATION_TIMEOUT_SECS") {
            self.operation_timeout_secs = value.parse().with_context(|| {
                format!("parsing FILESERVICE_OPERATION_TIMEOUT_SECS value `{value}`")
            })?;
        }

        if let Some(value) = lookup("FILESERVICE_AUTH_ENABLED") {
            self.auth.enabled = parse_bool("FILESERVICE_AUTH_ENABLED", &value)?;
        }
        if let Some(value) = lookup("FILESERVICE_AUTH_API_KEYS") {
            self.auth.api_keys = value
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect();
        }

        let storage = &mut self.storage;
        if let Some(value) = lookup("FILESERVICE_STORAGE_TYPE") {
            storage.kind = parse_kind(&value)?;
        }
        string("FILESERVICE_STORAGE_BUCKET", &mut storage.bucket);

        string("FILESERVICE_MINIO_ENDPOINT", &mut storage.minio.endpoint);
        string("FILESERVICE_MINIO_ACCESS_KEY", &mut storage.minio.access_key);
        string("FILESERVICE_MINIO_SECRET_KEY", &mut storage.minio.secret_key);
        string("FILESERVICE_MINIO_REGION", &mut storage.minio.region);
        if let Some(value) = lookup("FILESERVICE_MINIO_USE_SSL") {
            storage.minio.use_ssl = parse_bool("FILESERVICE_MINIO_USE_SSL", &value)?;
        }

        string("FILESERVICE_OSS_ENDPOINT", &mut storage.oss.endpoint);
        string("FILESERVICE_OSS_ACCESS_KEY", &mut storage.oss.access_key);
        string("FILESERVICE_OSS_SECRET_KEY", &mut storage.oss.secret_key);
        if let Some(value) = lookup("FILESERVICE_OSS_USE_SSL") {
            storage.oss.use_ssl = parse_bool("FILESERVICE_OSS_USE_SSL", &value)?;
        }

        string("FILESERVICE_OBS_ENDPOINT", &mut storage.obs.endpoint);
        string("FILESERVICE_OBS_ACCESS_KEY", &mut storage.obs.access_key);
        string("FILESERVICE_OBS_SECRET_KEY", &mut storage.obs.secret_key);
        if let Some(value) = lookup("FILESERVICE_OBS_USE_SSL") {
            storage.obs.use_ssl = parse_bool("FILESERVICE_OBS_USE_SSL", &value)?;
        }

        string("FILESERVICE_AZURE_ENDPOINT", &mut storage.azure.endpoint);
        string("FILESERVICE_AZURE_ACCOUNT_NAME", &mut storage.azure.account_name);
        string("FILESERVICE_AZURE_ACCOUNT_KEY", &mut storage.azure.account_key);
        string(
            "FILESERVICE_AZURE_CONNECTION_STRING",
            &mut storage.azure.connection_string,
        );

        Ok(())
    }

    fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(level) = &args.log_level {
            self.log_level = level.clone();
        }
        if let Some(kind) = &args.storage_type {
            self.storage.kind = parse_kind(kind)?;
        }
        if let Some(bucket) = &args.bucket {
            self.storage.bucket = bucket.clone();
        }
        if let Some(secs) = args.operation_timeout_secs {
            self.operation_timeout_secs = secs;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("port must be between 1 and 65535");
        }
        if self.storage.bucket.trim().is_empty() {
            bail!("storage.bucket must not be empty");
        }
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            bail!("auth is enabled but no api_keys are configured");
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }
}

fn parse_kind(value: &str) -> Result<BackendKind> {
    value.parse::<BackendKind>().map_err(|msg| anyhow!(msg))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("parsing {key} value `{value}`: expected true or false"),
    }
}
