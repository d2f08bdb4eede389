use anyhow::Result;
use std::io::ErrorKind;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use file_gateway::{
    app,
    config::AppConfig,
    services::StorageService,
    storage::StorageFactory,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    // --- Logging setup ---
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        "Starting file-gateway: storage={} bucket={} auth={} timeout={:?}",
        cfg.storage.kind,
        cfg.storage.bucket,
        cfg.auth.enabled,
        cfg.operation_timeout()
    );

    // --- Initialize storage backend ---
    let backend = StorageFactory::create(&cfg.storage)?;
    let service = StorageService::new(backend, cfg.storage.bucket.clone(), cfg.operation_timeout());

    // --- Build router ---
    let router = app(&cfg, service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
