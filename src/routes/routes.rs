//! Defines the HTTP surface of the gateway.
//!
//! ## Structure
//! - **Probes** (never behind auth)
//!   - `GET    /health`: liveness and backend type
//!   - `GET    /readyz`: backend reachability
//!
//! - **File endpoints** (behind the API key check when auth is enabled)
//!   - `POST   /upload/{bucket}/{*object}`: upload, creating the parent directory marker
//!   - `GET    /download/{bucket}/{*object}`: download; `?directory=true` zips the subtree
//!   - `DELETE /delete/{bucket}/{*object}`: delete; `?prefix=true` deletes the subtree
//!   - `GET    /list/{bucket}` and `GET /list/`: list (`?prefix=`, `?directories=true`)
//!   - `HEAD   /info/{bucket}/{*object}`: metadata as headers
//!   - `POST   /mkdir/{bucket}/{*object}`: create a directory marker
//!
//! The wildcard `*object` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    auth::{ApiKeys, require_api_key},
    config::AuthConfig,
    handlers::{
        health_handlers::{health, readyz},
        object_handlers::{
            create_directory, delete_file, download_file, list_default_bucket, list_objects,
            object_info, upload_file,
        },
    },
    services::storage_service::StorageService,
};
use axum::{
    Router, middleware,
    routing::{delete, get, head, post},
};

/// Build the router for every endpoint.
///
/// The router carries shared state (`StorageService`) to all handlers. When
/// `auth.enabled` is set, the file endpoints require one of `auth.api_keys`.
pub fn routes(auth: &AuthConfig) -> Router<StorageService> {
    let files = Router::new()
        .route("/upload/{bucket}/{*object}", post(upload_file))
        .route("/download/{bucket}/{*object}", get(download_file))
        .route("/delete/{bucket}/{*object}", delete(delete_file))
        .route("/list/{bucket}", get(list_objects))
        .route("/list/", get(list_default_bucket))
        .route("/info/{bucket}/{*object}", head(object_info))
        .route("/mkdir/{bucket}/{*object}", post(create_directory));

    let files = if auth.enabled {
        let keys = ApiKeys::new(auth.api_keys.iter().cloned());
        files.route_layer(middleware::from_fn_with_state(keys, require_api_key))
    } else {
        files
    };

    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .merge(files)
}
