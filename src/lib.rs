//! File gateway: one upload/download/list/delete API over MinIO, Aliyun OSS,
//! Huawei OBS and Azure Blob, with virtual directories and zip downloads of
//! whole subtrees.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod storage;

use axum::Router;

use config::AppConfig;
use services::StorageService;

/// Assemble the application router with its state attached.
pub fn app(config: &AppConfig, service: StorageService) -> Router {
    routes::routes::routes(&config.auth).with_state(service)
}
