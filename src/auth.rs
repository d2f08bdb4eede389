//! API key check for the file routes.
//!
//! The key is read from the `X-API-Key` header, or from the `api_key` query
//! parameter when the header is absent.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::errors::AppError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The set of accepted keys.
#[derive(Debug, Clone)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(keys.into_iter().map(Into::into).collect()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

fn presented_key(request: &Request) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }
    Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(mut params)| params.remove("api_key"))
        .filter(|v| !v.is_empty())
}

/// Middleware rejecting requests without a known API key.
pub async fn require_api_key(
    State(keys): State<ApiKeys>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(key) = presented_key(&request) else {
        return Err(AppError::unauthorized("API key is required"));
    };
    if !keys.contains(&key) {
        debug!("rejected request to {} with unknown API key", request.uri().path());
        return Err(AppError::unauthorized("Invalid API key"));
    }
    Ok(next.run(request).await)
}
