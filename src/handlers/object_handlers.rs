//! HTTP handlers for file and directory operations.
//! Object bodies are streamed in both directions; storage concerns are
//! delegated to `StorageService`.

use crate::{
    errors::AppError,
    models::object::ObjectRecord,
    services::storage_service::StorageService,
    storage::directory::normalize_directory,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;

/// Query flags accepted by download and delete.
#[derive(Debug, Default, Deserialize)]
pub struct ObjectQuery {
    /// `true` on download: send everything under the path as a zip.
    pub directory: Option<String>,
    /// `true` on delete: remove everything under the path.
    pub prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub prefix: Option<String>,
    /// `true`: list virtual directories instead of objects.
    pub directories: Option<String>,
}

#[derive(Serialize)]
struct ListResponse {
    bucket: String,
    prefix: String,
    objects: Vec<ObjectRecord>,
}

fn flag(value: &Option<String>) -> bool {
    value.as_deref() == Some("true")
}

/// Object keys arrive from the wildcard segment; a single leading `/` is dropped.
fn object_key(raw: &str) -> &str {
    raw.strip_prefix('/').unwrap_or(raw)
}

/// POST `/upload/{bucket}/{*object}`
pub async fn upload_file(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let object = object_key(&object);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let size_hint = match headers.get(header::CONTENT_LENGTH) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| AppError::bad_request("Invalid Content-Length header"))?,
        ),
        None => None,
    };

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    service
        .upload(&bucket, object, stream, size_hint, content_type)
        .await?;

    Ok(Json(json!({
        "message": "File uploaded successfully",
        "bucket": service.resolve_bucket(&bucket),
        "object": object,
    })))
}

/// GET `/download/{bucket}/{*object}`, or a zip of the subtree with `?directory=true`.
pub async fn download_file(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let object = object_key(&object);

    if flag(&q.directory) {
        let stream = service.archive(&bucket, object).await?;
        let mut response = Response::new(Body::from_stream(stream));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/zip"),
        );
        headers.insert(
            header::CONTENT_DISPOSITION,
            archive_disposition(object, service.resolve_bucket(&bucket)),
        );
        return Ok(response);
    }

    let (info, stream) = service.download(&bucket, object).await?;
    let mut response = Response::new(Body::from_stream(stream));
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// DELETE `/delete/{bucket}/{*object}`, or every key under it with `?prefix=true`.
pub async fn delete_file(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
    Query(q): Query<ObjectQuery>,
) -> Result<Response, AppError> {
    let object = object_key(&object);
    let bucket_name = service.resolve_bucket(&bucket).to_string();

    if flag(&q.prefix) {
        let outcome = service.delete_prefix(&bucket, object).await?;
        return Ok(Json(json!({
            "bucket": bucket_name,
            "prefix": object,
            "deleted": outcome.deleted,
            "errors": outcome.errors,
        }))
        .into_response());
    }

    service.delete(&bucket, object).await?;
    Ok(Json(json!({
        "message": "File deleted successfully",
        "bucket": bucket_name,
        "object": object,
    }))
    .into_response())
}

/// GET `/list/{bucket}?prefix=&directories=`
pub async fn list_objects(
    State(service): State<StorageService>,
    Path(bucket): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<impl Serialize>, AppError> {
    list(service, &bucket, q).await
}

/// GET `/list/`: same as `/list/{bucket}` on the default bucket.
pub async fn list_default_bucket(
    State(service): State<StorageService>,
    Query(q): Query<ListQuery>,
) -> Result<Json<impl Serialize>, AppError> {
    list(service, "", q).await
}

async fn list(
    service: StorageService,
    bucket: &str,
    q: ListQuery,
) -> Result<Json<ListResponse>, AppError> {
    let prefix = q.prefix.unwrap_or_default();
    let objects = if flag(&q.directories) {
        service.list_directories(bucket, &prefix).await?
    } else {
        service.list(bucket, &prefix).await?
    };
    Ok(Json(ListResponse {
        bucket: service.resolve_bucket(bucket).to_string(),
        prefix,
        objects,
    }))
}

/// HEAD `/info/{bucket}/{*object}`: metadata as headers, no body.
pub async fn object_info(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let info = service
        .get_object_info(&bucket, object_key(&object))
        .await?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &info);
    Ok(response)
}

/// POST `/mkdir/{bucket}/{*object}`
pub async fn create_directory(
    State(service): State<StorageService>,
    Path((bucket, object)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let object = object_key(&object);
    service.create_directory(&bucket, object).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Directory created successfully",
            "bucket": service.resolve_bucket(&bucket),
            "object": normalize_directory(object),
        })),
    ))
}

fn set_object_headers(headers: &mut HeaderMap, info: &ObjectRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&info.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));

    if let Some(modified) = info.last_modified {
        let http_date = modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }

    for (key, value) in &info.metadata {
        let name = HeaderName::from_bytes(format!("x-meta-{key}").as_bytes());
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
}

/// `attachment; filename="<last segment>.zip"`, falling back to the bucket
/// name at the root.
fn archive_disposition(prefix: &str, bucket: &str) -> HeaderValue {
    let base = prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(bucket);
    HeaderValue::from_str(&format!("attachment; filename=\"{base}.zip\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"archive.zip\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    #[test]
    fn test_object_key_strips_one_slash() {
        assert_eq!(object_key("/a/b.txt"), "a/b.txt");
        assert_eq!(object_key("a/b.txt"), "a/b.txt");
        assert_eq!(object_key("//a"), "/a");
    }

    #[test]
    fn test_archive_disposition() {
        assert_eq!(
            archive_disposition("photos/2025/", "media"),
            "attachment; filename=\"2025.zip\""
        );
        assert_eq!(
            archive_disposition("photos", "media"),
            "attachment; filename=\"photos.zip\""
        );
        assert_eq!(archive_disposition("", "media"), "attachment; filename=\"media.zip\"");
    }

    #[test]
    fn test_object_headers() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let info = ObjectRecord::file("a.txt", 42, Some("text/plain"), Some(ts)).with_metadata(
            HashMap::from([
                ("owner".to_string(), "ops".to_string()),
                ("bad key".to_string(), "dropped".to_string()),
            ]),
        );
        let mut headers = HeaderMap::new();
        set_object_headers(&mut headers, &info);

        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CONTENT_LENGTH], "42");
        assert_eq!(headers[header::LAST_MODIFIED], "Thu, 02 Jan 2025 03:04:05 GMT");
        assert_eq!(headers["x-meta-owner"], "ops");
        assert_eq!(headers.len(), 4);
    }
}
