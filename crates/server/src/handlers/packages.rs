//! Package endpoints: upload, listing, version chains, rollback, download,
//! delete, and bulk upload.

use crate::error::{ApiError, ApiResult};
use crate::gate::{client_ip, user_agent, AuthenticatedUser};
use crate::registry::{ClientInfo, UploadRequest};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use bytes::Bytes;
use depot_core::APK_CONTENT_TYPE;
use depot_metadata::models::{PackageFilter, PackageListing, PackageRow};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Full view of a package version record.
#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub package_id: Uuid,
    pub name: String,
    pub version: String,
    pub description: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub is_active: bool,
    pub is_rollback: bool,
    pub previous_version_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl From<PackageRow> for PackageResponse {
    fn from(row: PackageRow) -> Self {
        Self {
            package_id: row.package_id,
            name: row.name,
            version: row.version,
            description: row.description,
            original_filename: row.original_filename,
            size_bytes: row.size_bytes,
            content_hash: row.content_hash,
            is_active: row.is_active,
            is_rollback: row.is_rollback,
            previous_version_id: row.previous_version_id,
            uploaded_at: row.uploaded_at,
        }
    }
}

/// Listing entry with uploader and download annotations.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub package_id: Uuid,
    pub name: String,
    pub version: String,
    pub description: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub is_rollback: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub uploader_name: String,
    pub download_count: i64,
}

impl From<PackageListing> for ListingResponse {
    fn from(row: PackageListing) -> Self {
        Self {
            package_id: row.package_id,
            name: row.name,
            version: row.version,
            description: row.description,
            original_filename: row.original_filename,
            size_bytes: row.size_bytes,
            content_hash: row.content_hash,
            is_rollback: row.is_rollback,
            uploaded_at: row.uploaded_at,
            uploader_name: row.uploader_name,
            download_count: row.download_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub hash: String,
}

#[derive(Debug, Serialize)]
pub struct RollbackResponse {
    pub activated_id: Uuid,
    pub package: PackageResponse,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted_id: Uuid,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// One file pulled out of a multipart body.
struct MultipartFile {
    filename: String,
    content_type: Option<String>,
    bytes: Bytes,
}

/// Text fields and files from a multipart body.
#[derive(Default)]
struct MultipartUpload {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    files: Vec<MultipartFile>,
}

async fn read_multipart(mut multipart: Multipart) -> ApiResult<MultipartUpload> {
    let mut upload = MultipartUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "name" => upload.name = Some(read_text(field).await?),
            "version" => upload.version = Some(read_text(field).await?),
            "description" => upload.description = Some(read_text(field).await?),
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("file field needs a filename".to_string()))?;
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?;
                upload.files.push(MultipartFile {
                    filename,
                    content_type,
                    bytes,
                });
            }
            other => {
                return Err(ApiError::BadRequest(format!(
                    "unexpected multipart field '{other}'"
                )));
            }
        }
    }

    Ok(upload)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read field: {e}")))
}

fn require_field(value: Option<String>, name: &str) -> ApiResult<String> {
    value.ok_or_else(|| ApiError::BadRequest(format!("missing field '{name}'")))
}

/// POST /v1/packages - multipart upload of a single APK.
pub async fn upload_package(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let parts = read_multipart(multipart).await?;
    let mut files = parts.files;
    if files.len() != 1 {
        return Err(ApiError::BadRequest(
            "exactly one file is required".to_string(),
        ));
    }
    let file = files.remove(0);

    let row = state
        .registry
        .upload(
            &user.identity,
            UploadRequest {
                name: require_field(parts.name, "name")?,
                version: require_field(parts.version, "version")?,
                description: require_field(parts.description, "description")?,
                original_filename: file.filename,
                content_type: file.content_type,
                bytes: file.bytes,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: row.package_id,
            hash: row.content_hash,
        }),
    ))
}

/// GET /v1/packages - list active packages.
pub async fn list_packages(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ListingResponse>>> {
    let filter = PackageFilter {
        name: query.name,
        version: query.version,
        limit: query.limit,
        offset: query.offset,
    };
    let listings = state.registry.list(&filter).await?;
    Ok(Json(listings.into_iter().map(Into::into).collect()))
}

/// GET /v1/packages/{id}/versions - the package's full version chain.
pub async fn list_versions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(package_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PackageResponse>>> {
    let chain = state.registry.versions(package_id, &user.identity).await?;
    Ok(Json(chain.into_iter().map(Into::into).collect()))
}

/// POST /v1/packages/{id}/rollback
pub async fn rollback_package(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(package_id): Path<Uuid>,
) -> ApiResult<Json<RollbackResponse>> {
    let activated = state.registry.rollback(package_id, &user.identity).await?;
    Ok(Json(RollbackResponse {
        activated_id: activated.package_id,
        package: activated.into(),
    }))
}

/// DELETE /v1/packages/{id}
pub async fn delete_package(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(package_id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.registry.delete(package_id, &user.identity).await?;
    Ok(Json(DeleteResponse {
        deleted_id: deleted.package_id,
        name: deleted.name,
        version: deleted.version,
    }))
}

/// GET /v1/packages/{id}/download - stream the active package's bytes.
pub async fn download_package(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(package_id): Path<Uuid>,
    req: Request,
) -> ApiResult<Response> {
    let client = ClientInfo {
        ip: client_ip(&req),
        user_agent: user_agent(&req),
    };
    let (package, stream) = state
        .registry
        .download(package_id, Some(&user.identity), client)
        .await?;

    // Quotes and backslashes would break the quoted-string disposition value
    let safe_name: String = package
        .original_filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, APK_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, package.size_bytes)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{safe_name}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}

/// Result for one file in a bulk upload.
#[derive(Debug, Serialize)]
pub struct BulkItemResponse {
    pub filename: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BulkUploadResponse {
    pub uploaded: usize,
    pub failed: usize,
    pub results: Vec<BulkItemResponse>,
}

/// POST /v1/packages/bulk - upload several APKs in one request.
///
/// Intentionally not atomic: each file is attempted independently and
/// reported per-item. The package name is derived from each filename;
/// the shared `version` field applies to every file.
pub async fn bulk_upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> ApiResult<Json<BulkUploadResponse>> {
    let parts = read_multipart(multipart).await?;
    if parts.files.is_empty() {
        return Err(ApiError::BadRequest("no files provided".to_string()));
    }
    if parts.files.len() > state.config.server.max_bulk_files {
        return Err(ApiError::BadRequest(format!(
            "too many files: limit is {}",
            state.config.server.max_bulk_files
        )));
    }
    let version = require_field(parts.version, "version")?;
    let description = parts
        .description
        .unwrap_or_else(|| "Bulk upload".to_string());

    let mut results = Vec::with_capacity(parts.files.len());
    for file in parts.files {
        let filename = file.filename.clone();
        let outcome = state
            .registry
            .upload(
                &user.identity,
                UploadRequest {
                    name: derive_package_name(&filename),
                    version: version.clone(),
                    description: description.clone(),
                    original_filename: file.filename,
                    content_type: file.content_type,
                    bytes: file.bytes,
                },
            )
            .await;
        results.push(match outcome {
            Ok(row) => BulkItemResponse {
                filename,
                success: true,
                id: Some(row.package_id),
                hash: Some(row.content_hash),
                error: None,
            },
            Err(e) => BulkItemResponse {
                filename,
                success: false,
                id: None,
                hash: None,
                error: Some(e.to_string()),
            },
        });
    }

    let uploaded = results.iter().filter(|r| r.success).count();
    Ok(Json(BulkUploadResponse {
        uploaded,
        failed: results.len() - uploaded,
        results,
    }))
}

/// Package name from a filename: the stem without the .apk suffix.
fn derive_package_name(filename: &str) -> String {
    let lower = filename.to_ascii_lowercase();
    if let Some(stem_len) = lower.strip_suffix(".apk").map(str::len) {
        filename[..stem_len].to_string()
    } else {
        filename.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_package_name() {
        assert_eq!(derive_package_name("my-app.apk"), "my-app");
        assert_eq!(derive_package_name("My-App.APK"), "My-App");
        assert_eq!(derive_package_name("no-extension"), "no-extension");
    }
}
