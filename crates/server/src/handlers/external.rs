//! External API surface, authenticated with per-user API keys.
//!
//! Requests through these routes are recorded in the access log by
//! the route-level middleware in `routes`.

use crate::error::ApiResult;
use crate::gate::AuthenticatedUser;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use depot_metadata::models::{PackageFilter, PackageListing};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct ExternalListQuery {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub limit: i64,
}

/// Reduced listing shape for integrators. No ids, no uploader details.
#[derive(Debug, Serialize)]
pub struct ExternalPackageResponse {
    pub name: String,
    pub version: String,
    pub size_bytes: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
    pub download_count: i64,
}

impl From<PackageListing> for ExternalPackageResponse {
    fn from(row: PackageListing) -> Self {
        Self {
            name: row.name,
            version: row.version,
            size_bytes: row.size_bytes,
            uploaded_at: row.uploaded_at,
            download_count: row.download_count,
        }
    }
}

/// GET /v1/external/packages
pub async fn list_packages(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ExternalListQuery>,
) -> ApiResult<Json<Vec<ExternalPackageResponse>>> {
    user.require_api_key()?;

    let filter = PackageFilter {
        name: query.name,
        version: query.version,
        limit: query.limit,
        offset: 0,
    };
    let listings = state.registry.list(&filter).await?;
    Ok(Json(listings.into_iter().map(Into::into).collect()))
}
