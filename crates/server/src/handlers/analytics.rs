//! Download analytics, admin only.

use crate::error::{ApiError, ApiResult};
use crate::gate::AuthenticatedUser;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use depot_metadata::models::{DownloadEventDetail, DownloadFilter};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DownloadsQuery {
    pub package_id: Option<Uuid>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DownloadEventResponse {
    pub event_id: Uuid,
    pub package_id: Uuid,
    pub package_name: String,
    pub package_version: String,
    pub downloader_name: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub downloaded_at: OffsetDateTime,
    pub success: bool,
    pub bytes_served: i64,
}

impl From<DownloadEventDetail> for DownloadEventResponse {
    fn from(row: DownloadEventDetail) -> Self {
        Self {
            event_id: row.event_id,
            package_id: row.package_id,
            package_name: row.package_name,
            package_version: row.package_version,
            downloader_name: row.downloader_name,
            client_ip: row.client_ip,
            user_agent: row.user_agent,
            downloaded_at: row.downloaded_at,
            success: row.success,
            bytes_served: row.bytes_served,
        }
    }
}

fn parse_time(value: Option<String>, field: &str) -> ApiResult<Option<OffsetDateTime>> {
    match value {
        None => Ok(None),
        Some(s) => OffsetDateTime::parse(&s, &Rfc3339)
            .map(Some)
            .map_err(|_| {
                ApiError::BadRequest(format!("'{field}' must be an RFC 3339 timestamp"))
            }),
    }
}

/// GET /v1/analytics/downloads
pub async fn list_downloads(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DownloadsQuery>,
) -> ApiResult<Json<Vec<DownloadEventResponse>>> {
    user.require_admin()?;

    let filter = DownloadFilter {
        package_id: query.package_id,
        since: parse_time(query.since, "since")?,
        until: parse_time(query.until, "until")?,
        limit: query.limit.unwrap_or(0),
    };
    let events = state.metadata.list_downloads(&filter).await?;
    Ok(Json(events.into_iter().map(Into::into).collect()))
}
