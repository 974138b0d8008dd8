//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Users
// =============================================================================

/// Account record. Accounts are deactivated, never hard-deleted.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    /// Opaque credential for the external read-only API.
    pub api_key: String,
    pub created_at: OffsetDateTime,
    pub last_login_at: Option<OffsetDateTime>,
}

// =============================================================================
// Packages
// =============================================================================

/// Package version record.
///
/// `previous_version_id` forms a singly linked chain per (user_id, name),
/// newest first. At most one record per chain has `is_active` set; the
/// partial unique index idx_packages_active backs that invariant.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub package_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// Free-text version label. Labels are not semantically ordered;
    /// chain order comes from upload time.
    pub version: String,
    pub description: String,
    /// Blob store key for the stored bytes.
    pub stored_filename: String,
    pub original_filename: String,
    pub size_bytes: i64,
    /// Hex-encoded sha256 of the stored bytes.
    pub content_hash: String,
    pub is_active: bool,
    pub is_rollback: bool,
    pub previous_version_id: Option<Uuid>,
    pub uploaded_at: OffsetDateTime,
}

/// Fields the caller supplies for a new package version.
///
/// `previous_version_id` and the active/rollback flags are resolved inside
/// the create transaction, not by the caller.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub package_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub version: String,
    pub description: String,
    pub stored_filename: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub uploaded_at: OffsetDateTime,
}

/// Active package annotated with uploader name and download count for listings.
#[derive(Debug, Clone, FromRow)]
pub struct PackageListing {
    pub package_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub version: String,
    pub description: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub is_rollback: bool,
    pub uploaded_at: OffsetDateTime,
    pub uploader_name: String,
    pub download_count: i64,
}

/// Filters for the active package listing.
#[derive(Debug, Clone, Default)]
pub struct PackageFilter {
    /// Substring match on package name.
    pub name: Option<String>,
    /// Substring match on version label.
    pub version: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

// =============================================================================
// Download analytics
// =============================================================================

/// Append-only download event. Never mutated after insert.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadEventRow {
    pub event_id: Uuid,
    pub package_id: Uuid,
    /// None for anonymous external (api-key) downloads.
    pub user_id: Option<Uuid>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub downloaded_at: OffsetDateTime,
    pub success: bool,
    pub bytes_served: i64,
}

/// Download event joined with package and downloader names for reporting.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadEventDetail {
    pub event_id: Uuid,
    pub package_id: Uuid,
    pub package_name: String,
    pub package_version: String,
    pub downloader_name: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub downloaded_at: OffsetDateTime,
    pub success: bool,
    pub bytes_served: i64,
}

/// Filters for the download event report.
#[derive(Debug, Clone, Default)]
pub struct DownloadFilter {
    pub package_id: Option<Uuid>,
    pub since: Option<OffsetDateTime>,
    pub until: Option<OffsetDateTime>,
    pub limit: i64,
}

// =============================================================================
// Access log
// =============================================================================

/// Append-only audit row for external API requests.
#[derive(Debug, Clone, FromRow)]
pub struct AccessLogRow {
    pub entry_id: Uuid,
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub method: String,
    pub status: i64,
    pub latency_ms: i64,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub logged_at: OffsetDateTime,
}
