//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AccessLogRepo, AnalyticsRepo, PackageRepo, UserRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: UserRepo + PackageRepo + AnalyticsRepo + AccessLogRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; using a single connection avoids
            // persistent "database is locked" failures under test/axum concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(db_path = %path.display(), "SQLite metadata store ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Map a unique index violation to `AlreadyExists`, passing other errors through.
fn map_unique(err: sqlx::Error, what: &str) -> MetadataError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MetadataError::AlreadyExists(what.to_string())
        }
        _ => MetadataError::Database(err),
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(&self, user: &UserRow) -> MetadataResult<()> {
            if self
                .get_user_by_username(&user.username)
                .await?
                .is_some()
            {
                return Err(MetadataError::AlreadyExists(format!(
                    "username '{}' already exists",
                    user.username
                )));
            }
            if self.get_user_by_email(&user.email).await?.is_some() {
                return Err(MetadataError::AlreadyExists(format!(
                    "email '{}' already exists",
                    user.email
                )));
            }

            sqlx::query(
                "INSERT INTO users (user_id, username, email, password_hash, role, is_active, api_key, created_at, last_login_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(user.user_id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .bind(user.is_active)
            .bind(&user.api_key)
            .bind(user.created_at)
            .bind(user.last_login_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, "user"))?;
            Ok(())
        }

        async fn get_user(&self, user_id: Uuid) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_email(&self, email: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user_by_api_key(&self, api_key: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE api_key = ?")
                .bind(api_key)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn touch_last_login(
            &self,
            user_id: Uuid,
            logged_in_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query("UPDATE users SET last_login_at = ? WHERE user_id = ?")
                .bind(logged_in_at)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageRow> {
            let mut tx = self.pool.begin().await?;

            // Re-check uniqueness inside the transaction; the unique index on
            // (user_id, name, version) backs this against races.
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM packages WHERE user_id = ? AND name = ? AND version = ?)",
            )
            .bind(package.user_id)
            .bind(&package.name)
            .bind(&package.version)
            .fetch_one(&mut *tx)
            .await?;
            if exists {
                return Err(MetadataError::AlreadyExists(format!(
                    "package '{}' version '{}'",
                    package.name, package.version
                )));
            }

            // The most recent record for (owner, name) becomes the predecessor.
            let predecessor = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE user_id = ? AND name = ? \
                 ORDER BY uploaded_at DESC, rowid DESC LIMIT 1",
            )
            .bind(package.user_id)
            .bind(&package.name)
            .fetch_optional(&mut *tx)
            .await?;

            // Deactivate before inserting the new active row; the partial
            // unique index idx_packages_active is enforced per statement.
            if let Some(ref prev) = predecessor {
                sqlx::query("UPDATE packages SET is_active = 0 WHERE package_id = ?")
                    .bind(prev.package_id)
                    .execute(&mut *tx)
                    .await?;
                tracing::debug!(
                    package_id = %package.package_id,
                    predecessor_id = %prev.package_id,
                    "Deactivated predecessor for new package version"
                );
            }

            let previous_version_id = predecessor.map(|p| p.package_id);
            sqlx::query(
                "INSERT INTO packages (package_id, user_id, name, version, description, \
                 stored_filename, original_filename, size_bytes, content_hash, \
                 is_active, is_rollback, previous_version_id, uploaded_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?)",
            )
            .bind(package.package_id)
            .bind(package.user_id)
            .bind(&package.name)
            .bind(&package.version)
            .bind(&package.description)
            .bind(&package.stored_filename)
            .bind(&package.original_filename)
            .bind(package.size_bytes)
            .bind(&package.content_hash)
            .bind(previous_version_id)
            .bind(package.uploaded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                map_unique(
                    e,
                    &format!("package '{}' version '{}'", package.name, package.version),
                )
            })?;

            tx.commit().await?;

            Ok(PackageRow {
                package_id: package.package_id,
                user_id: package.user_id,
                name: package.name.clone(),
                version: package.version.clone(),
                description: package.description.clone(),
                stored_filename: package.stored_filename.clone(),
                original_filename: package.original_filename.clone(),
                size_bytes: package.size_bytes,
                content_hash: package.content_hash.clone(),
                is_active: true,
                is_rollback: false,
                previous_version_id,
                uploaded_at: package.uploaded_at,
            })
        }

        async fn get_package(&self, package_id: Uuid) -> MetadataResult<Option<PackageRow>> {
            let row =
                sqlx::query_as::<_, PackageRow>("SELECT * FROM packages WHERE package_id = ?")
                    .bind(package_id)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn find_version(
            &self,
            user_id: Uuid,
            name: &str,
            version: &str,
        ) -> MetadataResult<Option<PackageRow>> {
            let row = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE user_id = ? AND name = ? AND version = ?",
            )
            .bind(user_id)
            .bind(name)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_active(
            &self,
            filter: &PackageFilter,
        ) -> MetadataResult<Vec<PackageListing>> {
            let name_pattern = like_pattern(filter.name.as_deref());
            let version_pattern = like_pattern(filter.version.as_deref());
            let limit = if filter.limit > 0 {
                filter.limit.min(500)
            } else {
                50
            };
            let offset = filter.offset.max(0);

            let rows = sqlx::query_as::<_, PackageListing>(
                "SELECT p.package_id, p.user_id, p.name, p.version, p.description, \
                        p.original_filename, p.size_bytes, p.content_hash, p.is_rollback, \
                        p.uploaded_at, u.username AS uploader_name, \
                        (SELECT COUNT(*) FROM download_events e \
                         WHERE e.package_id = p.package_id AND e.success = 1) AS download_count \
                 FROM packages p \
                 JOIN users u ON u.user_id = p.user_id \
                 WHERE p.is_active = 1 AND p.name LIKE ? AND p.version LIKE ? \
                 ORDER BY p.uploaded_at DESC, p.rowid DESC \
                 LIMIT ? OFFSET ?",
            )
            .bind(name_pattern)
            .bind(version_pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_chain(&self, user_id: Uuid, name: &str) -> MetadataResult<Vec<PackageRow>> {
            let rows = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE user_id = ? AND name = ? \
                 ORDER BY uploaded_at DESC, rowid DESC",
            )
            .bind(user_id)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn rollback_package(&self, package_id: Uuid) -> MetadataResult<PackageRow> {
            let mut tx = self.pool.begin().await?;

            let target = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE package_id = ?",
            )
            .bind(package_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("package {package_id}")))?;

            let prev_id = target
                .previous_version_id
                .ok_or_else(|| MetadataError::NoPredecessor(package_id.to_string()))?;

            // Deactivate the chain's current active record before activating the
            // predecessor; the partial unique index is enforced per statement.
            sqlx::query(
                "UPDATE packages SET is_active = 0 WHERE user_id = ? AND name = ? AND is_active = 1",
            )
            .bind(target.user_id)
            .bind(&target.name)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE packages SET is_rollback = 1, is_active = 0 WHERE package_id = ?",
            )
            .bind(package_id)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query("UPDATE packages SET is_active = 1 WHERE package_id = ?")
                .bind(prev_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::Internal(format!(
                    "previous version {prev_id} missing for package {package_id}"
                )));
            }

            let predecessor = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE package_id = ?",
            )
            .bind(prev_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(predecessor)
        }

        async fn delete_package(&self, package_id: Uuid) -> MetadataResult<PackageRow> {
            let mut tx = self.pool.begin().await?;

            let victim = sqlx::query_as::<_, PackageRow>(
                "SELECT * FROM packages WHERE package_id = ?",
            )
            .bind(package_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("package {package_id}")))?;

            // Re-link successors to the victim's own predecessor so non-tail
            // deletes never orphan the chain.
            sqlx::query(
                "UPDATE packages SET previous_version_id = ? WHERE previous_version_id = ?",
            )
            .bind(victim.previous_version_id)
            .bind(victim.package_id)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM packages WHERE package_id = ?")
                .bind(victim.package_id)
                .execute(&mut *tx)
                .await?;

            // If the victim was the active record, the most recent survivor
            // takes its place.
            if victim.is_active {
                let survivor = sqlx::query_as::<_, PackageRow>(
                    "SELECT * FROM packages WHERE user_id = ? AND name = ? \
                     ORDER BY uploaded_at DESC, rowid DESC LIMIT 1",
                )
                .bind(victim.user_id)
                .bind(&victim.name)
                .fetch_optional(&mut *tx)
                .await?;
                if let Some(survivor) = survivor {
                    sqlx::query("UPDATE packages SET is_active = 1 WHERE package_id = ?")
                        .bind(survivor.package_id)
                        .execute(&mut *tx)
                        .await?;
                    tracing::debug!(
                        deleted_id = %victim.package_id,
                        activated_id = %survivor.package_id,
                        name = %victim.name,
                        "Deleted active package version, reactivated survivor"
                    );
                }
            }

            tx.commit().await?;
            Ok(victim)
        }
    }

    #[async_trait]
    impl AnalyticsRepo for SqliteStore {
        async fn record_download(&self, event: &DownloadEventRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO download_events (event_id, package_id, user_id, client_ip, \
                 user_agent, downloaded_at, success, bytes_served) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(event.event_id)
            .bind(event.package_id)
            .bind(event.user_id)
            .bind(&event.client_ip)
            .bind(&event.user_agent)
            .bind(event.downloaded_at)
            .bind(event.success)
            .bind(event.bytes_served)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_downloads(
            &self,
            filter: &DownloadFilter,
        ) -> MetadataResult<Vec<DownloadEventDetail>> {
            let limit = if filter.limit > 0 {
                filter.limit.min(1000)
            } else {
                100
            };

            let rows = sqlx::query_as::<_, DownloadEventDetail>(
                "SELECT e.event_id, e.package_id, p.name AS package_name, \
                        p.version AS package_version, u.username AS downloader_name, \
                        e.client_ip, e.user_agent, e.downloaded_at, e.success, e.bytes_served \
                 FROM download_events e \
                 JOIN packages p ON p.package_id = e.package_id \
                 LEFT JOIN users u ON u.user_id = e.user_id \
                 WHERE (?1 IS NULL OR e.package_id = ?1) \
                   AND (?2 IS NULL OR e.downloaded_at >= ?2) \
                   AND (?3 IS NULL OR e.downloaded_at <= ?3) \
                 ORDER BY e.downloaded_at DESC, e.rowid DESC \
                 LIMIT ?4",
            )
            .bind(filter.package_id)
            .bind(filter.since)
            .bind(filter.until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl AccessLogRepo for SqliteStore {
        async fn append_access(&self, entry: &AccessLogRow) -> MetadataResult<()> {
            sqlx::query(
                "INSERT INTO access_log (entry_id, user_id, endpoint, method, status, \
                 latency_ms, client_ip, user_agent, logged_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.entry_id)
            .bind(entry.user_id)
            .bind(&entry.endpoint)
            .bind(&entry.method)
            .bind(entry.status)
            .bind(entry.latency_ms)
            .bind(&entry.client_ip)
            .bind(&entry.user_agent)
            .bind(entry.logged_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn list_access(&self, limit: i64) -> MetadataResult<Vec<AccessLogRow>> {
            let limit = if limit > 0 { limit.min(1000) } else { 100 };
            let rows = sqlx::query_as::<_, AccessLogRow>(
                "SELECT * FROM access_log ORDER BY logged_at DESC, rowid DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    /// Substring LIKE pattern; None matches everything.
    fn like_pattern(filter: Option<&str>) -> String {
        match filter {
            Some(f) => format!("%{f}%"),
            None => "%".to_string(),
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Accounts. Deactivated, never hard-deleted.
CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user',
    is_active INTEGER NOT NULL DEFAULT 1,
    api_key TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    last_login_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
CREATE INDEX IF NOT EXISTS idx_users_api_key ON users(api_key);

-- Package versions. previous_version_id links each record to its predecessor
-- in the (user_id, name) chain; no FOREIGN KEY on it because delete re-links
-- successors inside the same transaction.
CREATE TABLE IF NOT EXISTS packages (
    package_id BLOB PRIMARY KEY,
    user_id BLOB NOT NULL REFERENCES users(user_id),
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    stored_filename TEXT NOT NULL UNIQUE,
    original_filename TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_rollback INTEGER NOT NULL DEFAULT 0,
    previous_version_id BLOB,
    uploaded_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_owner_name_version ON packages(user_id, name, version);
-- At most one active record per (owner, name) chain (partial unique index)
CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_active ON packages(user_id, name) WHERE is_active = 1;
CREATE INDEX IF NOT EXISTS idx_packages_chain ON packages(user_id, name, uploaded_at);
CREATE INDEX IF NOT EXISTS idx_packages_prev ON packages(previous_version_id);

-- Download events, append-only. No FOREIGN KEY on package_id: the history
-- outlives the package record.
CREATE TABLE IF NOT EXISTS download_events (
    event_id BLOB PRIMARY KEY,
    package_id BLOB NOT NULL,
    user_id BLOB,
    client_ip TEXT,
    user_agent TEXT,
    downloaded_at TEXT NOT NULL,
    success INTEGER NOT NULL DEFAULT 1,
    bytes_served INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_download_events_package ON download_events(package_id, downloaded_at);
CREATE INDEX IF NOT EXISTS idx_download_events_time ON download_events(downloaded_at);

-- External API access log, append-only
CREATE TABLE IF NOT EXISTS access_log (
    entry_id BLOB PRIMARY KEY,
    user_id BLOB,
    endpoint TEXT NOT NULL,
    method TEXT NOT NULL,
    status INTEGER NOT NULL,
    latency_ms INTEGER NOT NULL,
    client_ip TEXT,
    user_agent TEXT,
    logged_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_access_log_time ON access_log(logged_at);
"#;
