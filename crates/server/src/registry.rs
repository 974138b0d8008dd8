//! Versioning service: keeps package blobs and metadata rows consistent.
//!
//! Every job here orchestrates the blob store and the metadata store so that
//! no row exists without its blob and no blob without its row, with the
//! metadata store's transactions holding the chain invariants.

use crate::error::{ApiError, ApiResult};
use bytes::Bytes;
use depot_core::filename::StoredFilename;
use depot_core::hash::ContentHash;
use depot_core::identity::Identity;
use depot_core::APK_CONTENT_TYPE;
use depot_metadata::models::{
    DownloadEventRow, NewPackage, PackageFilter, PackageListing, PackageRow,
};
use depot_metadata::{MetadataError, MetadataStore};
use depot_storage::{ByteStream, ObjectStore, StorageError};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// A validated upload request.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub original_filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Per-request client metadata for download accounting.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// The versioning service.
pub struct Registry {
    storage: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    max_upload_bytes: u64,
}

impl Registry {
    /// Create a new registry over the given stores.
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            storage,
            metadata,
            max_upload_bytes,
        }
    }

    /// Upload a new package version for `owner`.
    ///
    /// Validates the request, fast-fails duplicates before any blob write,
    /// stores the blob, then inserts the row in one metadata transaction.
    /// A metadata failure rolls the blob back best-effort.
    pub async fn upload(&self, owner: &Identity, req: UploadRequest) -> ApiResult<PackageRow> {
        self.validate(&req)?;

        // Fast-fail duplicates so an obviously duplicate upload writes no blob.
        // The unique index re-checks inside the create transaction.
        if self
            .metadata
            .find_version(owner.user_id, &req.name, &req.version)
            .await?
            .is_some()
        {
            return Err(ApiError::DuplicateVersion(format!(
                "'{}' version '{}' already exists",
                req.name, req.version
            )));
        }

        let content_hash = ContentHash::compute(&req.bytes).to_hex();
        let stored = StoredFilename::generate(&req.original_filename);
        let size_bytes = req.bytes.len() as i64;

        self.storage.put(stored.as_str(), req.bytes).await?;

        let new_package = NewPackage {
            package_id: Uuid::new_v4(),
            user_id: owner.user_id,
            name: req.name,
            version: req.version,
            description: req.description,
            stored_filename: stored.as_str().to_string(),
            original_filename: req.original_filename,
            size_bytes,
            content_hash,
            uploaded_at: OffsetDateTime::now_utc(),
        };

        match self.metadata.create_package(&new_package).await {
            Ok(row) => {
                tracing::info!(
                    package_id = %row.package_id,
                    name = %row.name,
                    version = %row.version,
                    owner = %owner.username,
                    "package uploaded"
                );
                Ok(row)
            }
            Err(e) => {
                // Do not leave an orphaned blob behind
                if let Err(del) = self.storage.delete(stored.as_str()).await {
                    tracing::warn!(
                        key = %stored,
                        error = %del,
                        "failed to clean up blob after metadata failure"
                    );
                }
                Err(match e {
                    MetadataError::AlreadyExists(msg) => ApiError::DuplicateVersion(msg),
                    other => ApiError::Metadata(other),
                })
            }
        }
    }

    /// List active packages.
    pub async fn list(&self, filter: &PackageFilter) -> ApiResult<Vec<PackageListing>> {
        Ok(self.metadata.list_active(filter).await?)
    }

    /// All records in the package's (owner, name) chain, newest first.
    /// Restricted to the owner and admins.
    pub async fn versions(&self, package_id: Uuid, caller: &Identity) -> ApiResult<Vec<PackageRow>> {
        let package = self.get_authorized(package_id, caller).await?;
        Ok(self
            .metadata
            .list_chain(package.user_id, &package.name)
            .await?)
    }

    /// Roll a package back to its predecessor. Returns the activated record.
    pub async fn rollback(&self, package_id: Uuid, caller: &Identity) -> ApiResult<PackageRow> {
        self.get_authorized(package_id, caller).await?;

        let activated = self
            .metadata
            .rollback_package(package_id)
            .await
            .map_err(|e| match e {
                MetadataError::NoPredecessor(_) => ApiError::NoPreviousVersion,
                other => ApiError::Metadata(other),
            })?;
        tracing::info!(
            package_id = %package_id,
            activated_id = %activated.package_id,
            "package rolled back"
        );
        Ok(activated)
    }

    /// Delete a package record and its blob. Returns the deleted record.
    pub async fn delete(&self, package_id: Uuid, caller: &Identity) -> ApiResult<PackageRow> {
        self.get_authorized(package_id, caller).await?;

        let deleted = self.metadata.delete_package(package_id).await?;

        // A missing blob is logged, not fatal: the row is already gone
        match self.storage.delete(&deleted.stored_filename).await {
            Ok(()) => {}
            Err(StorageError::NotFound(_)) => {
                tracing::warn!(
                    package_id = %package_id,
                    key = %deleted.stored_filename,
                    "blob already missing at delete time"
                );
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(package_id = %package_id, "package deleted");
        Ok(deleted)
    }

    /// Stream an active package's bytes and account the download.
    ///
    /// Only active records resolve; inactive chain members are `NotFound`.
    /// Event accounting is fire-and-forget: a failure is logged, never
    /// surfaced to the downloader.
    pub async fn download(
        &self,
        package_id: Uuid,
        caller: Option<&Identity>,
        client: ClientInfo,
    ) -> ApiResult<(PackageRow, ByteStream)> {
        let package = self
            .metadata
            .get_package(package_id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| ApiError::NotFound(format!("package {package_id}")))?;

        let stream = self
            .storage
            .get_stream(&package.stored_filename)
            .await
            .map_err(|e| match e {
                // An active row without its blob is an inconsistency, not a 404
                StorageError::NotFound(key) => {
                    ApiError::Internal(format!("stored object missing: {key}"))
                }
                other => ApiError::Storage(other),
            })?;

        let event = DownloadEventRow {
            event_id: Uuid::new_v4(),
            package_id: package.package_id,
            user_id: caller.map(|c| c.user_id),
            client_ip: client.ip,
            user_agent: client.user_agent,
            downloaded_at: OffsetDateTime::now_utc(),
            success: true,
            bytes_served: package.size_bytes,
        };
        let metadata = self.metadata.clone();
        tokio::spawn(async move {
            if let Err(e) = metadata.record_download(&event).await {
                tracing::warn!(
                    package_id = %event.package_id,
                    error = %e,
                    "failed to record download event"
                );
            }
        });

        Ok((package, stream))
    }

    /// Look up a package and check the caller may mutate it.
    async fn get_authorized(&self, package_id: Uuid, caller: &Identity) -> ApiResult<PackageRow> {
        let package = self
            .metadata
            .get_package(package_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("package {package_id}")))?;
        if !caller.can_mutate(package.user_id) {
            return Err(ApiError::Forbidden(
                "not the package owner".to_string(),
            ));
        }
        Ok(package)
    }

    fn validate(&self, req: &UploadRequest) -> ApiResult<()> {
        if req.name.trim().is_empty() {
            return Err(ApiError::BadRequest("package name is required".to_string()));
        }
        if req.version.trim().is_empty() {
            return Err(ApiError::BadRequest("version is required".to_string()));
        }
        if req.description.trim().is_empty() {
            return Err(ApiError::BadRequest("description is required".to_string()));
        }
        if req.bytes.is_empty() {
            return Err(ApiError::BadRequest("file is empty".to_string()));
        }
        if req.bytes.len() as u64 > self.max_upload_bytes {
            return Err(ApiError::BadRequest(format!(
                "file exceeds size limit of {} bytes",
                self.max_upload_bytes
            )));
        }

        let has_apk_extension = req
            .original_filename
            .rsplit('.')
            .next()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("apk"))
            && req.original_filename.contains('.');
        let has_apk_content_type = req
            .content_type
            .as_deref()
            .is_some_and(|ct| ct == APK_CONTENT_TYPE);
        if !has_apk_extension && !has_apk_content_type {
            return Err(ApiError::BadRequest(
                "only .apk files are accepted".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::identity::Role;
    use depot_metadata::models::UserRow;
    use depot_metadata::SqliteStore;
    use depot_storage::FilesystemBackend;

    async fn test_registry() -> (tempfile::TempDir, Registry, Arc<dyn MetadataStore>) {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(dir.path().join("storage"))
                .await
                .unwrap(),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(dir.path().join("depot.db")).await.unwrap(),
        );
        let registry = Registry::new(storage, metadata.clone(), 10 * 1024 * 1024);
        (dir, registry, metadata)
    }

    async fn test_owner(metadata: &Arc<dyn MetadataStore>, username: &str, role: Role) -> Identity {
        let user = UserRow {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "$2b$04$test".to_string(),
            role: role.as_str().to_string(),
            is_active: true,
            api_key: format!("usr_{}", Uuid::new_v4().simple()),
            created_at: OffsetDateTime::now_utc(),
            last_login_at: None,
        };
        metadata.create_user(&user).await.unwrap();
        Identity {
            user_id: user.user_id,
            username: user.username,
            role,
        }
    }

    fn apk_upload(name: &str, version: &str) -> UploadRequest {
        UploadRequest {
            name: name.to_string(),
            version: version.to_string(),
            description: "test build".to_string(),
            original_filename: format!("{name}.apk"),
            content_type: Some(APK_CONTENT_TYPE.to_string()),
            bytes: Bytes::from(format!("apk bytes for {name} {version}")),
        }
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let row = registry.upload(&owner, apk_upload("app", "1.0")).await.unwrap();
        assert!(row.is_active);
        assert_eq!(row.content_hash.len(), 64);

        let (pkg, stream) = registry
            .download(row.package_id, Some(&owner), ClientInfo::default())
            .await
            .unwrap();
        assert_eq!(pkg.package_id, row.package_id);

        use futures::TryStreamExt;
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total as i64, pkg.size_bytes);
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_requests() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let mut empty_name = apk_upload("app", "1.0");
        empty_name.name = "  ".to_string();
        assert!(matches!(
            registry.upload(&owner, empty_name).await,
            Err(ApiError::BadRequest(_))
        ));

        let mut empty_bytes = apk_upload("app", "1.0");
        empty_bytes.bytes = Bytes::new();
        assert!(matches!(
            registry.upload(&owner, empty_bytes).await,
            Err(ApiError::BadRequest(_))
        ));

        let mut not_apk = apk_upload("app", "1.0");
        not_apk.original_filename = "app.zip".to_string();
        not_apk.content_type = Some("application/zip".to_string());
        assert!(matches!(
            registry.upload(&owner, not_apk).await,
            Err(ApiError::BadRequest(_))
        ));

        // Extension check is case-insensitive
        let mut upper = apk_upload("app", "1.0");
        upper.original_filename = "APP.APK".to_string();
        upper.content_type = None;
        registry.upload(&owner, upper).await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_version_writes_no_blob() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        registry.upload(&owner, apk_upload("app", "1.0")).await.unwrap();
        let blobs_before = registry.storage.list("").await.unwrap().len();

        let err = registry
            .upload(&owner, apk_upload("app", "1.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::DuplicateVersion(_)));
        assert_eq!(registry.storage.list("").await.unwrap().len(), blobs_before);
    }

    #[tokio::test]
    async fn test_version_chain_has_one_active_record() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        for i in 0..4 {
            registry
                .upload(&owner, apk_upload("app", &format!("1.{i}")))
                .await
                .unwrap();
        }

        let chain = registry
            .versions(
                registry
                    .list(&PackageFilter::default())
                    .await
                    .unwrap()[0]
                    .package_id,
                &owner,
            )
            .await
            .unwrap();
        assert_eq!(chain.len(), 4);
        assert_eq!(chain.iter().filter(|p| p.is_active).count(), 1);
        assert_eq!(chain[0].version, "1.3");
        assert!(chain[0].is_active);
    }

    #[tokio::test]
    async fn test_rollback_flow() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let v1 = registry.upload(&owner, apk_upload("app", "1.0")).await.unwrap();
        let v2 = registry.upload(&owner, apk_upload("app", "1.1")).await.unwrap();
        assert_eq!(v2.previous_version_id, Some(v1.package_id));

        let activated = registry.rollback(v2.package_id, &owner).await.unwrap();
        assert_eq!(activated.package_id, v1.package_id);
        assert!(activated.is_active);

        // Rolled-back record is inactive and no longer downloadable
        let err = registry
            .download(v2.package_id, Some(&owner), ClientInfo::default())
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        // v1 has no predecessor, so a further rollback is refused
        assert!(matches!(
            registry.rollback(v1.package_id, &owner).await,
            Err(ApiError::NoPreviousVersion)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_row_and_blob() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let row = registry.upload(&owner, apk_upload("app", "1.0")).await.unwrap();
        assert!(registry.storage.exists(&row.stored_filename).await.unwrap());

        let deleted = registry.delete(row.package_id, &owner).await.unwrap();
        assert_eq!(deleted.package_id, row.package_id);
        assert!(!registry.storage.exists(&row.stored_filename).await.unwrap());

        assert!(matches!(
            registry
                .download(row.package_id, Some(&owner), ClientInfo::default())
                .await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_non_owner_is_forbidden_admin_is_not() {
        let (_dir, registry, metadata) = test_registry().await;
        let alice = test_owner(&metadata, "alice", Role::User).await;
        let bob = test_owner(&metadata, "bob", Role::User).await;
        let admin = test_owner(&metadata, "root", Role::Admin).await;

        let row = registry.upload(&alice, apk_upload("app", "1.0")).await.unwrap();
        registry.upload(&alice, apk_upload("app", "1.1")).await.unwrap();

        assert!(matches!(
            registry.delete(row.package_id, &bob).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            registry.versions(row.package_id, &bob).await,
            Err(ApiError::Forbidden(_))
        ));

        // Row untouched after the refused delete
        assert!(metadata.get_package(row.package_id).await.unwrap().is_some());

        // Admin may manage any chain
        let chain = registry.versions(row.package_id, &admin).await.unwrap();
        assert_eq!(chain.len(), 2);
        registry.delete(row.package_id, &admin).await.unwrap();
    }

    #[tokio::test]
    async fn test_download_accounts_event() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let row = registry.upload(&owner, apk_upload("app", "1.0")).await.unwrap();
        registry
            .download(
                row.package_id,
                Some(&owner),
                ClientInfo {
                    ip: Some("10.0.0.9".to_string()),
                    user_agent: Some("test-agent".to_string()),
                },
            )
            .await
            .unwrap();

        // The event write is spawned; give it a moment to land
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let events = metadata
            .list_downloads(&depot_metadata::models::DownloadFilter::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].package_id, row.package_id);
        assert_eq!(events[0].client_ip.as_deref(), Some("10.0.0.9"));
    }

    #[tokio::test]
    async fn test_upload_size_limit() {
        let (_dir, registry, metadata) = test_registry().await;
        let owner = test_owner(&metadata, "alice", Role::User).await;

        let mut too_big = apk_upload("app", "1.0");
        too_big.bytes = Bytes::from(vec![0u8; 10 * 1024 * 1024 + 1]);
        assert!(matches!(
            registry.upload(&owner, too_big).await,
            Err(ApiError::BadRequest(_))
        ));
    }
}
