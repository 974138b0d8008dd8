//! Package repository.
//!
//! Every mutation that touches more than one row runs as a single SQL
//! transaction inside the store implementation, so the version chain and the
//! one-active-per-chain invariant hold under any interleaving.

use crate::error::MetadataResult;
use crate::models::{NewPackage, PackageFilter, PackageListing, PackageRow};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for package version operations.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Insert a new package version.
    ///
    /// One transaction: re-checks (user_id, name, version) uniqueness, links
    /// the new row to the most recent record for (user_id, name) as its
    /// predecessor, clears the predecessor's active flag, and inserts the new
    /// row active. Returns the inserted row with the chain link resolved.
    /// Duplicate versions fail with `AlreadyExists`.
    async fn create_package(&self, package: &NewPackage) -> MetadataResult<PackageRow>;

    /// Get a package by ID.
    async fn get_package(&self, package_id: Uuid) -> MetadataResult<Option<PackageRow>>;

    /// Find a specific (owner, name, version) record, active or not.
    async fn find_version(
        &self,
        user_id: Uuid,
        name: &str,
        version: &str,
    ) -> MetadataResult<Option<PackageRow>>;

    /// List active packages, newest first, annotated with uploader name and
    /// download count.
    async fn list_active(&self, filter: &PackageFilter) -> MetadataResult<Vec<PackageListing>>;

    /// All records for one (owner, name) chain, newest first.
    async fn list_chain(&self, user_id: Uuid, name: &str) -> MetadataResult<Vec<PackageRow>>;

    /// Roll a package back to its predecessor.
    ///
    /// One transaction: the target is marked as a rollback and deactivated,
    /// the predecessor becomes the active record. Fails with `NotFound` if
    /// the target is missing and `NoPredecessor` if it has no previous
    /// version; neither failure changes any flags. Returns the activated
    /// predecessor.
    async fn rollback_package(&self, package_id: Uuid) -> MetadataResult<PackageRow>;

    /// Delete a package record.
    ///
    /// One transaction: successors pointing at the victim are re-linked to
    /// the victim's own predecessor, and if the victim was active the most
    /// recent surviving chain member is reactivated. Returns the deleted row
    /// so the caller can remove the blob.
    async fn delete_package(&self, package_id: Uuid) -> MetadataResult<PackageRow>;
}
