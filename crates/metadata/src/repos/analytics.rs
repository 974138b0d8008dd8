//! Download analytics repository.

use crate::error::MetadataResult;
use crate::models::{DownloadEventDetail, DownloadEventRow, DownloadFilter};
use async_trait::async_trait;

/// Repository for download event accounting.
#[async_trait]
pub trait AnalyticsRepo: Send + Sync {
    /// Append a download event.
    async fn record_download(&self, event: &DownloadEventRow) -> MetadataResult<()>;

    /// Download events joined with package and downloader names, newest first.
    async fn list_downloads(
        &self,
        filter: &DownloadFilter,
    ) -> MetadataResult<Vec<DownloadEventDetail>>;
}
