//! External API access log repository.

use crate::error::MetadataResult;
use crate::models::AccessLogRow;
use async_trait::async_trait;

/// Repository for the append-only external API audit log.
#[async_trait]
pub trait AccessLogRepo: Send + Sync {
    /// Append an audit row.
    async fn append_access(&self, entry: &AccessLogRow) -> MetadataResult<()>;

    /// Recent audit rows, newest first.
    async fn list_access(&self, limit: i64) -> MetadataResult<Vec<AccessLogRow>>;
}
