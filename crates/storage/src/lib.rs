//! Blob storage abstraction and implementations for Depot.
//!
//! Package binaries are opaque objects keyed by their generated stored
//! filename. The metadata store owns which keys exist; this crate only moves
//! bytes.

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use error::{StorageError, StorageResult};
pub use traits::{ByteStream, ObjectMeta, ObjectStore};

use depot_core::config::StorageConfig;
use std::sync::Arc;

/// Create a storage backend from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            Ok(Arc::new(backend) as Arc<dyn ObjectStore>)
        }
    }
}
