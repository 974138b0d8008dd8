//! Application state shared across handlers.

use crate::registry::Registry;
use depot_auth::TokenSigner;
use depot_core::config::AppConfig;
use depot_metadata::MetadataStore;
use depot_storage::ObjectStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Object storage backend.
    pub storage: Arc<dyn ObjectStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Bearer token signer.
    pub signer: Arc<TokenSigner>,
    /// Versioning service keeping blobs and metadata consistent.
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The configuration must already be validated (`AppConfig::validate`).
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let signer = Arc::new(TokenSigner::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_secs,
        ));
        let registry = Arc::new(Registry::new(
            storage.clone(),
            metadata.clone(),
            config.server.max_upload_bytes,
        ));

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            signer,
            registry,
        }
    }
}
