//! Server test utilities.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use depot_auth::{generate_api_key, hash_password};
use depot_core::config::{AppConfig, AuthConfig, MetadataConfig, ServerConfig, StorageConfig};
use depot_core::identity::Role;
use depot_metadata::models::UserRow;
use depot_metadata::{MetadataStore, SqliteStore};
use depot_server::{create_router, AppState};
use depot_storage::{FilesystemBackend, ObjectStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

/// Credentials for an account created directly in the metadata store.
#[allow(dead_code)]
pub struct TestAccount {
    pub user_id: Uuid,
    pub username: String,
    pub password: String,
    pub api_key: String,
    pub token: String,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("storage");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");
        let storage: Arc<dyn ObjectStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig {
            server: ServerConfig::default(),
            storage: StorageConfig::Filesystem {
                path: storage_path,
            },
            metadata: MetadataConfig::Sqlite { path: db_path },
            auth: AuthConfig::for_testing(),
        };
        modifier(&mut config);

        let state = AppState::new(config, storage, metadata);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Create an account directly in the metadata store and sign a token
    /// for it. Faster than the register endpoint and lets tests pick the
    /// role.
    pub async fn create_account(&self, username: &str, role: Role) -> TestAccount {
        let password = "correct horse battery".to_string();
        let password_hash = hash_password(&password, self.state.config.auth.bcrypt_cost)
            .expect("Failed to hash password");
        let api_key = generate_api_key();
        let user = UserRow {
            user_id: Uuid::new_v4(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash,
            role: role.as_str().to_string(),
            is_active: true,
            api_key: api_key.clone(),
            created_at: OffsetDateTime::now_utc(),
            last_login_at: None,
        };
        self.state
            .metadata
            .create_user(&user)
            .await
            .expect("Failed to create user");

        let identity = depot_core::identity::Identity {
            user_id: user.user_id,
            username: user.username.clone(),
            role,
        };
        let token = self
            .state
            .signer
            .sign(&identity)
            .expect("Failed to sign token");

        TestAccount {
            user_id: user.user_id,
            username: user.username,
            password,
            api_key,
            token,
        }
    }
}

/// Helper to make JSON requests.
#[allow(dead_code)]
pub async fn json_request(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = auth_token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let body = match body {
        Some(v) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };

    let request = builder.body(body).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    (status, json)
}
