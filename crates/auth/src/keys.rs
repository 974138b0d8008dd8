//! API key generation.

use uuid::Uuid;

/// Prefix identifying user-scoped API keys.
pub const API_KEY_PREFIX: &str = "usr_";

/// Mint a new opaque API key.
pub fn generate_api_key() -> String {
    format!("{API_KEY_PREFIX}{}", Uuid::new_v4().simple())
}
