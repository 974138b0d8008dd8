//! JWT signing and verification.

use crate::error::{AuthError, AuthResult};
use depot_core::identity::{Identity, Role};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Username
    pub username: String,
    /// Role name ("user" or "admin")
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Resolve the claims into a verified identity.
    pub fn identity(&self) -> AuthResult<Identity> {
        let role: Role = self
            .role
            .parse()
            .map_err(|_| AuthError::InvalidClaims(format!("unknown role '{}'", self.role)))?;
        Ok(Identity {
            user_id: self.sub,
            username: self.username.clone(),
            role,
        })
    }
}

/// Signs and verifies bearer tokens with an HMAC secret.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: u64,
}

impl TokenSigner {
    /// Create a signer from a shared secret and token lifetime.
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a token for an identity.
    pub fn sign(&self, identity: &Identity) -> AuthResult<String> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: identity.user_id,
            username: identity.username.clone(),
            role: identity.role.as_str().to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            },
        )?;
        Ok(data.claims)
    }

    /// Token lifetime in seconds, for `expires_in` responses.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }
}
