//! Authentication and authorization middleware.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, USER_AGENT};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use depot_core::identity::{Identity, Role};
use std::net::SocketAddr;

/// How the caller authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthVia {
    /// Signed bearer token (JWT).
    Bearer,
    /// Opaque per-user API key.
    ApiKey,
}

/// Authenticated request extension.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The verified caller identity.
    pub identity: Identity,
    /// Credential kind used.
    pub via: AuthVia,
}

impl AuthenticatedUser {
    /// Require the admin role.
    pub fn require_admin(&self) -> ApiResult<()> {
        if self.identity.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin role required".to_string()))
        }
    }

    /// Require API-key authentication (external API surface).
    pub fn require_api_key(&self) -> ApiResult<()> {
        if self.via == AuthVia::ApiKey {
            Ok(())
        } else {
            Err(ApiError::Unauthorized(
                "this endpoint requires an API key".to_string(),
            ))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
    }
}

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Authentication middleware.
///
/// Credentials that are present but invalid fail the request outright;
/// requests without credentials pass through unauthenticated and are
/// rejected later by the `AuthenticatedUser` extractor where auth is
/// required.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_bearer_token(req.headers()) {
        let claims = state.signer.verify(token).map_err(|e| match e {
            depot_auth::AuthError::TokenExpired => {
                ApiError::Unauthorized("token expired".to_string())
            }
            _ => ApiError::Unauthorized("invalid token".to_string()),
        })?;
        let identity = claims
            .identity()
            .map_err(|_| ApiError::Unauthorized("invalid token".to_string()))?;
        req.extensions_mut().insert(AuthenticatedUser {
            identity,
            via: AuthVia::Bearer,
        });
    } else if let Some(api_key) = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    {
        let user = state
            .metadata
            .get_user_by_api_key(&api_key)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid API key".to_string()))?;
        if !user.is_active {
            return Err(ApiError::Unauthorized("account is deactivated".to_string()));
        }
        let role: Role = user
            .role
            .parse()
            .map_err(|_| ApiError::Internal(format!("invalid stored role '{}'", user.role)))?;
        req.extensions_mut().insert(AuthenticatedUser {
            identity: Identity {
                user_id: user.user_id,
                username: user.username,
                role,
            },
            via: AuthVia::ApiKey,
        });
    }

    Ok(next.run(req).await)
}

/// Best-effort client IP: X-Forwarded-For first, then the socket address.
pub fn client_ip(req: &Request) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// User-Agent header, if present.
pub fn user_agent(req: &Request) -> Option<String> {
    req.headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
