//! Audit middleware for the external API surface.

use crate::gate::{client_ip, user_agent, AuthenticatedUser};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use depot_metadata::models::AccessLogRow;
use std::time::Instant;
use time::OffsetDateTime;
use uuid::Uuid;

/// Appends an audit row for every response on the wrapped routes.
///
/// The write is fire-and-forget: auditing never delays or fails a request.
pub async fn access_log_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let endpoint = req.uri().path().to_string();
    let method = req.method().to_string();
    let ip = client_ip(&req);
    let agent = user_agent(&req);
    let user_id = req
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.identity.user_id);

    let response = next.run(req).await;

    let entry = AccessLogRow {
        entry_id: Uuid::new_v4(),
        user_id,
        endpoint,
        method,
        status: i64::from(response.status().as_u16()),
        latency_ms: started.elapsed().as_millis() as i64,
        client_ip: ip,
        user_agent: agent,
        logged_at: OffsetDateTime::now_utc(),
    };
    let metadata = state.metadata.clone();
    tokio::spawn(async move {
        if let Err(e) = metadata.append_access(&entry).await {
            tracing::warn!(endpoint = %entry.endpoint, error = %e, "failed to append access log row");
        }
    });

    response
}
