//! HTTP API server for the Depot APK registry.
//!
//! This crate provides the HTTP surface:
//! - Account registration and login
//! - Package upload (single and bulk)
//! - Listing, version chains, rollback
//! - Download streaming with analytics capture
//! - Admin analytics and the API-key external surface

pub mod access_log;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use gate::AuthenticatedUser;
pub use registry::Registry;
pub use routes::create_router;
pub use state::AppState;
