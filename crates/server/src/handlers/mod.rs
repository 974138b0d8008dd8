//! HTTP request handlers.

pub mod analytics;
pub mod auth;
pub mod external;
pub mod health;
pub mod packages;

pub use analytics::*;
pub use auth::*;
pub use health::*;
pub use packages::*;
