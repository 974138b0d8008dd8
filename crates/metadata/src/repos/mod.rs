//! Repository traits for metadata operations.

pub mod access_log;
pub mod analytics;
pub mod packages;
pub mod users;

pub use access_log::AccessLogRepo;
pub use analytics::AnalyticsRepo;
pub use packages::PackageRepo;
pub use users::UserRepo;
