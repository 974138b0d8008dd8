//! Core domain types and shared logic for the Depot package registry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes for uploaded package binaries
//! - Caller identity, roles, and the mutation predicate
//! - Stored-filename generation for the blob store
//! - Application configuration

pub mod config;
pub mod error;
pub mod filename;
pub mod hash;
pub mod identity;

pub use error::{Error, Result};
pub use filename::StoredFilename;
pub use hash::{ContentHash, ContentHasher};
pub use identity::{Identity, Role};

/// Maximum accepted package size: 500 MiB, matching the original deployment limit.
pub const MAX_PACKAGE_SIZE: u64 = 500 * 1024 * 1024;

/// MIME type Android package archives are uploaded with.
pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";
