//! Stored-filename generation for the blob store.

use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of the sanitized original-name portion.
/// Longer client filenames are truncated to keep blob keys manageable.
const MAX_NAME_LEN: usize = 120;

/// A blob-store key for an uploaded package binary.
///
/// Format: `{unix_millis}_{8-char random suffix}_{sanitized original name}`.
/// The timestamp keeps keys roughly chronological on disk; the random suffix
/// guarantees concurrent uploads of the same file in the same millisecond
/// never collide.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredFilename(String);

impl StoredFilename {
    /// Generate a fresh key for a client-supplied filename.
    pub fn generate(original: &str) -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}_{}",
            millis,
            &suffix[..8],
            sanitize(original)
        ))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reduce a client filename to a safe blob-key component.
///
/// Keeps ASCII alphanumerics, `.`, `-`, and `_`; everything else (including
/// path separators and whitespace) becomes `_`. Leading dots are stripped so
/// a key component can never be `..`.
fn sanitize(original: &str) -> String {
    let cleaned: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();

    if truncated.is_empty() {
        "package.apk".to_string()
    } else {
        truncated
    }
}
