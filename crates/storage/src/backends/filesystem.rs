//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of checking one path against the canonical storage root.
enum Containment {
    /// The path exists and resolves inside the root.
    Inside,
    /// Nothing exists at this path yet.
    Missing,
}

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create a new filesystem backend.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Map a key to its on-disk path, rejecting keys that escape the root.
    ///
    /// Runs the synchronous check on the blocking pool since it calls
    /// `canonicalize` and `symlink_metadata`.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Stat `candidate` and, if it exists, verify its canonical form stays
    /// under `root_canonical`. A broken symlink counts as an invalid key, not
    /// an I/O error. Shared by the target check and the ancestor walk in
    /// `key_path_sync`.
    fn check_containment(
        root_canonical: &Path,
        candidate: &Path,
        key: &str,
    ) -> StorageResult<Containment> {
        let meta = match std::fs::symlink_metadata(candidate) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Containment::Missing);
            }
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat path: {err}"),
                )));
            }
        };

        let resolved = candidate.canonicalize().map_err(|e| {
            if meta.file_type().is_symlink() {
                StorageError::InvalidKey(format!("symlink target missing or invalid: {key}"))
            } else {
                StorageError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to canonicalize path: {e}"),
                ))
            }
        })?;

        if !resolved.starts_with(root_canonical) {
            return Err(StorageError::InvalidKey(format!(
                "resolved path escapes storage root: {key}"
            )));
        }
        Ok(Containment::Inside)
    }

    /// Validate a key and return the path it maps to.
    ///
    /// Keys must be relative and made of plain components. Anything that
    /// currently exists along the key — the target itself or, for keys not
    /// on disk yet, the nearest existing ancestor — must canonicalize to a
    /// location under the root, which blocks symlink escapes in both the
    /// read and write paths.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;
        let path = root.join(key);

        match Self::check_containment(&root_canonical, &path, key)? {
            // Hand back the uncanonicalized path so keys stay relative to
            // the configured root in list output.
            Containment::Inside => return Ok(path),
            Containment::Missing => {}
        }

        // Target not on disk yet. Walk up until something exists and make
        // sure that ancestor resolves inside the root, so a write cannot
        // tunnel through a symlinked directory before create_dir_all runs.
        let mut cursor = path.as_path();
        while let Some(parent) = cursor.parent() {
            if let Containment::Inside =
                Self::check_containment(&root_canonical, parent, key)?
            {
                break;
            }
            cursor = parent;
        }

        Ok(path)
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn missing_as_not_found(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| missing_as_not_found(key, e))?;

        Ok(ObjectMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(|t| t.into()),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| missing_as_not_found(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| missing_as_not_found(key, e))?;

        // Yield fixed-size chunks rather than buffering the whole object.
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        // Write-fsync-rename so a crash never leaves a torn object behind.
        // The uuid suffix keeps concurrent writers to the same key apart.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| missing_as_not_found(key, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.key_path(prefix).await?
        };
        let mut keys = Vec::new();

        match fs::try_exists(&base).await {
            Ok(false) => return Ok(keys),
            Ok(true) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StorageError::Io(e)),
        }

        // Iterative walk. Classify entries by file_type(), which does not
        // follow symlinks, so a planted link cannot pull the walk outside
        // the root. Symlinks themselves are skipped entirely.
        let mut pending = vec![base];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry_path);
                } else if file_type.is_file() {
                    if let Ok(rel) = entry_path.strip_prefix(&self.root) {
                        keys.push(rel.to_string_lossy().to_string());
                    }
                }
            }
        }

        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "apks/1700000000000_ab12cd34_app.apk";
        let data = Bytes::from("not really an apk");

        backend.put(key, data.clone()).await.unwrap();
        assert!(backend.exists(key).await.unwrap());

        let retrieved = backend.get(key).await.unwrap();
        assert_eq!(retrieved, data);

        let meta = backend.head(key).await.unwrap();
        assert_eq!(meta.size, data.len() as u64);
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("apks/gone.apk", Bytes::from("x")).await.unwrap();
        backend.delete("apks/gone.apk").await.unwrap();

        assert!(!backend.exists("apks/gone.apk").await.unwrap());
        assert!(matches!(
            backend.get("apks/gone.apk").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete("apks/gone.apk").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_stream_matches_get() {
        use futures::TryStreamExt;

        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        // Larger than one chunk to exercise the chunked read path
        let data = Bytes::from(vec![0xAB; STREAM_CHUNK_SIZE * 2 + 17]);
        backend.put("apks/big.apk", data.clone()).await.unwrap();

        let stream = backend.get_stream("apks/big.apk").await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, data.len());
    }

    #[tokio::test]
    async fn test_list_returns_keys_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("apks/a.apk", Bytes::from("a")).await.unwrap();
        backend.put("apks/b.apk", Bytes::from("b")).await.unwrap();

        let mut keys = backend.list("apks").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["apks/a.apk", "apks/b.apk"]);

        // Empty prefix walks the whole root
        let all = backend.list("").await.unwrap();
        assert_eq!(all.len(), 2);

        // Missing prefix is an empty listing, not an error
        assert!(backend.list("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        // Test various path traversal attempts
        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.exists("foo/../../etc/passwd").await.is_err());

        // Valid keys should work
        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();

        // Create a file outside the storage root
        let outside_file = outside_dir.path().join("secret.txt");
        std::fs::write(&outside_file, "secret data").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        // Create a symlink inside storage root pointing outside
        let symlink_path = dir.path().join("malicious_link");
        symlink(&outside_file, &symlink_path).unwrap();

        // Attempting to read through the symlink should fail
        let result = backend.get("malicious_link").await;
        assert!(result.is_err(), "symlink traversal should be rejected");

        if let Err(StorageError::InvalidKey(msg)) = result {
            assert!(
                msg.contains("escapes storage root"),
                "error should mention escaping root: {msg}"
            );
        } else {
            panic!("expected InvalidKey error, got: {result:?}");
        }

        // Also test symlinked directory traversal
        let symlink_dir = dir.path().join("link_to_outside");
        symlink(outside_dir.path(), &symlink_dir).unwrap();

        let result = backend.get("link_to_outside/secret.txt").await;
        assert!(
            result.is_err(),
            "directory symlink traversal should be rejected"
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_broken_symlink_is_invalid_key() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        // Dangling link: the entry exists but cannot be resolved.
        symlink("/nonexistent/target", dir.path().join("dangling")).unwrap();

        assert!(matches!(
            backend.get("dangling").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_ancestor_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        // Symlink inside storage root pointing to an outside directory
        let symlink_path = dir.path().join("escape");
        symlink(outside_dir.path(), &symlink_path).unwrap();

        // Writing through a nested path whose existing ancestor is the symlink
        // must be rejected before create_dir_all can follow it outside the root.
        let result = backend
            .put("escape/nested/deep/file.apk", Bytes::from("data"))
            .await;

        assert!(
            result.is_err(),
            "ancestor symlink traversal should be rejected on write"
        );
        assert!(
            !outside_dir.path().join("nested").exists(),
            "should not have created directories outside storage root"
        );
    }
}
