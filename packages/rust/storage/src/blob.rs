//! Path-addressable byte storage for raw and processed documents.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use docket_shared::{DocketError, Result};
use uuid::Uuid;

/// Byte storage addressed by relative, `/`-separated paths.
///
/// Writes are all-or-nothing: a reader never observes a partially written
/// blob.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing blob.
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Read the blob at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Delete the blob at `path`. Missing blobs are not an error.
    async fn remove(&self, path: &str) -> Result<()>;

    /// Verify the store as a whole is reachable and writable.
    async fn check(&self) -> Result<()>;
}

/// A [`BlobStore`] rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative blob path, refusing anything that would escape the root.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(DocketError::Storage(format!("invalid blob path '{path}'")));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocketError::io(parent, e))?;
        }

        // Write beside the target and rename into place.
        let tmp = target.with_extension(format!("tmp-{}", Uuid::now_v7()));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DocketError::io(&tmp, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(DocketError::io(&target, e));
        }

        tracing::trace!(path, bytes = bytes.len(), "blob written");
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| DocketError::io(&target, e))
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocketError::io(&target, e)),
        }
    }

    async fn check(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| DocketError::io(&self.root, e))?;
        let probe = self.root.join(format!(".probe-{}", Uuid::now_v7()));
        tokio::fs::write(&probe, b"ok")
            .await
            .map_err(|e| DocketError::io(&probe, e))?;
        tokio::fs::remove_file(&probe)
            .await
            .map_err(|e| DocketError::io(&probe, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FsBlobStore {
        FsBlobStore::new(std::env::temp_dir().join(format!("docket_blobs_{}", Uuid::now_v7())))
    }

    #[tokio::test]
    async fn write_read_remove() {
        let store = temp_store();
        store.check().await.expect("root usable");

        store.write("2025-02/doc_abcd1234.html", b"<p>hi</p>").await.unwrap();
        assert_eq!(store.read("2025-02/doc_abcd1234.html").await.unwrap(), b"<p>hi</p>");

        store.remove("2025-02/doc_abcd1234.html").await.unwrap();
        assert!(store.read("2025-02/doc_abcd1234.html").await.is_err());
        // Removing twice is fine.
        store.remove("2025-02/doc_abcd1234.html").await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(store.root().join("2025-02"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty(), "no temp files left behind");
        let _ = std::fs::remove_dir_all(store.root());
    }

    #[tokio::test]
    async fn rejects_escaping_paths() {
        let store = temp_store();
        assert!(store.write("../outside.txt", b"x").await.is_err());
        assert!(store.write("/etc/passwd", b"x").await.is_err());
        assert!(store.read("").await.is_err());
    }
}
