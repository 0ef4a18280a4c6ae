//! On-disk content store.
//!
//! Blobs live beneath `root/{shard}/{shard}/{key}`, where the two shard
//! directories are the first bytes of `md5(namespace/key)`. This keeps the
//! fan-out per directory small even when thousands of projects are stored.

use super::{ContentStore, StoreError, StoreResult, ensure_key_safe};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct DiskContentStore {
    namespace: String,
    root: PathBuf,
}

impl DiskContentStore {
    /// Create a store rooted at `base_path/namespace`. The directory is
    /// created lazily on first write.
    pub fn new(base_path: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let root = base_path.into().join(&namespace);
        Self { namespace, root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shards(&self, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", self.namespace, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = self.shards(key);
        let mut path = self.root.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Remove empty directories from `start` upwards, stopping at the root.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.root) && current != self.root {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ContentStore for DiskContentStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        ensure_key_safe(key)?;
        match fs::read(self.blob_path(key)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Write to a temp file beside the target, fsync, then rename into place.
    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "blob path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let written = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&value).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &path).await?;
            Ok::<_, io::Error>(())
        }
        .await;

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        debug!("stored {} bytes at {}", value.len(), path.display());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        ensure_key_safe(key)?;
        let path = self.blob_path(key);
        match fs::remove_file(&path).await {
            Ok(_) => debug!("removed blob {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("blob {} already missing", path.display());
                return Ok(());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Best-effort write/read/delete of a probe file under the store root.
    async fn health_check(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root).await?;
        let probe = self.root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&probe, b"readyz").await?;
        let read_back = fs::read(&probe).await;
        let _ = fs::remove_file(&probe).await;

        if read_back? == b"readyz" {
            Ok(())
        } else {
            Err(StoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "probe file content mismatch",
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> DiskContentStore {
        let base = std::env::temp_dir().join(format!("project-store-{}", Uuid::new_v4()));
        DiskContentStore::new(base, "robotics-projects")
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let store = temp_store();
        let key = "alice-1/sub/b.cpp";

        assert!(store.get(key).await.unwrap().is_none());

        store.set(key, Bytes::from_static(b"int main(){}")).await.unwrap();
        assert_eq!(
            store.get(key).await.unwrap().as_deref(),
            Some(&b"int main(){}"[..])
        );

        store.set(key, Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(store.get(key).await.unwrap().as_deref(), Some(&b"v2"[..]));

        store.delete(key).await.unwrap();
        assert!(store.get(key).await.unwrap().is_none());
        // idempotent
        store.delete(key).await.unwrap();

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn delete_prunes_empty_shard_directories() {
        let store = temp_store();
        let key = "bob-2/deep/nested/file.txt";
        store.set(key, Bytes::from_static(b"x")).await.unwrap();

        let (shard_a, _) = store.shards(key);
        let shard_dir = store.root().join(shard_a);
        assert!(shard_dir.exists());

        store.delete(key).await.unwrap();
        assert!(!shard_dir.exists());

        let _ = fs::remove_dir_all(store.root()).await;
    }

    #[tokio::test]
    async fn rejects_unsafe_keys() {
        let store = temp_store();
        let err = store
            .set("../escape.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn health_check_leaves_no_probe_behind() {
        let store = temp_store();
        store.health_check().await.unwrap();

        let mut entries = fs::read_dir(store.root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());

        let _ = fs::remove_dir_all(store.root()).await;
    }
}
