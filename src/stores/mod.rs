//! Key/blob store abstractions consumed by the project service.
//!
//! Two logical stores back every project:
//! - a **content store** holding raw file bodies keyed by `{projectId}/{relativePath}`
//! - a **metadata store** holding one JSON document per project keyed by `projectId`
//!
//! Both are injected as trait objects so the service can run against disk +
//! SQLite in production and in-memory maps in tests.

pub mod disk;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

/// Default namespace for file bodies.
pub const DEFAULT_CONTENT_NAMESPACE: &str = "robotics-projects";

/// Default namespace for project metadata documents.
pub const DEFAULT_METADATA_NAMESPACE: &str = "project-metadata";

const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key `{0}`")]
    InvalidKey(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key → bytes map holding file bodies.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a blob. Returns `None` when nothing is stored at `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Create or overwrite the blob at `key`.
    async fn set(&self, key: &str, value: Bytes) -> StoreResult<()>;

    /// Remove the blob at `key`. Succeeds when the key is already absent.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Durable key → JSON document map holding project records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: String) -> StoreResult<()>;

    /// Remove the document at `key`. Succeeds when the key is already absent.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Every key currently stored in this namespace.
    async fn list(&self) -> StoreResult<Vec<String>>;

    async fn health_check(&self) -> StoreResult<()>;
}

/// Reject keys that could escape a store root or confuse path handling.
///
/// Keys must be non-empty, at most 1024 bytes, must not start with `/`, must
/// not contain `..`, and must not contain backslashes or control characters.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');

    if invalid {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_nested_keys() {
        assert!(ensure_key_safe("alice-1700000000000/src/main.cpp").is_ok());
        assert!(ensure_key_safe("alice-1/.gitignore").is_ok());
    }

    #[test]
    fn rejects_traversal_and_control_characters() {
        for key in ["", "/etc/passwd", "a/../b", "a\\b", "a\nb", "a\0b"] {
            assert!(
                matches!(ensure_key_safe(key), Err(StoreError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
        }
        assert!(ensure_key_safe(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
    }
}
