pub mod local;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;
use crate::object::{Container, ListPage, ObjectKey, VersionedListPage};
use crate::report::DeleteBatchResult;

/// Most keys a single delete request may carry.
pub const MAX_BATCH_KEYS: usize = 1000;

/// Paginated key enumeration.
#[async_trait]
pub trait Lister: Send + Sync {
    /// Fetch one page of keys, optionally scoped to `prefix`. Failures are
    /// reported as `StorageError::ListingFailed`.
    async fn list_page(
        &self,
        container: &Container,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> StorageResult<ListPage>;
}

/// Multi-key deletion.
#[async_trait]
pub trait BatchDeleter: Send + Sync {
    /// Delete up to [`MAX_BATCH_KEYS`] keys. Never fails as a whole: every
    /// key ends up either deleted or failed in the returned result.
    async fn delete_batch(&self, container: &Container, keys: &[ObjectKey]) -> DeleteBatchResult;
}

#[async_trait]
pub trait Backend: Lister + BatchDeleter {
    /// Store `data` under `key`, returning the object's public URL.
    async fn upload(
        &self,
        container: &Container,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String>;

    async fn delete_one(&self, container: &Container, key: &ObjectKey) -> StorageResult<()>;

    /// First page of the container's keys.
    async fn list(&self, container: &Container) -> StorageResult<ListPage> {
        self.list_page(container, None, None).await
    }

    /// One page of object versions. Resuming inside a key's versions takes
    /// both the key marker and the version id marker of the previous page.
    async fn list_versions(
        &self,
        container: &Container,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> StorageResult<VersionedListPage>;
}
