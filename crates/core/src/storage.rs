use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::backend::{Backend, MAX_BATCH_KEYS};
use crate::bulk::DeleteMatching;
use crate::error::{StorageError, StorageResult};
use crate::object::{Container, ListPage, ObjectKey, VersionedListPage};
use crate::report::{BulkDeleteReport, DeleteBatchResult};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Object storage bound to a configured default container.
///
/// Every operation accepts a `container_override` that replaces the
/// configured container for that call only.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn Backend>,
    container: Container,
}

impl Storage {
    pub fn new(backend: Arc<dyn Backend>, container: impl Into<String>) -> Self {
        Self {
            backend,
            container: Container::new(container),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    fn target(&self, container_override: Option<&str>) -> Container {
        match container_override {
            Some(name) if !name.is_empty() => Container::new(name),
            _ => self.container.clone(),
        }
    }

    /// Upload a local file, returning the object's public URL. The content
    /// type is inferred from the file extension.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        container_override: Option<&str>,
    ) -> StorageResult<String> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let content_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or(FALLBACK_CONTENT_TYPE);
        self.upload(key, Bytes::from(data), content_type, container_override)
            .await
    }

    pub async fn upload(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        container_override: Option<&str>,
    ) -> StorageResult<String> {
        let container = self.target(container_override);
        let key = ObjectKey::from(key);
        let size = data.len();
        let url = self
            .backend
            .upload(&container, &key, data, content_type)
            .await?;
        info!(container = %container, key = %key, size, content_type, "object uploaded");
        Ok(url)
    }

    pub async fn delete_object(&self, key: &str, container_override: Option<&str>) -> StorageResult<()> {
        let container = self.target(container_override);
        self.backend
            .delete_one(&container, &ObjectKey::from(key))
            .await?;
        debug!(container = %container, key, "object deleted");
        Ok(())
    }

    /// Delete up to 1000 keys in one request.
    pub async fn delete_objects(
        &self,
        keys: &[ObjectKey],
        container_override: Option<&str>,
    ) -> StorageResult<DeleteBatchResult> {
        if keys.len() > MAX_BATCH_KEYS {
            return Err(StorageError::BatchTooLarge(keys.len()));
        }
        if keys.is_empty() {
            return Ok(DeleteBatchResult::new());
        }
        let container = self.target(container_override);
        let result = self
            .backend
            .delete_batch(&container, keys)
            .await
            .reconcile(keys);
        info!(
            container = %container,
            deleted = result.deleted().len(),
            failed = result.failed().len(),
            "objects deleted"
        );
        Ok(result)
    }

    /// First page of keys in the container.
    pub async fn list_objects(&self, container_override: Option<&str>) -> StorageResult<ListPage> {
        self.backend.list(&self.target(container_override)).await
    }

    pub async fn list_object_versions(
        &self,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
        container_override: Option<&str>,
    ) -> StorageResult<VersionedListPage> {
        self.backend
            .list_versions(
                &self.target(container_override),
                key_marker,
                version_id_marker,
            )
            .await
    }

    pub async fn delete_matching_objects(
        &self,
        options: &DeleteMatching,
        container_override: Option<&str>,
    ) -> StorageResult<BulkDeleteReport> {
        let container = self.target(container_override);
        info!(
            container = %container,
            prefix = options.prefix_str().unwrap_or(""),
            pattern = options.pattern_str().unwrap_or(""),
            "deleting matching objects"
        );
        options
            .run(self.backend.as_ref(), self.backend.as_ref(), &container)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::error::FailureReason;

    fn storage(dir: &tempfile::TempDir) -> Storage {
        std::fs::create_dir_all(dir.path().join("main")).unwrap();
        std::fs::create_dir_all(dir.path().join("archive")).unwrap();
        let backend = LocalBackend::init(dir.path()).unwrap();
        Storage::new(Arc::new(backend), "main")
    }

    #[tokio::test]
    async fn upload_file_targets_configured_or_override_container() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let source = dir.path().join("report.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        let url = storage.upload_file(&source, "docs/report.pdf", None).await.unwrap();
        assert!(url.ends_with("main/docs/report.pdf"));
        storage
            .upload_file(&source, "docs/report.pdf", Some("archive"))
            .await
            .unwrap();

        assert_eq!(storage.list_objects(None).await.unwrap().keys.len(), 1);
        assert_eq!(storage.list_objects(Some("archive")).await.unwrap().keys.len(), 1);
    }

    #[tokio::test]
    async fn delete_objects_enforces_request_limit() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let keys: Vec<ObjectKey> = (0..=MAX_BATCH_KEYS).map(|i| format!("k{i}").into()).collect();

        let err = storage.delete_objects(&keys, None).await.unwrap_err();
        assert!(matches!(err, StorageError::BatchTooLarge(1001)));
        assert!(storage.delete_objects(&[], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_objects_reports_each_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.upload("a", Bytes::from_static(b"1"), "text/plain", None).await.unwrap();

        let result = storage
            .delete_objects(&["a".into(), "b".into()], None)
            .await
            .unwrap();
        assert!(result.deleted().contains(&ObjectKey::from("a")));
        assert_eq!(result.failed().get(&ObjectKey::from("b")), Some(&FailureReason::NotFound));
    }

    #[tokio::test]
    async fn delete_object_surfaces_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        let err = storage.delete_object("missing", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn delete_matching_objects_uses_override() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        for key in ["logs/2020/a.txt", "logs/2021/b.txt", "img/c.png"] {
            storage
                .upload(key, Bytes::from_static(b"x"), "text/plain", Some("archive"))
                .await
                .unwrap();
        }

        let options = DeleteMatching::new().prefix("logs/").pattern(r"logs/2020/.*");
        let report = storage
            .delete_matching_objects(&options, Some("archive"))
            .await
            .unwrap();
        assert_eq!(report.deleted().len(), 1);

        let remaining = storage.list_objects(Some("archive")).await.unwrap();
        assert_eq!(
            remaining.keys,
            vec![ObjectKey::from("img/c.png"), ObjectKey::from("logs/2021/b.txt")]
        );
    }

    #[tokio::test]
    async fn list_object_versions_passes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        for key in ["a", "b"] {
            storage.upload(key, Bytes::from_static(b"x"), "text/plain", None).await.unwrap();
        }
        let page = storage
            .list_object_versions(Some("a"), None, None)
            .await
            .unwrap();
        assert_eq!(page.versions.len(), 1);
        assert_eq!(page.versions[0].key, ObjectKey::from("b"));

        let resumed = storage
            .list_object_versions(Some("a"), Some("null"), None)
            .await
            .unwrap();
        assert_eq!(resumed.versions, page.versions);
    }
}
