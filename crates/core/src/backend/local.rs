use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{Backend, BatchDeleter, Lister};
use crate::error::{FailureReason, StorageError, StorageResult};
use crate::object::{Container, ListPage, ObjectKey, ObjectVersion, VersionedListPage};
use crate::report::DeleteBatchResult;

const DEFAULT_PAGE_SIZE: usize = 1000;
const NULL_VERSION: &str = "null";

/// Filesystem backend. Each container is a directory under `root`; keys are
/// `/`-separated paths relative to it.
pub struct LocalBackend {
    root: PathBuf,
    page_size: usize,
}

impl LocalBackend {
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let root = path.as_ref().to_path_buf();
        Ok(Self {
            root,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let backend = Self::new(path)?;
        std::fs::create_dir_all(&backend.root)?;
        Ok(backend)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn container_dir(&self, container: &Container) -> StorageResult<PathBuf> {
        let name = container.name();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(StorageError::InvalidKey(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn object_path(&self, container: &Container, key: &ObjectKey) -> StorageResult<PathBuf> {
        let mut path = self.container_dir(container)?;
        let key = key.as_str();
        if key.is_empty() || key.contains('\\') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(StorageError::InvalidKey(key.to_string()));
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Every key in the container, sorted.
    async fn all_keys(&self, container: &Container) -> StorageResult<Vec<ObjectKey>> {
        let dir = self.container_dir(container)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StorageError::NotFound(format!("container {container}")));
        }

        let mut keys = Vec::new();
        let mut pending = vec![(dir, String::new())];
        while let Some((dir, rel)) = pending.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                    continue;
                };
                let key = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), key));
                } else {
                    keys.push(ObjectKey::new(key));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn remove(&self, container: &Container, key: &ObjectKey) -> Result<(), FailureReason> {
        let path = self
            .object_path(container, key)
            .map_err(FailureReason::backend)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.prune_empty_parents(container, &path).await;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FailureReason::NotFound),
            Err(e) => Err(FailureReason::backend(e)),
        }
    }

    /// Remove directories left empty by a delete, stopping at the container.
    async fn prune_empty_parents(&self, container: &Container, path: &Path) {
        let Ok(stop) = self.container_dir(container) else {
            return;
        };
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == stop || tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl Lister for LocalBackend {
    async fn list_page(
        &self,
        container: &Container,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> StorageResult<ListPage> {
        let keys = self
            .all_keys(container)
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;

        let mut matching = keys
            .into_iter()
            .filter(|key| prefix.is_none_or(|p| key.as_str().starts_with(p)))
            .filter(|key| continuation.is_none_or(|after| key.as_str() > after))
            .peekable();

        let mut page = Vec::with_capacity(self.page_size.min(DEFAULT_PAGE_SIZE));
        while page.len() < self.page_size {
            match matching.next() {
                Some(key) => page.push(key),
                None => break,
            }
        }
        let continuation = match matching.peek() {
            Some(_) => page.last().map(|key| key.as_str().to_string()),
            None => None,
        };

        debug!(container = %container, keys = page.len(), more = continuation.is_some(), "listed page");
        Ok(ListPage::new(page, continuation))
    }
}

#[async_trait]
impl BatchDeleter for LocalBackend {
    async fn delete_batch(&self, container: &Container, keys: &[ObjectKey]) -> DeleteBatchResult {
        let mut result = DeleteBatchResult::new();
        for key in keys {
            match self.remove(container, key).await {
                Ok(()) => result.record_deleted(key.clone()),
                Err(reason) => result.record_failed(key.clone(), reason),
            }
        }
        result
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn upload(
        &self,
        container: &Container,
        key: &ObjectKey,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<String> {
        let path = self.object_path(container, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| StorageError::upload(key, e))?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete_one(&self, container: &Container, key: &ObjectKey) -> StorageResult<()> {
        match self.remove(container, key).await {
            Ok(()) => Ok(()),
            Err(FailureReason::NotFound) => Err(StorageError::NotFound(key.to_string())),
            Err(FailureReason::Backend(reason)) => Err(StorageError::Transport(reason)),
        }
    }

    async fn list_versions(
        &self,
        container: &Container,
        key_marker: Option<&str>,
        _version_id_marker: Option<&str>,
    ) -> StorageResult<VersionedListPage> {
        // One version per key, so the key marker alone positions the page.
        let keys = self
            .all_keys(container)
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;

        let mut remaining = keys
            .into_iter()
            .filter(|key| key_marker.is_none_or(|marker| key.as_str() > marker));
        let mut versions = Vec::new();
        for key in remaining.by_ref().take(self.page_size) {
            let metadata = tokio::fs::metadata(self.object_path(container, &key)?).await?;
            versions.push(ObjectVersion {
                key,
                version_id: NULL_VERSION.to_string(),
                is_latest: true,
                is_delete_marker: false,
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                size: metadata.len(),
            });
        }

        let next_key_marker = match remaining.next() {
            Some(_) => versions.last().map(|v| v.key.as_str().to_string()),
            None => None,
        };
        let next_version_id_marker = next_key_marker.as_ref().map(|_| NULL_VERSION.to_string());
        Ok(VersionedListPage {
            versions,
            next_key_marker,
            next_version_id_marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(names: &[&str]) -> (tempfile::TempDir, LocalBackend, Container) {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::init(dir.path()).unwrap();
        let container = Container::from("bucket");
        std::fs::create_dir_all(dir.path().join("bucket")).unwrap();
        for name in names {
            backend
                .upload(&container, &ObjectKey::from(*name), Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }
        (dir, backend, container)
    }

    #[tokio::test]
    async fn local_backend_roundtrip() {
        let (dir, backend, container) = seeded(&[]).await;

        let url = backend
            .upload(&container, &"test/hello.txt".into(), Bytes::from_static(b"world"), "text/plain")
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        let data = std::fs::read(dir.path().join("bucket/test/hello.txt")).unwrap();
        assert_eq!(data, b"world");

        let page = backend.list(&container).await.unwrap();
        assert_eq!(page.keys, vec![ObjectKey::from("test/hello.txt")]);
        assert!(page.is_last());

        backend.delete_one(&container, &"test/hello.txt".into()).await.unwrap();
        assert!(backend.list(&container).await.unwrap().keys.is_empty());
        assert!(!dir.path().join("bucket/test").exists());
    }

    #[tokio::test]
    async fn pages_follow_continuation_tokens() {
        let (_dir, backend, container) = seeded(&["a", "b/1", "b/2", "c", "d"]).await;
        let backend = backend.with_page_size(2);

        let mut seen = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = backend.list_page(&container, None, token.as_deref()).await.unwrap();
            pages += 1;
            seen.extend(page.keys.iter().map(|k| k.to_string()));
            match page.continuation {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        assert_eq!(pages, 3);
        assert_eq!(seen, vec!["a", "b/1", "b/2", "c", "d"]);
    }

    #[tokio::test]
    async fn prefix_scopes_listing() {
        let (_dir, backend, container) = seeded(&["logs/a", "logs/b", "img/c"]).await;
        let page = backend.list_page(&container, Some("logs/"), None).await.unwrap();
        assert_eq!(page.keys, vec![ObjectKey::from("logs/a"), ObjectKey::from("logs/b")]);
    }

    #[tokio::test]
    async fn batch_delete_reports_missing_keys() {
        let (_dir, backend, container) = seeded(&["a", "b"]).await;
        let result = backend
            .delete_batch(&container, &["a".into(), "b".into(), "ghost".into()])
            .await;
        assert_eq!(result.deleted().len(), 2);
        assert_eq!(
            result.failed().get(&ObjectKey::from("ghost")),
            Some(&FailureReason::NotFound)
        );
    }

    #[tokio::test]
    async fn delete_one_missing_is_not_found() {
        let (_dir, backend, container) = seeded(&[]).await;
        let err = backend.delete_one(&container, &"nope".into()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_container_fails_listing() {
        let (_dir, backend, _) = seeded(&[]).await;
        let err = backend.list(&Container::from("absent")).await.unwrap_err();
        assert!(matches!(err, StorageError::ListingFailed { .. }));
    }

    #[tokio::test]
    async fn rejects_escaping_keys() {
        let (_dir, backend, container) = seeded(&[]).await;
        let err = backend
            .upload(&container, &"../outside".into(), Bytes::new(), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn versions_report_one_latest_version_per_object() {
        let (_dir, backend, container) = seeded(&["a", "b", "c"]).await;
        let backend = backend.with_page_size(2);

        let first = backend.list_versions(&container, None, None).await.unwrap();
        assert_eq!(first.versions.len(), 2);
        assert!(first.versions.iter().all(|v| v.is_latest && v.version_id == "null"));
        assert_eq!(first.next_key_marker.as_deref(), Some("b"));

        let second = backend
            .list_versions(&container, Some("b"), Some("null"))
            .await.unwrap();
        assert_eq!(second.versions.len(), 1);
        assert_eq!(second.versions[0].key, ObjectKey::from("c"));
        assert!(second.is_last());
    }
}
