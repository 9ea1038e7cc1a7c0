use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Backend, BatchDeleter, Lister, MAX_BATCH_KEYS};
use crate::error::{FailureReason, StorageError, StorageResult};
use crate::object::{Container, ListPage, ObjectKey, ObjectVersion, VersionedListPage};
use crate::report::DeleteBatchResult;

/// Deletes in flight at once within one batch.
const DELETE_CONCURRENCY: usize = 16;
const PRESIGN_EXPIRY_SECS: u32 = 300;
const MAX_ERROR_BODY: usize = 200;

pub struct S3Backend {
    region: Region,
    credentials: Credentials,
    public_read: bool,
    http: reqwest::Client,
}

impl S3Backend {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> StorageResult<Self> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Transport(format!("invalid credentials: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        Ok(Self {
            region,
            credentials,
            public_read: true,
            http,
        })
    }

    /// Whether uploads are sent with a `public-read` ACL. Defaults to true.
    pub fn with_public_read(mut self, public_read: bool) -> Self {
        self.public_read = public_read;
        self
    }

    fn bucket(&self, container: &Container) -> StorageResult<Box<Bucket>> {
        let bucket = Bucket::new(
            container.name(),
            self.region.clone(),
            self.credentials.clone(),
        )
        .map_err(|e| StorageError::Transport(format!("cannot open bucket {container}: {e}")))?;
        Ok(bucket.with_path_style())
    }
}

async fn delete_key(bucket: &Bucket, key: &ObjectKey) -> Result<(), FailureReason> {
    match bucket.delete_object(key.as_str()).await {
        Ok(response) => classify_status(
            response.status_code(),
            &String::from_utf8_lossy(&response.to_vec()),
        ),
        Err(e) => Err(FailureReason::backend(e)),
    }
}

#[async_trait]
impl Lister for S3Backend {
    async fn list_page(
        &self,
        container: &Container,
        prefix: Option<&str>,
        continuation: Option<&str>,
    ) -> StorageResult<ListPage> {
        let bucket = self
            .bucket(container)
            .map_err(|e| StorageError::listing_failed(container, e))?;
        let (result, status) = bucket
            .list_page(
                prefix.unwrap_or_default().to_string(),
                None,
                continuation.map(str::to_string),
                None,
                Some(MAX_BATCH_KEYS),
            )
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;
        if !(200..300).contains(&status) {
            return Err(StorageError::listing_failed(container, format!("HTTP {status}")));
        }

        let continuation = match (result.is_truncated, result.next_continuation_token) {
            (false, _) => None,
            (true, Some(token)) => Some(token),
            (true, None) => {
                return Err(StorageError::listing_failed(
                    container,
                    "truncated listing without continuation token",
                ));
            }
        };
        let keys: Vec<ObjectKey> = result
            .contents
            .into_iter()
            .map(|object| ObjectKey::new(object.key))
            .collect();

        debug!(container = %container, keys = keys.len(), more = continuation.is_some(), "S3 LIST page");
        Ok(ListPage::new(keys, continuation))
    }
}

#[async_trait]
impl BatchDeleter for S3Backend {
    async fn delete_batch(&self, container: &Container, keys: &[ObjectKey]) -> DeleteBatchResult {
        let bucket = match self.bucket(container) {
            Ok(bucket) => bucket,
            Err(e) => {
                warn!(container = %container, error = %e, "S3 bucket unavailable, failing batch");
                return DeleteBatchResult::all_failed(keys, FailureReason::backend(e));
            }
        };
        let bucket: &Bucket = &bucket;

        let outcomes: Vec<_> = stream::iter(keys.iter().cloned())
            .map(move |key| async move {
                let outcome = delete_key(bucket, &key).await;
                (key, outcome)
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .collect()
            .await;

        let mut result = DeleteBatchResult::new();
        for (key, outcome) in outcomes {
            match outcome {
                Ok(()) => result.record_deleted(key),
                Err(reason) => result.record_failed(key, reason),
            }
        }
        debug!(
            container = %container,
            deleted = result.deleted().len(),
            failed = result.failed().len(),
            "S3 DELETE batch"
        );
        result
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn upload(
        &self,
        container: &Container,
        key: &ObjectKey,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<String> {
        let mut bucket = self
            .bucket(container)
            .map_err(|e| StorageError::upload(key, e))?;
        if self.public_read {
            bucket.add_header("x-amz-acl", "public-read");
        }
        let response = bucket
            .put_object_with_content_type(key.as_str(), &data, content_type)
            .await
            .map_err(|e| StorageError::upload(key, e))?;
        classify_status(
            response.status_code(),
            &String::from_utf8_lossy(&response.to_vec()),
        )
        .map_err(|reason| StorageError::upload(key, reason))?;
        Ok(object_url(&bucket.url(), key))
    }

    async fn delete_one(&self, container: &Container, key: &ObjectKey) -> StorageResult<()> {
        let bucket = self.bucket(container)?;
        match delete_key(&bucket, key).await {
            Ok(()) => Ok(()),
            Err(FailureReason::NotFound) => Err(StorageError::NotFound(key.to_string())),
            Err(FailureReason::Backend(reason)) => Err(StorageError::Transport(reason)),
        }
    }

    async fn list_versions(
        &self,
        container: &Container,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> StorageResult<VersionedListPage> {
        let bucket = self
            .bucket(container)
            .map_err(|e| StorageError::listing_failed(container, e))?;

        // rust-s3 has no ListObjectVersions; sign the request and send it ourselves.
        let queries = version_queries(key_marker, version_id_marker);
        let url = bucket
            .presign_get("/", PRESIGN_EXPIRY_SECS, Some(queries))
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::listing_failed(container, e))?;
        if !status.is_success() {
            return Err(StorageError::listing_failed(
                container,
                format!("HTTP {}: {}", status.as_u16(), describe_error(&body)),
            ));
        }
        parse_versions(&body).map_err(|e| StorageError::listing_failed(container, e))
    }
}

/// Query string of a ListObjectVersions request. S3 only honours a version
/// id marker together with a key marker.
fn version_queries(
    key_marker: Option<&str>,
    version_id_marker: Option<&str>,
) -> HashMap<String, String> {
    let mut queries = HashMap::new();
    queries.insert("versions".to_string(), String::new());
    if let Some(key) = key_marker {
        queries.insert("key-marker".to_string(), key.to_string());
        if let Some(version) = version_id_marker {
            queries.insert("version-id-marker".to_string(), version.to_string());
        }
    }
    queries
}

/// Only a missing object is `NotFound`; a 404 for the bucket itself
/// (`NoSuchBucket`) is a backend failure.
fn classify_status(status: u16, body: &str) -> Result<(), FailureReason> {
    match status {
        200..=299 => Ok(()),
        404 if matches!(error_code(body).as_deref(), None | Some("NoSuchKey")) => {
            Err(FailureReason::NotFound)
        }
        _ => Err(FailureReason::Backend(format!(
            "HTTP {status}: {}",
            describe_error(body)
        ))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

fn error_code(body: &str) -> Option<String> {
    quick_xml::de::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|error| error.code)
}

/// Short description of an S3 error body.
fn describe_error(body: &str) -> String {
    match quick_xml::de::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("{code}: {message}"),
        Ok(ErrorBody {
            code: Some(code), ..
        }) => code,
        _ => body.trim().chars().take(MAX_ERROR_BODY).collect(),
    }
}

fn object_url(base: &str, key: &ObjectKey) -> String {
    match reqwest::Url::parse(base) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().extend(key.as_str().split('/'));
            }
            url.to_string()
        }
        Err(_) => format!("{}/{key}", base.trim_end_matches('/')),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListVersionsResult {
    #[serde(default)]
    is_truncated: bool,
    next_key_marker: Option<String>,
    next_version_id_marker: Option<String>,
    #[serde(rename = "Version", default)]
    versions: Vec<VersionEntry>,
    #[serde(rename = "DeleteMarker", default)]
    delete_markers: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionEntry {
    key: String,
    version_id: String,
    #[serde(default)]
    is_latest: bool,
    last_modified: Option<String>,
    #[serde(default)]
    size: u64,
}

impl VersionEntry {
    fn into_version(self, is_delete_marker: bool) -> ObjectVersion {
        ObjectVersion {
            key: ObjectKey::new(self.key),
            version_id: self.version_id,
            is_latest: self.is_latest,
            is_delete_marker,
            last_modified: self
                .last_modified
                .as_deref()
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
            size: self.size,
        }
    }
}

fn parse_versions(xml: &str) -> Result<VersionedListPage, quick_xml::DeError> {
    let result: ListVersionsResult = quick_xml::de::from_str(xml)?;

    let mut versions: Vec<ObjectVersion> = result
        .versions
        .into_iter()
        .map(|entry| entry.into_version(false))
        .chain(
            result
                .delete_markers
                .into_iter()
                .map(|entry| entry.into_version(true)),
        )
        .collect();
    versions.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then(b.is_latest.cmp(&a.is_latest))
            .then(b.last_modified.cmp(&a.last_modified))
    });

    let (next_key_marker, next_version_id_marker) = if result.is_truncated {
        (result.next_key_marker, result.next_version_id_marker)
    } else {
        (None, None)
    };
    Ok(VersionedListPage {
        versions,
        next_key_marker,
        next_version_id_marker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSIONS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListVersionsResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>bucket</Name>
  <Prefix></Prefix>
  <KeyMarker></KeyMarker>
  <MaxKeys>1000</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextKeyMarker>report.pdf</NextKeyMarker>
  <NextVersionIdMarker>v-3</NextVersionIdMarker>
  <Version>
    <Key>photo.jpg</Key>
    <VersionId>v-1</VersionId>
    <IsLatest>false</IsLatest>
    <LastModified>2009-10-10T17:50:30.000Z</LastModified>
    <ETag>"abc"</ETag>
    <Size>434234</Size>
    <StorageClass>STANDARD</StorageClass>
  </Version>
  <DeleteMarker>
    <Key>photo.jpg</Key>
    <VersionId>v-2</VersionId>
    <IsLatest>true</IsLatest>
    <LastModified>2009-11-12T17:50:30.000Z</LastModified>
  </DeleteMarker>
  <Version>
    <Key>report.pdf</Key>
    <VersionId>v-3</VersionId>
    <IsLatest>true</IsLatest>
    <LastModified>2009-10-12T17:50:30.000Z</LastModified>
    <Size>12</Size>
  </Version>
</ListVersionsResult>"#;

    #[test]
    fn parses_versions_and_delete_markers() {
        let page = parse_versions(VERSIONS_XML).unwrap();
        assert_eq!(page.versions.len(), 3);

        let marker = &page.versions[0];
        assert_eq!(marker.key, ObjectKey::from("photo.jpg"));
        assert!(marker.is_delete_marker);
        assert!(marker.is_latest);
        assert_eq!(marker.size, 0);

        let old = &page.versions[1];
        assert_eq!(old.version_id, "v-1");
        assert!(!old.is_latest);
        assert_eq!(old.size, 434234);
        assert!(old.last_modified.is_some());

        assert_eq!(page.next_key_marker.as_deref(), Some("report.pdf"));
        assert_eq!(page.next_version_id_marker.as_deref(), Some("v-3"));
    }

    #[test]
    fn untruncated_listing_has_no_marker() {
        let xml = r#"<ListVersionsResult><IsTruncated>false</IsTruncated><NextKeyMarker>x</NextKeyMarker></ListVersionsResult>"#;
        let page = parse_versions(xml).unwrap();
        assert!(page.versions.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn version_queries_carry_both_markers() {
        let queries = version_queries(Some("photo.jpg"), Some("v-1"));
        assert_eq!(queries.get("versions").map(String::as_str), Some(""));
        assert_eq!(queries.get("key-marker").map(String::as_str), Some("photo.jpg"));
        assert_eq!(queries.get("version-id-marker").map(String::as_str), Some("v-1"));

        let queries = version_queries(None, Some("v-1"));
        assert_eq!(queries.len(), 1);
    }

    #[test]
    fn classifies_delete_statuses() {
        assert_eq!(classify_status(204, ""), Ok(()));
        assert_eq!(classify_status(404, ""), Err(FailureReason::NotFound));
        assert_eq!(
            classify_status(404, "<Error><Code>NoSuchKey</Code></Error>"),
            Err(FailureReason::NotFound)
        );

        let missing_bucket = r#"<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message></Error>"#;
        assert_eq!(
            classify_status(404, missing_bucket),
            Err(FailureReason::backend(
                "HTTP 404: NoSuchBucket: The specified bucket does not exist"
            ))
        );

        let body = r#"<Error><Code>AccessDenied</Code><Message>Access Denied</Message></Error>"#;
        assert_eq!(
            classify_status(403, body),
            Err(FailureReason::backend("HTTP 403: AccessDenied: Access Denied"))
        );
        assert_eq!(
            classify_status(500, "boom"),
            Err(FailureReason::backend("HTTP 500: boom"))
        );
    }

    #[test]
    fn object_url_encodes_key_segments() {
        let url = object_url("https://s3.example.com/bucket", &"dir/a b.txt".into());
        assert_eq!(url, "https://s3.example.com/bucket/dir/a%20b.txt");

        let url = object_url("https://bucket.s3.example.com/", &"file.txt".into());
        assert_eq!(url, "https://bucket.s3.example.com/file.txt");
    }
}
