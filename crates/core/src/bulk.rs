//! Pattern-based bulk deletion.
//!
//! Keys are listed page by page (optionally scoped to a prefix), filtered by
//! an optional regular expression and an optional [`BeforeDelete`] hook, and
//! deleted in batches of at most [`MAX_BATCH_KEYS`]. A failed listing aborts
//! the whole run; a failed batch only marks its keys as failed.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BatchDeleter, Lister, MAX_BATCH_KEYS};
use crate::error::{StorageError, StorageResult};
use crate::object::{Container, ListPage, ObjectKey};
use crate::report::BulkDeleteReport;

pub const DEFAULT_BATCH_SIZE: usize = MAX_BATCH_KEYS;

/// Hook invoked once per matching key before it joins a batch.
pub trait BeforeDelete: Send + Sync {
    /// Return `false` to keep the key out of the deletion.
    fn before_delete(&self, key: &ObjectKey) -> bool;
}

impl<F> BeforeDelete for F
where
    F: Fn(&ObjectKey) -> bool + Send + Sync,
{
    fn before_delete(&self, key: &ObjectKey) -> bool {
        self(key)
    }
}

/// Options for one bulk delete run.
#[derive(Clone)]
pub struct DeleteMatching {
    prefix: Option<String>,
    pattern: Option<String>,
    batch_size: usize,
    before_delete: Option<Arc<dyn BeforeDelete>>,
    cancellation: Option<CancellationToken>,
}

impl Default for DeleteMatching {
    fn default() -> Self {
        Self {
            prefix: None,
            pattern: None,
            batch_size: DEFAULT_BATCH_SIZE,
            before_delete: None,
            cancellation: None,
        }
    }
}

impl DeleteMatching {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only list keys starting with `prefix`. Empty means no prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    /// Only delete keys the regular expression matches in full. Empty means
    /// every listed key.
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        self.pattern = (!pattern.is_empty()).then_some(pattern);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn before_delete(mut self, hook: impl BeforeDelete + 'static) -> Self {
        self.before_delete = Some(Arc::new(hook));
        self
    }

    /// Stop issuing requests once `token` is cancelled; the report is then
    /// returned as incomplete.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn prefix_str(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn pattern_str(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    fn compile(&self) -> StorageResult<Option<Regex>> {
        let Some(pattern) = &self.pattern else {
            return Ok(None);
        };
        let invalid = |source: regex::Error| StorageError::InvalidPattern {
            pattern: pattern.clone(),
            source,
        };
        Regex::new(pattern).map_err(invalid)?;
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Some)
            .map_err(invalid)
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn is_eligible(&self, pattern: Option<&Regex>, key: &ObjectKey) -> bool {
        self.prefix
            .as_deref()
            .is_none_or(|prefix| key.as_str().starts_with(prefix))
            && pattern.is_none_or(|re| re.is_match(key.as_str()))
    }

    /// Delete every key in `container` that passes the configured filters.
    pub async fn run<L, D>(
        &self,
        lister: &L,
        deleter: &D,
        container: &Container,
    ) -> StorageResult<BulkDeleteReport>
    where
        L: Lister + ?Sized,
        D: BatchDeleter + ?Sized,
    {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_KEYS {
            return Err(StorageError::InvalidBatchSize(self.batch_size));
        }
        let pattern = self.compile()?;

        let mut report = BulkDeleteReport::default();
        let mut pending = Vec::with_capacity(self.batch_size);
        let mut seen = HashSet::new();
        let mut continuation: Option<String> = None;

        loop {
            let Some(page) = self
                .fetch_page(lister, container, continuation.as_deref())
                .await?
            else {
                return Ok(self.cancelled(report, pending.len()));
            };
            debug!(
                container = %container,
                keys = page.keys.len(),
                more = !page.is_last(),
                "bulk delete: page listed"
            );

            for key in page.keys {
                if !self.is_eligible(pattern.as_ref(), &key) || !seen.insert(key.clone()) {
                    continue;
                }
                if let Some(hook) = &self.before_delete {
                    if !hook.before_delete(&key) {
                        debug!(key = %key, "bulk delete: skipped by hook");
                        continue;
                    }
                }
                pending.push(key);

                if pending.len() == self.batch_size {
                    if self.is_cancelled() {
                        return Ok(self.cancelled(report, pending.len()));
                    }
                    self.flush(deleter, container, &mut pending, &mut report)
                        .await;
                }
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        if !pending.is_empty() {
            if self.is_cancelled() {
                return Ok(self.cancelled(report, pending.len()));
            }
            self.flush(deleter, container, &mut pending, &mut report)
                .await;
        }

        info!(
            container = %container,
            deleted = report.deleted().len(),
            failed = report.failed().len(),
            batches = report.batches(),
            "bulk delete finished"
        );
        Ok(report)
    }

    /// `None` when cancelled before the page arrived.
    async fn fetch_page<L: Lister + ?Sized>(
        &self,
        lister: &L,
        container: &Container,
        continuation: Option<&str>,
    ) -> StorageResult<Option<ListPage>> {
        if self.is_cancelled() {
            return Ok(None);
        }
        let request = lister.list_page(container, self.prefix.as_deref(), continuation);
        let page = match &self.cancellation {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Ok(None),
                page = request => page,
            },
            None => request.await,
        };
        page.map(Some).map_err(|e| match e {
            e @ StorageError::ListingFailed { .. } => e,
            other => StorageError::listing_failed(container, other),
        })
    }

    async fn flush<D: BatchDeleter + ?Sized>(
        &self,
        deleter: &D,
        container: &Container,
        pending: &mut Vec<ObjectKey>,
        report: &mut BulkDeleteReport,
    ) {
        let batch = std::mem::replace(pending, Vec::with_capacity(self.batch_size));
        let result = deleter
            .delete_batch(container, &batch)
            .await
            .reconcile(&batch);

        if result.is_ok() {
            debug!(container = %container, keys = batch.len(), "bulk delete: batch deleted");
        } else {
            warn!(
                container = %container,
                submitted = batch.len(),
                failed = result.failed().len(),
                "bulk delete: batch had failures"
            );
        }
        report.merge(result);
    }

    fn cancelled(&self, mut report: BulkDeleteReport, unsubmitted: usize) -> BulkDeleteReport {
        warn!(
            deleted = report.deleted().len(),
            failed = report.failed().len(),
            unsubmitted,
            "bulk delete cancelled"
        );
        report.mark_incomplete();
        report
    }
}
