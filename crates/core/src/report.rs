use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::error::FailureReason;
use crate::object::ObjectKey;

/// Outcome of one delete request, partitioning the requested keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteBatchResult {
    deleted: BTreeSet<ObjectKey>,
    failed: BTreeMap<ObjectKey, FailureReason>,
}

impl DeleteBatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key failed for the same reason.
    pub fn all_failed<'a>(
        keys: impl IntoIterator<Item = &'a ObjectKey>,
        reason: FailureReason,
    ) -> Self {
        let mut result = Self::new();
        for key in keys {
            result.record_failed(key.clone(), reason.clone());
        }
        result
    }

    pub fn record_deleted(&mut self, key: ObjectKey) {
        self.failed.remove(&key);
        self.deleted.insert(key);
    }

    pub fn record_failed(&mut self, key: ObjectKey, reason: FailureReason) {
        self.deleted.remove(&key);
        self.failed.insert(key, reason);
    }

    pub fn deleted(&self) -> &BTreeSet<ObjectKey> {
        &self.deleted
    }

    pub fn failed(&self) -> &BTreeMap<ObjectKey, FailureReason> {
        &self.failed
    }

    pub fn len(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }

    /// Restricts the result to exactly `submitted`.
    ///
    /// Keys the backend reported without being asked are dropped; submitted
    /// keys it did not report are recorded as failed.
    pub fn reconcile(mut self, submitted: &[ObjectKey]) -> Self {
        let wanted: HashSet<&ObjectKey> = submitted.iter().collect();
        self.deleted.retain(|key| wanted.contains(key));
        self.failed.retain(|key, _| wanted.contains(key));
        for key in submitted {
            if !self.deleted.contains(key) && !self.failed.contains_key(key) {
                self.failed.insert(
                    key.clone(),
                    FailureReason::backend("no result reported for key"),
                );
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Complete,
    /// The run was cancelled before listing was exhausted.
    Incomplete,
}

/// Aggregate of every batch issued by one bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkDeleteReport {
    status: ReportStatus,
    batches: usize,
    deleted: BTreeSet<ObjectKey>,
    failed: BTreeMap<ObjectKey, FailureReason>,
}

impl BulkDeleteReport {
    pub(crate) fn merge(&mut self, batch: DeleteBatchResult) {
        self.batches += 1;
        for key in batch.deleted {
            self.failed.remove(&key);
            self.deleted.insert(key);
        }
        for (key, reason) in batch.failed {
            self.deleted.remove(&key);
            self.failed.insert(key, reason);
        }
    }

    pub(crate) fn mark_incomplete(&mut self) {
        self.status = ReportStatus::Incomplete;
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == ReportStatus::Complete
    }

    /// Number of delete requests issued.
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Number of keys submitted for deletion.
    pub fn submitted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn deleted(&self) -> &BTreeSet<ObjectKey> {
        &self.deleted
    }

    pub fn failed(&self) -> &BTreeMap<ObjectKey, FailureReason> {
        &self.failed
    }

    pub fn not_found(&self) -> impl Iterator<Item = &ObjectKey> {
        self.failed
            .iter()
            .filter(|(_, reason)| **reason == FailureReason::NotFound)
            .map(|(key, _)| key)
    }
}
