pub mod backend;
pub mod bulk;
pub mod error;
pub mod object;
pub mod report;
pub mod storage;

pub use bulk::{BeforeDelete, DeleteMatching};
pub use error::{FailureReason, StorageError, StorageResult};
pub use object::{Container, ListPage, ObjectKey, ObjectVersion, VersionedListPage};
pub use report::{BulkDeleteReport, DeleteBatchResult, ReportStatus};
pub use storage::Storage;
