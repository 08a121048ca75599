use anyhow::Result;
use std::time::Duration;

use crate::domain::email::{EmailRecord, RecordId, StoredEmail};

/// Append-only sink for processed messages, plus the queries the digest
/// and the CLI need.
pub trait MailRepository {
    fn insert(&self, record: &EmailRecord) -> Result<RecordId>;

    /// Every record, oldest first.
    fn list_all(&self) -> Result<Vec<StoredEmail>>;
    /// Records whose subject is exactly `subject`.
    fn search_by_subject(&self, subject: &str) -> Result<Vec<StoredEmail>>;
    /// Records dated within `window` of now, newest first.
    fn list_within(&self, window: Duration) -> Result<Vec<StoredEmail>>;
}
