use serde::Serialize;

pub type RecordId = i64;

/// One processed message, as persisted and handed downstream.
///
/// Built only by [`EmailRecord::assemble`] (or rehydrated by the store);
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRecord {
    subject: String,
    sender: String,
    body: String,
    date: String,
}

impl EmailRecord {
    /// Absent fields are passed as `None` and stored as empty strings.
    pub fn assemble(
        subject: Option<String>,
        sender: Option<String>,
        body: Option<String>,
        date: Option<String>,
    ) -> Self {
        Self {
            subject: subject.unwrap_or_default(),
            sender: sender.unwrap_or_default(),
            body: body.unwrap_or_default(),
            date: date.unwrap_or_default(),
        }
    }

    pub(crate) fn from_stored(subject: String, sender: String, body: String, date: String) -> Self {
        Self {
            subject,
            sender,
            body,
            date,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Header-format date, unparsed.
    pub fn date(&self) -> &str {
        &self.date
    }
}

/// A record read back from the store, with its row id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredEmail {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: EmailRecord,
}
