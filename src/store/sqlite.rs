use anyhow::Result;
use rusqlite::{Connection, Row, params};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::domain::email::{EmailRecord, RecordId, StoredEmail};
use crate::store::repo::MailRepository;

pub struct SqliteRepo {
    conn: Connection,
}

impl SqliteRepo {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self { conn };
        repo.migrate()?;
        Ok(repo)
    }

    pub fn open_in_memory() -> Result<Self> {
        let repo = Self {
            conn: Connection::open_in_memory()?,
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS emails (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                subject     TEXT NOT NULL,
                sender      TEXT NOT NULL,
                body        TEXT NOT NULL,
                date        TEXT NOT NULL,
                date_epoch  INTEGER NOT NULL,
                stored_at   INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS emails_subject ON emails(subject);
            CREATE INDEX IF NOT EXISTS emails_date_epoch ON emails(date_epoch);
            "#,
        )?;
        Ok(())
    }

    fn insert_at(&self, record: &EmailRecord, stored_at: i64) -> Result<RecordId> {
        // Missing or unparseable dates sort as if received when stored.
        let date_epoch = match record.date().trim() {
            "" => stored_at,
            d => mailparse::dateparse(d).unwrap_or(stored_at),
        };
        self.conn.execute(
            r#"
            INSERT INTO emails (subject, sender, body, date, date_epoch, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.subject(),
                record.sender(),
                record.body(),
                record.date(),
                date_epoch,
                stored_at
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_within_at(&self, window: Duration, now: i64) -> Result<Vec<StoredEmail>> {
        let cutoff = now.saturating_sub(i64::try_from(window.as_secs()).unwrap_or(i64::MAX));
        self.query(
            r#"
            SELECT id, subject, sender, body, date
            FROM emails
            WHERE date_epoch >= ?1
            ORDER BY date_epoch DESC, id DESC
            "#,
            params![cutoff],
        )
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<StoredEmail>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            out.push(row_to_email(r)?);
        }
        Ok(out)
    }
}

fn row_to_email(r: &Row<'_>) -> rusqlite::Result<StoredEmail> {
    Ok(StoredEmail {
        id: r.get(0)?,
        record: EmailRecord::from_stored(r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?),
    })
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl MailRepository for SqliteRepo {
    fn insert(&self, record: &EmailRecord) -> Result<RecordId> {
        self.insert_at(record, now_epoch())
    }

    fn list_all(&self) -> Result<Vec<StoredEmail>> {
        self.query(
            r#"
            SELECT id, subject, sender, body, date
            FROM emails
            ORDER BY id ASC
            "#,
            [],
        )
    }

    fn search_by_subject(&self, subject: &str) -> Result<Vec<StoredEmail>> {
        self.query(
            r#"
            SELECT id, subject, sender, body, date
            FROM emails
            WHERE subject = ?1
            ORDER BY id ASC
            "#,
            params![subject],
        )
    }

    fn list_within(&self, window: Duration) -> Result<Vec<StoredEmail>> {
        self.list_within_at(window, now_epoch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JAN_1_2024: i64 = 1_704_067_200;
    const DAY: i64 = 86_400;

    fn rec(subject: &str, date: &str) -> EmailRecord {
        EmailRecord::assemble(
            Some(subject.to_string()),
            Some("a@example.com".to_string()),
            Some(format!("body of {subject}")),
            Some(date.to_string()),
        )
    }

    #[test]
    fn insert_then_list_all_in_order() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let a = repo.insert(&rec("first", "")).unwrap();
        let b = repo.insert(&rec("second", "")).unwrap();
        assert!(b > a);

        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a);
        assert_eq!(all[0].record, rec("first", ""));
        assert_eq!(all[1].record.subject(), "second");
    }

    #[test]
    fn search_matches_exact_subject_only() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.insert(&rec("Invoice", "")).unwrap();
        repo.insert(&rec("Invoice reminder", "")).unwrap();
        repo.insert(&rec("Invoice", "")).unwrap();

        let hits = repo.search_by_subject("Invoice").unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.record.subject() == "Invoice"));
        assert!(repo.search_by_subject("invoice").unwrap().is_empty());
    }

    #[test]
    fn window_uses_message_date_newest_first() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let now = JAN_1_2024 + DAY;
        repo.insert_at(&rec("old", "Fri, 1 Dec 2023 00:00:00 +0000"), now)
            .unwrap();
        repo.insert_at(&rec("recent", "Mon, 1 Jan 2024 00:00:00 +0000"), now)
            .unwrap();
        repo.insert_at(&rec("today", "Tue, 2 Jan 2024 00:00:00 +0000"), now)
            .unwrap();

        let week = Duration::from_secs(7 * DAY as u64);
        let got: Vec<_> = repo
            .list_within_at(week, now)
            .unwrap()
            .into_iter()
            .map(|e| e.record.subject().to_string())
            .collect();
        assert_eq!(got, ["today", "recent"]);
    }

    #[test]
    fn undated_records_count_as_stored_time() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.insert_at(&rec("no date", ""), JAN_1_2024).unwrap();

        let week = Duration::from_secs(7 * DAY as u64);
        assert_eq!(repo.list_within_at(week, JAN_1_2024 + DAY).unwrap().len(), 1);
        assert!(repo
            .list_within_at(week, JAN_1_2024 + 30 * DAY)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn oversized_window_reaches_back_to_the_start() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        repo.insert_at(&rec("ancient", "Thu, 1 Jan 1970 00:00:01 +0000"), JAN_1_2024)
            .unwrap();
        repo.insert_at(&rec("recent", "Mon, 1 Jan 2024 00:00:00 +0000"), JAN_1_2024)
            .unwrap();

        let all = repo
            .list_within_at(Duration::from_secs(u64::MAX), JAN_1_2024)
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].record.subject(), "ancient");
    }
}
