use anyhow::Result;
use log::{info, warn};
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::domain::email::StoredEmail;
use crate::mail::extract::{ExtractOptions, extract_record};
use crate::mail::imap_client::MessageSource;
use crate::store::repo::MailRepository;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Unread messages the server reported.
    pub fetched: usize,
    pub stored: Vec<StoredEmail>,
    /// Messages dropped because fetch, parse or insert failed.
    pub skipped: usize,
}

/// One pass over the unread messages. Holds no state between messages.
pub struct Ingestor<'a> {
    repo: &'a dyn MailRepository,
    opts: &'a ExtractOptions,
}

impl<'a> Ingestor<'a> {
    pub fn new(repo: &'a dyn MailRepository, opts: &'a ExtractOptions) -> Self {
        Self { repo, opts }
    }

    /// Fetch, extract and store each unread message in turn.
    ///
    /// Only failing to list messages is an error; a message that can't be
    /// fetched, parsed or stored is logged and skipped.
    pub fn run_once(&self, source: &mut dyn MessageSource) -> Result<IngestReport> {
        let uids = source.unseen_uids()?;
        let mut report = IngestReport {
            fetched: uids.len(),
            ..Default::default()
        };
        if uids.is_empty() {
            info!("no unread emails found");
            return Ok(report);
        }

        for uid in uids {
            let raw = match source.fetch_raw(uid) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    warn!("UID {uid}: server returned no body; skipping");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("UID {uid}: fetch failed: {e}");
                    report.skipped += 1;
                    continue;
                }
            };

            let record = match extract_record(&raw, self.opts) {
                Ok(r) => r,
                Err(e) => {
                    warn!("UID {uid}: {e}");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.repo.insert(&record) {
                Ok(id) => {
                    info!("UID {uid}: stored as #{id}: {:?}", record.subject());
                    report.stored.push(StoredEmail { id, record });
                }
                Err(e) => {
                    warn!("UID {uid}: insert failed: {e}");
                    report.skipped += 1;
                }
            }
        }

        info!(
            "saved {} of {} unread emails ({} skipped)",
            report.stored.len(),
            report.fetched,
            report.skipped
        );
        Ok(report)
    }
}

/// Call `cycle` every `interval` until Ctrl-C. A failed cycle is logged and
/// retried on the next tick.
pub fn run_every<F>(interval: Duration, mut cycle: F) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = cycle() {
            warn!("ingestion cycle failed: {e:#}");
        }

        // sleep in short steps so Ctrl-C is noticed promptly
        let mut slept = Duration::ZERO;
        while slept < interval && running.load(Ordering::SeqCst) {
            let step = Duration::from_millis(250).min(interval - slept);
            thread::sleep(step);
            slept += step;
        }
    }

    info!("stopping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::imap_client::MessageUid;
    use crate::store::sqlite::SqliteRepo;
    use anyhow::anyhow;
    use std::collections::BTreeMap;

    struct FakeSource {
        messages: BTreeMap<MessageUid, Option<Vec<u8>>>,
        broken: Vec<MessageUid>,
    }

    impl MessageSource for FakeSource {
        fn unseen_uids(&mut self) -> Result<Vec<MessageUid>> {
            let mut ids: Vec<_> = self.messages.keys().copied().collect();
            ids.extend(&self.broken);
            ids.sort_unstable();
            Ok(ids)
        }

        fn fetch_raw(&mut self, uid: MessageUid) -> Result<Option<Vec<u8>>> {
            if self.broken.contains(&uid) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.messages.get(&uid).cloned().flatten())
        }
    }

    fn msg(subject: &str, body: &str) -> Option<Vec<u8>> {
        Some(format!("Subject: {subject}\r\nFrom: x@example.com\r\n\r\n{body}\r\n").into_bytes())
    }

    #[test]
    fn failures_skip_only_the_failing_message() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let opts = ExtractOptions::default();
        let mut source = FakeSource {
            messages: BTreeMap::from([(1, msg("one", "a")), (2, None), (4, msg("four", "d"))]),
            broken: vec![3],
        };

        let report = Ingestor::new(&repo, &opts).run_once(&mut source).unwrap();
        assert_eq!(report.fetched, 4);
        assert_eq!(report.skipped, 2);
        let subjects: Vec<_> = report.stored.iter().map(|e| e.record.subject()).collect();
        assert_eq!(subjects, ["one", "four"]);
        assert_eq!(repo.list_all().unwrap(), report.stored);
    }

    #[test]
    fn empty_inbox_is_a_quiet_success() {
        let repo = SqliteRepo::open_in_memory().unwrap();
        let opts = ExtractOptions::default();
        let mut source = FakeSource {
            messages: BTreeMap::new(),
            broken: vec![],
        };
        let report = Ingestor::new(&repo, &opts).run_once(&mut source).unwrap();
        assert_eq!(report, IngestReport::default());
    }
}
