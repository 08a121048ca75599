use crate::config::DigestConfig;
use crate::domain::email::StoredEmail;
use crate::mail::decoders::truncate_chars;

/// Text of the outgoing summary email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub subject: String,
    pub body: String,
}

/// One section per record, in the order given. `None` when there is nothing
/// to summarise.
pub fn compose_digest(records: &[StoredEmail], cfg: &DigestConfig) -> Option<Digest> {
    if records.is_empty() {
        return None;
    }

    let n = records.len();
    let subject = format!(
        "Email digest: {} message{} from the last {} day{}",
        n,
        plural(n as u64),
        cfg.window_days,
        plural(cfg.window_days)
    );

    let mut body = String::new();
    for (i, e) in records.iter().enumerate() {
        let r = &e.record;
        if i > 0 {
            body.push_str("\n----\n\n");
        }
        body.push_str(&format!(
            "From:    {}\nSubject: {}\nDate:    {}\n\n{}\n",
            or_dash(r.sender()),
            or_dash(r.subject()),
            or_dash(r.date()),
            or_dash(&truncate_chars(r.body(), cfg.summary_chars)),
        ));
    }

    Some(Digest { subject, body })
}

fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}
