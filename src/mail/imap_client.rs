use anyhow::{Result, anyhow};
use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use crate::config::ImapConfig;

pub type MessageUid = u32;

/// Where unread raw messages come from.
pub trait MessageSource {
    /// Identifiers of unread messages, ascending.
    fn unseen_uids(&mut self) -> Result<Vec<MessageUid>>;
    /// Full RFC 822 bytes, or `None` if the server sent no body.
    fn fetch_raw(&mut self, uid: MessageUid) -> Result<Option<Vec<u8>>>;
}

pub struct ImapClient {
    session: imap::Session<TlsStream<TcpStream>>,
}

impl ImapClient {
    /// Connect over implicit TLS, log in and select the configured mailbox.
    pub fn connect(cfg: &ImapConfig, password: &str) -> Result<Self> {
        let tls = TlsConnector::builder().build()?;
        let server = cfg.server.as_str();
        debug!("connecting to {}:{}", server, cfg.port());
        let client = imap::connect((server, cfg.port()), server, &tls)?;

        let mut session = client
            .login(&cfg.username, password)
            .map_err(|(e, _client)| anyhow!("IMAP login as {} failed: {e}", cfg.username))?;

        let mailbox = session.select(cfg.mailbox())?;
        info!(
            "selected {} on {} ({} messages)",
            cfg.mailbox(),
            server,
            mailbox.exists
        );
        Ok(Self { session })
    }

    pub fn logout(mut self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }
}

impl MessageSource for ImapClient {
    fn unseen_uids(&mut self) -> Result<Vec<MessageUid>> {
        let mut uids: Vec<MessageUid> = self.session.uid_search("UNSEEN")?.into_iter().collect();
        uids.sort_unstable(); // ascending
        Ok(uids)
    }

    fn fetch_raw(&mut self, uid: MessageUid) -> Result<Option<Vec<u8>>> {
        // RFC822 (not BODY.PEEK) so the message is flagged \Seen once fetched.
        let fetches = self.session.uid_fetch(uid.to_string(), "RFC822")?;
        Ok(fetches
            .iter()
            .next()
            .and_then(|f| f.body())
            .map(|b| b.to_vec()))
    }
}
