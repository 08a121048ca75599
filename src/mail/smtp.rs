use anyhow::{Result, anyhow};
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use log::info;

use crate::config::SmtpConfig;
use crate::digest::Digest;

pub struct DigestSender {
    cfg: SmtpConfig,
    password: String,
}

impl DigestSender {
    pub fn new(cfg: SmtpConfig, password: String) -> Self {
        Self { cfg, password }
    }

    pub fn build_message(&self, digest: &Digest) -> Result<Message> {
        let from: Mailbox = self
            .cfg
            .from_address()
            .parse()
            .map_err(|e| anyhow!("invalid from address {:?}: {e}", self.cfg.from_address()))?;
        let to: Mailbox = self
            .cfg
            .recipient
            .parse()
            .map_err(|e| anyhow!("invalid recipient {:?}: {e}", self.cfg.recipient))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(digest.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(digest.body.clone())
            .map_err(|e| anyhow!("failed to build digest email: {e}"))
    }

    /// Implicit TLS on 465, STARTTLS otherwise.
    pub fn send(&self, digest: &Digest) -> Result<()> {
        let message = self.build_message(digest)?;
        let creds = Credentials::new(self.cfg.username.clone(), self.password.clone());
        let port = self.cfg.port();

        let builder = if port == 465 {
            SmtpTransport::relay(&self.cfg.server)
        } else {
            SmtpTransport::starttls_relay(&self.cfg.server)
        }
        .map_err(|e| anyhow!("SMTP relay error: {e}"))?;

        let mailer = builder.port(port).credentials(creds).build();
        mailer
            .send(&message)
            .map_err(|e| anyhow!("SMTP send error: {e}"))?;

        info!(
            "digest sent to {} via {}:{}",
            self.cfg.recipient, self.cfg.server, port
        );
        Ok(())
    }
}
