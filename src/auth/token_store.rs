use anyhow::{Result, anyhow};
use keyring::{Entry, Error as KeyringError};

const SERVICE: &str = "mail_digest";

/// Which server a stored password belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Account {
    Imap,
    Smtp,
}

impl Account {
    fn key(self, username: &str) -> String {
        match self {
            Account::Imap => format!("imap:{username}"),
            Account::Smtp => format!("smtp:{username}"),
        }
    }

    /// Environment variable consulted when neither config nor keyring has one.
    pub fn env_var(self) -> &'static str {
        match self {
            Account::Imap => "MAIL_DIGEST_IMAP_PASSWORD",
            Account::Smtp => "MAIL_DIGEST_SMTP_PASSWORD",
        }
    }
}

/// Save a password into the OS keyring for the given account and username
pub fn save_password(account: Account, username: &str, password: &str) -> Result<()> {
    let entry = Entry::new(SERVICE, &account.key(username));
    entry?
        .set_password(password)
        .map_err(|e| anyhow!(e.to_string()))?;
    Ok(())
}

/// Load a password from the keyring for the given account and username
pub fn load_password(account: Account, username: &str) -> Result<Option<String>> {
    let entry = Entry::new(SERVICE, &account.key(username));
    match entry?.get_password() {
        Ok(v) => Ok(Some(v)),
        Err(KeyringError::NoEntry) => Ok(None),
        Err(e) => Err(anyhow!(e.to_string())),
    }
}

/// Config value first, then keyring, then environment.
pub fn resolve_password(
    account: Account,
    username: &str,
    configured: Option<&str>,
) -> Result<String> {
    if let Some(p) = configured.filter(|p| !p.is_empty()) {
        return Ok(p.to_string());
    }
    match load_password(account, username) {
        Ok(Some(p)) => return Ok(p),
        Ok(None) => {}
        Err(e) => log::warn!("keyring lookup failed for {username}: {e}"),
    }
    std::env::var(account.env_var()).map_err(|_| {
        anyhow!(
            "no {:?} password for {username}: set it in the config, run `set-password`, or export {}",
            account,
            account.env_var()
        )
    })
}
