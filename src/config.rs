use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mail::extract::ExtractOptions;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub smtp: Option<SmtpConfig>,
    pub db_path: Option<String>,
    #[serde(default)]
    pub extract: ExtractOptions,
    #[serde(default)]
    pub digest: DigestConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImapConfig {
    pub server: String,
    pub port: Option<u16>,
    pub username: String,
    /// Falls back to the keyring, then `MAIL_DIGEST_IMAP_PASSWORD`.
    pub password: Option<String>,
    pub mailbox: Option<String>,
}

impl ImapConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(993)
    }

    pub fn mailbox(&self) -> &str {
        self.mailbox.as_deref().unwrap_or("INBOX")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmtpConfig {
    pub server: String,
    pub port: Option<u16>,
    pub username: String,
    /// Falls back to the keyring, then `MAIL_DIGEST_SMTP_PASSWORD`.
    pub password: Option<String>,
    /// Defaults to `username`.
    pub from: Option<String>,
    pub recipient: String,
}

impl SmtpConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(587)
    }

    pub fn from_address(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DigestConfig {
    pub window_days: u64,
    pub summary_chars: usize,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            window_days: 7,
            summary_chars: 200,
        }
    }
}

impl DigestConfig {
    /// `window_days` as a duration, saturating for absurdly large values.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_days.saturating_mul(24 * 60 * 60))
    }
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("mail_digest"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("mail.db");
    Ok(p)
}

fn template() -> Config {
    Config {
        imap: ImapConfig {
            server: "imap.gmail.com".to_string(),
            port: Some(993),
            username: "you@example.com".to_string(),
            password: None,
            mailbox: Some("INBOX".to_string()),
        },
        smtp: Some(SmtpConfig {
            server: "smtp.gmail.com".to_string(),
            port: Some(587),
            username: "you@example.com".to_string(),
            password: None,
            from: None,
            recipient: "you@example.com".to_string(),
        }),
        db_path: None,
        extract: ExtractOptions::default(),
        digest: DigestConfig::default(),
    }
}

/// Load `path`, or the default `config.toml` (writing a template if missing).
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = config_path()?;
            if !p.exists() {
                // create a template config for users to edit
                let tom = toml::to_string_pretty(&template())?;
                fs::write(&p, tom)?;
                return Err(anyhow::anyhow!(
                    "Created template config at {}: edit it and run again",
                    p.display()
                ));
            }
            p
        }
    };
    let s = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&s, is_json(&path)).with_context(|| format!("parsing config {}", path.display()))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

pub fn parse_config(s: &str, json: bool) -> Result<Config> {
    let cfg = if json {
        serde_json::from_str(s)?
    } else {
        toml::from_str(s)?
    };
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}
