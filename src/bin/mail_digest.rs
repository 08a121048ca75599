use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use mail_digest::auth::token_store::{self, Account};
use mail_digest::config::{Config, load_config, resolve_db_path};
use mail_digest::daemon::{Ingestor, run_every};
use mail_digest::digest::compose_digest;
use mail_digest::domain::email::StoredEmail;
use mail_digest::mail::imap_client::ImapClient;
use mail_digest::mail::smtp::DigestSender;
use mail_digest::store::repo::MailRepository;
use mail_digest::store::sqlite::SqliteRepo;

#[derive(Parser)]
#[command(name = "mail_digest")]
#[command(about = "Store unread mail as plain text and send digests of it", long_about = None)]
struct Cli {
    /// Config file (.toml or .json); defaults to the user config dir
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch unread mail once and store it
    Run,

    /// Fetch unread mail every `interval` seconds until Ctrl-C
    Watch {
        #[arg(long, default_value_t = 300)]
        interval: u64,
    },

    /// Send a digest of the mail stored in the last N days
    Digest {
        /// Overrides `digest.window_days`
        #[arg(long)]
        days: Option<u64>,

        /// Print the digest instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Print stored mail with exactly this subject
    Search {
        subject: String,

        #[arg(long)]
        json: bool,
    },

    /// Store an IMAP or SMTP password in the keyring
    SetPassword {
        #[arg(long, value_enum)]
        account: AccountArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AccountArg {
    Imap,
    Smtp,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref()).map_err(|e| anyhow!("Configuration error: {e:#}"))?;

    match cli.cmd {
        Command::Run => {
            let repo = open_repo(&cfg)?;
            let report = ingest(&cfg, &repo)?;
            if report.is_empty() {
                println!("No unread emails found.");
            } else {
                println!("Found {} unread emails:", report.len());
                for e in &report {
                    print_summary(e);
                }
            }
            Ok(())
        }

        Command::Watch { interval } => {
            let repo = open_repo(&cfg)?;
            run_every(Duration::from_secs(interval), || ingest(&cfg, &repo).map(|_| ()))
        }

        Command::Digest { days, dry_run } => {
            let repo = open_repo(&cfg)?;
            let mut digest_cfg = cfg.digest.clone();
            if let Some(d) = days {
                digest_cfg.window_days = d;
            }

            let records = repo.list_within(digest_cfg.window())?;
            let Some(digest) = compose_digest(&records, &digest_cfg) else {
                println!("No summaries to send.");
                return Ok(());
            };

            if dry_run {
                println!("Subject: {}\n\n{}", digest.subject, digest.body);
                return Ok(());
            }

            let smtp = cfg
                .smtp
                .clone()
                .ok_or_else(|| anyhow!("[smtp] section not set in config"))?;
            let password =
                token_store::resolve_password(Account::Smtp, &smtp.username, smtp.password.as_deref())?;
            DigestSender::new(smtp, password).send(&digest)?;
            println!("Sent digest of {} emails", records.len());
            Ok(())
        }

        Command::Search { subject, json } => {
            let repo = open_repo(&cfg)?;
            let hits = repo.search_by_subject(&subject)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for e in &hits {
                    print_summary(e);
                    println!("  {}", e.record.body());
                }
            }
            Ok(())
        }

        Command::SetPassword { account } => {
            let (account, username) = match account {
                AccountArg::Imap => (Account::Imap, cfg.imap.username.clone()),
                AccountArg::Smtp => (
                    Account::Smtp,
                    cfg.smtp
                        .as_ref()
                        .map(|s| s.username.clone())
                        .ok_or_else(|| anyhow!("[smtp] section not set in config"))?,
                ),
            };
            eprintln!("Paste password for {username} (end with Ctrl-D):");
            let mut secret = String::new();
            std::io::Read::read_to_string(&mut std::io::stdin(), &mut secret)?;
            token_store::save_password(account, &username, secret.trim())?;
            println!("Saved {account:?} password for {username}");
            Ok(())
        }
    }
}

fn open_repo(cfg: &Config) -> Result<SqliteRepo> {
    let db_path = resolve_db_path(cfg)?;
    info!("using store {}", db_path.display());
    SqliteRepo::open(&db_path)
}

fn ingest(cfg: &Config, repo: &SqliteRepo) -> Result<Vec<StoredEmail>> {
    let password =
        token_store::resolve_password(Account::Imap, &cfg.imap.username, cfg.imap.password.as_deref())?;
    let mut imap = ImapClient::connect(&cfg.imap, &password)?;
    let report = Ingestor::new(repo, &cfg.extract).run_once(&mut imap)?;
    imap.logout()?;
    Ok(report.stored)
}

fn print_summary(e: &StoredEmail) {
    println!(
        "Subject: {}, From: {}, Date: {}",
        e.record.subject(),
        e.record.sender(),
        e.record.date()
    );
}
