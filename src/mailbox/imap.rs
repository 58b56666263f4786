//! IMAP mailbox — search and labels over raw IMAP with rustls.
//!
//! Every trait call opens a short session (connect, LOGIN, CAPABILITY,
//! SELECT), runs its commands and logs out. The blocking socket work runs
//! on the blocking pool.
//!
//! Gmail (`X-GM-EXT-1`) gets real threads from `X-GM-THRID` and real labels
//! via `X-GM-LABELS`. Other servers get one thread per message and labels
//! stored as IMAP keywords.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mail_parser::{MessageParser, PartType};
use regex::Regex;
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::types::{Label, Message, Thread, group_into_threads};
use super::{LabelStore, MailSource};
use crate::config::{ConfigSource, parse_or};
use crate::error::{ConfigError, MailboxError};

// ── Configuration ───────────────────────────────────────────────────

/// IMAP/SMTP account settings.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    /// Address forwards are sent from.
    pub from_address: String,
    /// Folder searched for new mail.
    pub folder: String,
}

impl MailConfig {
    /// Build from `EMAIL_*` variables.
    pub fn from_source(source: &ConfigSource) -> Result<Self, ConfigError> {
        let imap_host = source.require("EMAIL_IMAP_HOST")?;
        let username = source.require("EMAIL_USERNAME")?;
        let password = SecretString::from(source.require("EMAIL_PASSWORD")?);

        let smtp_host = source
            .get("EMAIL_SMTP_HOST")
            .map(str::to_string)
            .unwrap_or_else(|| imap_host.replace("imap", "smtp"));

        Ok(Self {
            imap_port: parse_or(source, "EMAIL_IMAP_PORT", 993)?,
            smtp_port: parse_or(source, "EMAIL_SMTP_PORT", 587)?,
            from_address: source
                .get("EMAIL_FROM_ADDRESS")
                .map(str::to_string)
                .unwrap_or_else(|| username.clone()),
            folder: parse_or(source, "EMAIL_FOLDER", "INBOX".to_string())?,
            imap_host,
            smtp_host,
            username,
            password,
        })
    }
}

// ── Mailbox ─────────────────────────────────────────────────────────

/// IMAP-backed [`MailSource`] and [`LabelStore`].
pub struct ImapMailbox {
    config: MailConfig,
}

impl ImapMailbox {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    /// Open a session, run `op`, log out.
    async fn with_session<T, F>(&self, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession) -> Result<T, MailboxError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = ImapSession::open(&config)?;
            let result = op(&mut session);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl MailSource for ImapMailbox {
    async fn search_since(&self, since: DateTime<Utc>) -> Result<Vec<Thread>, MailboxError> {
        let messages = self
            .with_session(move |session| {
                let uids = session.search_since(since)?;
                session.fetch_messages(&uids)
            })
            .await?;

        // SEARCH SINCE only has day granularity.
        let in_window: Vec<Message> = messages.into_iter().filter(|m| m.date >= since).collect();
        debug!(count = in_window.len(), %since, "Fetched messages in scan window");
        Ok(group_into_threads(in_window))
    }
}

#[async_trait]
impl LabelStore for ImapMailbox {
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError> {
        let name = name.to_string();
        self.with_session(move |session| {
            if !session.gmail {
                return Ok(Some(keyword_label(&name)));
            }
            let response = session.command(&list_command(&name))?;
            let exists = response
                .untagged
                .iter()
                .any(|u| u.text.starts_with("* LIST"));
            Ok(exists.then(|| Label::named(name)))
        })
        .await
    }

    async fn create_label(&self, name: &str) -> Result<Label, MailboxError> {
        let name = name.to_string();
        self.with_session(move |session| {
            if !session.gmail {
                return Ok(keyword_label(&name));
            }
            session.command(&create_command(&name))?;
            Ok(Label::named(name))
        })
        .await
    }

    async fn add_label(&self, thread: &Thread, label: &Label) -> Result<(), MailboxError> {
        let uids: Vec<String> = thread.messages.iter().map(|m| m.id.clone()).collect();
        if uids.is_empty() {
            return Ok(());
        }
        let label = label.clone();
        self.with_session(move |session| {
            session.command(&store_label_command(session.gmail, &uids, &label))?;
            Ok(())
        })
        .await
    }
}

fn list_command(name: &str) -> String {
    format!("LIST \"\" {}", quote(name))
}

fn create_command(name: &str) -> String {
    format!("CREATE {}", quote(name))
}

/// `UID STORE` adding `label` to `uids`: a Gmail label, or a keyword flag.
fn store_label_command(gmail: bool, uids: &[String], label: &Label) -> String {
    let set = uids.join(",");
    if gmail {
        format!("UID STORE {set} +X-GM-LABELS.SILENT ({})", quote(&label.name))
    } else {
        format!("UID STORE {set} +FLAGS.SILENT ({})", label.id)
    }
}

/// `UID SEARCH SINCE` one day before `since`.
///
/// Servers compare SINCE against each message's date in its own zone, so
/// the UTC date of `since` can be a day too late. Extras are dropped by the
/// caller's exact filter.
fn search_since_command(since: DateTime<Utc>) -> String {
    let day_before = since.checked_sub_signed(TimeDelta::days(1)).unwrap_or(since);
    format!("UID SEARCH SINCE {}", day_before.format("%d-%b-%Y"))
}

/// Label stored as an IMAP keyword: atom-safe version of the name.
fn keyword_label(name: &str) -> Label {
    let keyword: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && !"(){%*\"\\]".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    Label {
        id: keyword,
        name: name.to_string(),
    }
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// One untagged response line, with any literals it carried.
#[derive(Debug, Default)]
struct Untagged {
    text: String,
    literals: Vec<Vec<u8>>,
}

/// Everything the server sent for one tagged command.
#[derive(Debug)]
struct Response {
    untagged: Vec<Untagged>,
}

struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
    gmail: bool,
}

impl ImapSession {
    /// Connect over TLS, log in, detect Gmail, select the folder.
    fn open(config: &MailConfig) -> Result<Self, MailboxError> {
        let connect_err = |reason: String| MailboxError::Connect {
            host: config.imap_host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.imap_host.clone())
            .map_err(|e| connect_err(e.to_string()))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| connect_err(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
            gmail: false,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        session
            .command(&format!(
                "LOGIN {} {}",
                quote(&config.username),
                quote(config.password.expose_secret())
            ))
            .map_err(|_| MailboxError::AuthFailed {
                user: config.username.clone(),
            })?;

        let caps = session.command("CAPABILITY")?;
        session.gmail = caps
            .untagged
            .iter()
            .any(|u| u.text.starts_with("* CAPABILITY") && u.text.contains("X-GM-EXT-1"));

        session.command(&format!("SELECT {}", quote(&config.folder)))?;
        debug!(host = %config.imap_host, gmail = session.gmail, "IMAP session open");
        Ok(session)
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Protocol("IMAP connection closed".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailboxError> {
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Send a tagged command and collect the response. Anything but a
    /// tagged `OK` is an error.
    fn command(&mut self, command: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {command}\r\n").as_bytes())?;
        stream.flush()?;

        // Never echo LOGIN arguments into errors.
        let verb = command.split_whitespace().next().unwrap_or_default().to_string();
        let tag_prefix = format!("{tag} ");
        let mut untagged = Vec::new();

        loop {
            let line = self.read_line()?;
            if let Some(status) = line.strip_prefix(&tag_prefix) {
                if status.starts_with("OK") {
                    return Ok(Response { untagged });
                }
                return Err(MailboxError::CommandFailed {
                    command: verb,
                    response: status.trim_end().to_string(),
                });
            }
            if line.starts_with('+') {
                return Err(MailboxError::Protocol(format!(
                    "unexpected continuation for {verb}"
                )));
            }

            let mut item = Untagged {
                text: line,
                literals: Vec::new(),
            };
            while let Some(len) = literal_len(&item.text) {
                let literal = self.read_literal(len)?;
                item.literals.push(literal);
                let rest = self.read_line()?;
                item.text.push_str(&rest);
            }
            untagged.push(item);
        }
    }

    fn search_since(&mut self, since: DateTime<Utc>) -> Result<Vec<String>, MailboxError> {
        let response = self.command(&search_since_command(since))?;
        Ok(response
            .untagged
            .iter()
            .filter_map(|u| u.text.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace().map(str::to_string))
            .collect())
    }

    fn fetch_messages(&mut self, uids: &[String]) -> Result<Vec<Message>, MailboxError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let items = if self.gmail {
            "(UID INTERNALDATE X-GM-THRID BODY.PEEK[])"
        } else {
            "(UID INTERNALDATE BODY.PEEK[])"
        };
        let response = self.command(&format!("UID FETCH {} {items}", uids.join(",")))?;
        Ok(response
            .untagged
            .iter()
            .filter(|u| u.text.contains(" FETCH "))
            .filter_map(|u| {
                let parsed = parse_fetch(u);
                if parsed.is_none() {
                    warn!(line = %u.text.lines().next().unwrap_or_default(), "Skipping unparseable FETCH item");
                }
                parsed
            })
            .collect())
    }

    fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout did not complete cleanly");
        }
    }
}

/// Length of a trailing `{N}` literal marker, if the line ends with one.
fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

// ── FETCH parsing ───────────────────────────────────────────────────

static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bUID (\d+)").unwrap());
static THRID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"X-GM-THRID (\d+)").unwrap());
static INTERNALDATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"INTERNALDATE "([^"]+)""#).unwrap());

/// Parse an IMAP INTERNALDATE such as `17-Jul-1996 02:44:25 -0700`.
fn parse_internal_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Turn one FETCH response into a [`Message`].
fn parse_fetch(item: &Untagged) -> Option<Message> {
    let uid = UID_RE.captures(&item.text)?.get(1)?.as_str().to_string();
    let raw = item.literals.first()?;
    let parsed = MessageParser::default().parse(raw.as_slice())?;

    let date = INTERNALDATE_RE
        .captures(&item.text)
        .and_then(|c| parse_internal_date(c.get(1)?.as_str()))
        .or_else(|| {
            parsed
                .date()
                .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        })
        .unwrap_or_else(Utc::now);

    let thread_id = THRID_RE
        .captures(&item.text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| parsed.message_id().map(str::to_string))
        .unwrap_or_else(|| format!("uid-{uid}"));

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".into());

    let body_html = parsed.html_part(0).and_then(|part| match &part.body {
        PartType::Html(html) => Some(html.to_string()),
        _ => None,
    });

    Some(Message {
        id: uid,
        thread_id,
        from,
        subject: parsed.subject().unwrap_or_default().to_string(),
        body_plain: parsed
            .body_text(0)
            .map(|t| t.into_owned())
            .unwrap_or_default(),
        body_html,
        date,
    })
}
