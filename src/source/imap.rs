//! IMAP message source — raw IMAP over rustls, blocking I/O in `spawn_blocking`.
//!
//! One session is opened on the first fetch of a run and kept until
//! `disconnect()`. Messages are read with `BODY.PEEK[]` so polling never
//! changes `\Seen` flags in the mailbox.
//!
//! `SEARCH SINCE` matches on the server's local date of INTERNALDATE, so the
//! search starts `search_slack_days` before the checkpoint. The overlap is
//! absorbed by the ledger gate.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use rustls_pki_types::ServerName;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::config::MailboxConfig;
use crate::error::SourceError;
use crate::source::{FetchScope, MessageSource, RawMessage, mime};

/// Socket read/write timeout. A stuck server stalls a run at most this long per read.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Days searched before the checkpoint when nothing else is configured.
pub const DEFAULT_SEARCH_SLACK_DAYS: i64 = 1;

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder (Gmail label) to poll.
    pub label: String,
    /// Whole days searched before the fetch scope's `since`. At least 1.
    pub search_slack_days: i64,
}

impl From<&MailboxConfig> for ImapConfig {
    fn from(mailbox: &MailboxConfig) -> Self {
        Self {
            host: mailbox.imap_host.clone(),
            port: mailbox.imap_port,
            username: mailbox.email.clone(),
            password: mailbox.password.clone(),
            label: mailbox.label.clone(),
            search_slack_days: DEFAULT_SEARCH_SLACK_DAYS,
        }
    }
}

/// Bulk-poll source over a single IMAP label.
pub struct ImapSource {
    config: ImapConfig,
    session: Arc<Mutex<Option<ImapSession>>>,
}

impl ImapSource {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl MessageSource for ImapSource {
    fn source_key(&self) -> String {
        format!("imap:{}/{}", self.config.username, self.config.label)
    }

    async fn fetch(&self, scope: &FetchScope) -> Result<Vec<RawMessage>, SourceError> {
        let config = self.config.clone();
        let slot = Arc::clone(&self.session);
        let criterion = search_criterion(scope.since, self.config.search_slack_days);
        let source_key = self.source_key();

        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .lock()
                .map_err(|_| SourceError::Protocol("IMAP session lock poisoned".into()))?;
            if guard.is_none() {
                *guard = Some(ImapSession::connect(&config)?);
            }
            let Some(session) = guard.as_mut() else {
                return Err(SourceError::Protocol("IMAP session missing after connect".into()));
            };
            let result = session.fetch_matching(&config.label, &criterion);
            if result.is_err() {
                // Never reuse a session that failed mid-conversation
                *guard = None;
            }
            result
        })
        .await;

        match outcome {
            Ok(Ok(messages)) => {
                info!(source = %source_key, count = messages.len(), "Fetched messages from IMAP");
                Ok(messages)
            }
            Ok(Err(e)) => Err(SourceError::Unavailable {
                source_key,
                reason: e.to_string(),
            }),
            Err(e) => Err(SourceError::Unavailable {
                source_key,
                reason: format!("IMAP fetch task failed: {e}"),
            }),
        }
    }

    async fn disconnect(&self) {
        let slot = Arc::clone(&self.session);
        let closed = tokio::task::spawn_blocking(move || {
            let session = slot.lock().ok().and_then(|mut guard| guard.take());
            match session {
                Some(session) => {
                    session.logout();
                    true
                }
                None => false,
            }
        })
        .await
        .unwrap_or(false);

        if closed {
            debug!(source = %self.source_key(), "IMAP session closed");
        }
    }
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// An authenticated IMAP session.
struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

/// Collected response to one tagged command.
#[derive(Debug, Default)]
struct ImapResponse {
    /// Untagged and tagged lines, CRLF stripped.
    lines: Vec<String>,
    /// Literal payloads (`{N}` blocks) in arrival order.
    literals: Vec<Vec<u8>>,
    ok: bool,
}

impl ImapResponse {
    fn status_line(&self) -> &str {
        self.lines.last().map(String::as_str).unwrap_or_default()
    }
}

impl ImapSession {
    /// Connect, negotiate TLS, and log in.
    fn connect(config: &ImapConfig) -> Result<Self, SourceError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| SourceError::Protocol(format!("invalid IMAP host name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| SourceError::Protocol(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = read_line(&mut session.stream)?;
        if !greeting.starts_with("* OK") {
            return Err(SourceError::Protocol(format!("unexpected greeting: {greeting}")));
        }

        let login = session.command(&format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        ))?;
        if !login.ok {
            return Err(SourceError::Protocol("IMAP login failed".into()));
        }

        debug!(host = %config.host, user = %config.username, "IMAP session established");
        Ok(session)
    }

    /// Send one tagged command and collect its response.
    fn command(&mut self, cmd: &str) -> Result<ImapResponse, SourceError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        read_response(&mut self.stream, &tag)
    }

    /// Select `label` and fetch every message matching the search `criterion`.
    fn fetch_matching(&mut self, label: &str, criterion: &str) -> Result<Vec<RawMessage>, SourceError> {
        let select = self.command(&format!("SELECT {}", quote(label)))?;
        if !select.ok {
            return Err(SourceError::Protocol(format!(
                "cannot select label '{label}': {}",
                select.status_line()
            )));
        }

        let search = self.command(&format!("SEARCH {criterion}"))?;
        if !search.ok {
            return Err(SourceError::Protocol(format!("search failed: {}", search.status_line())));
        }
        let ids = parse_search(&search.lines);
        debug!(label, count = ids.len(), "IMAP search complete");

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let fetch = self.command(&format!("FETCH {id} BODY.PEEK[]"))?;
            if !fetch.ok {
                warn!(id, status = fetch.status_line(), "IMAP fetch rejected, skipping message");
                continue;
            }
            match fetch.literals.first().and_then(|raw| mime::parse_rfc822(raw)) {
                Some(message) => messages.push(message),
                None => warn!(id, "Unparseable message body, skipping"),
            }
        }
        Ok(messages)
    }

    /// Best-effort LOGOUT. The connection is dropped either way.
    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout did not complete cleanly");
        }
    }
}

// ── Protocol helpers ────────────────────────────────────────────────

/// Read one CRLF-terminated line, returned without the line ending.
fn read_line<R: BufRead>(reader: &mut R) -> Result<String, SourceError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(SourceError::Protocol("IMAP connection closed".into()));
    }
    Ok(String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string())
}

/// Read lines until the tagged completion for `tag`, consuming literals byte-exact.
fn read_response<R: BufRead>(reader: &mut R, tag: &str) -> Result<ImapResponse, SourceError> {
    let mut response = ImapResponse::default();
    let tagged = format!("{tag} ");
    loop {
        let line = read_line(reader)?;

        if let Some(len) = literal_len(&line) {
            let mut literal = vec![0u8; len];
            reader.read_exact(&mut literal)?;
            response.literals.push(literal);
            response.lines.push(line);
            continue;
        }

        if let Some(rest) = line.strip_prefix(&tagged) {
            response.ok = rest.starts_with("OK");
            response.lines.push(line);
            return Ok(response);
        }

        response.lines.push(line);
    }
}

/// Length of a trailing `{N}` literal marker, if the line ends with one.
fn literal_len(line: &str) -> Option<usize> {
    let body = line.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].trim_end_matches('+').parse().ok()
}

/// Message sequence numbers from `* SEARCH` lines.
fn parse_search(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}

/// `SINCE <date>` a slack window before `since`, or `ALL` when that date is
/// not representable as an IMAP date.
fn search_criterion(since: DateTime<Utc>, slack_days: i64) -> String {
    chrono::Duration::try_days(slack_days.max(1))
        .and_then(|slack| since.checked_sub_signed(slack))
        .filter(|start| (1..=9999).contains(&start.year()))
        .map(|start| format!("SINCE {}", imap_date(start)))
        .unwrap_or_else(|| "ALL".to_string())
}

/// IMAP `date` format, e.g. `05-Jan-2026`.
fn imap_date(at: DateTime<Utc>) -> String {
    at.format("%d-%b-%Y").to_string()
}

/// Quote a string as an IMAP quoted-string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn literal_len_detects_markers() {
        assert_eq!(literal_len("* 1 FETCH (BODY[] {342}"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (BODY[] {12+}"), Some(12));
        assert_eq!(literal_len("A1 OK done"), None);
        assert_eq!(literal_len("* OK {not a number}"), None);
    }

    #[test]
    fn read_response_consumes_literal_exactly() {
        // The literal itself contains a line that looks like a tagged completion
        let literal = "Subject: x\r\nA7 OK fake\r\n";
        let wire = format!(
            "* 1 FETCH (BODY[] {{{}}}\r\n{literal})\r\nA7 OK FETCH completed\r\n",
            literal.len()
        );
        let mut reader = Cursor::new(wire.into_bytes());
        let response = read_response(&mut reader, "A7").unwrap();
        assert!(response.ok);
        assert_eq!(response.literals.len(), 1);
        assert_eq!(response.literals[0], literal.as_bytes());
        assert_eq!(response.status_line(), "A7 OK FETCH completed");
    }

    #[test]
    fn read_response_reports_failure() {
        let mut reader = Cursor::new(b"* BAD nope\r\nA2 NO [NONEXISTENT] Unknown folder\r\n".to_vec());
        let response = read_response(&mut reader, "A2").unwrap();
        assert!(!response.ok);
        assert_eq!(response.lines.len(), 2);
    }

    #[test]
    fn read_response_errors_on_eof() {
        let mut reader = Cursor::new(b"* 3 EXISTS\r\n".to_vec());
        assert!(read_response(&mut reader, "A1").is_err());
    }

    #[test]
    fn search_results_are_parsed() {
        let lines = vec![
            "* SEARCH 2 5 9".to_string(),
            "* SEARCH".to_string(),
            "A3 OK SEARCH completed".to_string(),
        ];
        assert_eq!(parse_search(&lines), vec![2, 5, 9]);
    }

    #[test]
    fn imap_date_format() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 23, 59, 0).unwrap();
        assert_eq!(imap_date(at), "05-Jan-2026");
    }

    #[test]
    fn search_starts_a_day_before_the_checkpoint_date() {
        // 02:30Z on the 5th is still the 4th on a UTC-8 server
        let checkpoint = Utc.with_ymd_and_hms(2026, 1, 5, 2, 0, 0).unwrap();
        assert_eq!(search_criterion(checkpoint, 1), "SINCE 04-Jan-2026");
        assert_eq!(search_criterion(checkpoint, 0), "SINCE 04-Jan-2026");
        assert_eq!(search_criterion(checkpoint, 3), "SINCE 02-Jan-2026");
    }

    #[test]
    fn unrepresentable_window_searches_everything() {
        assert_eq!(search_criterion(DateTime::<Utc>::MIN_UTC, 1), "ALL");
        let checkpoint = Utc.with_ymd_and_hms(2026, 1, 5, 2, 0, 0).unwrap();
        assert_eq!(search_criterion(checkpoint, i64::MAX), "ALL");
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote(r#"pa"ss\word"#), r#""pa\"ss\\word""#);
        assert_eq!(quote("Recruiters"), "\"Recruiters\"");
    }

    #[test]
    fn source_key_includes_user_and_label() {
        let source = ImapSource::new(ImapConfig {
            host: "imap.example.com".into(),
            port: 993,
            username: "me@example.com".into(),
            password: SecretString::from("pw".to_string()),
            label: "Recruiters".into(),
            search_slack_days: DEFAULT_SEARCH_SLACK_DAYS,
        });
        assert_eq!(source.source_key(), "imap:me@example.com/Recruiters");
    }
}
