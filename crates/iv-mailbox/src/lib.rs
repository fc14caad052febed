// SPDX-License-Identifier: MIT OR Apache-2.0
//! Thin IMAP wrapper: connect over TLS, open a folder, search `SINCE` a
//! date, and fetch full message bodies with attachments split out.
//!
//! Everything here is a collaborator for the email check engine's stage
//! machine (`connect` -> `open_folder` -> `search` -> `fetch`): each method
//! maps one IMAP round trip to one stage, and every failure is folded into
//! [`iv_error::ErrorCode::Unreachable`] or [`iv_error::ErrorCode::AuthFailed`]
//! so the caller doesn't need to know anything about IMAP response codes.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_imap::types::Fetch;
use async_native_tls::TlsStream;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::TryStreamExt;
use iv_error::{ErrorCode, IvError, IvResult};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Credentials and connection parameters for one mailbox.
#[derive(Debug, Clone)]
pub struct ImapCredentials {
    /// IMAP server hostname.
    pub host: String,
    /// IMAP server port (typically `993` for implicit TLS).
    pub port: u16,
    /// Mailbox username.
    pub username: String,
    /// Decrypted password or OAuth bearer token.
    pub password: String,
}

/// Maximum time allowed for TCP connect + TLS handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Maximum time allowed for the IMAP `LOGIN`/`AUTHENTICATE` round trip.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(15);

type ImapSession = async_imap::Session<TlsStream<TcpStream>>;

/// An authenticated IMAP session with a folder optionally selected.
pub struct MailboxSession {
    session: ImapSession,
}

/// Result of selecting a folder: its `UIDVALIDITY` and message count.
#[derive(Debug, Clone, Copy)]
pub struct OpenedFolder {
    /// The folder's `UIDVALIDITY`. A monitor's stored value must match
    /// this on every run or its UID-based dedupe history is meaningless.
    pub uidvalidity: u32,
    /// Number of messages currently in the folder.
    pub exists: u32,
}

/// One fetched attachment: its declared filename, MIME type, and raw
/// bytes.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Filename from the MIME `Content-Disposition`/`Content-Type`, if any.
    pub filename: Option<String>,
    /// MIME type (e.g. `"application/pdf"`).
    pub mime_type: String,
    /// Raw attachment bytes.
    pub bytes: Vec<u8>,
}

/// One fetched message: envelope metadata plus its attachments.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// The message's UID within the currently selected folder.
    pub uid: u32,
    /// `Message-ID` header, if present.
    pub message_id: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// `From` address.
    pub from_address: Option<String>,
    /// Date header, parsed to UTC.
    pub received_date: Option<DateTime<Utc>>,
    /// Attachments found in the MIME structure.
    pub attachments: Vec<Attachment>,
}

/// Connect to `creds.host:creds.port` over TLS and authenticate, bounded by
/// [`CONNECT_TIMEOUT`] for the handshake and [`AUTH_TIMEOUT`] for login.
pub async fn connect(creds: &ImapCredentials) -> IvResult<MailboxSession> {
    let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((creds.host.as_str(), creds.port)))
        .await
        .map_err(|_| {
            IvError::new(ErrorCode::Unreachable, "IMAP TCP connect timed out")
                .with_context("host", creds.host.clone())
                .with_context("timeout_ms", CONNECT_TIMEOUT.as_millis() as u64)
        })?
        .map_err(|e| {
            IvError::new(ErrorCode::Unreachable, "IMAP TCP connect failed").with_source(e)
        })?;

    let tls = tokio::time::timeout(
        CONNECT_TIMEOUT,
        async_native_tls::connect(creds.host.as_str(), tcp),
    )
    .await
    .map_err(|_| IvError::new(ErrorCode::Unreachable, "IMAP TLS handshake timed out"))?
    .map_err(|e| {
        IvError::new(ErrorCode::Unreachable, "IMAP TLS handshake failed")
            .with_context("reason", e.to_string())
    })?;

    let client = async_imap::Client::new(tls);
    let session = tokio::time::timeout(AUTH_TIMEOUT, client.login(&creds.username, &creds.password))
        .await
        .map_err(|_| IvError::new(ErrorCode::Unreachable, "IMAP login timed out"))?
        .map_err(|(e, _client)| {
            IvError::new(ErrorCode::AuthFailed, "IMAP login rejected")
                .with_context("reason", e.to_string())
        })?;

    info!(host = %creds.host, "IMAP session authenticated");
    Ok(MailboxSession { session })
}

impl MailboxSession {
    /// `SELECT` a folder and capture its `UIDVALIDITY`.
    pub async fn open_folder(&mut self, folder: &str) -> IvResult<OpenedFolder> {
        let mailbox = self.session.select(folder).await.map_err(|e| {
            IvError::new(ErrorCode::Unreachable, "failed to open mailbox folder")
                .with_context("folder", folder)
                .with_context("reason", e.to_string())
        })?;
        Ok(OpenedFolder {
            uidvalidity: mailbox.uid_validity.unwrap_or(0),
            exists: mailbox.exists,
        })
    }

    /// `UID SEARCH SINCE <date>`, keeping only the most recent `limit`
    /// UIDs (ascending UID order tracks arrival order on essentially every
    /// real IMAP server).
    pub async fn search_since(&mut self, since: NaiveDate, limit: usize) -> IvResult<Vec<u32>> {
        let query = format!("SINCE {}", since.format("%d-%b-%Y"));
        let mut uids: Vec<u32> = self
            .session
            .uid_search(&query)
            .await
            .map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "IMAP search failed")
                    .with_context("query", query.clone())
                    .with_context("reason", e.to_string())
            })?
            .into_iter()
            .collect();
        uids.sort_unstable();
        if uids.len() > limit {
            let keep_from = uids.len() - limit;
            uids = uids.split_off(keep_from);
        }
        debug!(count = uids.len(), query, "search complete");
        Ok(uids)
    }

    /// Fetch the full `RFC822` body and envelope for each UID in `uids`,
    /// parsing MIME structure into [`FetchedMessage`]s.
    pub async fn fetch_messages(&mut self, uids: &[u32]) -> IvResult<Vec<FetchedMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let fetches: Vec<Fetch> = self
            .session
            .uid_fetch(&set, "(UID RFC822)")
            .await
            .map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "IMAP fetch failed").with_source(e)
            })?
            .try_collect()
            .await
            .map_err(|e| {
                IvError::new(ErrorCode::ProcessingError, "IMAP fetch stream failed").with_source(e)
            })?;

        Ok(fetches.iter().filter_map(parse_fetch).collect())
    }

    /// Close the session (`LOGOUT`).
    pub async fn logout(mut self) -> IvResult<()> {
        self.session.logout().await.map_err(|e| {
            IvError::new(ErrorCode::Unreachable, "IMAP logout failed").with_source(e)
        })
    }
}

fn parse_fetch(fetch: &Fetch) -> Option<FetchedMessage> {
    let uid = fetch.uid?;
    let body = fetch.body()?;
    let parsed = mail_parser::MessageParser::default().parse(body)?;

    let message_id = parsed.message_id().map(str::to_string);
    let subject = parsed.subject().map(str::to_string);
    let from_address = parsed
        .from()
        .and_then(|f| f.first())
        .and_then(|a| a.address())
        .map(str::to_string);
    let received_date = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    let attachments = parsed
        .attachments()
        .map(|att| Attachment {
            filename: att.attachment_name().map(str::to_string),
            mime_type: att
                .content_type()
                .map(|ct| {
                    ct.subtype()
                        .map(|st| format!("{}/{}", ct.ctype(), st))
                        .unwrap_or_else(|| ct.ctype().to_string())
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes: att.contents().to_vec(),
        })
        .collect();

    Some(FetchedMessage {
        uid,
        message_id,
        subject,
        from_address,
        received_date,
        attachments,
    })
}
