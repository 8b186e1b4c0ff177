//! IMAP session handling (SYNCHRONOUS - run inside `spawn_blocking`).
//!
//! Sessions are short-lived: connect, log in, select, do one thing, log
//! out. Fetching uses `BODY.PEEK[]` so nothing is flagged `\Seen` until the
//! caller explicitly calls [`mark_seen`].
//!
//! The TLS stream is built over a socket this module owns, so an
//! [`Interrupt`] triggered from another thread can shut the socket down and
//! unblock a command stuck on a silent server.

use crate::error::{MailError, Result};
use chrono::{DateTime, Months, Utc};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type TlsStream = StreamOwned<ClientConnection, TcpStream>;
type Session = imap::Session<TlsStream>;

/// TCP connect budget per resolved address.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on any single socket read or write.
const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for one mailbox.
#[derive(Clone)]
pub struct ImapSettings {
    /// Server host name
    pub host: String,
    /// TLS port
    pub port: u16,
    /// Login name
    pub username: String,
    /// Login password
    pub password: String,
    /// Mailbox to select
    pub mailbox: String,
}

impl std::fmt::Debug for ImapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

/// A fetched message, still undecoded.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Message UID in the selected mailbox
    pub uid: u32,
    /// Server receive time
    pub internal_date: Option<DateTime<Utc>>,
    /// Full RFC 822 bytes
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct InterruptState {
    triggered: bool,
    socket: Option<TcpStream>,
}

/// Cross-thread kill switch for a blocking session.
///
/// Triggering it marks the session cancelled and shuts down its socket, so
/// a read blocked inside the IMAP client returns immediately. A session
/// attached after the trigger is refused.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    state: Arc<Mutex<InterruptState>>,
}

impl Interrupt {
    /// A fresh, untriggered interrupt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the session and tear down its socket.
    pub fn trigger(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.triggered = true;
        if let Some(socket) = state.socket.take() {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                tracing::debug!("IMAP socket shutdown: {}", e);
            }
        }
    }

    /// Whether [`trigger`](Self::trigger) was called.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .triggered
    }

    fn attach(&self, socket: &TcpStream) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.triggered {
            return Err(MailError::Cancelled);
        }
        let handle = socket
            .try_clone()
            .map_err(|e| MailError::Connect(format!("cannot clone socket: {e}")))?;
        state.socket = Some(handle);
        Ok(())
    }

    /// `err`, unless the failure was caused by the interrupt.
    fn explain(&self, err: MailError) -> MailError {
        if self.is_triggered() {
            MailError::Cancelled
        } else {
            err
        }
    }
}

fn tls_config() -> Result<Arc<ClientConfig>> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| MailError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

fn connect_tcp(settings: &ImapSettings) -> Result<TcpStream> {
    let addrs = (settings.host.as_str(), settings.port)
        .to_socket_addrs()
        .map_err(|e| MailError::Connect(format!("{}: {e}", settings.host)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
    }
    Err(MailError::Connect(last_error.map_or_else(
        || format!("{} did not resolve", settings.host),
        |e| e.to_string(),
    )))
}

fn open_session(settings: &ImapSettings, interrupt: &Interrupt) -> Result<Session> {
    let tcp = connect_tcp(settings)?;
    tcp.set_read_timeout(Some(IO_TIMEOUT))
        .and_then(|()| tcp.set_write_timeout(Some(IO_TIMEOUT)))
        .map_err(|e| MailError::Connect(e.to_string()))?;
    interrupt.attach(&tcp)?;

    let server_name =
        ServerName::try_from(settings.host.clone()).map_err(|e| MailError::Tls(e.to_string()))?;
    let tls = ClientConnection::new(tls_config()?, server_name).map_err(|e| MailError::Tls(e.to_string()))?;

    let mut client = imap::Client::new(StreamOwned::new(tls, tcp));
    client
        .read_greeting()
        .map_err(|e| interrupt.explain(MailError::Connect(e.to_string())))?;

    let mut session = client
        .login(&settings.username, &settings.password)
        .map_err(|(e, _)| interrupt.explain(MailError::Login(e.to_string())))?;

    if let Err(e) = session.select(&settings.mailbox) {
        let _ = session.logout();
        return Err(interrupt.explain(MailError::command("select")(e)));
    }
    Ok(session)
}

fn check_cancel(session: &mut Session, interrupt: &Interrupt) -> Result<()> {
    if interrupt.is_triggered() {
        tracing::debug!("IMAP session cancelled, logging out");
        let _ = session.logout();
        return Err(MailError::Cancelled);
    }
    Ok(())
}

/// `SINCE` search date: `dd-Mon-YYYY`, three months before `now`.
#[must_use]
pub fn since_date(now: DateTime<Utc>) -> String {
    let cutoff = now.checked_sub_months(Months::new(3)).unwrap_or(now);
    cutoff.format("%d-%b-%Y").to_string()
}

/// Comma-joined UID set for `UID FETCH`/`UID STORE`.
#[must_use]
pub fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Fetch up to `max` unseen messages from the last three months, newest
/// first, without marking them read.
///
/// Once `interrupt` is triggered the socket is shut down, any command in
/// flight fails, and [`MailError::Cancelled`] is returned.
pub fn fetch_unseen(settings: &ImapSettings, max: usize, interrupt: &Interrupt) -> Result<Vec<RawMessage>> {
    let mut session = open_session(settings, interrupt)?;
    check_cancel(&mut session, interrupt)?;

    let query = format!("UNSEEN SINCE {}", since_date(Utc::now()));
    let found = match session.uid_search(&query) {
        Ok(found) => found,
        Err(e) => {
            let _ = session.logout();
            return Err(interrupt.explain(MailError::command("search")(e)));
        }
    };

    let mut uids: Vec<u32> = found.into_iter().collect();
    // Newest first
    uids.sort_unstable_by(|a, b| b.cmp(a));
    uids.truncate(max);

    if uids.is_empty() {
        let _ = session.logout();
        return Ok(Vec::new());
    }
    check_cancel(&mut session, interrupt)?;

    let fetches = match session.uid_fetch(uid_set(&uids), "(UID INTERNALDATE BODY.PEEK[])") {
        Ok(fetches) => fetches,
        Err(e) => {
            let _ = session.logout();
            return Err(interrupt.explain(MailError::command("fetch")(e)));
        }
    };

    let mut messages: Vec<RawMessage> = fetches
        .iter()
        .filter_map(|fetch| {
            let uid = fetch.uid?;
            let body = fetch.body()?.to_vec();
            Some(RawMessage {
                uid,
                internal_date: fetch.internal_date().map(|d| d.with_timezone(&Utc)),
                body,
            })
        })
        .collect();
    messages.sort_unstable_by(|a, b| b.uid.cmp(&a.uid));

    let _ = session.logout();
    tracing::debug!("Fetched {} unseen messages", messages.len());
    Ok(messages)
}

/// Flag `uids` as `\Seen` in one batch.
pub fn mark_seen(settings: &ImapSettings, uids: &[u32]) -> Result<()> {
    if uids.is_empty() {
        return Ok(());
    }

    let mut session = open_session(settings, &Interrupt::new())?;
    let result = session
        .uid_store(uid_set(uids), "+FLAGS.SILENT (\\Seen)")
        .map(|_| ())
        .map_err(MailError::command("store"));
    let _ = session.logout();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_date_three_months_back() {
        let now: DateTime<Utc> = "2026-05-31T12:00:00Z".parse().expect("parse date");
        // Clamped to the end of February
        assert_eq!(since_date(now), "28-Feb-2026");

        let now: DateTime<Utc> = "2026-10-17T00:00:00Z".parse().expect("parse date");
        assert_eq!(since_date(now), "17-Jul-2026");
    }

    #[test]
    fn test_uid_set() {
        assert_eq!(uid_set(&[42, 7, 3]), "42,7,3");
        assert_eq!(uid_set(&[]), "");
    }

    #[test]
    fn test_settings_debug_redacts_password() {
        let settings = ImapSettings {
            host: "imap.example.com".to_string(),
            port: 993,
            username: "me".to_string(),
            password: "hunter2".to_string(),
            mailbox: "INBOX".to_string(),
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_interrupt_shuts_down_attached_socket() {
        use std::io::Read;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");
        let (mut server_side, _) = listener.accept().expect("accept");

        let interrupt = Interrupt::new();
        interrupt.attach(&client).expect("attach");
        interrupt.trigger();
        assert!(interrupt.is_triggered());

        // The peer sees end-of-stream once the client side is shut down.
        server_side
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("timeout");
        let mut buf = [0u8; 16];
        assert_eq!(server_side.read(&mut buf).expect("read"), 0);
    }

    #[test]
    fn test_triggered_interrupt_refuses_new_sessions() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");

        let interrupt = Interrupt::new();
        interrupt.trigger();
        assert!(matches!(interrupt.attach(&client), Err(MailError::Cancelled)));
    }
}
