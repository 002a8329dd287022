//! Session and connector traits, plus the `suppaftp` implementation.
//!
//! The engine never talks to `suppaftp` directly; it goes through
//! [`Connector`] and [`FtpSession`] so that tests can substitute an
//! in-memory server.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::{debug, instrument};

use super::SessionError;
use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, TRANSFER_BUFFER_SIZE};
use crate::model::ServerProfile;

/// Timeouts applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Limit on establishing the control connection.
    pub connect_timeout: Duration,
    /// Limit on any single read from the control or data connection.
    pub read_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

/// One authenticated FTP session.
///
/// Sessions are owned by exactly one worker and are never shared.
pub trait FtpSession: Send {
    /// Changes the working directory.
    fn change_dir(&mut self, path: &str) -> Result<(), SessionError>;

    /// Returns the working directory.
    fn current_dir(&mut self) -> Result<String, SessionError>;

    /// Lists bare entry names of the working directory.
    fn list_names(&mut self) -> Result<Vec<String>, SessionError>;

    /// Streams `filename` from the working directory into `sink`, returning
    /// the byte count.
    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> Result<u64, SessionError>;

    /// Logs out and closes the control connection.
    fn quit(&mut self) -> Result<(), SessionError>;
}

/// Opens new sessions.
pub trait Connector: Send + Sync {
    /// Connects, authenticates and switches to binary transfers.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] when the server cannot be reached or the
    /// login is refused.
    fn connect(
        &self,
        server: &ServerProfile,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn FtpSession>, SessionError>;
}

/// Connector backed by a plaintext `suppaftp::FtpStream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppaConnector;

impl Connector for SuppaConnector {
    #[instrument(level = "debug", skip(self, settings), fields(server = %server.identity()))]
    fn connect(
        &self,
        server: &ServerProfile,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn FtpSession>, SessionError> {
        let addr = resolve_addr(server)?;
        let stream = FtpStream::connect_timeout(addr, settings.connect_timeout)
            .map_err(|e| SessionError::from_ftp("connect", e))?;
        stream
            .get_ref()
            .set_read_timeout(Some(settings.read_timeout))
            .map_err(|e| SessionError::io("connect", e))?;
        let (connect_timeout, read_timeout) = (settings.connect_timeout, settings.read_timeout);
        let stream = stream.passive_stream_builder(move |data_addr| {
            open_data_stream(data_addr, connect_timeout, read_timeout)
                .map_err(suppaftp::FtpError::ConnectionError)
        });

        let mut session = SuppaSession { stream };
        if let Err(e) = session.login(server) {
            let _ = session.quit();
            return Err(e);
        }
        debug!(%addr, "session established");
        Ok(Box::new(session))
    }
}

/// Opens a passive-mode data connection bounded by the session timeouts.
fn open_data_stream(
    addr: SocketAddr,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&addr, connect_timeout)?;
    stream.set_read_timeout(Some(read_timeout))?;
    Ok(stream)
}

fn resolve_addr(server: &ServerProfile) -> Result<SocketAddr, SessionError> {
    let address = format!("{}:{}", server.host, server.port);
    let mut addrs = (server.host.as_str(), server.port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Address {
            address: address.clone(),
            reason: e.to_string(),
        })?;
    addrs.next().ok_or_else(|| SessionError::Address {
        address,
        reason: "no addresses returned".to_string(),
    })
}

struct SuppaSession {
    stream: FtpStream,
}

impl SuppaSession {
    fn login(&mut self, server: &ServerProfile) -> Result<(), SessionError> {
        self.stream
            .login(&server.username, &server.password)
            .map_err(|e| SessionError::from_ftp("login", e))?;
        self.stream
            .transfer_type(FileType::Binary)
            .map_err(|e| SessionError::from_ftp("set binary mode", e))
    }
}

impl FtpSession for SuppaSession {
    fn change_dir(&mut self, path: &str) -> Result<(), SessionError> {
        self.stream
            .cwd(path)
            .map_err(|e| SessionError::from_ftp("change directory", e))
    }

    fn current_dir(&mut self) -> Result<String, SessionError> {
        self.stream
            .pwd()
            .map_err(|e| SessionError::from_ftp("print directory", e))
    }

    fn list_names(&mut self) -> Result<Vec<String>, SessionError> {
        let names = self
            .stream
            .nlst(None)
            .map_err(|e| SessionError::from_ftp("list", e))?;
        // Some servers answer NLST with paths; keep only the final segment.
        Ok(names
            .into_iter()
            .filter_map(|n| {
                let name = n.trim().rsplit('/').next().unwrap_or_default().to_string();
                (!name.is_empty()).then_some(name)
            })
            .collect())
    }

    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> Result<u64, SessionError> {
        let mut local_error: Option<io::Error> = None;
        let result = self.stream.retr(filename, |reader| {
            copy_counting(reader, sink, &mut local_error)
                .map_err(suppaftp::FtpError::ConnectionError)
        });
        if let Some(source) = local_error {
            return Err(SessionError::LocalWrite { source });
        }
        result.map_err(|e| SessionError::from_ftp("retrieve", e))
    }

    fn quit(&mut self) -> Result<(), SessionError> {
        self.stream
            .quit()
            .map_err(|e| SessionError::from_ftp("quit", e))
    }
}

/// Copies `reader` into `sink`, parking sink failures in `local_error` so the
/// caller can tell them apart from network failures.
fn copy_counting(
    reader: &mut dyn Read,
    sink: &mut dyn Write,
    local_error: &mut Option<io::Error>,
) -> io::Result<u64> {
    let mut buf = [0u8; TRANSFER_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if let Err(e) = sink.write_all(&buf[..n]) {
            let message = e.to_string();
            *local_error = Some(e);
            return Err(io::Error::other(message));
        }
        total += n as u64;
    }
    if let Err(e) = sink.flush() {
        let message = e.to_string();
        *local_error = Some(e);
        return Err(io::Error::other(message));
    }
    Ok(total)
}
