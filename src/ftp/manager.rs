//! Per-worker ownership of one FTP session.
//!
//! A [`ConnectionManager`] connects lazily, remembers the working directory
//! to skip redundant `CWD`s, and on an I/O failure closes the stale session
//! and reconnects exactly once before surfacing the error.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::{ConnectionSettings, Connector, FtpSession, SessionError};
use crate::download::DownloadError;
use crate::model::ServerProfile;

struct LiveSession {
    session: Box<dyn FtpSession>,
    cwd: Option<String>,
}

impl LiveSession {
    fn enter(&mut self, dir: &str) -> Result<(), SessionError> {
        if self.cwd.as_deref() == Some(dir) {
            return Ok(());
        }
        self.cwd = None;
        self.session.change_dir(dir)?;
        self.cwd = Some(dir.to_string());
        Ok(())
    }
}

enum OpError {
    Connect(SessionError),
    Session(SessionError),
}

impl OpError {
    fn is_io(&self) -> bool {
        match self {
            Self::Connect(e) | Self::Session(e) => e.is_io(),
        }
    }
}

/// Owns at most one live session for one worker.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    server: ServerProfile,
    settings: ConnectionSettings,
    session: Option<LiveSession>,
    connects: u32,
}

impl ConnectionManager {
    /// Creates a manager; no connection is opened until the first operation.
    pub fn new(
        connector: Arc<dyn Connector>,
        server: ServerProfile,
        settings: ConnectionSettings,
    ) -> Self {
        Self {
            connector,
            server,
            settings,
            session: None,
            connects: 0,
        }
    }

    /// Number of sessions opened so far.
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.connects
    }

    /// Whether a session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Opens a session now if none is open.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connection`] if connecting fails twice.
    pub fn connect(&mut self) -> Result<(), DownloadError> {
        self.run(|_| Ok(()))
            .map_err(|e| self.map_error(e, DownloadError::connection))
    }

    /// Returns the server's working directory.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connection`] if no session can be opened.
    pub fn current_dir(&mut self) -> Result<String, DownloadError> {
        self.run(|live| live.session.current_dir())
            .map_err(|e| self.map_error(e, DownloadError::connection))
    }

    /// Lists the entry names of `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connection`] if no session can be opened and
    /// [`DownloadError::Listing`] if the directory cannot be entered or
    /// enumerated.
    #[instrument(level = "debug", skip(self), fields(server = %self.server.identity()))]
    pub fn list_dir(&mut self, dir: &str) -> Result<Vec<String>, DownloadError> {
        self.run(|live| {
            live.enter(dir)?;
            live.session.list_names()
        })
        .map_err(|e| self.map_error(e, |_, source| DownloadError::listing(dir, source)))
    }

    /// Retrieves `dir/filename` into `dest`, truncating `dest` on every try.
    ///
    /// Any failed transfer closes the session, so the next operation starts
    /// on a clean control channel.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connection`] if no session can be opened,
    /// [`DownloadError::Io`] if `dest` cannot be written and
    /// [`DownloadError::Retrieval`] for transfer failures.
    #[instrument(level = "debug", skip(self, dest), fields(server = %self.server.identity()))]
    pub fn retrieve_to(
        &mut self,
        dir: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<u64, DownloadError> {
        let remote_path = crate::model::join_remote(dir, filename);
        let result = self.run(|live| {
            live.enter(dir)?;
            let mut file = File::create(dest).map_err(|source| SessionError::LocalWrite { source })?;
            live.session.retrieve(filename, &mut file)
        });
        result.map_err(|e| {
            // An aborted transfer can leave its closing reply queued on the
            // control channel; the next command would read it.
            if matches!(e, OpError::Session(_)) {
                self.reset();
            }
            match e {
                OpError::Session(SessionError::LocalWrite { source }) => {
                    DownloadError::io(dest, source)
                }
                other => self.map_error(other, |_, source| {
                    DownloadError::retrieval(&remote_path, source)
                }),
            }
        })
    }

    /// Closes the current session so the next operation starts fresh.
    pub fn reset(&mut self) {
        if let Some(mut live) = self.session.take() {
            if let Err(e) = live.session.quit() {
                debug!(error = %e, "quit on stale session failed");
            }
        }
    }

    /// Logs out and closes; equivalent to [`ConnectionManager::reset`].
    pub fn close(&mut self) {
        self.reset();
    }

    fn live(&mut self) -> Result<&mut LiveSession, SessionError> {
        if let Some(live) = self.session.take() {
            return Ok(self.session.insert(live));
        }
        let session = self.connector.connect(&self.server, &self.settings)?;
        self.connects += 1;
        debug!(server = %self.server.identity(), connects = self.connects, "opened session");
        Ok(self.session.insert(LiveSession { session, cwd: None }))
    }

    fn run<T>(
        &mut self,
        mut op: impl FnMut(&mut LiveSession) -> Result<T, SessionError>,
    ) -> Result<T, OpError> {
        let mut reconnected = false;
        loop {
            let result = match self.live() {
                Ok(live) => op(live).map_err(OpError::Session),
                Err(e) => Err(OpError::Connect(e)),
            };
            match result {
                Err(err) if err.is_io() && !reconnected => {
                    warn!(
                        server = %self.server.identity(),
                        "session I/O failure, reconnecting once"
                    );
                    self.reset();
                    reconnected = true;
                }
                Err(err) => {
                    if err.is_io() {
                        self.reset();
                    }
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    fn map_error(
        &self,
        error: OpError,
        on_session: impl FnOnce(&str, SessionError) -> DownloadError,
    ) -> DownloadError {
        match error {
            OpError::Connect(source) => DownloadError::connection(&self.server.identity(), source),
            OpError::Session(source) => on_session(&self.server.identity(), source),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

/// Runs `f` with a fresh manager and closes the session on every exit path.
///
/// # Errors
///
/// Returns whatever `f` returns.
pub fn with_connection<T>(
    connector: Arc<dyn Connector>,
    server: &ServerProfile,
    settings: ConnectionSettings,
    f: impl FnOnce(&mut ConnectionManager) -> Result<T, DownloadError>,
) -> Result<T, DownloadError> {
    let mut manager = ConnectionManager::new(connector, server.clone(), settings);
    let result = f(&mut manager);
    manager.close();
    result
}
