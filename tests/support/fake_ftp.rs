//! In-memory FTP server for driving the engine without a network.
//!
//! A [`FakeFtp`] holds a directory tree and a set of injected faults. It
//! implements [`Connector`]; every session it hands out shares the same tree
//! and counters, so tests can assert on how often the engine connected,
//! listed and retrieved.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use station_downloader_core::ServerProfile;
use station_downloader_core::ftp::{ConnectionSettings, Connector, FtpSession, SessionError};

#[derive(Default)]
struct FakeState {
    dirs: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    refuse_connections: bool,
    retrieve_failures: HashMap<String, u32>,
    retrieve_io_failures: HashMap<String, u32>,
    failing_listings: HashSet<String>,
    connects: usize,
    listings: usize,
    retrieves: usize,
    quits: usize,
}

/// Cloneable handle to one fake server.
#[derive(Clone, Default)]
pub struct FakeFtp {
    state: Arc<Mutex<FakeState>>,
}

impl FakeFtp {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake ftp state poisoned")
    }

    /// Adds an (initially empty) directory.
    pub fn with_dir(self, dir: &str) -> Self {
        self.state().dirs.entry(dir.to_string()).or_default();
        self
    }

    /// Adds a file, creating its directory.
    pub fn with_file(self, dir: &str, name: &str, contents: &[u8]) -> Self {
        self.state()
            .dirs
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), contents.to_vec());
        self
    }

    /// The next `times` retrievals of `dir/name` are aborted by the server.
    pub fn failing_retrieve(self, dir: &str, name: &str, times: u32) -> Self {
        self.state()
            .retrieve_failures
            .insert(format!("{dir}/{name}"), times);
        self
    }

    /// The next `times` retrievals of `dir/name` drop the connection.
    pub fn failing_retrieve_io(self, dir: &str, name: &str, times: u32) -> Self {
        self.state()
            .retrieve_io_failures
            .insert(format!("{dir}/{name}"), times);
        self
    }

    /// `dir` can be entered but listing it fails.
    pub fn failing_listing(self, dir: &str) -> Self {
        let mut state = self.state();
        state.dirs.entry(dir.to_string()).or_default();
        state.failing_listings.insert(dir.to_string());
        drop(state);
        self
    }

    /// Every connection attempt is refused.
    pub fn refusing_connections(self) -> Self {
        self.state().refuse_connections = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn listings(&self) -> usize {
        self.state().listings
    }

    pub fn retrieves(&self) -> usize {
        self.state().retrieves
    }

    pub fn quits(&self) -> usize {
        self.state().quits
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }
}

impl Connector for FakeFtp {
    fn connect(
        &self,
        _server: &ServerProfile,
        _settings: &ConnectionSettings,
    ) -> Result<Box<dyn FtpSession>, SessionError> {
        let mut state = self.state();
        if state.refuse_connections {
            return Err(SessionError::io(
                "connect",
                io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"),
            ));
        }
        state.connects += 1;
        Ok(Box::new(FakeSession {
            server: self.clone(),
            cwd: "/".to_string(),
        }))
    }
}

struct FakeSession {
    server: FakeFtp,
    cwd: String,
}

impl FtpSession for FakeSession {
    fn change_dir(&mut self, path: &str) -> Result<(), SessionError> {
        if !self.server.state().dirs.contains_key(path) {
            return Err(SessionError::rejected(
                "change directory",
                format!("550 {path}: No such file or directory"),
            ));
        }
        self.cwd = path.to_string();
        Ok(())
    }

    fn current_dir(&mut self) -> Result<String, SessionError> {
        Ok(self.cwd.clone())
    }

    fn list_names(&mut self) -> Result<Vec<String>, SessionError> {
        let mut state = self.server.state();
        state.listings += 1;
        if state.failing_listings.contains(&self.cwd) {
            return Err(SessionError::rejected("list", "450 Requested file action not taken"));
        }
        Ok(state
            .dirs
            .get(&self.cwd)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn retrieve(&mut self, filename: &str, sink: &mut dyn Write) -> Result<u64, SessionError> {
        let contents = {
            let mut state = self.server.state();
            state.retrieves += 1;
            let key = format!("{}/{}", self.cwd, filename);
            if let Some(remaining) = state.retrieve_io_failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(SessionError::io(
                    "retrieve",
                    io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"),
                ));
            }
            if let Some(remaining) = state.retrieve_failures.get_mut(&key)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(SessionError::rejected(
                    "retrieve",
                    "426 Connection closed; transfer aborted",
                ));
            }
            state
                .dirs
                .get(&self.cwd)
                .and_then(|files| files.get(filename))
                .cloned()
                .ok_or_else(|| {
                    SessionError::rejected("retrieve", format!("550 {filename}: not found"))
                })?
        };
        sink.write_all(&contents)
            .map_err(|source| SessionError::LocalWrite { source })?;
        Ok(contents.len() as u64)
    }

    fn quit(&mut self) -> Result<(), SessionError> {
        self.server.state().quits += 1;
        Ok(())
    }
}
