//! Remote directory discovery across heterogeneous server layouts.
//!
//! For every (station, date) the resolver renders an ordered, duplicate-free
//! list of candidate directories from [`PathTemplate`]s and tries them in
//! order over a live session. The first directory that can be entered and
//! listed wins, even if it is empty.
//!
//! The winning template is cached per `(server, date)` for the rest of the
//! run. Later lookups for the same server and date try the cached template
//! first (rendered for the requested station) and only fall back to the full
//! scan when it does not resolve.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::NaiveDate;
//! use station_downloader_core::ftp::{ConnectionManager, ConnectionSettings, SuppaConnector};
//! use station_downloader_core::resolver::PathResolver;
//! use station_downloader_core::ServerProfile;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = ServerProfile::new("ftp.example.com", "user", "secret");
//! let mut manager = ConnectionManager::new(
//!     Arc::new(SuppaConnector),
//!     server.clone(),
//!     ConnectionSettings::default(),
//! );
//! let resolver = PathResolver::new();
//! let date = NaiveDate::from_ymd_opt(2025, 11, 18).ok_or("bad date")?;
//! if let Some(dir) = resolver.resolve(&mut manager, &server, "STATION1", date)? {
//!     println!("{} has {} entries", dir.path, dir.entries.len());
//! }
//! # Ok(())
//! # }
//! ```

mod templates;

pub use templates::{PathTemplate, TemplateContext, default_templates, is_station_scoped};

use std::collections::HashSet;

use chrono::NaiveDate;
use dashmap::DashMap;
use tracing::{debug, info, instrument, warn};

use crate::download::DownloadError;
use crate::ftp::ConnectionManager;
use crate::model::ServerProfile;

/// A directory that was entered and listed successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDir {
    pub path: String,
    /// Name of the template that produced `path`.
    pub template: &'static str,
    /// Bare entry names as listed.
    pub entries: Vec<String>,
}

/// Ordered template probing with a per-run cache.
///
/// One resolver serves one run: directory listings are memoized by path so
/// a directory shared by several stations is listed once.
#[derive(Debug)]
pub struct PathResolver {
    templates: Vec<PathTemplate>,
    cache: DashMap<(String, NaiveDate), usize>,
    listings: DashMap<String, Vec<String>>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PathResolver {
    /// Resolver over [`default_templates`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_templates(default_templates())
    }

    #[must_use]
    pub fn with_templates(templates: Vec<PathTemplate>) -> Self {
        Self {
            templates,
            cache: DashMap::new(),
            listings: DashMap::new(),
        }
    }

    /// Candidate directories for one station and date, in probing order,
    /// with duplicates removed (first occurrence wins).
    #[must_use]
    pub fn candidate_paths(
        &self,
        server: &ServerProfile,
        station: &str,
        date: NaiveDate,
    ) -> Vec<String> {
        self.candidates(server, station, date)
            .into_iter()
            .map(|(_, path)| path)
            .collect()
    }

    /// Name of the template cached for `(server, date)`, if any.
    #[must_use]
    pub fn cached_template(&self, server: &ServerProfile, date: NaiveDate) -> Option<&'static str> {
        self.cache
            .get(&(server.identity(), date))
            .and_then(|index| self.templates.get(*index).map(|t| t.name))
    }

    /// Finds the directory holding `station`'s files for `date`.
    ///
    /// Returns `Ok(None)` when no template resolves; that date is a gap, not
    /// an error. Listing failures on individual candidates are misses.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Connection`] when no session can be opened,
    /// since no other candidate could succeed either.
    #[instrument(level = "debug", skip(self, manager, server), fields(server = %server.identity()))]
    pub fn resolve(
        &self,
        manager: &mut ConnectionManager,
        server: &ServerProfile,
        station: &str,
        date: NaiveDate,
    ) -> Result<Option<ResolvedDir>, DownloadError> {
        let key = (server.identity(), date);
        let candidates = self.candidates(server, station, date);

        let cached = self.cache.get(&key).map(|index| *index);
        if let Some(cached) = cached {
            if let Some((index, path)) = candidates.iter().find(|(i, _)| *i == cached) {
                if let Some(dir) = self.try_candidate(manager, *index, path)? {
                    debug!(path = %dir.path, "resolved from cache");
                    return Ok(Some(dir));
                }
            }
            debug!("cached layout did not resolve, probing all templates");
        }

        for (index, path) in &candidates {
            if Some(*index) == cached {
                continue;
            }
            if let Some(dir) = self.try_candidate(manager, *index, path)? {
                let template = &self.templates[*index];
                info!(
                    %station,
                    %date,
                    path = %dir.path,
                    template = template.name,
                    station_scoped = is_station_scoped(template),
                    entries = dir.entries.len(),
                    "resolved remote directory"
                );
                self.cache.insert(key, *index);
                return Ok(Some(dir));
            }
        }

        warn!(%station, %date, tried = candidates.len(), "no remote directory found for date");
        Ok(None)
    }

    fn candidates(
        &self,
        server: &ServerProfile,
        station: &str,
        date: NaiveDate,
    ) -> Vec<(usize, String)> {
        let ctx = TemplateContext {
            base: server.base_dir(),
            station,
            date,
        };
        let mut seen = HashSet::new();
        self.templates
            .iter()
            .enumerate()
            .map(|(index, template)| (index, template.render(&ctx)))
            .filter(|(_, path)| seen.insert(path.clone()))
            .collect()
    }

    fn try_candidate(
        &self,
        manager: &mut ConnectionManager,
        index: usize,
        path: &str,
    ) -> Result<Option<ResolvedDir>, DownloadError> {
        let template = self.templates[index].name;
        if let Some(entries) = self.listings.get(path) {
            return Ok(Some(ResolvedDir {
                path: path.to_string(),
                template,
                entries: entries.clone(),
            }));
        }
        match manager.list_dir(path) {
            Ok(entries) => {
                self.listings.insert(path.to_string(), entries.clone());
                Ok(Some(ResolvedDir {
                    path: path.to_string(),
                    template,
                    entries,
                }))
            }
            Err(e @ DownloadError::Connection { .. }) => Err(e),
            Err(e) if e.is_path_rejection() => {
                debug!(%path, "path not found");
                Ok(None)
            }
            Err(e) => {
                warn!(%path, error = %e, "listing failed, skipping path");
                Ok(None)
            }
        }
    }
}
