//! Station filename parsing and local path resolution.
//!
//! Instrument files are named `STATIONID` + `YYMMDDHHMMSS` + extension,
//! optionally with a secondary `_` + digits stamp before the extension:
//!
//! ```text
//! STATION1251118104500.txt                    -> STATION1,   2025-11-18 10:45:00
//! STATION1RF251108170000_20251108170535.txt   -> STATION1RF, 2025-11-08 17:00:00
//! ```
//!
//! The primary timestamp is always the last 12 digits immediately before the
//! extension (plain shape) or before the `_` separator (extended shape);
//! everything in front of it is the station id.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use thiserror::Error;

use super::constants::PARTIAL_SUFFIX;
use crate::model::DownloadWindow;

/// `STATION` + 12 digits, greedy so the digits are the trailing 12.
#[allow(clippy::expect_used)]
static PLAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<station>.+)(?P<stamp>\d{12})$").expect("plain filename regex is valid") // Static pattern, safe to panic
});

/// `STATION` + 12 digits + `_` + digits.
#[allow(clippy::expect_used)]
static EXTENDED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<station>.+)(?P<stamp>\d{12})_(?P<secondary>\d+)$")
        .expect("extended filename regex is valid")
});

/// Which filename shape matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilenameShape {
    /// `STATION` + `YYMMDDHHMMSS` + extension.
    Plain,
    /// `STATION` + `YYMMDDHHMMSS` + `_` + digits + extension.
    Extended,
}

/// Station and timestamp parsed from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFilename {
    pub station_id: String,
    pub timestamp: NaiveDateTime,
    pub shape: FilenameShape,
}

/// Why a filename was not recognized.
///
/// Not an error for the run: unparsable files are silently excluded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// Name contains a path separator or is a relative path component.
    #[error("filename '{name}' is not a plain file name")]
    NotAFileName { name: String },

    /// No 12-digit stamp with a non-empty station in front of it.
    #[error("filename '{name}' has no station + 12-digit timestamp")]
    NoTimestamp { name: String },

    /// The 12 digits are not a valid calendar date/time.
    #[error("invalid timestamp '{digits}' in filename '{name}'")]
    InvalidTimestamp { name: String, digits: String },
}

/// Parses a remote filename into station id and primary timestamp.
///
/// The extended shape is checked first: when the stem ends in `_` + digits,
/// those trailing digits are the secondary stamp and must not be read as the
/// primary one. Otherwise the plain shape applies to the whole stem.
///
/// # Errors
///
/// Returns a [`ParseFailure`] when neither shape matches or the matched
/// digits do not form a valid date/time.
pub fn parse_filename(name: &str) -> Result<ParsedFilename, ParseFailure> {
    if !is_plain_file_name(name) {
        return Err(ParseFailure::NotAFileName {
            name: name.to_string(),
        });
    }
    let stem = split_extension(name).0;

    let (captures, shape) = if let Some(c) = EXTENDED_PATTERN.captures(stem) {
        (c, FilenameShape::Extended)
    } else if let Some(c) = PLAIN_PATTERN.captures(stem) {
        (c, FilenameShape::Plain)
    } else {
        return Err(ParseFailure::NoTimestamp {
            name: name.to_string(),
        });
    };

    let station_id = &captures["station"];
    let digits = &captures["stamp"];
    let timestamp = parse_stamp(digits).ok_or_else(|| ParseFailure::InvalidTimestamp {
        name: name.to_string(),
        digits: digits.to_string(),
    })?;

    Ok(ParsedFilename {
        station_id: station_id.to_string(),
        timestamp,
        shape,
    })
}

/// Formats a plain-shape filename; the inverse of [`parse_filename`] for
/// timestamps in 2000..=2099.
#[must_use]
pub fn format_filename(station_id: &str, timestamp: &NaiveDateTime, extension: &str) -> String {
    let stamp = timestamp.format("%y%m%d%H%M%S");
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() {
        format!("{station_id}{stamp}")
    } else {
        format!("{station_id}{stamp}.{extension}")
    }
}

/// Splits `name` into stem and extension (without the dot).
#[must_use]
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// `YYMMDDHHMMSS` with the year expanded to `20YY`.
fn parse_stamp(digits: &str) -> Option<NaiveDateTime> {
    let field = |range: std::ops::Range<usize>| digits.get(range)?.parse::<u32>().ok();
    let year = 2000 + i32::try_from(field(0..2)?).ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(2..4)?, field(4..6)?)?;
    let time = NaiveTime::from_hms_opt(field(6..8)?, field(8..10)?, field(10..12)?)?;
    Some(date.and_time(time))
}

fn is_plain_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return false;
    }
    Path::new(name)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

/// Deterministic local destination: `root/STATION/DDMMYYYY_DDMMYYYY/filename`.
#[must_use]
pub fn local_destination(
    local_root: &Path,
    station_id: &str,
    window: &DownloadWindow,
    filename: &str,
) -> PathBuf {
    local_root
        .join(station_id)
        .join(window.folder_label())
        .join(filename)
}

/// In-progress sibling of `dest` (`name.ext.part`).
#[must_use]
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Whether a timestamp can round-trip through the two-digit year.
#[must_use]
pub fn is_formattable(timestamp: &NaiveDateTime) -> bool {
    (2000..=2099).contains(&timestamp.year()) && timestamp.nanosecond() == 0
}
