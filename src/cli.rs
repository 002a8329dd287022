//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Download station time-series files from FTP servers.
///
/// Files are selected by the station id and `YYMMDDHHMMSS` timestamp embedded
/// in each filename and stored under `OUTPUT/STATION/DDMMYYYY_DDMMYYYY/`.
#[derive(Parser, Debug)]
#[command(name = "station-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/station-downloader/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download files for the configured stations within a date window
    Download(DownloadArgs),

    /// Connect, log in and print the working directory
    Check(ServerArgs),

    /// List one remote directory without downloading
    Preview(PreviewArgs),
}

/// Server overrides; the password is only read from the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// FTP host
    #[arg(long)]
    pub host: Option<String>,

    /// FTP control port
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    /// Login name
    #[arg(long)]
    pub user: Option<String>,

    /// Remote base directory all layouts are rooted at
    #[arg(long, value_name = "PATH")]
    pub base_path: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// First date of the window (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub from: NaiveDate,

    /// Last date of the window (YYYY-MM-DD), inclusive
    #[arg(long, value_parser = parse_date)]
    pub to: NaiveDate,

    /// Earliest time of day on the first date (HH:MM or HH:MM:SS)
    #[arg(long, value_parser = parse_time)]
    pub start_time: Option<NaiveTime>,

    /// Latest time of day on the last date (HH:MM or HH:MM:SS)
    #[arg(long, value_parser = parse_time)]
    pub end_time: Option<NaiveTime>,

    /// Station id (repeatable); replaces the configured station list
    #[arg(short, long = "station", value_name = "ID")]
    pub stations: Vec<String>,

    /// Local root directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Upper bound on concurrent sessions (1-64)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub max_workers: Option<u16>,

    /// Retries after a failed attempt (0-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_RETRIES, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub retries: u32,

    /// Write the run summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Remote directory to list
    pub path: String,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|e| format!("expected HH:MM or HH:MM:SS: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(extra: &[&str]) -> DownloadArgs {
        let mut argv = vec![
            "station-downloader",
            "download",
            "--from",
            "2025-11-18",
            "--to",
            "2025-11-20",
        ];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Download(args) => args,
            other => panic!("expected download, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_download_minimal_args() {
        let args = download(&[]);
        assert_eq!(args.from, NaiveDate::from_ymd_opt(2025, 11, 18).unwrap());
        assert_eq!(args.to, NaiveDate::from_ymd_opt(2025, 11, 20).unwrap());
        assert_eq!(args.retries, DEFAULT_RETRIES);
        assert!(args.stations.is_empty());
        assert!(args.max_workers.is_none());
        assert!(args.start_time.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["station-downloader", "-v", "check"]).unwrap();
        assert_eq!(cli.verbose, 1);

        let cli = Cli::try_parse_from(["station-downloader", "check", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let cli = Cli::try_parse_from(["station-downloader", "--quiet", "check"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["station-downloader", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["station-downloader"]).is_err());
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Cli::try_parse_from(["station-downloader", "check", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    // ==================== Download Args Tests ====================

    #[test]
    fn test_cli_repeatable_station() {
        let args = download(&["--station", "STATION1", "-s", "STATION1RF"]);
        assert_eq!(args.stations, ["STATION1", "STATION1RF"]);
    }

    #[test]
    fn test_cli_times_accept_minutes_and_seconds() {
        let args = download(&["--start-time", "08:30", "--end-time", "17:45:10"]);
        assert_eq!(args.start_time, NaiveTime::from_hms_opt(8, 30, 0));
        assert_eq!(args.end_time, NaiveTime::from_hms_opt(17, 45, 10));
    }

    #[test]
    fn test_cli_rejects_bad_date() {
        let result = Cli::try_parse_from([
            "station-downloader",
            "download",
            "--from",
            "18/11/2025",
            "--to",
            "2025-11-20",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_max_workers_range() {
        assert_eq!(download(&["-w", "64"]).max_workers, Some(64));
        let result = Cli::try_parse_from([
            "station-downloader",
            "download",
            "--from",
            "2025-11-18",
            "--to",
            "2025-11-18",
            "--max-workers",
            "65",
        ]);
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::ValueValidation
        );
    }

    #[test]
    fn test_cli_retries_range() {
        assert_eq!(download(&["-r", "0"]).retries, 0);
        assert_eq!(download(&["--retries", "10"]).retries, 10);
        let result = Cli::try_parse_from([
            "station-downloader",
            "download",
            "--from",
            "2025-11-18",
            "--to",
            "2025-11-18",
            "-r",
            "11",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_server_overrides() {
        let args = download(&["--host", "ftp.example.com", "--port", "2121", "--user", "ops"]);
        assert_eq!(args.server.host.as_deref(), Some("ftp.example.com"));
        assert_eq!(args.server.port, Some(2121));
        assert_eq!(args.server.user.as_deref(), Some("ops"));
    }

    // ==================== Preview Tests ====================

    #[test]
    fn test_cli_preview_path() {
        let cli =
            Cli::try_parse_from(["station-downloader", "preview", "/ARCHIVE/2025/11/18"]).unwrap();
        match cli.command {
            Command::Preview(args) => assert_eq!(args.path, "/ARCHIVE/2025/11/18"),
            other => panic!("expected preview, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli =
            Cli::try_parse_from(["station-downloader", "check", "--config", "/tmp/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }
}
