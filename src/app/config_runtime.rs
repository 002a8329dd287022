use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgMatches, CommandFactory, FromArgMatches, parser::ValueSource};
use station_downloader_core::{
    ConcurrencyConfig, ConnectionSettings, DownloadRequest, DownloadWindow, ExtensionFilter,
    RetryPolicy, ServerProfile, StationSelection,
};

use crate::app::config_file::FileConfig;
use crate::cli::{Cli, DownloadArgs, ServerArgs};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) retries: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let command = Cli::command();
    let matches = command.get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());

    let sources = match matches.subcommand_matches("download") {
        Some(download) => CliValueSources {
            retries: is_commandline_value(download, "retries"),
        },
        None => CliValueSources::default(),
    };
    (cli, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Server profile and timeouts from CLI overrides and the config file.
pub(crate) fn resolve_server(
    args: &ServerArgs,
    file_config: Option<&FileConfig>,
) -> Result<(ServerProfile, ConnectionSettings)> {
    let file = file_config.cloned().unwrap_or_default();

    let Some(host) = args.host.clone().or(file.host) else {
        bail!("No FTP host configured. Pass --host or set `host` in the config file");
    };
    let Some(username) = args.user.clone().or(file.username) else {
        bail!("No FTP username configured. Pass --user or set `username` in the config file");
    };
    let password = file.password.unwrap_or_default();

    let mut profile = ServerProfile::new(host, username, password);
    if let Some(port) = args.port.or(file.port) {
        profile = profile.with_port(port);
    }
    if let Some(base_path) = args.base_path.clone().or(file.base_path) {
        profile = profile.with_base_path(base_path);
    }
    profile.validate().context("Invalid server settings")?;

    let settings = ConnectionSettings {
        connect_timeout: Duration::from_secs(
            file.connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        ),
        read_timeout: Duration::from_secs(
            file.read_timeout_secs.unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        ),
    };
    Ok((profile, settings))
}

/// Everything the `download` command needs besides the server.
#[derive(Debug)]
pub(crate) struct ResolvedDownload {
    pub(crate) request: DownloadRequest,
    pub(crate) settings: ConnectionSettings,
    pub(crate) concurrency: ConcurrencyConfig,
    pub(crate) report: Option<PathBuf>,
}

pub(crate) fn resolve_download(
    args: &DownloadArgs,
    cli_sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Result<ResolvedDownload> {
    let (server, settings) = resolve_server(&args.server, file_config)?;

    let stations = if args.stations.is_empty() {
        file_config
            .and_then(|f| f.stations.clone())
            .unwrap_or_default()
    } else {
        args.stations.clone()
    };
    let stations = StationSelection::new(stations);
    if stations.is_empty() {
        bail!("No stations selected. Pass --station or set `stations` in the config file");
    }

    let window = DownloadWindow::with_times(args.from, args.to, args.start_time, args.end_time)
        .context("Invalid download window")?;

    let local_root = args
        .output
        .clone()
        .or_else(|| file_config.and_then(|f| f.local_root.clone()))
        .unwrap_or_else(|| PathBuf::from("."));

    let extensions = ExtensionFilter::new(
        file_config
            .and_then(|f| f.extensions.clone())
            .unwrap_or_default(),
    );

    let retries = match file_config.and_then(|f| f.retry_attempts) {
        Some(from_file) if !cli_sources.retries => from_file,
        _ => args.retries,
    };
    let retry_delay = Duration::from_millis(
        file_config
            .and_then(|f| f.retry_delay_ms)
            .unwrap_or_default(),
    );
    let max_workers = args
        .max_workers
        .or_else(|| file_config.and_then(|f| f.max_workers))
        .map(usize::from);

    let concurrency = ConcurrencyConfig {
        max_workers,
        retry: RetryPolicy::with_retries(retries).with_base_delay(retry_delay),
        ..ConcurrencyConfig::default()
    };
    concurrency
        .validate()
        .context("Invalid concurrency settings")?;

    Ok(ResolvedDownload {
        request: DownloadRequest {
            server,
            stations,
            window,
            local_root,
            extensions,
        },
        settings,
        concurrency,
        report: args.report.clone(),
    })
}

/// Priority: `RUST_LOG` (applied by the subscriber) > quiet > verbose > info.
pub(crate) fn resolve_default_log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
