//! Routes the `check` and `preview` subcommands.
//!
//! Both open a single session, print what the server returned and exit. The
//! `download` command is left to the caller.

use std::sync::Arc;

use anyhow::{Context, Result};
use station_downloader_core::{ConcurrencyConfig, DownloadEngine, SuppaConnector};

use crate::ProcessExit;
use crate::app::config_file::FileConfig;
use crate::app::config_runtime;
use crate::cli::Command;

/// Runs `command` if it is not `download` and returns `Some(exit)`; otherwise `None`.
pub(crate) async fn try_dispatch(
    command: &Command,
    file_config: Option<&FileConfig>,
) -> Result<Option<ProcessExit>> {
    match command {
        Command::Download(_) => Ok(None),
        Command::Check(server_args) => {
            let (server, settings) = config_runtime::resolve_server(server_args, file_config)?;
            let engine = DownloadEngine::new(
                Arc::new(SuppaConnector),
                settings,
                ConcurrencyConfig::default(),
            )?;
            let cwd = engine
                .check_connection(&server)
                .await
                .with_context(|| format!("Could not connect to {}", server.identity()))?;
            println!("Connected to {}:{} as {}", server.host, server.port, server.username);
            println!("Working directory: {cwd}");
            Ok(Some(ProcessExit::Success))
        }
        Command::Preview(preview_args) => {
            let (server, settings) =
                config_runtime::resolve_server(&preview_args.server, file_config)?;
            let engine = DownloadEngine::new(
                Arc::new(SuppaConnector),
                settings,
                ConcurrencyConfig::default(),
            )?;
            let entries = engine
                .preview_listing(&server, &preview_args.path)
                .await
                .with_context(|| format!("Could not list '{}'", preview_args.path))?;
            for entry in &entries {
                println!("{entry}");
            }
            println!("{} entries in {}", entries.len(), preview_args.path);
            Ok(Some(ProcessExit::Success))
        }
    }
}
