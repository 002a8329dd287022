use anyhow::Result;
use tracing::{debug, info};

use station_downloader_core::CancelToken;

use crate::ProcessExit;
use crate::app::{
    command_dispatcher, config_file, config_runtime, download_orchestrator, exit_handler, report,
    terminal,
};
use crate::cli::Command;

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    let (cli, cli_sources) = config_runtime::parse_cli_with_sources();

    terminal::init_tracing(config_runtime::resolve_default_log_level(
        cli.verbose,
        cli.quiet,
    ));
    debug!(?cli, "CLI arguments parsed");

    let file_config = config_file::load_file_config(cli.config.as_deref())?;

    if let Some(exit) = command_dispatcher::try_dispatch(&cli.command, file_config.as_ref()).await? {
        return Ok(exit);
    }
    let Command::Download(download_args) = &cli.command else {
        return Ok(ProcessExit::Success);
    };

    let resolved =
        config_runtime::resolve_download(download_args, &cli_sources, file_config.as_ref())?;
    info!(
        server = %resolved.request.server.identity(),
        stations = resolved.request.stations.len(),
        from = %resolved.request.window.start_bound(),
        to = %resolved.request.window.end_bound(),
        local_root = %resolved.request.local_root.display(),
        "Station downloader starting"
    );

    let cancel = CancelToken::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_signal.cancel();
        }
    });

    let run = download_orchestrator::run_download(&resolved, cli.quiet, &cancel).await?;

    if !cli.quiet {
        println!("{}", download_orchestrator::format_summary(&run.summary));
    }
    if let Some(path) = &resolved.report {
        report::write_report(path, &resolved.request, &run)?;
        info!(path = %path.display(), "Run report written");
    }

    Ok(exit_handler::determine_exit_outcome(&run.summary))
}
