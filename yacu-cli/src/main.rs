mod cli;
mod config;
mod daemon;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let options = match config::load_config(&cli.config) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("Error: failed to setup configuration: {:#}", error);
            return ExitCode::FAILURE;
        }
    };

    // Keep the guard alive until exit so buffered log lines are flushed
    let _log_guard = logging::init_logging(&options.logging);
    tracing::debug!(
        config = %cli.config.display(),
        database = %options.database.path.display(),
        registries = options.registries.0.len(),
        webhooks = options.webhooks.len(),
        "Config loaded"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(error) => {
            tracing::error!(%error, "Failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(daemon::run(options, cli.once)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{:#}", error);
            ExitCode::FAILURE
        }
    }
}
