//! Command-line flags for the yacu daemon.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "yacu", author, version, about = "Keeps containers on their latest images")]
pub struct Cli {
    /// Path to the YAML config file. Defaults apply when it does not exist.
    #[arg(long, env = "YACU_CONFIG", default_value = "yacu.yaml")]
    pub config: PathBuf,

    /// Run a single update batch now and exit instead of following the schedule
    #[arg(long)]
    pub once: bool,
}
