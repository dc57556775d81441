use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;

/// Watches the local Docker fleet and reports lifecycle changes to chat.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Config file; `${ VAR }` placeholders are filled from the environment.
    #[arg(short, long, default_value = "homelab-monitor.toml")]
    pub config: PathBuf,

    /// Load and validate the config, print the effective settings and exit
    /// without contacting Docker.
    #[arg(long)]
    pub check_config: bool,
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}
