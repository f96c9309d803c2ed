pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Send and receive encrypted messages using Nostr relays")]
#[command(version)]
pub struct Args {
    /// Path to the pulse config directory (defaults to ~/.pulse)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Show per-relay status and timings
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
