//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "otad", version, about = "On-device OTA update agent")]
pub struct Cli {
    /// Path to the toml config file
    #[arg(long, env = "OTAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Install root override (versions/, symlinks, tmp/, logs/)
    #[arg(long)]
    pub install_root: Option<PathBuf>,

    /// Listen port override for the localhost API
    #[arg(long)]
    pub port: Option<u16>,

    /// Progress callback endpoint override
    #[arg(long)]
    pub callback_url: Option<String>,

    /// Verbose logging (RUST_LOG still takes precedence)
    #[arg(long, short = 'd')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the update agent (default)
    Run,
    /// Install a package archive as the immutable factory version
    Provision {
        /// Path to the package zip
        #[arg(long)]
        package: PathBuf,
        /// Version the archive must declare
        #[arg(long)]
        version: String,
    },
}
