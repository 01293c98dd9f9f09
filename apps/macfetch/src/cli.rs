//! Command line interface definition

use clap::{Parser, Subcommand};
use macfetch_types::OsType;
use std::path::PathBuf;

/// macfetch - verified downloads of macOS installer and recovery images
#[derive(Parser)]
#[command(name = "macfetch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verified downloads of macOS installer and recovery images")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write debug logs as JSON to the log directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root of the download tree
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Fetch the recovery (or diagnostics) image for a board
    #[command(alias = "rec")]
    Recovery {
        /// Board identifier, e.g. Mac-E43C1C25D4880AD6
        #[arg(long, short = 'b', value_name = "ID")]
        board_id: String,

        /// Which OS the server should hand out
        #[arg(long, value_enum, default_value_t = OsType::Default)]
        os: OsType,

        /// Logic board serial number
        #[arg(long, short = 'm')]
        mlb: Option<String>,

        /// Client id (16 hex digits); random when omitted
        #[arg(long, value_name = "HEX")]
        client_id: Option<String>,

        /// Fetch the diagnostics image instead of recovery
        #[arg(long)]
        diagnostics: bool,

        /// Accept a board id missing from the board dataset
        #[arg(long)]
        allow_unknown_board: bool,
    },

    /// Download an installer payload from a known URL
    #[command(alias = "dl")]
    Download {
        /// Payload URL
        #[arg(long)]
        url: String,

        /// Chunklist authenticating the payload
        #[arg(long, value_name = "URL")]
        chunklist_url: Option<String>,

        /// Product identifier, used as the first directory level
        #[arg(long)]
        product: String,

        /// OS version, used as the second directory level
        #[arg(long)]
        os_version: String,

        /// File name for the payload; taken from the URL when omitted
        #[arg(long)]
        file_name: Option<String>,
    },

    /// Check a downloaded file against its chunklist
    Verify {
        /// Chunklist file
        #[arg(long)]
        chunklist: PathBuf,

        /// Payload file
        #[arg(long)]
        payload: PathBuf,
    },

    /// List known boards and their products
    Boards {
        /// Only show this board
        #[arg(long, value_name = "ID")]
        board_id: Option<String>,
    },
}
