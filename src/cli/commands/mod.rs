//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod serve;
mod split;
mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "beo")]
#[command(about = "Split banquet event order packets into one PDF per event")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Split a PDF packet into one file per BEO
    Split {
        /// Packet to split
        input: PathBuf,
        /// Output directory (default: <input>_split next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Withhold per-BEO files when any page needs review
        #[arg(long)]
        stop_on_problems: bool,
        /// Never fall back to OCR
        #[arg(long)]
        no_ocr: bool,
        /// Header/footer band as a fraction of page height
        #[arg(long)]
        margin_ratio: Option<f64>,
    },

    /// Start the upload API server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default from config)
        bind: Option<String>,
    },

    /// Initialize the data directory and database
    Init,

    /// Check that the external PDF tools are installed
    Tools,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (mut settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Split {
            input,
            output,
            stop_on_problems,
            no_ocr,
            margin_ratio,
        } => {
            if stop_on_problems {
                settings.split.stop_on_problems = true;
            }
            if no_ocr {
                settings.split.ocr_enabled = false;
            }
            if let Some(ratio) = margin_ratio {
                settings.split.margin_ratio = ratio;
            }
            split::cmd_split(&settings, &input, output).await
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind_address.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Tools => tools::cmd_tools(&settings),
    }
}
