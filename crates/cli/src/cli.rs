//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "mediamux", version, about = "Fetch, remux and demux media through ffmpeg and yt-dlp")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory where outputs are written
    #[arg(long, global = true, default_value = ".")]
    pub out_dir: PathBuf,

    /// Run jobs concurrently instead of one at a time
    #[arg(long, global = true)]
    pub parallel: bool,

    /// Concurrent job cap (implies --parallel when greater than 1)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=16))]
    pub max_jobs: Option<u64>,

    /// Overwrite existing output files instead of uniquifying names
    #[arg(long, global = true)]
    pub overwrite: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download one or more URLs with yt-dlp
    Fetch {
        #[arg(required = true)]
        urls: Vec<String>,

        /// yt-dlp format selector
        #[arg(long, default_value = "best")]
        format: String,

        /// Merge video and audio into this container after download
        #[arg(long)]
        merge_format: Option<String>,
    },

    /// Repackage files into another container without re-encoding
    Remux {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target container extension
        #[arg(long, default_value = "mp4")]
        container: String,
    },

    /// Split files into separate video and per-language audio outputs
    Demux {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target format for extracted audio streams
        #[arg(long, default_value = "aac")]
        audio_format: String,

        /// Target container for the extracted video stream
        #[arg(long, default_value = "mp4")]
        video_format: String,

        /// Re-encode streams even when the codec already matches
        #[arg(long)]
        force_reencode: bool,
    },
}
