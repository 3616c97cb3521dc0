use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "beatclock",
    about = "Per-frame audio features and beat events from a video soundtrack"
)]
pub struct Cli {
    /// Input video file (any container ffmpeg can read)
    pub input: PathBuf,

    /// Output frame rate the feature stream is quantized to
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Write the full analysis result as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Config file (TOML); defaults to ./beatclock.toml or the platform config dir
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seed for the synthetic fallback generator
    #[arg(long)]
    pub seed: Option<u64>,
}
