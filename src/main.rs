mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use beatclock::analyze;
use beatclock::config::{self, Config};

use cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect beatclock.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("beatclock.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("beatclock").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut config = Config::default();
    if let Some(ref path) = config_path {
        match config::load_config(path) {
            Some(loaded) => {
                log::info!("Loaded config from {}", path.display());
                config = loaded;
            }
            None => log::warn!("Failed to load config from {}", path.display()),
        }
    }
    if cli.seed.is_some() {
        config.analysis.synth_seed = cli.seed;
    }

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("Input: {}", cli.input.display());
    log::info!("Frame rate: {} fps", cli.fps);

    let result = analyze(&cli.input, cli.fps, &config);

    // Consumer-style pass: sample the clock once per output frame
    let total = result.total_frames();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames")
            .unwrap()
            .progress_chars("=>-"),
    );

    let mut energy_sum = 0.0f64;
    let mut beat_count = 0usize;
    for index in 0..total {
        let (frame, is_beat) = result.feature_at_frame(index);
        energy_sum += frame.energy as f64;
        if is_beat {
            beat_count += 1;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mean_energy = if total > 0 { energy_sum / total as f64 } else { 0.0 };
    log::info!(
        "Duration: {:.2}s, frames: {}, beats: {}, mean energy: {:.3}",
        result.duration(),
        total,
        beat_count,
        mean_energy
    );

    if let Some(ref output) = cli.output {
        let file = std::fs::File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &result)
            .context("Failed to serialize analysis result")?;
        log::info!("Wrote analysis to {}", output.display());
    }

    Ok(())
}
